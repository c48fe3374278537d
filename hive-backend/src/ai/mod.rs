pub mod openai;

pub use openai::OpenAIClient;

use crate::gateway::protocol::method;
use crate::gateway::Dispatcher;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

/// RPC deadline for a planning request routed through the gateway
pub const GATEWAY_REASONING_TIMEOUT_MS: u64 = 60_000;
/// Run timeout (seconds) the gateway applies to a planning request
const GATEWAY_REASONING_RUN_SECS: u64 = 30;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl ToString for MessageRole {
    fn to_string(&self) -> String {
        match self {
            MessageRole::System => "system".to_string(),
            MessageRole::User => "user".to_string(),
            MessageRole::Assistant => "assistant".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

/// Opaque planner: takes an instruction, returns free text that should
/// contain JSON. Callers must cope with fences and garbage.
#[async_trait]
pub trait ReasoningService: Send + Sync {
    async fn propose(&self, instruction: &str) -> Result<String, String>;
}

#[async_trait]
impl ReasoningService for OpenAIClient {
    async fn propose(&self, instruction: &str) -> Result<String, String> {
        self.generate_text(vec![Message {
            role: MessageRole::User,
            content: instruction.to_string(),
        }])
        .await
    }
}

/// Routes planning prompts through the gateway's `agent` method on the main lane
pub struct GatewayReasoner {
    dispatcher: Arc<dyn Dispatcher>,
}

impl GatewayReasoner {
    pub fn new(dispatcher: Arc<dyn Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl ReasoningService for GatewayReasoner {
    async fn propose(&self, instruction: &str) -> Result<String, String> {
        let params = json!({
            "message": instruction,
            "lane": "main",
            "deliver": false,
            "timeout": GATEWAY_REASONING_RUN_SECS,
            "idempotencyKey": uuid::Uuid::new_v4().to_string(),
        });

        let result = self
            .dispatcher
            .invoke(method::AGENT, params, GATEWAY_REASONING_TIMEOUT_MS)
            .await
            .map_err(|e| e.to_string())?;

        result
            .get("text")
            .and_then(|t| t.as_str())
            .map(|t| t.to_string())
            .ok_or_else(|| "Gateway reasoning response had no text".to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::MockDispatcher;

    #[tokio::test]
    async fn test_gateway_reasoner_reads_text() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_always(method::AGENT, Ok(json!({ "text": "{\"tasks\": []}" })));

        let reasoner = GatewayReasoner::new(dispatcher.clone());
        let text = reasoner.propose("plan it").await.unwrap();
        assert_eq!(text, "{\"tasks\": []}");

        let calls = dispatcher.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].timeout_ms, GATEWAY_REASONING_TIMEOUT_MS);
        assert_eq!(calls[0].params["lane"], "main");
        assert_eq!(calls[0].params["deliver"], false);
    }

    #[tokio::test]
    async fn test_gateway_reasoner_missing_text_is_error() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_always(method::AGENT, Ok(json!({ "runId": "r1" })));

        let reasoner = GatewayReasoner::new(dispatcher);
        assert!(reasoner.propose("plan it").await.is_err());
    }
}
