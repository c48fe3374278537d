//! agent_send: message another agent directly by id

use crate::hive::{resolve_session_key, SendRequest};
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub struct AgentSendTool {
    definition: ToolDefinition,
}

impl AgentSendTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "agentId".to_string(),
            PropertySchema::string("Target agent id. A bare id is addressed under 'main'; 'namespace:id' is used as-is."),
        );
        properties.insert(
            "message".to_string(),
            PropertySchema::string("Message for the target agent"),
        );
        properties.insert(
            "timeoutSeconds".to_string(),
            PropertySchema::number("Seconds to wait for the target's run. 0 returns right after acceptance.")
                .with_default(json!(30)),
        );
        properties.insert(
            "idempotencyKey".to_string(),
            PropertySchema::string("Only when retrying: the idempotencyKey returned by the failed attempt"),
        );

        AgentSendTool {
            definition: ToolDefinition {
                name: "agent_send".to_string(),
                description: "Send a message directly to another agent by their agentId. The agents may continue the conversation on their own afterwards.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["agentId".to_string(), "message".to_string()],
                },
                group: ToolGroup::Messaging,
            },
        }
    }
}

impl Default for AgentSendTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct AgentSendParams {
    agent_id: String,
    message: String,
    timeout_seconds: Option<f64>,
    idempotency_key: Option<String>,
}

#[async_trait]
impl Tool for AgentSendTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: AgentSendParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let hive = match context.require_hive() {
            Ok(h) => h,
            Err(result) => return result,
        };

        let backoff_key = resolve_session_key(params.agent_id.trim());
        let outcome = hive
            .messenger(context.requester())
            .send(SendRequest {
                target_agent_id: params.agent_id,
                message: params.message,
                timeout_seconds: params.timeout_seconds,
                idempotency_key: params.idempotency_key,
            })
            .await;

        if outcome.is_ok() {
            hive.backoff().record_success(&backoff_key);
            return ToolResult::json(outcome.to_json());
        }
        if outcome.retryable {
            let delay = hive.backoff().record_timeout(&backoff_key);
            return ToolResult::retryable_error(outcome.to_json(), delay);
        }
        ToolResult::json(outcome.to_json())
    }
}
