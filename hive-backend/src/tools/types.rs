use crate::hive::{HiveManager, Requester};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;

/// Tool groups, used to order and label the tool listing
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ToolGroup {
    #[default]
    Messaging,
    Hive,
    Scheduling,
    System,
}

impl ToolGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolGroup::Messaging => "messaging",
            ToolGroup::Hive => "hive",
            ToolGroup::Scheduling => "scheduling",
            ToolGroup::System => "system",
        }
    }
}

/// JSON Schema property definition
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PropertySchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items: Option<Box<PropertySchema>>,
    #[serde(rename = "enum", skip_serializing_if = "Option::is_none")]
    pub enum_values: Option<Vec<String>>,
}

impl PropertySchema {
    pub fn string(description: impl Into<String>) -> Self {
        PropertySchema {
            schema_type: "string".to_string(),
            description: description.into(),
            default: None,
            items: None,
            enum_values: None,
        }
    }

    pub fn number(description: impl Into<String>) -> Self {
        PropertySchema {
            schema_type: "number".to_string(),
            ..Self::string(description)
        }
    }

    pub fn with_default(mut self, default: Value) -> Self {
        self.default = Some(default);
        self
    }
}

/// Tool input schema using JSON Schema format
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolInputSchema {
    #[serde(rename = "type")]
    pub schema_type: String,
    pub properties: HashMap<String, PropertySchema>,
    #[serde(default)]
    pub required: Vec<String>,
}

impl Default for ToolInputSchema {
    fn default() -> Self {
        ToolInputSchema {
            schema_type: "object".to_string(),
            properties: HashMap::new(),
            required: vec![],
        }
    }
}

/// Tool definition as listed to agents and the API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    pub name: String,
    pub description: String,
    pub input_schema: ToolInputSchema,
    #[serde(default)]
    pub group: ToolGroup,
}

/// Result of tool execution. `content` is a JSON body carrying a `status`
/// of `ok`, `error` or `pending_confirmation`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub success: bool,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Value>,
    /// Seconds the caller should wait before retrying
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retry_after_secs: Option<u64>,
}

impl ToolResult {
    /// Wrap a JSON body; anything but `status: "error"` counts as success
    pub fn json(body: Value) -> Self {
        let error = match body.get("status").and_then(|s| s.as_str()) {
            Some("error") => Some(
                body.get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("unknown error")
                    .to_string(),
            ),
            _ => None,
        };
        ToolResult {
            success: error.is_none(),
            content: body.to_string(),
            error,
            metadata: None,
            retry_after_secs: None,
        }
    }

    pub fn ok(body: Value) -> Self {
        let mut body = body;
        if let Some(map) = body.as_object_mut() {
            map.entry("status").or_insert_with(|| json!("ok"));
        }
        Self::json(body)
    }

    pub fn error(message: impl Into<String>) -> Self {
        let msg = message.into();
        ToolResult {
            success: false,
            content: json!({ "status": "error", "error": msg }).to_string(),
            error: Some(msg),
            metadata: None,
            retry_after_secs: None,
        }
    }

    /// Error body the caller may retry after `retry_after_secs`
    pub fn retryable_error(body: Value, retry_after_secs: u64) -> Self {
        let mut result = Self::json(body);
        result.success = false;
        if result.error.is_none() {
            result.error = Some("retryable failure".to_string());
        }
        result.retry_after_secs = Some(retry_after_secs);
        result
    }

    pub fn with_metadata(mut self, metadata: Value) -> Self {
        self.metadata = Some(metadata);
        self
    }

    pub fn should_retry(&self) -> bool {
        self.retry_after_secs.is_some()
    }

    /// Parsed JSON body, or Null when the content is not JSON
    pub fn body(&self) -> Value {
        serde_json::from_str(&self.content).unwrap_or(Value::Null)
    }
}

/// Context provided to tools during execution
#[derive(Clone, Default)]
pub struct ToolContext {
    /// Session key of the calling agent
    pub session_key: Option<String>,
    pub channel: Option<String>,
    pub hive: Option<HiveManager>,
    /// Additional context data
    pub extra: HashMap<String, Value>,
}

impl std::fmt::Debug for ToolContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ToolContext")
            .field("session_key", &self.session_key)
            .field("channel", &self.channel)
            .field("hive", &self.hive.is_some())
            .field("extra", &self.extra)
            .finish()
    }
}

impl ToolContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(mut self, session_key: impl Into<String>) -> Self {
        self.session_key = Some(session_key.into());
        self
    }

    pub fn with_channel(mut self, channel: impl Into<String>) -> Self {
        self.channel = Some(channel.into());
        self
    }

    pub fn with_hive(mut self, hive: HiveManager) -> Self {
        self.hive = Some(hive);
        self
    }

    /// The hive services, or an error result for tools that need them
    pub fn require_hive(&self) -> Result<&HiveManager, ToolResult> {
        self.hive
            .as_ref()
            .ok_or_else(|| ToolResult::error("Hive services are not available in this context"))
    }

    /// Identity used for outgoing agent messages
    pub fn requester(&self) -> Requester {
        Requester::new(
            self.session_key.clone().unwrap_or_default(),
            self.channel
                .clone()
                .unwrap_or_else(|| crate::hive::messenger::INTERNAL_MESSAGE_CHANNEL.to_string()),
        )
    }
}
