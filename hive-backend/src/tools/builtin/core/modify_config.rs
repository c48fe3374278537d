//! modify_config: request a runtime configuration change
//!
//! The change is written to the audit log as `pending_confirmation` before
//! the gateway is asked to apply it. If the patch call fails the row is
//! closed as `failed` and can no longer be approved.

use crate::gateway::protocol::method;
use crate::models::audit::{actions, AuditStatus};
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Map, Value};
use std::collections::HashMap;

const CONFIG_PATCH_TIMEOUT_MS: u64 = 10_000;

pub struct ModifyConfigTool {
    definition: ToolDefinition,
}

impl ModifyConfigTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("key".to_string(), PropertySchema::string("Configuration key to change"));
        properties.insert(
            "value".to_string(),
            PropertySchema {
                schema_type: "string".to_string(),
                description: "New value (any JSON value)".to_string(),
                default: None,
                items: None,
                enum_values: None,
            },
        );
        properties.insert("reason".to_string(), PropertySchema::string("Why the change is needed"));

        ModifyConfigTool {
            definition: ToolDefinition {
                name: "modify_config".to_string(),
                description: "Modify your own configuration or global settings. Changes require manual approval in mission control. Use with caution.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["key".to_string(), "value".to_string(), "reason".to_string()],
                },
                group: ToolGroup::System,
            },
        }
    }
}

impl Default for ModifyConfigTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
struct ModifyConfigParams {
    key: String,
    value: Value,
    reason: String,
}

#[async_trait]
impl Tool for ModifyConfigTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: ModifyConfigParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        if params.key.trim().is_empty() || params.reason.trim().is_empty() {
            return ToolResult::error("key and reason are required");
        }
        let hive = match context.require_hive() {
            Ok(h) => h,
            Err(result) => return result,
        };

        let diff = json!({ "old": "unknown", "new": params.value, "reason": params.reason });
        let entry = match hive.db().append_audit(
            "agent",
            actions::MODIFY_CONFIG,
            &params.key,
            &diff,
            AuditStatus::PendingConfirmation,
        ) {
            Ok(e) => e,
            Err(e) => return ToolResult::error(format!("Failed to record config change: {}", e)),
        };

        let mut patch = Map::new();
        patch.insert(params.key.clone(), params.value);
        if let Err(e) = hive
            .dispatcher()
            .invoke(method::CONFIG_PATCH, json!({ "patch": patch }), CONFIG_PATCH_TIMEOUT_MS)
            .await
        {
            log::warn!("[HIVE] Config patch for '{}' failed: {}", params.key, e);
            if let Err(db_err) = hive.db().fail_pending_audit(&entry.id) {
                log::error!("[HIVE] Could not close audit row {}: {}", entry.id, db_err);
            }
            return ToolResult::json(json!({ "status": "error", "error": e.to_string(), "auditId": entry.id }));
        }

        log::info!("[HIVE] Config change for '{}' pending confirmation ({})", params.key, entry.id);
        ToolResult::json(json!({
            "status": AuditStatus::PendingConfirmation.as_str(),
            "message": format!(
                "Configuration change for \"{}\" has been logged and requires manual approval in Mission Control.",
                params.key
            ),
            "auditId": entry.id,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rejected, test_hive, CannedReasoner, MockDispatcher};
    use std::sync::Arc;

    #[tokio::test]
    async fn test_change_is_audited_then_patched() {
        let dispatcher = Arc::new(MockDispatcher::new());
        let (_dir, hive) = test_hive(dispatcher.clone(), CannedReasoner::ok(""));
        let db = hive.db().clone();
        let ctx = ToolContext::new().with_hive(hive);

        let result = ModifyConfigTool::new()
            .execute(json!({ "key": "agents.maxTurns", "value": 3, "reason": "shorter loops" }), &ctx)
            .await;

        assert!(result.success);
        let body = result.body();
        assert_eq!(body["status"], "pending_confirmation");

        let entry = db.get_audit_entry(body["auditId"].as_str().unwrap()).unwrap().unwrap();
        assert_eq!(entry.actor_id, "agent");
        assert_eq!(entry.status, "pending_confirmation");
        assert_eq!(entry.diff["new"], 3);
        assert_eq!(entry.diff["old"], "unknown");

        let calls = dispatcher.calls_for(method::CONFIG_PATCH);
        assert_eq!(calls[0].params, json!({ "patch": { "agents.maxTurns": 3 } }));
    }

    #[tokio::test]
    async fn test_patch_failure_is_error() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_once(method::CONFIG_PATCH, Err(rejected(method::CONFIG_PATCH, "forbidden")));
        let (_dir, hive) = test_hive(dispatcher, CannedReasoner::ok(""));
        let db = hive.db().clone();
        let ctx = ToolContext::new().with_hive(hive);

        let result = ModifyConfigTool::new()
            .execute(json!({ "key": "k", "value": "v", "reason": "r" }), &ctx)
            .await;
        assert!(!result.success);
        let audit_id = result.body()["auditId"].as_str().unwrap().to_string();
        assert!(result.error.unwrap().contains("forbidden"));

        let entry = db.get_audit_entry(&audit_id).unwrap().unwrap();
        assert_eq!(entry.status, "failed");
        // a change that never went out cannot be approved
        assert!(!db.resolve_pending_audit(&audit_id, true).unwrap());
        assert_eq!(db.get_audit_entry(&audit_id).unwrap().unwrap().status, "failed");
    }
}
