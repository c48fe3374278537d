pub mod builtin;
pub mod registry;
pub mod types;

pub use registry::ToolRegistry;
pub use types::ToolContext;

use std::sync::Arc;

/// Register all built-in tools to a registry
fn register_all_tools(registry: &mut ToolRegistry) {
    // Messaging tools
    registry.register(Arc::new(builtin::AgentSendTool::new()));

    // Hive tools
    registry.register(Arc::new(builtin::SpawnTeamTool::new()));

    // Scheduling tools
    registry.register(Arc::new(builtin::ScheduleTaskTool::new()));
    registry.register(Arc::new(builtin::ListScheduledTasksTool::new()));
    registry.register(Arc::new(builtin::CancelScheduledTaskTool::new()));

    // System tools
    registry.register(Arc::new(builtin::ModifyConfigTool::new()));
}

/// Create a new ToolRegistry with all built-in tools registered
pub fn create_default_registry() -> ToolRegistry {
    let mut registry = ToolRegistry::new();
    register_all_tools(&mut registry);
    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_default_registry_lists_grouped_tools() {
        let registry = create_default_registry();
        assert_eq!(registry.len(), 6);
        let names: Vec<String> = registry.list_definitions().into_iter().map(|d| d.name).collect();
        assert_eq!(
            names,
            vec![
                "hive_spawn_team",
                "agent_send",
                "cancel_scheduled_task",
                "list_scheduled_tasks",
                "schedule_task",
                "modify_config",
            ]
        );
    }

    #[tokio::test]
    async fn test_unknown_tool_is_error() {
        let registry = create_default_registry();
        let result = registry.execute("nope", json!({}), &ToolContext::new()).await;
        assert!(!result.success);
    }
}
