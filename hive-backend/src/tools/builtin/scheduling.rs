//! Recurring task tools: schedule_task, list_scheduled_tasks, cancel_scheduled_task

use crate::schedule::{next_run_after, resolve_cron};
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

const DEFAULT_OWNER: &str = "main";

pub struct ScheduleTaskTool {
    definition: ToolDefinition,
}

impl ScheduleTaskTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "cronExpression".to_string(),
            PropertySchema::string("Five-field cron expression, e.g. '*/15 * * * *'"),
        );
        properties.insert(
            "naturalLanguageSchedule".to_string(),
            PropertySchema::string("Schedule in plain English, e.g. 'every monday at 9am'. Used when cronExpression is absent."),
        );
        properties.insert(
            "description".to_string(),
            PropertySchema::string("What should happen each time the task runs"),
        );
        properties.insert(
            "ownerAgentId".to_string(),
            PropertySchema::string("Agent that owns the task").with_default(json!(DEFAULT_OWNER)),
        );

        ScheduleTaskTool {
            definition: ToolDefinition {
                name: "schedule_task".to_string(),
                description: "Schedule a recurring task for an agent.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["description".to_string()],
                },
                group: ToolGroup::Scheduling,
            },
        }
    }
}

impl Default for ScheduleTaskTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScheduleTaskParams {
    cron_expression: Option<String>,
    natural_language_schedule: Option<String>,
    description: String,
    owner_agent_id: Option<String>,
}

#[async_trait]
impl Tool for ScheduleTaskTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: ScheduleTaskParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let hive = match context.require_hive() {
            Ok(h) => h,
            Err(result) => return result,
        };

        let cron = match resolve_cron(
            params.cron_expression.as_deref(),
            params.natural_language_schedule.as_deref(),
        ) {
            Ok(c) => c,
            Err(e) => return ToolResult::error(e),
        };
        let next_run_at = match next_run_after(&cron, Utc::now()) {
            Ok(t) => t,
            Err(e) => return ToolResult::error(e),
        };

        let owner = params
            .owner_agent_id
            .filter(|o| !o.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_OWNER.to_string());
        let phrase = params
            .natural_language_schedule
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty());

        match hive.db().create_scheduled_task(
            &owner,
            &cron,
            phrase,
            &json!({ "description": params.description }),
            Some(next_run_at),
        ) {
            Ok(task) => ToolResult::ok(json!({
                "taskId": task.id,
                "cronExpression": task.cron_expression,
                "nextRunAt": next_run_at.to_rfc3339(),
            })),
            Err(e) => ToolResult::error(format!("Failed to store scheduled task: {}", e)),
        }
    }
}

pub struct ListScheduledTasksTool {
    definition: ToolDefinition,
}

impl ListScheduledTasksTool {
    pub fn new() -> Self {
        ListScheduledTasksTool {
            definition: ToolDefinition {
                name: "list_scheduled_tasks".to_string(),
                description: "List all recurring tasks, including cancelled ones.".to_string(),
                input_schema: ToolInputSchema::default(),
                group: ToolGroup::Scheduling,
            },
        }
    }
}

impl Default for ListScheduledTasksTool {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Tool for ListScheduledTasksTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, _params: Value, context: &ToolContext) -> ToolResult {
        let hive = match context.require_hive() {
            Ok(h) => h,
            Err(result) => return result,
        };
        match hive.db().list_scheduled_tasks() {
            Ok(tasks) => ToolResult::ok(json!({ "tasks": tasks })),
            Err(e) => ToolResult::error(format!("Failed to list scheduled tasks: {}", e)),
        }
    }
}

pub struct CancelScheduledTaskTool {
    definition: ToolDefinition,
}

impl CancelScheduledTaskTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert("taskId".to_string(), PropertySchema::string("Id of the task to cancel"));

        CancelScheduledTaskTool {
            definition: ToolDefinition {
                name: "cancel_scheduled_task".to_string(),
                description: "Cancel a recurring task. The task stays listed as cancelled.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["taskId".to_string()],
                },
                group: ToolGroup::Scheduling,
            },
        }
    }
}

impl Default for CancelScheduledTaskTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CancelParams {
    task_id: String,
}

#[async_trait]
impl Tool for CancelScheduledTaskTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: CancelParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        let hive = match context.require_hive() {
            Ok(h) => h,
            Err(result) => return result,
        };
        match hive.db().cancel_scheduled_task(&params.task_id) {
            Ok(true) => ToolResult::ok(json!({ "taskId": params.task_id })),
            Ok(false) => ToolResult::error(format!("No active scheduled task with id {}", params.task_id)),
            Err(e) => ToolResult::error(format!("Failed to cancel scheduled task: {}", e)),
        }
    }
}
