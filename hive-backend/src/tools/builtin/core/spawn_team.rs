//! hive_spawn_team: compose a team for a goal and start every member

use crate::hive::TeamSpawnRequest;
use crate::tools::registry::Tool;
use crate::tools::types::{
    PropertySchema, ToolContext, ToolDefinition, ToolGroup, ToolInputSchema, ToolResult,
};
use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use std::collections::HashMap;

pub struct SpawnTeamTool {
    definition: ToolDefinition,
}

impl SpawnTeamTool {
    pub fn new() -> Self {
        let mut properties = HashMap::new();
        properties.insert(
            "teamName".to_string(),
            PropertySchema::string("Short name for the team, used to label member runs"),
        );
        properties.insert(
            "goal".to_string(),
            PropertySchema::string("What the team should accomplish"),
        );

        SpawnTeamTool {
            definition: ToolDefinition {
                name: "hive_spawn_team".to_string(),
                description: "Assemble a team of agents for a goal and start each member. Members report back to you.".to_string(),
                input_schema: ToolInputSchema {
                    schema_type: "object".to_string(),
                    properties,
                    required: vec!["teamName".to_string(), "goal".to_string()],
                },
                group: ToolGroup::Hive,
            },
        }
    }
}

impl Default for SpawnTeamTool {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SpawnTeamParams {
    team_name: String,
    goal: String,
}

#[async_trait]
impl Tool for SpawnTeamTool {
    fn definition(&self) -> ToolDefinition {
        self.definition.clone()
    }

    async fn execute(&self, params: Value, context: &ToolContext) -> ToolResult {
        let params: SpawnTeamParams = match serde_json::from_value(params) {
            Ok(p) => p,
            Err(e) => return ToolResult::error(format!("Invalid parameters: {}", e)),
        };
        if params.goal.trim().is_empty() {
            return ToolResult::error("goal is required");
        }
        let hive = match context.require_hive() {
            Ok(h) => h,
            Err(result) => return result,
        };
        let Some(parent) = context.session_key.clone().filter(|k| !k.is_empty()) else {
            return ToolResult::error("A calling session is required to spawn a team");
        };

        let request = TeamSpawnRequest {
            team_name: params.team_name,
            goal: params.goal,
            parent_session_key: parent,
        };

        match hive.spawner().spawn_team(&request).await {
            Ok(result) => {
                let run_ids: Vec<String> = result.run_handles().iter().map(|h| h.to_string()).collect();
                ToolResult::ok(json!({
                    "teamName": result.team_name,
                    "runIds": run_ids,
                    "failed": result.failed().len(),
                    "members": result.members,
                }))
            }
            Err(e) => ToolResult::error(format!("Could not compose team: {}", e)),
        }
    }
}
