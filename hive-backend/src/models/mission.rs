use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persisted sub-task of a planned goal, shown in mission control
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MissionTask {
    pub id: String,
    /// Groups the rows of one planning pass
    pub graph_id: String,
    pub goal: String,
    /// Sub-task id as produced by the planner (unique within the graph only)
    pub task_key: String,
    pub title: String,
    pub description: String,
    pub dependencies: Vec<String>,
    pub assigned_to: Option<String>,
    pub status: String,
    /// Execution tier, None when the task could not be scheduled
    pub tier: Option<i64>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusCount {
    pub status: String,
    pub count: i64,
}
