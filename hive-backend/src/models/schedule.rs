use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScheduledTaskStatus {
    Active,
    Cancelled,
}

impl ScheduledTaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScheduledTaskStatus::Active => "active",
            ScheduledTaskStatus::Cancelled => "cancelled",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "active" => Some(ScheduledTaskStatus::Active),
            "cancelled" => Some(ScheduledTaskStatus::Cancelled),
            _ => None,
        }
    }
}

/// Recurring task owned by an agent
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScheduledTask {
    pub id: String,
    pub owner_agent_id: String,
    /// Five-field cron expression (min hour dom month dow)
    pub cron_expression: String,
    pub natural_language_schedule: Option<String>,
    pub task_payload: Value,
    pub status: ScheduledTaskStatus,
    pub next_run_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
