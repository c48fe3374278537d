use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Audit action names
pub mod actions {
    pub const DECOMPOSITION_FAILED: &str = "decomposition_failed";
    pub const TEAM_SPAWNED: &str = "team_spawned";
    pub const AGENT_EXCHANGE_TURN: &str = "agent_exchange_turn";
    pub const AGENT_EXCHANGE_END: &str = "agent_exchange_end";
    pub const MODIFY_CONFIG: &str = "modify_config";
    /// Rows whose diff carries `{"tokens": n}`, summed by mission control
    pub const TOKEN_USAGE: &str = "token_usage";
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    Ok,
    Failed,
    PendingConfirmation,
    Approved,
    Rejected,
}

impl AuditStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuditStatus::Ok => "ok",
            AuditStatus::Failed => "failed",
            AuditStatus::PendingConfirmation => "pending_confirmation",
            AuditStatus::Approved => "approved",
            AuditStatus::Rejected => "rejected",
        }
    }
}

impl std::fmt::Display for AuditStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Append-only audit row
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: String,
    pub actor_id: String,
    pub action: String,
    pub resource: String,
    pub diff: Value,
    pub status: String,
    pub created_at: DateTime<Utc>,
}
