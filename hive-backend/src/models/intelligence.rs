use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Confidence given to a fact the first time it is observed
pub const BASELINE_CONFIDENCE: f64 = 0.5;
/// Confidence added per repeated observation (capped at 1.0)
pub const CONFIDENCE_STEP: f64 = 0.1;
pub const DEFAULT_SOURCE: &str = "conversation";

/// Learned fact about a user, keyed by (user_id, category, key)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntelligenceMemory {
    pub id: String,
    pub user_id: String,
    pub category: String,
    pub key: String,
    pub value: String,
    pub confidence_score: f64,
    pub source: String,
    pub last_observed_at: DateTime<Utc>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
