use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Capability flags keyed by name, e.g. `allow_coding`
pub type Permissions = BTreeMap<String, bool>;

/// Flags every new workspace starts with
pub fn default_permissions() -> Permissions {
    [
        ("allow_web_search", true),
        ("allow_coding", true),
        ("allow_telephony", false),
    ]
    .into_iter()
    .map(|(k, v)| (k.to_string(), v))
    .collect()
}

/// An isolated working area for agents, with its own directory and flags
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Workspace {
    pub id: String,
    pub name: String,
    pub root_path: String,
    pub permissions: Permissions,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}
