//! Hive planning and team types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle of a sub-task within one planning pass
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SubTaskStatus {
    #[default]
    Pending,
    Active,
    Completed,
    Failed,
}

impl std::fmt::Display for SubTaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SubTaskStatus::Pending => write!(f, "pending"),
            SubTaskStatus::Active => write!(f, "active"),
            SubTaskStatus::Completed => write!(f, "completed"),
            SubTaskStatus::Failed => write!(f, "failed"),
        }
    }
}

impl SubTaskStatus {
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "pending" => Some(SubTaskStatus::Pending),
            "active" | "in_progress" => Some(SubTaskStatus::Active),
            "completed" | "done" => Some(SubTaskStatus::Completed),
            "failed" => Some(SubTaskStatus::Failed),
            _ => None,
        }
    }
}

/// One node of a task graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubTask {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub description: String,
    /// Ids of tasks that must finish first
    #[serde(default)]
    pub dependencies: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub assigned_to: Option<String>,
    #[serde(default)]
    pub status: SubTaskStatus,
}

impl SubTask {
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            description: String::new(),
            dependencies: Vec::new(),
            assigned_to: None,
            status: SubTaskStatus::Pending,
        }
    }

    pub fn depends_on(mut self, ids: &[&str]) -> Self {
        self.dependencies = ids.iter().map(|s| s.to_string()).collect();
        self
    }
}

/// A goal and its ordered sub-tasks. Re-planning builds a new graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskGraph {
    pub goal: String,
    pub tasks: Vec<SubTask>,
}

impl TaskGraph {
    pub fn new(goal: impl Into<String>, tasks: Vec<SubTask>) -> Self {
        Self {
            goal: goal.into(),
            tasks,
        }
    }

    /// Degenerate graph returned when planning output is unusable
    pub fn empty(goal: impl Into<String>) -> Self {
        Self::new(goal, Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&SubTask> {
        self.tasks.iter().find(|t| t.id == id)
    }
}

/// Batches of task ids whose dependencies are satisfied by earlier batches.
///
/// `unresolved` is empty for an acyclic graph. When non-empty, resolution
/// stopped early: those tasks sit on (or behind) a cycle or depend on ids
/// missing from the graph.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ExecutionTiers {
    pub tiers: Vec<Vec<String>>,
    #[serde(default)]
    pub unresolved: Vec<String>,
}

impl ExecutionTiers {
    pub fn has_cycle(&self) -> bool {
        !self.unresolved.is_empty()
    }

    pub fn scheduled_count(&self) -> usize {
        self.tiers.iter().map(|t| t.len()).sum()
    }

    /// Tier index of a task, if it was scheduled
    pub fn tier_of(&self, id: &str) -> Option<usize> {
        self.tiers.iter().position(|tier| tier.iter().any(|t| t == id))
    }
}

/// Roster entry proposed by the planner
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamMember {
    pub role: String,
    pub agent_id: String,
    #[serde(default)]
    pub specialty: Vec<String>,
}

/// Run identifier handed back by the dispatcher for a spawned unit of work
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RunHandle(pub String);

impl RunHandle {
    /// Handle minted locally when the dispatcher did not return one
    pub fn synthesized() -> Self {
        RunHandle(Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for RunHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpawnRequest {
    pub team_name: String,
    pub goal: String,
    pub parent_session_key: String,
}

/// Spawn result for one roster entry: a handle, or the reason there is none
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MemberSpawn {
    pub member: TeamMember,
    pub session_key: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl MemberSpawn {
    pub fn is_spawned(&self) -> bool {
        self.run_id.is_some()
    }
}

/// Per-member outcome of a team spawn, in roster order
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TeamSpawnResult {
    pub team_name: String,
    pub members: Vec<MemberSpawn>,
}

impl TeamSpawnResult {
    /// Handles of members that spawned, in roster order
    pub fn run_handles(&self) -> Vec<RunHandle> {
        self.members.iter().filter_map(|m| m.run_id.clone()).collect()
    }

    pub fn failed(&self) -> Vec<&MemberSpawn> {
        self.members.iter().filter(|m| !m.is_spawned()).collect()
    }

    pub fn all_spawned(&self) -> bool {
        self.members.iter().all(|m| m.is_spawned())
    }
}
