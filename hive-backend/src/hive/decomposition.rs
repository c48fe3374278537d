//! Goal decomposition and tier resolution
//!
//! [`GoalDecomposer::decompose`] asks the reasoning service for a task
//! breakdown and never fails: unusable output yields an empty graph.
//! [`resolve_execution_order`] batches a graph into tiers and reports
//! whatever it could not schedule instead of guessing an order for it.

use serde::Deserialize;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;

use super::output::{outer_span, strip_code_fences};
use super::types::{ExecutionTiers, SubTask, SubTaskStatus, TaskGraph};
use crate::ai::ReasoningService;
use crate::db::Database;
use crate::models::audit::{actions, AuditStatus};

#[derive(Debug, Deserialize)]
struct PlannedGraph {
    #[serde(default)]
    goal: Option<String>,
    tasks: Vec<PlannedTask>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PlannedTask {
    id: String,
    title: String,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    dependencies: Vec<String>,
    #[serde(default, alias = "assignee")]
    assigned_to: Option<String>,
}

pub struct GoalDecomposer {
    reasoning: Arc<dyn ReasoningService>,
    audit: Option<Arc<Database>>,
}

impl GoalDecomposer {
    pub fn new(reasoning: Arc<dyn ReasoningService>) -> Self {
        Self {
            reasoning,
            audit: None,
        }
    }

    /// Record planning failures in the audit log as well as the process log
    pub fn with_audit(mut self, db: Arc<Database>) -> Self {
        self.audit = Some(db);
        self
    }

    /// Break a goal into a dependency graph of pending sub-tasks.
    ///
    /// One reasoning call, no retries. Any failure (call error, unparsable
    /// text, missing fields) returns the goal with no tasks.
    pub async fn decompose(&self, goal: &str) -> TaskGraph {
        log::info!("[HIVE] Decomposing goal: {}", goal);

        let text = match self.reasoning.propose(&decomposition_prompt(goal)).await {
            Ok(text) => text,
            Err(e) => {
                self.record_failure(goal, &format!("reasoning call failed: {}", e));
                return TaskGraph::empty(goal);
            }
        };

        match parse_task_graph(goal, &text) {
            Ok(graph) => {
                log::info!("[HIVE] Decomposed goal into {} tasks", graph.tasks.len());
                graph
            }
            Err(e) => {
                self.record_failure(goal, &e);
                TaskGraph::empty(goal)
            }
        }
    }

    fn record_failure(&self, goal: &str, reason: &str) {
        log::error!("[HIVE] Failed to decompose goal '{}': {}", goal, reason);
        if let Some(db) = &self.audit {
            if let Err(e) = db.append_audit(
                "hive",
                actions::DECOMPOSITION_FAILED,
                goal,
                &json!({ "error": reason }),
                AuditStatus::Failed,
            ) {
                log::warn!("[HIVE] Could not audit decomposition failure: {}", e);
            }
        }
    }
}

fn decomposition_prompt(goal: &str) -> String {
    format!(
        "Break the goal below into sub-tasks and list which sub-tasks each one depends on.\n\
         Goal: {goal}\n\n\
         Answer with a single JSON object shaped like:\n\
         {{\n  \"goal\": \"{goal}\",\n  \"tasks\": [\n    {{ \"id\": \"task-id\", \"title\": \"...\", \"description\": \"...\", \"dependencies\": [\"other-task-id\"] }}\n  ]\n}}\n\
         Output JSON only.",
        goal = goal
    )
}

/// Parse planner text into a graph. Tasks come back pending whatever the
/// planner claimed; duplicate dependency entries are collapsed.
fn parse_task_graph(goal: &str, text: &str) -> Result<TaskGraph, String> {
    let cleaned = strip_code_fences(text);
    let planned: PlannedGraph = match serde_json::from_str(&cleaned) {
        Ok(planned) => planned,
        Err(first_err) => outer_span(&cleaned, '{', '}')
            .and_then(|span| serde_json::from_str(span).ok())
            .ok_or_else(|| format!("unparsable planner output: {}", first_err))?,
    };

    let mut seen_ids = HashSet::new();
    let mut tasks = Vec::with_capacity(planned.tasks.len());
    for task in planned.tasks {
        let id = task.id.trim().to_string();
        let title = task.title.trim().to_string();
        if id.is_empty() || title.is_empty() {
            return Err("planner returned a task without id or title".to_string());
        }
        if !seen_ids.insert(id.clone()) {
            return Err(format!("planner returned duplicate task id '{}'", id));
        }

        let mut dependencies: Vec<String> = Vec::with_capacity(task.dependencies.len());
        for dep in task.dependencies {
            let dep = dep.trim().to_string();
            if !dep.is_empty() && !dependencies.contains(&dep) {
                dependencies.push(dep);
            }
        }

        tasks.push(SubTask {
            id,
            title,
            description: task.description.unwrap_or_default(),
            dependencies,
            assigned_to: task.assigned_to.filter(|a| !a.trim().is_empty()),
            status: SubTaskStatus::Pending,
        });
    }

    let goal = planned
        .goal
        .filter(|g| !g.trim().is_empty())
        .unwrap_or_else(|| goal.to_string());

    Ok(TaskGraph::new(goal, tasks))
}

/// Greedy topological batching.
///
/// Each round schedules every remaining task whose dependencies are all
/// scheduled, keeping graph order inside the tier. A round that schedules
/// nothing ends resolution: the tiers so far are returned and the rest is
/// reported in `unresolved`.
pub fn resolve_execution_order(graph: &TaskGraph) -> ExecutionTiers {
    let mut scheduled: HashSet<&str> = HashSet::new();
    let mut remaining: Vec<&SubTask> = graph.tasks.iter().collect();
    let mut tiers: Vec<Vec<String>> = Vec::new();

    while !remaining.is_empty() {
        let (ready, blocked): (Vec<&SubTask>, Vec<&SubTask>) = remaining
            .into_iter()
            .partition(|t| t.dependencies.iter().all(|d| scheduled.contains(d.as_str())));

        if ready.is_empty() {
            let unresolved: Vec<String> = blocked.iter().map(|t| t.id.clone()).collect();
            log::error!(
                "[HIVE] Circular or dangling dependencies in task graph for '{}': {:?}",
                graph.goal,
                unresolved
            );
            return ExecutionTiers { tiers, unresolved };
        }

        for task in &ready {
            scheduled.insert(task.id.as_str());
        }
        tiers.push(ready.iter().map(|t| t.id.clone()).collect());
        remaining = blocked;
    }

    ExecutionTiers {
        tiers,
        unresolved: Vec::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{temp_db, CannedReasoner};

    fn diamond() -> TaskGraph {
        TaskGraph::new(
            "Plan launch",
            vec![
                SubTask::new("A", "Draft plan"),
                SubTask::new("B", "Build").depends_on(&["A"]),
                SubTask::new("C", "Market").depends_on(&["A"]),
                SubTask::new("D", "Launch").depends_on(&["B", "C"]),
            ],
        )
    }

    fn ids(tier: &[&str]) -> Vec<String> {
        tier.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_diamond_tiers() {
        let tiers = resolve_execution_order(&diamond());
        assert_eq!(tiers.tiers, vec![ids(&["A"]), ids(&["B", "C"]), ids(&["D"])]);
        assert!(!tiers.has_cycle());
    }

    #[test]
    fn test_dependencies_land_in_earlier_tiers() {
        let graph = TaskGraph::new(
            "Ship release",
            vec![
                SubTask::new("docs", "Docs").depends_on(&["api", "cli"]),
                SubTask::new("api", "API").depends_on(&["schema"]),
                SubTask::new("schema", "Schema"),
                SubTask::new("cli", "CLI").depends_on(&["api"]),
                SubTask::new("lint", "Lint"),
                SubTask::new("release", "Release").depends_on(&["docs", "lint"]),
            ],
        );

        let tiers = resolve_execution_order(&graph);
        assert!(!tiers.has_cycle());
        assert_eq!(tiers.scheduled_count(), graph.tasks.len());
        for task in &graph.tasks {
            let own = tiers.tier_of(&task.id).unwrap();
            for dep in &task.dependencies {
                assert!(tiers.tier_of(dep).unwrap() < own, "{} before {}", dep, task.id);
            }
        }
    }

    #[test]
    fn test_cycle_returns_resolvable_prefix() {
        let graph = TaskGraph::new(
            "Loop",
            vec![
                SubTask::new("A", "Start"),
                SubTask::new("B", "Ping").depends_on(&["A", "C"]),
                SubTask::new("C", "Pong").depends_on(&["B"]),
                SubTask::new("D", "After").depends_on(&["C"]),
                SubTask::new("E", "Side").depends_on(&["A"]),
            ],
        );

        let tiers = resolve_execution_order(&graph);
        assert!(tiers.has_cycle());
        assert_eq!(tiers.tiers, vec![ids(&["A"]), ids(&["E"])]);
        assert_eq!(tiers.unresolved, ids(&["B", "C", "D"]));
    }

    #[test]
    fn test_self_dependency_is_a_cycle() {
        let graph = TaskGraph::new("Self", vec![SubTask::new("A", "Me").depends_on(&["A"])]);
        let tiers = resolve_execution_order(&graph);
        assert!(tiers.tiers.is_empty());
        assert_eq!(tiers.unresolved, ids(&["A"]));
    }

    #[test]
    fn test_unknown_dependency_is_unresolved() {
        let graph = TaskGraph::new(
            "Dangling",
            vec![
                SubTask::new("A", "Real"),
                SubTask::new("B", "Ghost dep").depends_on(&["Z"]),
            ],
        );
        let tiers = resolve_execution_order(&graph);
        assert_eq!(tiers.tiers, vec![ids(&["A"])]);
        assert_eq!(tiers.unresolved, ids(&["B"]));
    }

    #[test]
    fn test_empty_graph_has_no_tiers() {
        let tiers = resolve_execution_order(&TaskGraph::empty("Nothing"));
        assert!(tiers.tiers.is_empty());
        assert!(!tiers.has_cycle());
    }

    #[tokio::test]
    async fn test_decompose_fenced_output() {
        let reply = r#"```json
{
  "goal": "Plan launch",
  "tasks": [
    { "id": "A", "title": "Draft plan", "description": "Outline", "dependencies": [] },
    { "id": "B", "title": "Build", "dependencies": ["A", "A"], "status": "completed" },
    { "id": "C", "title": "Market", "dependencies": ["A"] },
    { "id": "D", "title": "Launch", "dependencies": ["B", "C"] }
  ]
}
```"#;
        let reasoner = Arc::new(CannedReasoner::ok(reply));
        let graph = GoalDecomposer::new(reasoner.clone()).decompose("Plan launch").await;

        assert_eq!(reasoner.call_count(), 1);
        assert_eq!(graph.goal, "Plan launch");
        assert_eq!(graph.tasks.len(), 4);
        assert!(graph.tasks.iter().all(|t| t.status == SubTaskStatus::Pending));
        assert_eq!(graph.get("B").unwrap().dependencies, vec!["A".to_string()]);
        assert_eq!(graph.get("A").unwrap().description, "Outline");

        let tiers = resolve_execution_order(&graph);
        assert_eq!(tiers.tiers, vec![ids(&["A"]), ids(&["B", "C"]), ids(&["D"])]);
    }

    #[tokio::test]
    async fn test_decompose_payload_wrapped_in_prose() {
        let reply = "Here you go: {\"tasks\": [{\"id\": \"x\", \"title\": \"Only step\"}]} Good luck!";
        let graph = GoalDecomposer::new(Arc::new(CannedReasoner::ok(reply)))
            .decompose("Tiny goal")
            .await;
        assert_eq!(graph.goal, "Tiny goal");
        assert_eq!(graph.tasks.len(), 1);
        assert!(graph.tasks[0].dependencies.is_empty());
    }

    #[tokio::test]
    async fn test_decompose_garbage_is_empty_graph() {
        let graph = GoalDecomposer::new(Arc::new(CannedReasoner::ok("I cannot help with that.")))
            .decompose("Plan launch")
            .await;
        assert_eq!(graph, TaskGraph::empty("Plan launch"));
    }

    #[tokio::test]
    async fn test_decompose_missing_fields_is_empty_graph() {
        let missing_title = r#"{"tasks": [{"id": "A"}]}"#;
        let graph = GoalDecomposer::new(Arc::new(CannedReasoner::ok(missing_title)))
            .decompose("Plan launch")
            .await;
        assert!(graph.is_empty());

        let missing_tasks = r#"{"goal": "Plan launch"}"#;
        let graph = GoalDecomposer::new(Arc::new(CannedReasoner::ok(missing_tasks)))
            .decompose("Plan launch")
            .await;
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_decompose_duplicate_ids_is_empty_graph() {
        let dup = r#"{"tasks": [{"id": "A", "title": "One"}, {"id": "A", "title": "Two"}]}"#;
        let graph = GoalDecomposer::new(Arc::new(CannedReasoner::ok(dup)))
            .decompose("Plan launch")
            .await;
        assert!(graph.is_empty());
    }

    #[tokio::test]
    async fn test_decompose_failure_is_audited() {
        let (_dir, db) = temp_db();
        let db = Arc::new(db);
        let graph = GoalDecomposer::new(Arc::new(CannedReasoner::failing("upstream down")))
            .with_audit(db.clone())
            .decompose("Plan launch")
            .await;

        assert!(graph.is_empty());
        let audit = db.list_recent_audit(10).unwrap();
        assert_eq!(audit.len(), 1);
        assert_eq!(audit[0].action, actions::DECOMPOSITION_FAILED);
        assert_eq!(audit[0].resource, "Plan launch");
    }
}
