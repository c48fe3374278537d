//! Mission task database operations (persisted task graphs)

use chrono::Utc;
use rusqlite::{params, Result as SqliteResult, Row};
use uuid::Uuid;

use crate::db::{parse_timestamp, Database};
use crate::hive::types::{ExecutionTiers, SubTaskStatus, TaskGraph};
use crate::models::mission::{MissionTask, StatusCount};

const MISSION_COLUMNS: &str = "id, graph_id, goal, task_key, title, description, dependencies, assigned_to, status, tier, created_at, updated_at";

fn row_to_mission_task(row: &Row) -> SqliteResult<MissionTask> {
    let dependencies_json: String = row.get(6)?;
    let created_at: String = row.get(10)?;
    let updated_at: String = row.get(11)?;
    Ok(MissionTask {
        id: row.get(0)?,
        graph_id: row.get(1)?,
        goal: row.get(2)?,
        task_key: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        dependencies: serde_json::from_str(&dependencies_json).unwrap_or_default(),
        assigned_to: row.get(7)?,
        status: row.get(8)?,
        tier: row.get(9)?,
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

impl Database {
    /// Store every task of a graph along with its tier. Returns the graph id.
    pub fn save_task_graph(&self, graph: &TaskGraph, tiers: &ExecutionTiers) -> SqliteResult<String> {
        let mut conn = self.conn.lock().unwrap();
        let graph_id = Uuid::new_v4().to_string();
        let now = Utc::now().to_rfc3339();

        let tx = conn.transaction()?;
        for task in &graph.tasks {
            let dependencies = serde_json::to_string(&task.dependencies).unwrap_or_else(|_| "[]".to_string());
            let tier = tiers.tier_of(&task.id).map(|t| t as i64);
            tx.execute(
                "INSERT INTO mission_tasks
                    (id, graph_id, goal, task_key, title, description, dependencies, assigned_to, status, tier, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?11)",
                params![
                    Uuid::new_v4().to_string(),
                    graph_id,
                    graph.goal,
                    task.id,
                    task.title,
                    task.description,
                    dependencies,
                    task.assigned_to,
                    task.status.to_string(),
                    tier,
                    now
                ],
            )?;
        }
        tx.commit()?;

        log::info!(
            "[HIVE] Saved task graph {} ({} tasks) for '{}'",
            graph_id,
            graph.tasks.len(),
            graph.goal
        );
        Ok(graph_id)
    }

    /// Most recent mission tasks, newest graph first, graph order within a graph
    pub fn list_recent_mission_tasks(&self, limit: usize) -> SqliteResult<Vec<MissionTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mission_tasks ORDER BY created_at DESC, rowid ASC LIMIT ?1",
            MISSION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_mission_task)?;
        rows.collect()
    }

    pub fn list_mission_tasks_for_graph(&self, graph_id: &str) -> SqliteResult<Vec<MissionTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM mission_tasks WHERE graph_id = ?1 ORDER BY rowid ASC",
            MISSION_COLUMNS
        ))?;
        let rows = stmt.query_map(params![graph_id], row_to_mission_task)?;
        rows.collect()
    }

    /// Update one task's status (and optionally its assignee)
    pub fn set_mission_task_status(
        &self,
        graph_id: &str,
        task_key: &str,
        status: SubTaskStatus,
        assigned_to: Option<&str>,
    ) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE mission_tasks SET status = ?1, assigned_to = COALESCE(?2, assigned_to), updated_at = ?3
             WHERE graph_id = ?4 AND task_key = ?5",
            params![status.to_string(), assigned_to, Utc::now().to_rfc3339(), graph_id, task_key],
        )?;
        Ok(updated > 0)
    }

    pub fn mission_task_status_counts(&self) -> SqliteResult<Vec<StatusCount>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT status, COUNT(*) FROM mission_tasks GROUP BY status ORDER BY status",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(StatusCount {
                status: row.get(0)?,
                count: row.get(1)?,
            })
        })?;
        rows.collect()
    }
}
