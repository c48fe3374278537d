//! Scheduled task database operations
//!
//! Rows are never deleted; cancelling flips the status to `cancelled`.

use chrono::{DateTime, Utc};
use rusqlite::{params, Result as SqliteResult, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{parse_timestamp, Database};
use crate::models::schedule::{ScheduledTask, ScheduledTaskStatus};

const SCHEDULE_COLUMNS: &str = "id, owner_agent_id, cron_expression, natural_language_schedule, task_payload, status, next_run_at, created_at, updated_at";

fn row_to_scheduled_task(row: &Row) -> SqliteResult<ScheduledTask> {
    let payload_json: String = row.get(4)?;
    let status: String = row.get(5)?;
    let next_run_at: Option<String> = row.get(6)?;
    let created_at: String = row.get(7)?;
    let updated_at: String = row.get(8)?;
    Ok(ScheduledTask {
        id: row.get(0)?,
        owner_agent_id: row.get(1)?,
        cron_expression: row.get(2)?,
        natural_language_schedule: row.get(3)?,
        task_payload: serde_json::from_str(&payload_json).unwrap_or(Value::Null),
        status: ScheduledTaskStatus::from_str(&status).unwrap_or(ScheduledTaskStatus::Cancelled),
        next_run_at: next_run_at.as_deref().map(parse_timestamp),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

impl Database {
    /// Insert a new active scheduled task
    pub fn create_scheduled_task(
        &self,
        owner_agent_id: &str,
        cron_expression: &str,
        natural_language_schedule: Option<&str>,
        task_payload: &Value,
        next_run_at: Option<DateTime<Utc>>,
    ) -> SqliteResult<ScheduledTask> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let payload_json = serde_json::to_string(task_payload).unwrap_or_else(|_| "{}".to_string());

        conn.execute(
            "INSERT INTO scheduled_tasks
                (id, owner_agent_id, cron_expression, natural_language_schedule, task_payload, status, next_run_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8)",
            params![
                id,
                owner_agent_id,
                cron_expression,
                natural_language_schedule,
                payload_json,
                ScheduledTaskStatus::Active.as_str(),
                next_run_at.map(|t| t.to_rfc3339()),
                now.to_rfc3339()
            ],
        )?;

        log::info!(
            "[SCHEDULE] Created task {} for {} ({})",
            id,
            owner_agent_id,
            cron_expression
        );

        Ok(ScheduledTask {
            id,
            owner_agent_id: owner_agent_id.to_string(),
            cron_expression: cron_expression.to_string(),
            natural_language_schedule: natural_language_schedule.map(|s| s.to_string()),
            task_payload: task_payload.clone(),
            status: ScheduledTaskStatus::Active,
            next_run_at,
            created_at: now,
            updated_at: now,
        })
    }

    /// Every scheduled task, newest first
    pub fn list_scheduled_tasks(&self) -> SqliteResult<Vec<ScheduledTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scheduled_tasks ORDER BY created_at DESC, rowid DESC",
            SCHEDULE_COLUMNS
        ))?;
        let rows = stmt.query_map([], row_to_scheduled_task)?;
        rows.collect()
    }

    /// Active tasks, soonest first
    pub fn list_active_scheduled_tasks(&self) -> SqliteResult<Vec<ScheduledTask>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM scheduled_tasks WHERE status = ?1 ORDER BY next_run_at ASC",
            SCHEDULE_COLUMNS
        ))?;
        let rows = stmt.query_map(
            params![ScheduledTaskStatus::Active.as_str()],
            row_to_scheduled_task,
        )?;
        rows.collect()
    }

    /// Mark a task cancelled. Returns false when no active task has this id.
    pub fn cancel_scheduled_task(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE scheduled_tasks SET status = ?1, next_run_at = NULL, updated_at = ?2
             WHERE id = ?3 AND status = ?4",
            params![
                ScheduledTaskStatus::Cancelled.as_str(),
                Utc::now().to_rfc3339(),
                id,
                ScheduledTaskStatus::Active.as_str()
            ],
        )?;
        if updated > 0 {
            log::info!("[SCHEDULE] Cancelled task {}", id);
        }
        Ok(updated > 0)
    }
}

#[cfg(test)]
mod tests {
    use crate::models::schedule::ScheduledTaskStatus;
    use crate::testing::temp_db;
    use chrono::{Duration, Utc};
    use serde_json::json;

    #[test]
    fn test_create_and_list_active_in_run_order() {
        let (_dir, db) = temp_db();
        let now = Utc::now();
        let later = db
            .create_scheduled_task("main", "0 9 * * *", None, &json!({"description": "late"}), Some(now + Duration::hours(5)))
            .unwrap();
        let sooner = db
            .create_scheduled_task("coder", "*/5 * * * *", Some("every 5 minutes"), &json!({"description": "soon"}), Some(now + Duration::minutes(5)))
            .unwrap();

        let active = db.list_active_scheduled_tasks().unwrap();
        assert_eq!(active.len(), 2);
        assert_eq!(active[0].id, sooner.id);
        assert_eq!(active[1].id, later.id);
        assert_eq!(active[0].task_payload["description"], "soon");
        assert_eq!(active[0].natural_language_schedule.as_deref(), Some("every 5 minutes"));
    }

    #[test]
    fn test_cancel_keeps_row() {
        let (_dir, db) = temp_db();
        let task = db
            .create_scheduled_task("main", "0 9 * * *", None, &json!({"description": "standup"}), Some(Utc::now()))
            .unwrap();

        assert!(db.cancel_scheduled_task(&task.id).unwrap());
        assert!(!db.cancel_scheduled_task(&task.id).unwrap());
        assert!(!db.cancel_scheduled_task("missing").unwrap());

        let all = db.list_scheduled_tasks().unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].id, task.id);
        assert_eq!(all[0].status, ScheduledTaskStatus::Cancelled);
        assert!(all[0].next_run_at.is_none());
        assert!(db.list_active_scheduled_tasks().unwrap().is_empty());
    }
}
