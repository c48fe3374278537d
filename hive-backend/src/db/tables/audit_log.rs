//! Audit log database operations

use chrono::Utc;
use rusqlite::{params, Result as SqliteResult, Row};
use serde_json::Value;
use uuid::Uuid;

use crate::db::{parse_timestamp, Database};
use crate::models::audit::{actions, AuditEntry, AuditStatus};

const AUDIT_COLUMNS: &str = "id, actor_id, action, resource, diff, status, created_at";

fn row_to_audit(row: &Row) -> SqliteResult<AuditEntry> {
    let diff_json: String = row.get(4)?;
    let created_at: String = row.get(6)?;
    Ok(AuditEntry {
        id: row.get(0)?,
        actor_id: row.get(1)?,
        action: row.get(2)?,
        resource: row.get(3)?,
        diff: serde_json::from_str(&diff_json).unwrap_or(Value::Null),
        status: row.get(5)?,
        created_at: parse_timestamp(&created_at),
    })
}

impl Database {
    /// Append an audit row
    pub fn append_audit(
        &self,
        actor_id: &str,
        action: &str,
        resource: &str,
        diff: &Value,
        status: AuditStatus,
    ) -> SqliteResult<AuditEntry> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::new_v4().to_string();
        let now = Utc::now();
        let diff_json = serde_json::to_string(diff).unwrap_or_else(|_| "{}".to_string());

        conn.execute(
            "INSERT INTO audit_log (id, actor_id, action, resource, diff, status, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![id, actor_id, action, resource, diff_json, status.as_str(), now.to_rfc3339()],
        )?;

        Ok(AuditEntry {
            id,
            actor_id: actor_id.to_string(),
            action: action.to_string(),
            resource: resource.to_string(),
            diff: diff.clone(),
            status: status.as_str().to_string(),
            created_at: now,
        })
    }

    pub fn get_audit_entry(&self, id: &str) -> SqliteResult<Option<AuditEntry>> {
        let conn = self.conn.lock().unwrap();
        let result = conn.query_row(
            &format!("SELECT {} FROM audit_log WHERE id = ?1", AUDIT_COLUMNS),
            params![id],
            row_to_audit,
        );

        match result {
            Ok(entry) => Ok(Some(entry)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Most recent audit rows, newest first
    pub fn list_recent_audit(&self, limit: usize) -> SqliteResult<Vec<AuditEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM audit_log ORDER BY created_at DESC, rowid DESC LIMIT ?1",
            AUDIT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_audit)?;
        rows.collect()
    }

    /// Audit rows for one resource, oldest first
    pub fn list_audit_for_resource(&self, resource: &str) -> SqliteResult<Vec<AuditEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM audit_log WHERE resource = ?1 ORDER BY created_at ASC, rowid ASC",
            AUDIT_COLUMNS
        ))?;
        let rows = stmt.query_map(params![resource], row_to_audit)?;
        rows.collect()
    }

    /// Approve or reject a row awaiting confirmation.
    /// Returns false if the row does not exist or is not pending.
    pub fn resolve_pending_audit(&self, id: &str, approve: bool) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let status = if approve {
            AuditStatus::Approved
        } else {
            AuditStatus::Rejected
        };
        let updated = conn.execute(
            "UPDATE audit_log SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![status.as_str(), id, AuditStatus::PendingConfirmation.as_str()],
        )?;
        Ok(updated > 0)
    }

    /// Close a pending row whose action never went out
    pub fn fail_pending_audit(&self, id: &str) -> SqliteResult<bool> {
        let conn = self.conn.lock().unwrap();
        let updated = conn.execute(
            "UPDATE audit_log SET status = ?1 WHERE id = ?2 AND status = ?3",
            params![
                AuditStatus::Failed.as_str(),
                id,
                AuditStatus::PendingConfirmation.as_str()
            ],
        )?;
        Ok(updated > 0)
    }

    /// Sum of `diff.tokens` across token usage rows
    pub fn total_token_usage(&self) -> SqliteResult<i64> {
        let conn = self.conn.lock().unwrap();
        let total: Option<i64> = conn.query_row(
            "SELECT SUM(CAST(json_extract(diff, '$.tokens') AS INTEGER))
             FROM audit_log WHERE action = ?1",
            params![actions::TOKEN_USAGE],
            |row| row.get(0),
        )?;
        Ok(total.unwrap_or(0))
    }
}

#[cfg(test)]
mod tests {
    use crate::models::audit::{actions, AuditStatus};
    use crate::testing::temp_db;
    use serde_json::json;

    #[test]
    fn test_append_and_list() {
        let (_dir, db) = temp_db();
        let first = db
            .append_audit("agent", actions::MODIFY_CONFIG, "theme", &json!({"new": "dark"}), AuditStatus::PendingConfirmation)
            .unwrap();
        db.append_audit("hive", actions::TEAM_SPAWNED, "Launch", &json!({}), AuditStatus::Ok)
            .unwrap();

        let recent = db.list_recent_audit(10).unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].action, actions::TEAM_SPAWNED);
        assert_eq!(recent[1].id, first.id);
        assert_eq!(recent[1].diff["new"], "dark");
        assert_eq!(db.list_recent_audit(1).unwrap().len(), 1);
    }

    #[test]
    fn test_resolve_only_pending_rows() {
        let (_dir, db) = temp_db();
        let pending = db
            .append_audit("agent", actions::MODIFY_CONFIG, "k", &json!({}), AuditStatus::PendingConfirmation)
            .unwrap();
        let done = db
            .append_audit("hive", actions::TEAM_SPAWNED, "t", &json!({}), AuditStatus::Ok)
            .unwrap();

        assert!(db.resolve_pending_audit(&pending.id, true).unwrap());
        assert_eq!(db.get_audit_entry(&pending.id).unwrap().unwrap().status, "approved");
        // Already resolved
        assert!(!db.resolve_pending_audit(&pending.id, false).unwrap());
        assert!(!db.resolve_pending_audit(&done.id, true).unwrap());
        assert!(!db.resolve_pending_audit("missing", true).unwrap());
    }

    #[test]
    fn test_fail_only_pending_rows() {
        let (_dir, db) = temp_db();
        let pending = db
            .append_audit("agent", actions::MODIFY_CONFIG, "k", &json!({}), AuditStatus::PendingConfirmation)
            .unwrap();

        assert!(db.fail_pending_audit(&pending.id).unwrap());
        assert_eq!(db.get_audit_entry(&pending.id).unwrap().unwrap().status, "failed");
        assert!(!db.fail_pending_audit(&pending.id).unwrap());
        assert!(!db.resolve_pending_audit(&pending.id, true).unwrap());
    }

    #[test]
    fn test_token_usage_sum() {
        let (_dir, db) = temp_db();
        assert_eq!(db.total_token_usage().unwrap(), 0);
        db.append_audit("agent", actions::TOKEN_USAGE, "run-1", &json!({"tokens": 1200}), AuditStatus::Ok)
            .unwrap();
        db.append_audit("agent", actions::TOKEN_USAGE, "run-2", &json!({"tokens": 300}), AuditStatus::Ok)
            .unwrap();
        db.append_audit("agent", actions::MODIFY_CONFIG, "x", &json!({"tokens": 999}), AuditStatus::Ok)
            .unwrap();
        assert_eq!(db.total_token_usage().unwrap(), 1500);
    }
}
