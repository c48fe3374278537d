//! Workspace database operations

use chrono::Utc;
use rusqlite::{params, Connection, Result as SqliteResult, Row};

use crate::db::{parse_timestamp, Database};
use crate::models::workspace::{Permissions, Workspace};

const WORKSPACE_COLUMNS: &str = "id, name, root_path, permissions, created_at, updated_at";

fn select_workspace(conn: &Connection, id: &str) -> SqliteResult<Option<Workspace>> {
    let result = conn.query_row(
        &format!("SELECT {} FROM workspaces WHERE id = ?1", WORKSPACE_COLUMNS),
        params![id],
        row_to_workspace,
    );

    match result {
        Ok(workspace) => Ok(Some(workspace)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e),
    }
}

fn row_to_workspace(row: &Row) -> SqliteResult<Workspace> {
    let permissions_json: String = row.get(3)?;
    let created_at: String = row.get(4)?;
    let updated_at: String = row.get(5)?;
    Ok(Workspace {
        id: row.get(0)?,
        name: row.get(1)?,
        root_path: row.get(2)?,
        permissions: serde_json::from_str(&permissions_json).unwrap_or_default(),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

impl Database {
    pub fn insert_workspace(
        &self,
        id: &str,
        name: &str,
        root_path: &str,
        permissions: &Permissions,
    ) -> SqliteResult<Workspace> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now();
        let permissions_json = serde_json::to_string(permissions).unwrap_or_else(|_| "{}".to_string());

        conn.execute(
            "INSERT INTO workspaces (id, name, root_path, permissions, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, name, root_path, permissions_json, now.to_rfc3339()],
        )?;

        Ok(Workspace {
            id: id.to_string(),
            name: name.to_string(),
            root_path: root_path.to_string(),
            permissions: permissions.clone(),
            created_at: now,
            updated_at: now,
        })
    }

    pub fn get_workspace(&self, id: &str) -> SqliteResult<Option<Workspace>> {
        let conn = self.conn.lock().unwrap();
        select_workspace(&conn, id)
    }

    /// Merge `changes` into the stored flags. Flags not named keep their value.
    /// Returns None when the workspace does not exist.
    pub fn merge_workspace_permissions(
        &self,
        id: &str,
        changes: &Permissions,
    ) -> SqliteResult<Option<Workspace>> {
        let mut conn = self.conn.lock().unwrap();
        let tx = conn.transaction()?;

        let Some(mut workspace) = select_workspace(&tx, id)? else {
            return Ok(None);
        };

        workspace
            .permissions
            .extend(changes.iter().map(|(k, v)| (k.clone(), *v)));
        workspace.updated_at = Utc::now();
        let permissions_json =
            serde_json::to_string(&workspace.permissions).unwrap_or_else(|_| "{}".to_string());

        tx.execute(
            "UPDATE workspaces SET permissions = ?1, updated_at = ?2 WHERE id = ?3",
            params![permissions_json, workspace.updated_at.to_rfc3339(), id],
        )?;
        tx.commit()?;

        Ok(Some(workspace))
    }
}
