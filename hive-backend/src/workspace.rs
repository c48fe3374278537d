//! Agent workspaces: a directory per workspace plus a row of permission flags

use std::path::{Path, PathBuf};
use std::sync::Arc;
use uuid::Uuid;

use crate::db::Database;
use crate::models::workspace::{default_permissions, Permissions, Workspace};

pub const DEFAULT_WORKSPACE_ROOT: &str = "./workspaces";
const MAX_NAME_LEN: usize = 128;

pub struct WorkspaceManager {
    db: Arc<Database>,
    root: PathBuf,
}

impl WorkspaceManager {
    pub fn new(db: Arc<Database>, root: impl Into<PathBuf>) -> Self {
        Self { db, root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Create the directory, then record the workspace with default flags
    pub async fn create(&self, name: &str) -> Result<Workspace, String> {
        self.create_with(name, &default_permissions()).await
    }

    /// New workspace that starts from the source's flags. Files are not copied.
    pub async fn clone_from(&self, source_id: &str, name: &str) -> Result<Workspace, String> {
        let source = self
            .get(source_id)?
            .ok_or_else(|| format!("Source workspace {} not found", source_id))?;

        let target = self.create_with(name, &source.permissions).await?;
        log::info!("[WORKSPACE] Cloned {} into {}", source.id, target.id);
        Ok(target)
    }

    pub fn get(&self, id: &str) -> Result<Option<Workspace>, String> {
        self.db
            .get_workspace(id)
            .map_err(|e| format!("Failed to load workspace: {}", e))
    }

    pub fn set_permissions(&self, id: &str, changes: &Permissions) -> Result<Workspace, String> {
        let workspace = self
            .db
            .merge_workspace_permissions(id, changes)
            .map_err(|e| format!("Failed to update workspace: {}", e))?
            .ok_or_else(|| format!("Workspace {} not found", id))?;

        log::info!("[WORKSPACE] Permissions for {} now {:?}", id, workspace.permissions);
        Ok(workspace)
    }

    async fn create_with(&self, name: &str, permissions: &Permissions) -> Result<Workspace, String> {
        let name = name.trim();
        if name.is_empty() {
            return Err("name is required".to_string());
        }
        if name.chars().count() > MAX_NAME_LEN {
            return Err(format!("name must be at most {} characters", MAX_NAME_LEN));
        }

        let id = Uuid::new_v4().to_string();
        let root_path = self.root.join(&id);
        log::info!("[WORKSPACE] Creating '{}' at {}", name, root_path.display());

        tokio::fs::create_dir_all(&root_path)
            .await
            .map_err(|e| format!("Failed to create workspace directory: {}", e))?;

        self.db
            .insert_workspace(&id, name, &root_path.to_string_lossy(), permissions)
            .map_err(|e| format!("Failed to store workspace: {}", e))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::temp_db;

    fn manager() -> (tempfile::TempDir, WorkspaceManager) {
        let (dir, db) = temp_db();
        let root = dir.path().join("workspaces");
        (dir, WorkspaceManager::new(Arc::new(db), root))
    }

    #[tokio::test]
    async fn test_create_makes_directory_and_defaults() {
        let (_dir, workspaces) = manager();
        let created = workspaces.create("Research").await.unwrap();

        assert!(Path::new(&created.root_path).is_dir());
        assert!(Path::new(&created.root_path).starts_with(workspaces.root()));
        assert_eq!(created.permissions, default_permissions());
        assert_eq!(workspaces.get(&created.id).unwrap().unwrap().name, "Research");
    }

    #[tokio::test]
    async fn test_create_rejects_blank_name() {
        let (_dir, workspaces) = manager();
        assert!(workspaces.create("   ").await.is_err());
        assert!(workspaces.create(&"w".repeat(129)).await.is_err());
    }

    #[tokio::test]
    async fn test_clone_copies_flags_into_new_workspace() {
        let (_dir, workspaces) = manager();
        let source = workspaces.create("Source").await.unwrap();
        let changes: Permissions = [("allow_telephony".to_string(), true)].into_iter().collect();
        workspaces.set_permissions(&source.id, &changes).unwrap();

        let copy = workspaces.clone_from(&source.id, "Copy").await.unwrap();
        assert_ne!(copy.id, source.id);
        assert_ne!(copy.root_path, source.root_path);
        assert_eq!(copy.permissions.get("allow_telephony"), Some(&true));

        assert!(workspaces.clone_from("missing", "Nope").await.unwrap_err().contains("not found"));
    }

    #[tokio::test]
    async fn test_set_permissions_on_unknown_workspace() {
        let (_dir, workspaces) = manager();
        let err = workspaces.set_permissions("missing", &Permissions::new()).unwrap_err();
        assert!(err.contains("not found"));
    }
}
