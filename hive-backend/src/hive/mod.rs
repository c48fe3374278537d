//! Multi-agent hive orchestration
//!
//! - [`decomposition`]: goal to task graph, and task graph to execution tiers
//! - [`team`]: roster composition and team spawning
//! - [`messenger`]: direct agent-to-agent sends
//! - [`continuation`]: the detached ping-pong exchange that follows a send
//! - [`backoff`]: retry hints for sends that time out

pub mod backoff;
pub mod continuation;
pub mod decomposition;
pub mod messenger;
mod output;
pub mod team;
pub mod types;

pub use backoff::DispatchBackoff;
pub use continuation::ExchangeTracker;
pub use decomposition::{resolve_execution_order, GoalDecomposer};
pub use messenger::{resolve_session_key, AgentMessenger, Requester, SendRequest};
pub use team::TeamSpawner;
pub use types::TeamSpawnRequest;

use std::path::PathBuf;
use std::sync::Arc;

use crate::ai::ReasoningService;
use crate::db::Database;
use crate::gateway::Dispatcher;
use crate::workspace::{WorkspaceManager, DEFAULT_WORKSPACE_ROOT};

/// Shared handles for building hive services per request
#[derive(Clone)]
pub struct HiveManager {
    reasoning: Arc<dyn ReasoningService>,
    dispatcher: Arc<dyn Dispatcher>,
    db: Arc<Database>,
    tracker: Arc<ExchangeTracker>,
    backoff: Arc<DispatchBackoff>,
    workspace_root: PathBuf,
}

impl HiveManager {
    pub fn new(
        reasoning: Arc<dyn ReasoningService>,
        dispatcher: Arc<dyn Dispatcher>,
        db: Arc<Database>,
        tracker: Arc<ExchangeTracker>,
    ) -> Self {
        Self {
            reasoning,
            dispatcher,
            db,
            tracker,
            backoff: Arc::new(DispatchBackoff::new()),
            workspace_root: PathBuf::from(DEFAULT_WORKSPACE_ROOT),
        }
    }

    pub fn with_workspace_root(mut self, root: impl Into<PathBuf>) -> Self {
        self.workspace_root = root.into();
        self
    }

    pub fn decomposer(&self) -> GoalDecomposer {
        GoalDecomposer::new(self.reasoning.clone()).with_audit(self.db.clone())
    }

    pub fn spawner(&self) -> TeamSpawner {
        TeamSpawner::new(self.reasoning.clone(), self.dispatcher.clone()).with_audit(self.db.clone())
    }

    pub fn messenger(&self, requester: Requester) -> AgentMessenger {
        AgentMessenger::new(self.dispatcher.clone(), requester, self.tracker.clone()).with_audit(self.db.clone())
    }

    pub fn workspaces(&self) -> WorkspaceManager {
        WorkspaceManager::new(self.db.clone(), self.workspace_root.clone())
    }

    pub fn tracker(&self) -> &Arc<ExchangeTracker> {
        &self.tracker
    }

    pub fn backoff(&self) -> &Arc<DispatchBackoff> {
        &self.backoff
    }

    pub fn db(&self) -> &Arc<Database> {
        &self.db
    }

    pub fn dispatcher(&self) -> &Arc<dyn Dispatcher> {
        &self.dispatcher
    }
}
