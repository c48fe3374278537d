//! Test doubles for the dispatcher and reasoning seams

use crate::ai::ReasoningService;
use crate::db::Database;
use crate::gateway::{DispatchError, Dispatcher};
use async_trait::async_trait;
use serde_json::{json, Value};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;

#[derive(Debug, Clone)]
pub struct RecordedCall {
    pub method: String,
    pub params: Value,
    pub timeout_ms: u64,
}

/// Scripted dispatcher. Queued answers are consumed first, then the
/// per-method fallback, then `{}`.
#[derive(Default)]
pub struct MockDispatcher {
    calls: Mutex<Vec<RecordedCall>>,
    queued: Mutex<HashMap<String, VecDeque<Result<Value, DispatchError>>>>,
    fallback: Mutex<HashMap<String, Result<Value, DispatchError>>>,
}

impl MockDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_once(&self, method: &str, result: Result<Value, DispatchError>) {
        self.queued
            .lock()
            .unwrap()
            .entry(method.to_string())
            .or_default()
            .push_back(result);
    }

    pub fn respond_always(&self, method: &str, result: Result<Value, DispatchError>) {
        self.fallback.lock().unwrap().insert(method.to_string(), result);
    }

    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, method: &str) -> Vec<RecordedCall> {
        self.calls()
            .into_iter()
            .filter(|c| c.method == method)
            .collect()
    }
}

#[async_trait]
impl Dispatcher for MockDispatcher {
    async fn invoke(&self, method: &str, params: Value, timeout_ms: u64) -> Result<Value, DispatchError> {
        self.calls.lock().unwrap().push(RecordedCall {
            method: method.to_string(),
            params,
            timeout_ms,
        });

        if let Some(result) = self
            .queued
            .lock()
            .unwrap()
            .get_mut(method)
            .and_then(|q| q.pop_front())
        {
            return result;
        }

        self.fallback
            .lock()
            .unwrap()
            .get(method)
            .cloned()
            .unwrap_or_else(|| Ok(json!({})))
    }
}

pub fn rejected(method: &str, message: &str) -> DispatchError {
    DispatchError::Rejected {
        method: method.to_string(),
        code: -32603,
        message: message.to_string(),
    }
}

pub fn timed_out(method: &str, timeout_ms: u64) -> DispatchError {
    DispatchError::Timeout {
        method: method.to_string(),
        timeout_ms,
    }
}

/// Reasoning double returning the same text (or error) every time
pub struct CannedReasoner {
    response: Result<String, String>,
    calls: AtomicUsize,
}

impl CannedReasoner {
    pub fn ok(text: impl Into<String>) -> Self {
        Self {
            response: Ok(text.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn failing(message: impl Into<String>) -> Self {
        Self {
            response: Err(message.into()),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ReasoningService for CannedReasoner {
    async fn propose(&self, _instruction: &str) -> Result<String, String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.response.clone()
    }
}

/// On-disk database in a fresh temp dir. Keep the TempDir alive for the test.
pub fn temp_db() -> (tempfile::TempDir, Database) {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("hive-test.db");
    let db = Database::new(path.to_str().unwrap()).unwrap();
    (dir, db)
}

/// Hive services over a scripted dispatcher, a canned planner and a temp database
pub fn test_hive(
    dispatcher: std::sync::Arc<MockDispatcher>,
    reasoner: CannedReasoner,
) -> (tempfile::TempDir, crate::hive::HiveManager) {
    use std::sync::Arc;

    let (dir, db) = temp_db();
    let hive = crate::hive::HiveManager::new(
        Arc::new(reasoner),
        dispatcher,
        Arc::new(db),
        Arc::new(crate::hive::ExchangeTracker::new()),
    )
    .with_workspace_root(dir.path().join("workspaces"));
    (dir, hive)
}
