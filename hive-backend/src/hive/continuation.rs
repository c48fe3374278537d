//! Ping-pong continuation after an agent-to-agent send
//!
//! Runs detached from the original caller. The two sessions take turns
//! (requester first) until one replies `REPLY_SKIP`, the turn budget runs
//! out, a wait times out, or a turn fails. Completed or exhausted exchanges
//! finish with one announce step relayed back to the requester.

use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messenger::{ACCEPTANCE_TIMEOUT_MS, AGENT_LANE_NESTED, INTERNAL_MESSAGE_CHANNEL, SOURCE_TOOL, WAIT_GRACE_MS};
use super::types::RunHandle;
use crate::db::Database;
use crate::gateway::protocol::method;
use crate::gateway::{DispatchError, Dispatcher};
use crate::models::audit::{actions, AuditStatus};

pub const REPLY_SKIP: &str = "REPLY_SKIP";
pub const ANNOUNCE_SKIP: &str = "ANNOUNCE_SKIP";
const HISTORY_LIMIT: u64 = 20;

#[derive(Debug, Clone)]
pub struct ContinuationContext {
    pub target_session_key: String,
    /// Agent id as the caller wrote it
    pub display_key: String,
    pub message: String,
    pub announce_timeout_ms: u64,
    pub max_turns: u32,
    pub requester_session_key: Option<String>,
    pub requester_channel: Option<String>,
    pub run_id: RunHandle,
}

/// How an exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowEnd {
    Completed,
    TurnBudgetExhausted,
    Timeout,
    TurnFailed(String),
    NoRequester,
}

impl FlowEnd {
    pub fn as_str(&self) -> &'static str {
        match self {
            FlowEnd::Completed => "completed",
            FlowEnd::TurnBudgetExhausted => "turn_budget_exhausted",
            FlowEnd::Timeout => "timeout",
            FlowEnd::TurnFailed(_) => "turn_failed",
            FlowEnd::NoRequester => "no_requester",
        }
    }

    fn announces(&self) -> bool {
        matches!(self, FlowEnd::Completed | FlowEnd::TurnBudgetExhausted)
    }
}

/// A live exchange as seen by observers
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExchangeState {
    pub run_id: String,
    pub target_session_key: String,
    pub requester_session_key: Option<String>,
    pub turns: u32,
    pub max_turns: u32,
    pub started_at: DateTime<Utc>,
    /// Flows sharing this run id, e.g. a retried send the receiver deduplicated
    #[serde(skip)]
    flows: u32,
}

/// In-process registry of running continuation flows. Observation only;
/// nothing in the flow reads it back. An entry lives until every flow
/// registered under its run id has finished.
#[derive(Default)]
pub struct ExchangeTracker {
    exchanges: DashMap<String, ExchangeState>,
}

impl ExchangeTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn begin(&self, ctx: &ContinuationContext) {
        self.exchanges
            .entry(ctx.run_id.to_string())
            .and_modify(|state| state.flows += 1)
            .or_insert_with(|| ExchangeState {
                run_id: ctx.run_id.to_string(),
                target_session_key: ctx.target_session_key.clone(),
                requester_session_key: ctx.requester_session_key.clone(),
                turns: 0,
                max_turns: ctx.max_turns,
                started_at: Utc::now(),
                flows: 1,
            });
    }

    pub fn record_turn(&self, run_id: &str) {
        if let Some(mut state) = self.exchanges.get_mut(run_id) {
            state.turns += 1;
        }
    }

    /// Release one flow's hold on the run. Returns the state once the last one is done.
    pub fn finish(&self, run_id: &str) -> Option<ExchangeState> {
        match self.exchanges.entry(run_id.to_string()) {
            Entry::Occupied(mut entry) if entry.get().flows > 1 => {
                entry.get_mut().flows -= 1;
                None
            }
            Entry::Occupied(entry) => Some(entry.remove()),
            Entry::Vacant(_) => None,
        }
    }

    /// Running exchanges, oldest first
    pub fn snapshot(&self) -> Vec<ExchangeState> {
        let mut states: Vec<ExchangeState> = self.exchanges.iter().map(|e| e.value().clone()).collect();
        states.sort_by(|a, b| a.started_at.cmp(&b.started_at));
        states
    }

    pub fn len(&self) -> usize {
        self.exchanges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.exchanges.is_empty()
    }

    pub fn is_active(&self, run_id: &str) -> bool {
        self.exchanges.contains_key(run_id)
    }
}

enum WaitError {
    Timeout,
    Failed(String),
}

impl From<DispatchError> for WaitError {
    fn from(e: DispatchError) -> Self {
        if e.is_timeout() {
            WaitError::Timeout
        } else {
            WaitError::Failed(e.to_string())
        }
    }
}

impl From<WaitError> for FlowEnd {
    fn from(e: WaitError) -> Self {
        match e {
            WaitError::Timeout => FlowEnd::Timeout,
            WaitError::Failed(reason) => FlowEnd::TurnFailed(reason),
        }
    }
}

#[derive(Clone)]
pub struct ContinuationFlow {
    dispatcher: Arc<dyn Dispatcher>,
    tracker: Arc<ExchangeTracker>,
    audit: Option<Arc<Database>>,
}

impl ContinuationFlow {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, tracker: Arc<ExchangeTracker>) -> Self {
        Self {
            dispatcher,
            tracker,
            audit: None,
        }
    }

    pub fn with_audit(mut self, db: Arc<Database>) -> Self {
        self.audit = Some(db);
        self
    }

    /// Register the exchange and run it on its own task
    pub fn launch(&self, ctx: ContinuationContext) -> JoinHandle<FlowEnd> {
        self.tracker.begin(&ctx);
        let flow = self.clone();
        tokio::spawn(async move { flow.run(ctx).await })
    }

    pub async fn run(&self, ctx: ContinuationContext) -> FlowEnd {
        let run_id = ctx.run_id.to_string();
        let (end, turns) = self.exchange(&ctx).await;

        if end.announces() {
            if let Err(e) = self.announce(&ctx).await {
                log::warn!("[PING_PONG] Announce for run {} failed: {}", run_id, e);
            }
        }

        self.tracker.finish(&run_id);
        log::info!(
            "[PING_PONG] Exchange {} with {} ended: {} after {} turn(s)",
            run_id,
            ctx.display_key,
            end.as_str(),
            turns
        );
        self.audit_row(
            actions::AGENT_EXCHANGE_END,
            &run_id,
            json!({
                "end": end.as_str(),
                "reason": match &end {
                    FlowEnd::TurnFailed(reason) => Some(reason.as_str()),
                    _ => None,
                },
                "turns": turns,
                "target": ctx.target_session_key,
            }),
            match end {
                FlowEnd::TurnFailed(_) | FlowEnd::Timeout => AuditStatus::Failed,
                _ => AuditStatus::Ok,
            },
        );
        end
    }

    async fn exchange(&self, ctx: &ContinuationContext) -> (FlowEnd, u32) {
        let Some(requester) = ctx.requester_session_key.clone() else {
            return (FlowEnd::NoRequester, 0);
        };

        let mut reply = match self
            .wait_and_read(ctx.run_id.as_str(), &ctx.target_session_key, ctx.announce_timeout_ms)
            .await
        {
            Ok(r) => r,
            Err(e) => return (e.into(), 0),
        };

        let mut turns = 0;
        while turns < ctx.max_turns {
            if is_skip(&reply, REPLY_SKIP) {
                return (FlowEnd::Completed, turns);
            }

            // Requester answers first, then the sides alternate
            let (speaker, other) = if turns % 2 == 0 {
                (requester.as_str(), ctx.target_session_key.as_str())
            } else {
                (ctx.target_session_key.as_str(), requester.as_str())
            };

            turns += 1;
            log::debug!("[PING_PONG] Run {} turn {}/{} -> {}", ctx.run_id, turns, ctx.max_turns, speaker);

            let prompt = turn_prompt(ctx, other, turns);
            reply = match self.turn(ctx, speaker, other, &reply, prompt).await {
                Ok(r) => r,
                Err(e) => return (e.into(), turns),
            };

            self.tracker.record_turn(ctx.run_id.as_str());
            self.audit_row(
                actions::AGENT_EXCHANGE_TURN,
                ctx.run_id.as_str(),
                json!({ "turn": turns, "speaker": speaker, "reply": reply }),
                AuditStatus::Ok,
            );
        }

        if is_skip(&reply, REPLY_SKIP) {
            (FlowEnd::Completed, turns)
        } else {
            (FlowEnd::TurnBudgetExhausted, turns)
        }
    }

    /// One dispatch, one wait, one history read
    async fn turn(
        &self,
        ctx: &ContinuationContext,
        speaker: &str,
        other: &str,
        message: &str,
        extra_system_prompt: String,
    ) -> Result<String, WaitError> {
        let params = json!({
            "message": message,
            "sessionKey": speaker,
            "idempotencyKey": Uuid::new_v4().to_string(),
            "deliver": false,
            "channel": INTERNAL_MESSAGE_CHANNEL,
            "lane": AGENT_LANE_NESTED,
            "parentRunId": ctx.run_id.as_str(),
            "extraSystemPrompt": extra_system_prompt,
            "inputProvenance": {
                "kind": "inter_session",
                "sourceSessionKey": other,
                "sourceChannel": ctx.requester_channel.as_deref().unwrap_or(INTERNAL_MESSAGE_CHANNEL),
                "sourceTool": SOURCE_TOOL,
            },
        });

        let response = self
            .dispatcher
            .invoke(method::AGENT, params, ACCEPTANCE_TIMEOUT_MS)
            .await
            .map_err(|e| WaitError::Failed(e.to_string()))?;
        let turn_run = response
            .get("runId")
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        self.wait_and_read(&turn_run, speaker, ctx.announce_timeout_ms).await
    }

    async fn wait_and_read(&self, run_id: &str, session_key: &str, timeout_ms: u64) -> Result<String, WaitError> {
        let waited = self
            .dispatcher
            .invoke(
                method::AGENT_WAIT,
                json!({ "runId": run_id, "timeoutMs": timeout_ms }),
                timeout_ms.saturating_add(WAIT_GRACE_MS),
            )
            .await?;
        match waited.get("status").and_then(|s| s.as_str()) {
            Some("timeout") => return Err(WaitError::Timeout),
            Some("error") => {
                let reason = waited
                    .get("error")
                    .and_then(|e| e.as_str())
                    .unwrap_or("run failed")
                    .to_string();
                return Err(WaitError::Failed(reason));
            }
            _ => {}
        }

        let history = self
            .dispatcher
            .invoke(
                method::CHAT_HISTORY,
                json!({ "sessionKey": session_key, "limit": HISTORY_LIMIT }),
                ACCEPTANCE_TIMEOUT_MS,
            )
            .await
            .map_err(|e| WaitError::Failed(e.to_string()))?;
        Ok(latest_assistant_reply(&history))
    }

    /// Ask the target for a summary and relay it to the requester
    async fn announce(&self, ctx: &ContinuationContext) -> Result<(), String> {
        let Some(requester) = ctx.requester_session_key.as_deref() else {
            return Ok(());
        };

        let prompt = format!(
            "The agent-to-agent exchange with {} is over.\n\
             Write the message to relay back to the requester, or reply exactly {} to stay silent.",
            requester, ANNOUNCE_SKIP
        );
        let reply = self
            .turn(ctx, &ctx.target_session_key, requester, &prompt, announce_context(ctx))
            .await
            .map_err(|e| match e {
                WaitError::Timeout => "announce timed out".to_string(),
                WaitError::Failed(reason) => reason,
            })?;

        if is_skip(&reply, ANNOUNCE_SKIP) {
            log::debug!("[PING_PONG] Announce for run {} suppressed", ctx.run_id);
            return Ok(());
        }

        self.dispatcher
            .invoke(
                method::SEND,
                json!({
                    "sessionKey": requester,
                    "channel": ctx.requester_channel.as_deref().unwrap_or(INTERNAL_MESSAGE_CHANNEL),
                    "message": reply,
                    "idempotencyKey": Uuid::new_v4().to_string(),
                }),
                ACCEPTANCE_TIMEOUT_MS,
            )
            .await
            .map_err(|e| e.to_string())?;
        log::info!("[PING_PONG] Announced run {} to {}", ctx.run_id, requester);
        Ok(())
    }

    fn audit_row(&self, action: &str, run_id: &str, diff: Value, status: AuditStatus) {
        if let Some(db) = &self.audit {
            if let Err(e) = db.append_audit("hive", action, run_id, &diff, status) {
                log::warn!("[PING_PONG] Could not audit {}: {}", action, e);
            }
        }
    }
}

fn turn_prompt(ctx: &ContinuationContext, other: &str, turn: u32) -> String {
    format!(
        "Agent-to-agent exchange, turn {} of {}.\n\
         Original request: {}\n\
         You are replying to {}. Reply exactly {} when nothing more is needed.",
        turn, ctx.max_turns, ctx.message, other, REPLY_SKIP
    )
}

fn announce_context(ctx: &ContinuationContext) -> String {
    format!("Agent-to-agent announce step for request: {}", ctx.message)
}

fn is_skip(reply: &str, token: &str) -> bool {
    let reply = reply.trim();
    reply.is_empty() || reply == token
}

/// Text of the newest assistant message in a `chat.history` response
fn latest_assistant_reply(history: &Value) -> String {
    let messages = history
        .get("messages")
        .and_then(|m| m.as_array())
        .or_else(|| history.as_array());
    let Some(messages) = messages else {
        return String::new();
    };

    messages
        .iter()
        .rev()
        .find(|m| m.get("role").and_then(|r| r.as_str()) == Some("assistant"))
        .map(|m| match m.get("content") {
            Some(Value::String(s)) => s.trim().to_string(),
            Some(Value::Array(parts)) => parts
                .iter()
                .filter_map(|p| p.get("text").and_then(|t| t.as_str()))
                .collect::<Vec<_>>()
                .join("\n")
                .trim()
                .to_string(),
            _ => String::new(),
        })
        .unwrap_or_default()
}
