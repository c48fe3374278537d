//! Direct agent-to-agent messaging
//!
//! A send is accepted by the dispatcher, optionally waited on, and then
//! handed to a detached [`ContinuationFlow`] that carries the ping-pong
//! exchange. The caller only ever sees the acceptance outcome.

use serde::Serialize;
use serde_json::{json, Value};
use std::sync::Arc;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::continuation::{ContinuationContext, ContinuationFlow, ExchangeTracker, FlowEnd};
use super::types::RunHandle;
use crate::config;
use crate::db::Database;
use crate::gateway::protocol::method;
use crate::gateway::Dispatcher;

pub const DEFAULT_SESSION_NAMESPACE: &str = "main";
pub const INTERNAL_MESSAGE_CHANNEL: &str = "internal";
pub const AGENT_LANE_NESTED: &str = "nested";
pub const SOURCE_TOOL: &str = "agent_send";
pub const ACCEPTANCE_TIMEOUT_MS: u64 = 10_000;
/// Added to the wait deadline for the RPC itself
pub const WAIT_GRACE_MS: u64 = 2_000;
pub const DEFAULT_TIMEOUT_SECONDS: u64 = 30;
/// Longest wait a caller may ask for (one day)
pub const MAX_TIMEOUT_SECONDS: u64 = 86_400;
/// Announce deadline when the caller asked not to block
pub const ANNOUNCE_FALLBACK_MS: u64 = 30_000;
pub const MAX_AGENT_ID_LEN: usize = 64;

/// Address an agent's session. Qualified ids (`ns:id`) pass through.
pub fn resolve_session_key(agent_id: &str) -> String {
    if agent_id.contains(':') {
        agent_id.to_string()
    } else {
        format!("{}:{}", DEFAULT_SESSION_NAMESPACE, agent_id)
    }
}

/// Where an inter-agent message came from
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InputProvenance {
    pub kind: String,
    pub source_session_key: String,
    pub source_channel: String,
    pub source_tool: String,
}

impl InputProvenance {
    pub fn inter_session(requester: &Requester) -> Self {
        Self {
            kind: "inter_session".to_string(),
            source_session_key: requester.session_key.clone(),
            source_channel: requester.channel.clone(),
            source_tool: SOURCE_TOOL.to_string(),
        }
    }
}

/// Parameters of the `agent` dispatch for one send
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentMessageEnvelope {
    pub message: String,
    pub session_key: String,
    pub idempotency_key: String,
    pub deliver: bool,
    pub channel: String,
    pub lane: String,
    pub extra_system_prompt: String,
    pub input_provenance: InputProvenance,
}

/// The session that is sending
#[derive(Debug, Clone, PartialEq)]
pub struct Requester {
    pub session_key: String,
    pub channel: String,
}

impl Requester {
    pub fn new(session_key: impl Into<String>, channel: impl Into<String>) -> Self {
        Self {
            session_key: session_key.into(),
            channel: channel.into(),
        }
    }
}

/// Raw send input, as received from a tool call
#[derive(Debug, Clone, Default)]
pub struct SendRequest {
    pub target_agent_id: String,
    pub message: String,
    pub timeout_seconds: Option<f64>,
    /// Key of an earlier attempt; set only when retrying it
    pub idempotency_key: Option<String>,
}

/// A validated send. Re-delivering the same attempt reuses its key.
#[derive(Debug, Clone, PartialEq)]
pub struct SendAttempt {
    pub target_agent_id: String,
    pub session_key: String,
    pub message: String,
    pub timeout_seconds: u64,
    pub idempotency_key: String,
}

impl SendAttempt {
    pub fn new(request: SendRequest) -> Result<Self, String> {
        let target = request.target_agent_id.trim();
        if target.is_empty() {
            return Err("agentId is required".to_string());
        }
        if target.chars().count() > MAX_AGENT_ID_LEN {
            return Err(format!("agentId must be at most {} characters", MAX_AGENT_ID_LEN));
        }
        if request.message.trim().is_empty() {
            return Err("message is required".to_string());
        }

        let timeout_seconds = match request.timeout_seconds {
            Some(t) if !t.is_finite() => DEFAULT_TIMEOUT_SECONDS,
            Some(t) if t < 0.0 => return Err("timeoutSeconds must not be negative".to_string()),
            Some(t) => (t.floor() as u64).min(MAX_TIMEOUT_SECONDS),
            None => DEFAULT_TIMEOUT_SECONDS,
        };

        let idempotency_key = request
            .idempotency_key
            .filter(|k| !k.trim().is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Ok(Self {
            target_agent_id: target.to_string(),
            session_key: resolve_session_key(target),
            message: request.message,
            timeout_seconds,
            idempotency_key,
        })
    }

    pub fn timeout_ms(&self) -> u64 {
        self.timeout_seconds.saturating_mul(1000)
    }

    pub fn announce_timeout_ms(&self) -> u64 {
        if self.timeout_seconds == 0 {
            ANNOUNCE_FALLBACK_MS
        } else {
            self.timeout_ms()
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SendStatus {
    Ok,
    Error,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SendOutcome {
    pub status: SendStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub run_id: Option<RunHandle>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retryable: bool,
}

impl SendOutcome {
    fn accepted(attempt: &SendAttempt, run_id: RunHandle) -> Self {
        Self {
            status: SendStatus::Ok,
            run_id: Some(run_id),
            agent_id: Some(attempt.target_agent_id.clone()),
            idempotency_key: Some(attempt.idempotency_key.clone()),
            error: None,
            retryable: false,
        }
    }

    fn invalid(error: String) -> Self {
        Self {
            status: SendStatus::Error,
            run_id: None,
            agent_id: None,
            idempotency_key: None,
            error: Some(error),
            retryable: false,
        }
    }

    fn failed(attempt: &SendAttempt, error: String, retryable: bool) -> Self {
        Self {
            status: SendStatus::Error,
            run_id: None,
            agent_id: Some(attempt.target_agent_id.clone()),
            idempotency_key: Some(attempt.idempotency_key.clone()),
            error: Some(error),
            retryable,
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == SendStatus::Ok
    }

    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or_else(|_| json!({ "status": "error" }))
    }
}

/// Sends messages on behalf of one requester session
pub struct AgentMessenger {
    dispatcher: Arc<dyn Dispatcher>,
    requester: Requester,
    flow: ContinuationFlow,
}

impl AgentMessenger {
    pub fn new(dispatcher: Arc<dyn Dispatcher>, requester: Requester, tracker: Arc<ExchangeTracker>) -> Self {
        let flow = ContinuationFlow::new(dispatcher.clone(), tracker);
        Self {
            dispatcher,
            requester,
            flow,
        }
    }

    pub fn with_audit(mut self, db: Arc<Database>) -> Self {
        self.flow = self.flow.with_audit(db);
        self
    }

    pub fn requester(&self) -> &Requester {
        &self.requester
    }

    /// Validate and deliver a new message
    pub async fn send(&self, request: SendRequest) -> SendOutcome {
        match SendAttempt::new(request) {
            Ok(attempt) => self.deliver(&attempt).await.0,
            Err(e) => {
                log::warn!("[AGENT_SEND] Rejected send: {}", e);
                SendOutcome::invalid(e)
            }
        }
    }

    /// Deliver an earlier attempt again under its original idempotency key
    pub async fn retry(&self, attempt: &SendAttempt) -> SendOutcome {
        log::info!(
            "[AGENT_SEND] Retrying {} with key {}",
            attempt.session_key,
            attempt.idempotency_key
        );
        self.deliver(attempt).await.0
    }

    pub fn envelope(&self, attempt: &SendAttempt) -> AgentMessageEnvelope {
        AgentMessageEnvelope {
            message: attempt.message.clone(),
            session_key: attempt.session_key.clone(),
            idempotency_key: attempt.idempotency_key.clone(),
            deliver: false,
            channel: INTERNAL_MESSAGE_CHANNEL.to_string(),
            lane: AGENT_LANE_NESTED.to_string(),
            extra_system_prompt: format!(
                "{}\n\n{}",
                agent_to_agent_context(&self.requester, &attempt.session_key),
                hive_note(&self.requester)
            ),
            input_provenance: InputProvenance::inter_session(&self.requester),
        }
    }

    /// Acceptance, optional wait, then the detached continuation.
    /// The handle is only ever awaited by tests.
    async fn deliver(&self, attempt: &SendAttempt) -> (SendOutcome, Option<JoinHandle<FlowEnd>>) {
        let params = match serde_json::to_value(self.envelope(attempt)) {
            Ok(p) => p,
            Err(e) => return (SendOutcome::failed(attempt, e.to_string(), false), None),
        };

        log::info!(
            "[AGENT_SEND] {} -> {} (timeout {}s)",
            self.requester.session_key,
            attempt.session_key,
            attempt.timeout_seconds
        );

        let response = match self
            .dispatcher
            .invoke(method::AGENT, params, ACCEPTANCE_TIMEOUT_MS)
            .await
        {
            Ok(r) => r,
            Err(e) => {
                log::warn!("[AGENT_SEND] Dispatch to {} failed: {}", attempt.session_key, e);
                return (SendOutcome::failed(attempt, e.to_string(), e.is_timeout()), None);
            }
        };

        let run_id = match response.get("runId").and_then(|v| v.as_str()).filter(|s| !s.is_empty()) {
            Some(id) => RunHandle(id.to_string()),
            None => {
                let synthesized = RunHandle::synthesized();
                log::debug!("[AGENT_SEND] No runId returned, using {}", synthesized);
                synthesized
            }
        };

        if attempt.timeout_seconds > 0 {
            let timeout_ms = attempt.timeout_ms();
            let wait = self
                .dispatcher
                .invoke(
                    method::AGENT_WAIT,
                    json!({ "runId": run_id.as_str(), "timeoutMs": timeout_ms }),
                    timeout_ms.saturating_add(WAIT_GRACE_MS),
                )
                .await;
            if let Err(e) = wait {
                log::warn!("[AGENT_SEND] Wait on run {} failed: {}", run_id, e);
                return (SendOutcome::failed(attempt, e.to_string(), e.is_timeout()), None);
            }
        }

        let context = ContinuationContext {
            target_session_key: attempt.session_key.clone(),
            display_key: attempt.target_agent_id.clone(),
            message: attempt.message.clone(),
            announce_timeout_ms: attempt.announce_timeout_ms(),
            max_turns: config::max_ping_pong_turns(),
            requester_session_key: Some(self.requester.session_key.clone()).filter(|k| !k.is_empty()),
            requester_channel: Some(self.requester.channel.clone()).filter(|c| !c.is_empty()),
            run_id: run_id.clone(),
        };
        let handle = self.flow.launch(context);

        (SendOutcome::accepted(attempt, run_id), Some(handle))
    }
}

fn agent_to_agent_context(requester: &Requester, target_session_key: &str) -> String {
    format!(
        "Agent-to-agent message context:\n\
         - Requester session: {}\n\
         - Requester channel: {}\n\
         - Target session: {}",
        requester.session_key, requester.channel, target_session_key
    )
}

fn hive_note(requester: &Requester) -> String {
    format!(
        "You are part of a Hive collaboration mesh.\n\
         Collaborate effectively with the requester agent ({}).",
        requester.session_key
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{rejected, timed_out, MockDispatcher};

    fn messenger(dispatcher: Arc<MockDispatcher>) -> AgentMessenger {
        AgentMessenger::new(
            dispatcher,
            Requester::new("main:planner", INTERNAL_MESSAGE_CHANNEL),
            Arc::new(ExchangeTracker::new()),
        )
    }

    fn request(agent: &str, timeout: Option<f64>) -> SendRequest {
        SendRequest {
            target_agent_id: agent.to_string(),
            message: "Review the PR".to_string(),
            timeout_seconds: timeout,
            idempotency_key: None,
        }
    }

    #[test]
    fn test_resolve_session_key() {
        assert_eq!(resolve_session_key("coder-agent"), "main:coder-agent");
        assert_eq!(resolve_session_key("ops:builder"), "ops:builder");
    }

    #[test]
    fn test_attempt_validation() {
        assert!(SendAttempt::new(request("", None)).is_err());
        assert!(SendAttempt::new(request(&"a".repeat(65), None)).is_err());
        assert!(SendAttempt::new(request(&"a".repeat(64), None)).is_ok());
        assert!(SendAttempt::new(request("coder", Some(-1.0))).is_err());

        let mut empty_message = request("coder", None);
        empty_message.message = "   ".to_string();
        assert!(SendAttempt::new(empty_message).is_err());
    }

    #[test]
    fn test_attempt_timeouts() {
        let default = SendAttempt::new(request("coder", None)).unwrap();
        assert_eq!(default.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);

        let nan = SendAttempt::new(request("coder", Some(f64::NAN))).unwrap();
        assert_eq!(nan.timeout_seconds, DEFAULT_TIMEOUT_SECONDS);

        let floored = SendAttempt::new(request("coder", Some(5.9))).unwrap();
        assert_eq!(floored.timeout_seconds, 5);
        assert_eq!(floored.announce_timeout_ms(), 5_000);

        let zero = SendAttempt::new(request("coder", Some(0.0))).unwrap();
        assert_eq!(zero.announce_timeout_ms(), ANNOUNCE_FALLBACK_MS);
    }

    #[test]
    fn test_huge_timeout_is_capped() {
        let attempt = SendAttempt::new(request("coder", Some(1e20))).unwrap();
        assert_eq!(attempt.timeout_seconds, MAX_TIMEOUT_SECONDS);
        assert_eq!(attempt.timeout_ms(), MAX_TIMEOUT_SECONDS * 1000);
        assert_eq!(attempt.announce_timeout_ms(), MAX_TIMEOUT_SECONDS * 1000);
    }

    #[tokio::test]
    async fn test_huge_timeout_send_waits_with_capped_deadline() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_once(method::AGENT, Ok(json!({ "runId": "run-big" })));
        dispatcher.respond_once(method::AGENT_WAIT, Err(timed_out(method::AGENT_WAIT, 0)));
        let m = messenger(dispatcher.clone());

        let outcome = m.send(request("coder", Some(1e20))).await;
        assert!(outcome.retryable);
        let wait = &dispatcher.calls_for(method::AGENT_WAIT)[0];
        assert_eq!(wait.params["timeoutMs"], MAX_TIMEOUT_SECONDS * 1000);
        assert_eq!(wait.timeout_ms, MAX_TIMEOUT_SECONDS * 1000 + WAIT_GRACE_MS);
    }

    #[test]
    fn test_envelope_fields() {
        let m = messenger(Arc::new(MockDispatcher::new()));
        let attempt = SendAttempt::new(request("coder-agent", None)).unwrap();
        let envelope = serde_json::to_value(m.envelope(&attempt)).unwrap();

        assert_eq!(envelope["sessionKey"], "main:coder-agent");
        assert_eq!(envelope["deliver"], false);
        assert_eq!(envelope["channel"], "internal");
        assert_eq!(envelope["lane"], "nested");
        assert_eq!(envelope["idempotencyKey"], attempt.idempotency_key.as_str());
        assert_eq!(envelope["inputProvenance"]["kind"], "inter_session");
        assert_eq!(envelope["inputProvenance"]["sourceSessionKey"], "main:planner");
        assert_eq!(envelope["inputProvenance"]["sourceTool"], "agent_send");
        let prompt = envelope["extraSystemPrompt"].as_str().unwrap();
        assert!(prompt.contains("main:coder-agent"));
        assert!(prompt.contains("Hive collaboration mesh"));
    }

    #[tokio::test]
    async fn test_zero_timeout_skips_wait() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_once(method::AGENT, Ok(json!({ "runId": "run-1" })));
        let m = messenger(dispatcher.clone());
        let attempt = SendAttempt::new(request("coder-agent", Some(0.0))).unwrap();

        let (outcome, handle) = m.deliver(&attempt).await;
        // The continuation has not been polled yet on the test runtime
        let calls = dispatcher.calls();
        assert!(outcome.is_ok());
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].method, method::AGENT);
        assert_eq!(calls[0].timeout_ms, ACCEPTANCE_TIMEOUT_MS);
        assert_eq!(calls[0].params["sessionKey"], "main:coder-agent");
        handle.unwrap().abort();
    }

    #[tokio::test]
    async fn test_positive_timeout_waits_with_grace() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_once(method::AGENT, Ok(json!({ "runId": "run-5" })));
        let m = messenger(dispatcher.clone());
        let attempt = SendAttempt::new(request("coder-agent", Some(5.0))).unwrap();

        let (outcome, handle) = m.deliver(&attempt).await;
        let calls = dispatcher.calls();
        assert_eq!(outcome.run_id, Some(RunHandle("run-5".to_string())));
        assert_eq!(calls.len(), 2);
        assert_eq!(calls[1].method, method::AGENT_WAIT);
        assert_eq!(calls[1].params, json!({ "runId": "run-5", "timeoutMs": 5000 }));
        assert_eq!(calls[1].timeout_ms, 7000);
        handle.unwrap().abort();
    }

    #[tokio::test]
    async fn test_retry_reuses_key_and_new_send_does_not() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_once(method::AGENT, Err(timed_out(method::AGENT, ACCEPTANCE_TIMEOUT_MS)));
        dispatcher.respond_always(method::AGENT, Ok(json!({ "runId": "run-r" })));
        let m = messenger(dispatcher.clone());

        let attempt = SendAttempt::new(request("coder-agent", Some(0.0))).unwrap();
        let first = m.deliver(&attempt).await.0;
        assert!(!first.is_ok());
        assert!(first.retryable);
        assert_eq!(first.idempotency_key.as_deref(), Some(attempt.idempotency_key.as_str()));

        let (second, handle) = m.deliver(&attempt).await;
        assert!(second.is_ok());
        handle.unwrap().abort();

        let fresh = SendAttempt::new(request("coder-agent", Some(0.0))).unwrap();
        let (third, handle) = m.deliver(&fresh).await;
        handle.unwrap().abort();

        let keys: Vec<String> = dispatcher
            .calls_for(method::AGENT)
            .iter()
            .map(|c| c.params["idempotencyKey"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(keys[0], keys[1]);
        assert_ne!(keys[1], keys[2]);
        assert_ne!(third.idempotency_key, second.idempotency_key);
    }

    #[test]
    fn test_caller_supplied_key_marks_retry() {
        let mut req = request("coder", None);
        req.idempotency_key = Some("key-123".to_string());
        assert_eq!(SendAttempt::new(req).unwrap().idempotency_key, "key-123");
    }

    #[tokio::test]
    async fn test_invalid_input_makes_no_calls() {
        let dispatcher = Arc::new(MockDispatcher::new());
        let m = messenger(dispatcher.clone());

        let outcome = m.send(request("", Some(1.0))).await;
        assert_eq!(outcome.status, SendStatus::Error);
        let outcome = m.send(request("coder", Some(-5.0))).await;
        assert!(outcome.error.unwrap().contains("negative"));
        assert!(dispatcher.calls().is_empty());
    }

    #[tokio::test]
    async fn test_rejection_is_not_retryable() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_once(method::AGENT, Err(rejected(method::AGENT, "unknown session")));
        let m = messenger(dispatcher.clone());

        let outcome = m.send(request("ghost", Some(0.0))).await;
        assert_eq!(outcome.status, SendStatus::Error);
        assert!(!outcome.retryable);
        assert!(outcome.error.unwrap().contains("unknown session"));
        let json = m.send(request("", None)).await.to_json();
        assert_eq!(json["status"], "error");
    }

    #[tokio::test]
    async fn test_wait_timeout_is_retryable() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_once(method::AGENT, Ok(json!({ "runId": "run-w" })));
        dispatcher.respond_once(method::AGENT_WAIT, Err(timed_out(method::AGENT_WAIT, 3000)));
        let m = messenger(dispatcher.clone());

        let outcome = m.send(request("coder", Some(1.0))).await;
        assert!(!outcome.is_ok());
        assert!(outcome.retryable);
    }

    #[tokio::test]
    async fn test_missing_run_id_is_synthesized() {
        let dispatcher = Arc::new(MockDispatcher::new());
        let m = messenger(dispatcher.clone());
        let attempt = SendAttempt::new(request("coder", Some(0.0))).unwrap();

        let (outcome, handle) = m.deliver(&attempt).await;
        handle.unwrap().abort();
        let run_id = outcome.run_id.clone().unwrap();
        assert!(Uuid::parse_str(run_id.as_str()).is_ok());
        let json = outcome.to_json();
        assert_eq!(json["status"], "ok");
        assert_eq!(json["agentId"], "coder");
        assert!(json.get("retryable").is_none());
    }

    #[tokio::test]
    async fn test_send_registers_exchange() {
        let dispatcher = Arc::new(MockDispatcher::new());
        dispatcher.respond_once(method::AGENT, Ok(json!({ "runId": "run-t" })));
        let tracker = Arc::new(ExchangeTracker::new());
        let m = AgentMessenger::new(
            dispatcher,
            Requester::new("main:planner", INTERNAL_MESSAGE_CHANNEL),
            tracker.clone(),
        );
        let attempt = SendAttempt::new(request("coder", Some(0.0))).unwrap();

        let (_, handle) = m.deliver(&attempt).await;
        assert!(tracker.is_active("run-t"));
        handle.unwrap().abort();
    }
}
