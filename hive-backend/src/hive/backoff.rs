//! Retry hints for sends that time out at the dispatcher
//!
//! Each target session accumulates strikes. The hint doubles per strike,
//! from 5s up to 60s, and a target that stays quiet for two minutes starts
//! over. Quiet targets are dropped whenever a new strike is written.

use dashmap::DashMap;
use std::time::{Duration, Instant};

const BASE_DELAY_SECS: u64 = 5;
const MAX_DELAY_SECS: u64 = 60;
const RESET_AFTER: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Copy)]
struct Strikes {
    count: u32,
    last_at: Instant,
}

impl Strikes {
    fn delay_secs(&self) -> u64 {
        let exponent = self.count.saturating_sub(1).min(16);
        BASE_DELAY_SECS.saturating_mul(1 << exponent).min(MAX_DELAY_SECS)
    }

    fn is_stale(&self, now: Instant) -> bool {
        now.duration_since(self.last_at) > RESET_AFTER
    }
}

/// Timeout strikes per target session key
#[derive(Debug, Default)]
pub struct DispatchBackoff {
    strikes: DashMap<String, Strikes>,
}

impl DispatchBackoff {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_success(&self, session_key: &str) {
        if self.strikes.remove(session_key).is_some() {
            log::debug!("[AGENT_SEND] {} answered again, backoff cleared", session_key);
        }
    }

    /// Count a timeout against `session_key` and return the retry hint in seconds
    pub fn record_timeout(&self, session_key: &str) -> u64 {
        self.record_timeout_at(session_key, Instant::now())
    }

    fn record_timeout_at(&self, session_key: &str, now: Instant) -> u64 {
        self.strikes.retain(|key, s| key == session_key || !s.is_stale(now));

        let mut entry = self.strikes.entry(session_key.to_string()).or_insert(Strikes {
            count: 0,
            last_at: now,
        });
        if entry.is_stale(now) {
            entry.count = 0;
        }
        entry.count += 1;
        entry.last_at = now;

        let delay = entry.delay_secs();
        log::warn!(
            "[AGENT_SEND] Timeout #{} for {}, retry in {}s",
            entry.count,
            session_key,
            delay
        );
        delay
    }

    pub fn current_delay(&self, session_key: &str) -> Option<u64> {
        self.strikes.get(session_key).map(|s| s.delay_secs())
    }

    pub fn len(&self) -> usize {
        self.strikes.len()
    }
}
