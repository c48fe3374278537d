//! Rule-based extraction of user preferences and habits from chat text

use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;
use std::sync::Arc;

use crate::db::Database;
use crate::models::intelligence::{IntelligenceMemory, DEFAULT_SOURCE};

/// A fact spotted in a message, before it is stored
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Observation {
    pub category: &'static str,
    pub key: &'static str,
    pub value: &'static str,
}

struct Rule {
    pattern: Regex,
    observation: Observation,
}

fn rule(pattern: &str, category: &'static str, key: &'static str, value: &'static str) -> Rule {
    Rule {
        pattern: Regex::new(pattern).unwrap(),
        observation: Observation { category, key, value },
    }
}

static RULES: Lazy<Vec<Rule>> = Lazy::new(|| {
    vec![
        rule(
            r"(?i)\bi\s+(?:like|prefer)\s+(?:\w+\s+)?(?:concise|brief|short)\b",
            "preference",
            "response_style",
            "concise",
        ),
        rule(
            r"(?i)\bi\s+(?:like|prefer)\s+(?:\w+\s+)?(?:detailed|thorough)\b",
            "preference",
            "response_style",
            "detailed",
        ),
        rule(r"(?i)\bevery\s+morning\b", "habit", "morning_routine", "active"),
        rule(r"(?i)\bevery\s+(?:evening|night)\b", "habit", "evening_routine", "active"),
    ]
});

/// Facts a message supports, in rule order. A fact appears at most once.
pub fn extract_observations(message: &str) -> Vec<Observation> {
    let mut found: Vec<Observation> = Vec::new();
    for rule in RULES.iter() {
        if rule.pattern.is_match(message)
            && !found
                .iter()
                .any(|o| o.category == rule.observation.category && o.key == rule.observation.key)
        {
            found.push(rule.observation.clone());
        }
    }
    found
}

pub struct IntelligenceExtractor {
    db: Arc<Database>,
}

impl IntelligenceExtractor {
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Store every observation in `message` for `user_id`
    pub fn extract(&self, user_id: &str, message: &str) -> Result<Vec<IntelligenceMemory>, String> {
        let observations = extract_observations(message);
        if observations.is_empty() {
            log::debug!("[INTEL] Nothing to learn from message for {}", user_id);
        }

        observations
            .iter()
            .map(|o| {
                self.db
                    .upsert_intelligence_memory(user_id, o.category, o.key, o.value, DEFAULT_SOURCE)
                    .map_err(|e| format!("Failed to store {}/{}: {}", o.category, o.key, e))
            })
            .collect()
    }
}
