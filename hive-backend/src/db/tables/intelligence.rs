//! User intelligence memory operations
//!
//! Facts are keyed by (user_id, category, key). The first observation
//! starts at the baseline confidence; each repeat adds one step, capped
//! at 1.0. The upsert is a single statement so concurrent writers for the
//! same fact converge on one row.

use chrono::Utc;
use rusqlite::{params, Result as SqliteResult, Row};
use uuid::Uuid;

use crate::db::{parse_timestamp, Database};
use crate::models::intelligence::{IntelligenceMemory, BASELINE_CONFIDENCE, CONFIDENCE_STEP};

const MEMORY_COLUMNS: &str = "id, user_id, category, key, value, confidence_score, source, last_observed_at, created_at, updated_at";

fn row_to_memory(row: &Row) -> SqliteResult<IntelligenceMemory> {
    let last_observed_at: String = row.get(7)?;
    let created_at: String = row.get(8)?;
    let updated_at: String = row.get(9)?;
    Ok(IntelligenceMemory {
        id: row.get(0)?,
        user_id: row.get(1)?,
        category: row.get(2)?,
        key: row.get(3)?,
        value: row.get(4)?,
        confidence_score: row.get(5)?,
        source: row.get(6)?,
        last_observed_at: parse_timestamp(&last_observed_at),
        created_at: parse_timestamp(&created_at),
        updated_at: parse_timestamp(&updated_at),
    })
}

impl Database {
    /// Record an observation of a fact and return the stored row
    pub fn upsert_intelligence_memory(
        &self,
        user_id: &str,
        category: &str,
        key: &str,
        value: &str,
        source: &str,
    ) -> SqliteResult<IntelligenceMemory> {
        let conn = self.conn.lock().unwrap();
        let now = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO user_intelligence_memory
                (id, user_id, category, key, value, confidence_score, source, last_observed_at, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?8, ?8)
             ON CONFLICT(user_id, category, key) DO UPDATE SET
                value = excluded.value,
                confidence_score = MIN(1.0, confidence_score + ?9),
                last_observed_at = excluded.last_observed_at,
                updated_at = excluded.updated_at",
            params![
                Uuid::new_v4().to_string(),
                user_id,
                category,
                key,
                value,
                BASELINE_CONFIDENCE,
                source,
                now,
                CONFIDENCE_STEP
            ],
        )?;

        let memory = conn.query_row(
            &format!(
                "SELECT {} FROM user_intelligence_memory WHERE user_id = ?1 AND category = ?2 AND key = ?3",
                MEMORY_COLUMNS
            ),
            params![user_id, category, key],
            row_to_memory,
        )?;

        log::info!(
            "[INTEL] {}/{}={} for {} (confidence: {:.2})",
            category,
            key,
            value,
            user_id,
            memory.confidence_score
        );

        Ok(memory)
    }

    /// Highest-confidence facts across all users
    pub fn list_top_intelligence(&self, limit: usize) -> SqliteResult<Vec<IntelligenceMemory>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM user_intelligence_memory ORDER BY confidence_score DESC, updated_at DESC LIMIT ?1",
            MEMORY_COLUMNS
        ))?;
        let rows = stmt.query_map(params![limit as i64], row_to_memory)?;
        rows.collect()
    }
}

#[cfg(test)]
mod tests {
    use crate::models::intelligence::{BASELINE_CONFIDENCE, DEFAULT_SOURCE};
    use crate::testing::temp_db;

    #[test]
    fn test_new_fact_starts_at_baseline() {
        let (_dir, db) = temp_db();
        let memory = db
            .upsert_intelligence_memory("u1", "preference", "response_style", "concise", DEFAULT_SOURCE)
            .unwrap();
        assert!((memory.confidence_score - BASELINE_CONFIDENCE).abs() < 1e-9);
        assert_eq!(memory.source, "conversation");
    }

    #[test]
    fn test_repeat_observation_is_monotone_and_capped() {
        let (_dir, db) = temp_db();
        let mut last = 0.0;
        for _ in 0..10 {
            let memory = db
                .upsert_intelligence_memory("u1", "habit", "morning_routine", "active", DEFAULT_SOURCE)
                .unwrap();
            assert!(memory.confidence_score >= last);
            assert!(memory.confidence_score <= 1.0);
            last = memory.confidence_score;
        }
        assert!((last - 1.0).abs() < 1e-9);

        let second = db
            .upsert_intelligence_memory("u1", "habit", "morning_routine", "active", DEFAULT_SOURCE)
            .unwrap();
        assert!((second.confidence_score - 1.0).abs() < 1e-9);
    }

    #[test]
    fn test_second_observation_adds_one_step() {
        let (_dir, db) = temp_db();
        let first = db
            .upsert_intelligence_memory("u1", "preference", "response_style", "concise", DEFAULT_SOURCE)
            .unwrap();
        let second = db
            .upsert_intelligence_memory("u1", "preference", "response_style", "brief", DEFAULT_SOURCE)
            .unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(second.value, "brief");
        assert!((second.confidence_score - 0.6).abs() < 1e-9);
    }

    #[test]
    fn test_facts_are_scoped_by_owner_and_category() {
        let (_dir, db) = temp_db();
        db.upsert_intelligence_memory("u1", "preference", "response_style", "concise", DEFAULT_SOURCE)
            .unwrap();
        let other_user = db
            .upsert_intelligence_memory("u2", "preference", "response_style", "concise", DEFAULT_SOURCE)
            .unwrap();
        assert!((other_user.confidence_score - BASELINE_CONFIDENCE).abs() < 1e-9);
        let all = db.list_top_intelligence(10).unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|m| m.category == "preference"));
    }
}
