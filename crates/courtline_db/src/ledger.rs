//! Append-only circuit breaker ledger.
//!
//! Rows are never updated or deleted; the current state for a key is
//! the row with the highest attempt number. Reads happen once per run
//! (batch prefetch) and writes once per run (batched append), so the
//! ledger is never touched concurrently by workers.

use crate::error::Result;
use chrono::{DateTime, NaiveDate, Utc};
use courtline_protocol::{BreakerState, CircuitBreakerRecord};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tracing::debug;

/// Ledger client.
#[derive(Clone)]
pub struct LedgerStore {
    pool: Pool<Sqlite>,
}

impl LedgerStore {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Latest breaker state per entity for one (processor, date) scope.
    /// Entities with no ledger rows are simply absent from the map.
    pub async fn latest_states(
        &self,
        processor: &str,
        analysis_date: NaiveDate,
    ) -> Result<HashMap<String, BreakerState>> {
        let rows: Vec<(String, i64, i64, Option<String>)> = sqlx::query_as(
            r#"
            SELECT entity_id, attempt_number, tripped, tripped_until
            FROM breaker_ledger
            WHERE processor = ?1 AND analysis_date = ?2
            ORDER BY attempt_number ASC
            "#,
        )
        .bind(processor)
        .bind(analysis_date.to_string())
        .fetch_all(&self.pool)
        .await?;

        // Ascending attempt order, so the last row per entity wins.
        let mut states = HashMap::new();
        for (entity_id, attempt, tripped, until) in rows {
            let tripped_until = until
                .as_deref()
                .and_then(|t| DateTime::parse_from_rfc3339(t).ok())
                .map(|t| t.with_timezone(&Utc));
            states.insert(
                entity_id,
                BreakerState {
                    attempt_number: attempt.max(0) as u32,
                    tripped: tripped != 0,
                    tripped_until,
                },
            );
        }
        debug!(processor, %analysis_date, entities = states.len(), "prefetched breaker states");
        Ok(states)
    }

    /// Append a batch of new attempts in one transaction.
    pub async fn append_batch(&self, records: &[CircuitBreakerRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            sqlx::query(
                r#"
                INSERT INTO breaker_ledger
                    (processor, entity_id, analysis_date, attempt_number,
                     tripped, tripped_until, recorded_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)
                "#,
            )
            .bind(&record.processor)
            .bind(&record.entity_id)
            .bind(record.analysis_date.to_string())
            .bind(record.attempt_number as i64)
            .bind(record.tripped as i64)
            .bind(record.tripped_until.map(|t| t.to_rfc3339()))
            .bind(record.recorded_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        debug!(appended = records.len(), "breaker ledger batch committed");
        Ok(records.len() as u64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::in_memory_pool;
    use crate::schema::init_schema;
    use chrono::Duration;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn record(entity: &str, attempt: u32, tripped: bool) -> CircuitBreakerRecord {
        let now = Utc::now();
        CircuitBreakerRecord {
            processor: "player_features".to_string(),
            entity_id: entity.to_string(),
            analysis_date: date("2026-01-15"),
            attempt_number: attempt,
            tripped,
            tripped_until: tripped.then(|| now + Duration::hours(24)),
            recorded_at: now,
        }
    }

    #[tokio::test]
    async fn latest_attempt_wins() {
        let pool = in_memory_pool().await.unwrap();
        init_schema(&pool).await.unwrap();
        let ledger = LedgerStore::new(pool);

        ledger
            .append_batch(&[record("p1", 1, false), record("p2", 1, false)])
            .await
            .unwrap();
        ledger
            .append_batch(&[record("p1", 2, false), record("p1", 3, true)])
            .await
            .unwrap();

        let states = ledger
            .latest_states("player_features", date("2026-01-15"))
            .await
            .unwrap();
        assert_eq!(states["p1"].attempt_number, 3);
        assert!(states["p1"].tripped);
        assert!(states["p1"].tripped_until.is_some());
        assert_eq!(states["p2"].attempt_number, 1);
        assert!(!states.contains_key("p3"));
    }

    #[tokio::test]
    async fn other_dates_do_not_leak() {
        let pool = in_memory_pool().await.unwrap();
        init_schema(&pool).await.unwrap();
        let ledger = LedgerStore::new(pool);

        let mut other = record("p1", 1, false);
        other.analysis_date = date("2026-01-14");
        ledger.append_batch(&[other]).await.unwrap();

        let states = ledger
            .latest_states("player_features", date("2026-01-15"))
            .await
            .unwrap();
        assert!(states.is_empty());
    }
}
