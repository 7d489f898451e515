//! Per-entity circuit breaker over the append-only ledger.
//!
//! The book is built from one batch prefetch before concurrent work
//! starts and answers status checks from memory. Skip increments queue
//! in the book and drain into a single batched ledger append on the
//! orchestrating task after aggregation; workers never write.

use chrono::{DateTime, Duration, NaiveDate, Utc};
use courtline_protocol::defaults::{BREAKER_LOCKOUT_HOURS, BREAKER_TRIP_THRESHOLD};
use courtline_protocol::{BreakerState, CircuitBreakerRecord};
use std::collections::HashMap;
use tracing::{info, warn};

/// Read-time interpretation of an entity's breaker state.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum BreakerStatus {
    Clear,
    Tripped { until: DateTime<Utc> },
}

/// In-memory breaker ledger view for one (processor, date) scope.
pub struct BreakerBook {
    processor: String,
    analysis_date: NaiveDate,
    states: HashMap<String, BreakerState>,
    pending: Vec<CircuitBreakerRecord>,
}

impl BreakerBook {
    /// Build from prefetched latest-per-entity ledger states.
    pub fn new(
        processor: impl Into<String>,
        analysis_date: NaiveDate,
        states: HashMap<String, BreakerState>,
    ) -> Self {
        Self {
            processor: processor.into(),
            analysis_date,
            states,
            pending: Vec::new(),
        }
    }

    /// Current state for an entity. Unknown entities read as fresh.
    pub fn state(&self, entity_id: &str) -> BreakerState {
        self.states.get(entity_id).copied().unwrap_or_default()
    }

    /// Status at `now`. An expired lockout reads as clear; the ledger
    /// itself never changes on read.
    pub fn status(&self, entity_id: &str, now: DateTime<Utc>) -> BreakerStatus {
        let state = self.state(entity_id);
        match (state.is_locked_out(now), state.tripped_until) {
            // Lockout stands; completeness is not re-evaluated.
            (true, Some(until)) => BreakerStatus::Tripped { until },
            _ => BreakerStatus::Clear,
        }
    }

    /// Record an incompleteness-driven skip. Appends attempt = prior+1
    /// to the pending batch, tripping at the fixed threshold with the
    /// fixed lockout. Returns the state the entity will be in once the
    /// batch lands.
    pub fn record_skip(&mut self, entity_id: &str, now: DateTime<Utc>) -> BreakerState {
        let prior = self.state(entity_id);
        let attempt_number = prior.attempt_number + 1;
        let tripped = attempt_number >= BREAKER_TRIP_THRESHOLD;
        let tripped_until = tripped.then(|| now + Duration::hours(BREAKER_LOCKOUT_HOURS));

        if tripped && !prior.tripped {
            warn!(
                entity_id,
                attempt_number,
                until = ?tripped_until,
                "circuit breaker tripped; further attempts refused until lockout expires"
            );
        }

        let state = BreakerState {
            attempt_number,
            tripped,
            tripped_until,
        };
        self.states.insert(entity_id.to_string(), state);
        self.pending.push(CircuitBreakerRecord {
            processor: self.processor.clone(),
            entity_id: entity_id.to_string(),
            analysis_date: self.analysis_date,
            attempt_number,
            tripped,
            tripped_until,
            recorded_at: now,
        });
        state
    }

    /// Take the queued ledger rows for the single post-aggregation append.
    pub fn drain_pending(&mut self) -> Vec<CircuitBreakerRecord> {
        let pending = std::mem::take(&mut self.pending);
        if !pending.is_empty() {
            info!(count = pending.len(), "draining breaker increments for ledger append");
        }
        pending
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn book() -> BreakerBook {
        BreakerBook::new("player_features", "2026-01-15".parse().unwrap(), HashMap::new())
    }

    #[test]
    fn third_skip_trips() {
        let mut book = book();
        let now = Utc::now();

        let s1 = book.record_skip("p1", now);
        assert_eq!(s1.attempt_number, 1);
        assert!(!s1.tripped);

        let s2 = book.record_skip("p1", now);
        assert!(!s2.tripped);

        let s3 = book.record_skip("p1", now);
        assert_eq!(s3.attempt_number, 3);
        assert!(s3.tripped);
        assert!(s3.tripped_until.is_some());
    }

    #[test]
    fn fourth_attempt_refused_before_expiry() {
        let mut book = book();
        let now = Utc::now();
        for _ in 0..3 {
            book.record_skip("p1", now);
        }
        assert!(matches!(
            book.status("p1", now + Duration::hours(1)),
            BreakerStatus::Tripped { .. }
        ));
    }

    #[test]
    fn expired_lockout_reads_clear_and_attempts_stay_monotonic() {
        let mut book = book();
        let now = Utc::now();
        for _ in 0..3 {
            book.record_skip("p1", now);
        }
        let after = now + Duration::hours(BREAKER_LOCKOUT_HOURS + 1);
        assert_eq!(book.status("p1", after), BreakerStatus::Clear);

        // The ledger is append-only: the next skip continues the count.
        let s4 = book.record_skip("p1", after);
        assert_eq!(s4.attempt_number, 4);
        assert!(s4.tripped);
    }

    #[test]
    fn drains_one_row_per_skip() {
        let mut book = book();
        let now = Utc::now();
        book.record_skip("p1", now);
        book.record_skip("p2", now);
        book.record_skip("p1", now);

        let pending = book.drain_pending();
        assert_eq!(pending.len(), 3);
        assert_eq!(book.pending_len(), 0);
        assert_eq!(pending[2].attempt_number, 2);
        assert_eq!(pending[2].entity_id, "p1");
    }

    #[test]
    fn unknown_entity_is_clear() {
        let book = book();
        assert_eq!(book.status("nobody", Utc::now()), BreakerStatus::Clear);
        assert_eq!(book.state("nobody").attempt_number, 0);
    }

    #[test]
    fn prefetched_state_is_respected() {
        let mut states = HashMap::new();
        states.insert(
            "p1".to_string(),
            BreakerState {
                attempt_number: 2,
                tripped: false,
                tripped_until: None,
            },
        );
        let mut book =
            BreakerBook::new("player_features", "2026-01-15".parse().unwrap(), states);
        let s = book.record_skip("p1", Utc::now());
        assert_eq!(s.attempt_number, 3);
        assert!(s.tripped);
    }
}
