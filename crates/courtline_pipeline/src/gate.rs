//! Idempotency gate over stored content hashes.
//!
//! The gate decides once per run, for the whole batch: the write is
//! skipped only when every successful record hashes identically to the
//! row already stored for its key. A single changed or new record means
//! the full delete-then-insert proceeds, keeping the stored scope
//! internally consistent.

use courtline_protocol::FeatureRecord;
use std::collections::HashMap;
use tracing::info;

/// What the gate saw and decided.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateDecision {
    pub write_needed: bool,
    pub unchanged: usize,
    pub changed: usize,
    pub new: usize,
}

/// Compare freshly computed records against the stored hashes for the
/// same analysis date. `prior` maps entity_id to stored content_hash.
pub fn evaluate(records: &[FeatureRecord], prior: &HashMap<String, String>) -> GateDecision {
    let mut unchanged = 0;
    let mut changed = 0;
    let mut new = 0;

    for record in records {
        match prior.get(&record.entity_id) {
            Some(stored) if *stored == record.content_hash => unchanged += 1,
            Some(_) => changed += 1,
            None => new += 1,
        }
    }

    let write_needed = !records.is_empty() && (changed > 0 || new > 0);
    if !write_needed && !records.is_empty() {
        info!(
            unchanged,
            "all records match stored hashes; skipping write"
        );
    }
    GateDecision {
        write_needed,
        unchanged,
        changed,
        new,
    }
}
