//! Retried batch writes behind the `FeatureSink` seam.
//!
//! Writes are strictly sequential: delete the scope, then insert in
//! fixed-size batches. An append-only destination is a known temporary
//! condition, so a refused delete is tolerated (stale rows are cleared
//! on the next healthy run) and a refused insert batch is recorded
//! without retrying, since retries cannot change the answer.

use crate::error::{PipelineError, Result};
use chrono::NaiveDate;
use courtline_db::{DbError, FeatureTable};
use courtline_protocol::FeatureRecord;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Error, Debug)]
pub enum SinkError {
    /// The destination currently refuses deletes/overwrites.
    #[error("destination is append-only: {0}")]
    AppendOnly(String),
    /// Anything else the destination reported.
    #[error("destination error: {0}")]
    Unavailable(String),
}

impl From<DbError> for SinkError {
    fn from(err: DbError) -> Self {
        if err.is_append_only() {
            SinkError::AppendOnly(err.to_string())
        } else {
            SinkError::Unavailable(err.to_string())
        }
    }
}

/// Destination for computed feature records.
pub trait FeatureSink {
    /// Remove existing rows for the (entity-set x date) scope.
    fn delete_scope(
        &self,
        analysis_date: NaiveDate,
        entity_ids: &[String],
    ) -> impl std::future::Future<Output = std::result::Result<u64, SinkError>> + Send;

    /// Insert one batch atomically.
    fn insert_batch(
        &self,
        records: &[FeatureRecord],
    ) -> impl std::future::Future<Output = std::result::Result<u64, SinkError>> + Send;
}

impl FeatureSink for FeatureTable {
    async fn delete_scope(
        &self,
        analysis_date: NaiveDate,
        entity_ids: &[String],
    ) -> std::result::Result<u64, SinkError> {
        Ok(FeatureTable::delete_scope(self, analysis_date, entity_ids).await?)
    }

    async fn insert_batch(
        &self,
        records: &[FeatureRecord],
    ) -> std::result::Result<u64, SinkError> {
        Ok(FeatureTable::insert_batch(self, records).await?)
    }
}

/// Totals for one write pass.
#[derive(Debug, Clone, Default)]
pub struct WriteStats {
    pub rows_written: u64,
    pub rows_failed: u64,
    pub batches_written: u32,
    pub batches_failed: u32,
    /// True when the scope delete was refused and left to the next run.
    pub delete_deferred: bool,
    pub errors: Vec<String>,
}

/// Sequential batched writer with bounded per-batch retry.
pub struct BatchWriter<'a, S: FeatureSink> {
    sink: &'a S,
    batch_size: usize,
    max_attempts: u32,
    backoff: Duration,
}

impl<'a, S: FeatureSink> BatchWriter<'a, S> {
    pub fn new(sink: &'a S, batch_size: usize, max_attempts: u32, backoff_ms: u64) -> Self {
        Self {
            sink,
            batch_size,
            max_attempts: max_attempts.max(1),
            backoff: Duration::from_millis(backoff_ms),
        }
    }

    /// Delete-then-insert for the full record set. A failed batch never
    /// aborts the pass; its rows are counted failed and the next batch
    /// proceeds.
    pub async fn write(
        &self,
        analysis_date: NaiveDate,
        records: &[FeatureRecord],
    ) -> Result<WriteStats> {
        let mut stats = WriteStats::default();
        if records.is_empty() {
            return Ok(stats);
        }

        let entity_ids: Vec<String> = records.iter().map(|r| r.entity_id.clone()).collect();
        match self.sink.delete_scope(analysis_date, &entity_ids).await {
            Ok(deleted) => debug!(deleted, %analysis_date, "cleared prior rows"),
            Err(SinkError::AppendOnly(msg)) => {
                warn!(%analysis_date, msg, "destination refused delete; stale rows clear on the next healthy run");
                stats.delete_deferred = true;
            }
            Err(SinkError::Unavailable(msg)) => {
                return Err(PipelineError::Write(format!(
                    "clearing prior rows for {}: {}",
                    analysis_date, msg
                )));
            }
        }

        for batch in records.chunks(self.batch_size) {
            match self.write_batch(batch).await {
                Ok(rows) => {
                    stats.rows_written += rows;
                    stats.batches_written += 1;
                }
                Err(err) => {
                    error!(rows = batch.len(), error = %err, "batch permanently failed");
                    stats.rows_failed += batch.len() as u64;
                    stats.batches_failed += 1;
                    stats.errors.push(err.to_string());
                }
            }
        }

        info!(
            rows_written = stats.rows_written,
            rows_failed = stats.rows_failed,
            batches_written = stats.batches_written,
            batches_failed = stats.batches_failed,
            "write pass finished"
        );
        Ok(stats)
    }

    async fn write_batch(&self, batch: &[FeatureRecord]) -> std::result::Result<u64, SinkError> {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match self.sink.insert_batch(batch).await {
                Ok(rows) => return Ok(rows),
                // Retrying an append-only refusal cannot change the answer.
                Err(err @ SinkError::AppendOnly(_)) => return Err(err),
                Err(err) if attempt < self.max_attempts => {
                    warn!(attempt, error = %err, "batch insert failed; backing off");
                    tokio::time::sleep(self.backoff).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use courtline_protocol::{BreakerState, QualityTier};
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    fn record(entity_id: &str) -> FeatureRecord {
        FeatureRecord {
            entity_id: entity_id.to_string(),
            universal_id: None,
            analysis_date: "2026-01-15".parse().unwrap(),
            values: Vec::new(),
            quality_score: 0.0,
            quality_tier: QualityTier::Unknown,
            windows: Vec::new(),
            source_snapshots: HashMap::new(),
            breaker_state: BreakerState::fresh(),
            is_production_ready: false,
            content_hash: "hash".to_string(),
            computed_at: Utc::now(),
        }
    }

    fn records(n: usize) -> Vec<FeatureRecord> {
        (0..n).map(|i| record(&format!("p{}", i))).collect()
    }

    /// Scriptable sink: fails the first `fail_inserts` insert calls.
    struct FlakySink {
        fail_inserts: u32,
        append_only_deletes: bool,
        insert_calls: AtomicU32,
        inserted: Mutex<Vec<usize>>,
    }

    impl FlakySink {
        fn new(fail_inserts: u32, append_only_deletes: bool) -> Self {
            Self {
                fail_inserts,
                append_only_deletes,
                insert_calls: AtomicU32::new(0),
                inserted: Mutex::new(Vec::new()),
            }
        }
    }

    impl FeatureSink for FlakySink {
        async fn delete_scope(
            &self,
            _analysis_date: NaiveDate,
            entity_ids: &[String],
        ) -> std::result::Result<u64, SinkError> {
            if self.append_only_deletes {
                Err(SinkError::AppendOnly("table is frozen".to_string()))
            } else {
                Ok(entity_ids.len() as u64)
            }
        }

        async fn insert_batch(
            &self,
            batch: &[FeatureRecord],
        ) -> std::result::Result<u64, SinkError> {
            let call = self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_inserts {
                return Err(SinkError::Unavailable("transient".to_string()));
            }
            self.inserted.lock().unwrap().push(batch.len());
            Ok(batch.len() as u64)
        }
    }

    fn date() -> NaiveDate {
        "2026-01-15".parse().unwrap()
    }

    #[tokio::test]
    async fn splits_into_batches_and_counts_rows() {
        let sink = FlakySink::new(0, false);
        let writer = BatchWriter::new(&sink, 10, 3, 0);
        let stats = writer.write(date(), &records(25)).await.unwrap();

        assert_eq!(stats.rows_written, 25);
        assert_eq!(stats.batches_written, 3);
        assert_eq!(stats.batches_failed, 0);
        assert_eq!(*sink.inserted.lock().unwrap(), vec![10, 10, 5]);
    }

    #[tokio::test]
    async fn transient_failure_retries_to_success() {
        let sink = FlakySink::new(2, false);
        let writer = BatchWriter::new(&sink, 100, 3, 0);
        let stats = writer.write(date(), &records(5)).await.unwrap();

        assert_eq!(stats.rows_written, 5);
        assert_eq!(stats.batches_failed, 0);
        assert_eq!(sink.insert_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn exhausted_retries_record_batch_failure_and_continue() {
        // First batch burns all 3 attempts; second batch succeeds.
        let sink = FlakySink::new(3, false);
        let writer = BatchWriter::new(&sink, 5, 3, 0);
        let stats = writer.write(date(), &records(10)).await.unwrap();

        assert_eq!(stats.batches_failed, 1);
        assert_eq!(stats.rows_failed, 5);
        assert_eq!(stats.batches_written, 1);
        assert_eq!(stats.rows_written, 5);
        assert_eq!(stats.errors.len(), 1);
    }

    #[tokio::test]
    async fn append_only_delete_is_tolerated() {
        let sink = FlakySink::new(0, true);
        let writer = BatchWriter::new(&sink, 100, 3, 0);
        let stats = writer.write(date(), &records(4)).await.unwrap();

        assert!(stats.delete_deferred);
        assert_eq!(stats.rows_written, 4);
    }

    /// Sink whose inserts always refuse with AppendOnly.
    struct FrozenSink {
        insert_calls: AtomicU32,
    }

    impl FeatureSink for FrozenSink {
        async fn delete_scope(
            &self,
            _analysis_date: NaiveDate,
            _entity_ids: &[String],
        ) -> std::result::Result<u64, SinkError> {
            Ok(0)
        }

        async fn insert_batch(
            &self,
            _batch: &[FeatureRecord],
        ) -> std::result::Result<u64, SinkError> {
            self.insert_calls.fetch_add(1, Ordering::SeqCst);
            Err(SinkError::AppendOnly("frozen".to_string()))
        }
    }

    #[tokio::test]
    async fn append_only_insert_is_not_retried() {
        let sink = FrozenSink {
            insert_calls: AtomicU32::new(0),
        };
        let writer = BatchWriter::new(&sink, 100, 3, 0);
        let stats = writer.write(date(), &records(3)).await.unwrap();

        assert_eq!(stats.batches_failed, 1);
        assert_eq!(sink.insert_calls.load(Ordering::SeqCst), 1);
    }

    /// Sink that refuses exactly one insert call with AppendOnly.
    struct OneFrozenBatchSink {
        frozen_call: u32,
        insert_calls: AtomicU32,
    }

    impl FeatureSink for OneFrozenBatchSink {
        async fn delete_scope(
            &self,
            _analysis_date: NaiveDate,
            _entity_ids: &[String],
        ) -> std::result::Result<u64, SinkError> {
            Ok(0)
        }

        async fn insert_batch(
            &self,
            batch: &[FeatureRecord],
        ) -> std::result::Result<u64, SinkError> {
            let call = self.insert_calls.fetch_add(1, Ordering::SeqCst);
            if call == self.frozen_call {
                return Err(SinkError::AppendOnly("frozen".to_string()));
            }
            Ok(batch.len() as u64)
        }
    }

    #[tokio::test]
    async fn middle_batch_failure_leaves_others_intact() {
        // 250 rows at batch size 100: batches of 100, 100 and 50. The
        // second refuses append-only; the first and third still land.
        let sink = OneFrozenBatchSink {
            frozen_call: 1,
            insert_calls: AtomicU32::new(0),
        };
        let writer = BatchWriter::new(&sink, 100, 3, 0);
        let stats = writer.write(date(), &records(250)).await.unwrap();

        assert_eq!(stats.rows_written, 150);
        assert_eq!(stats.rows_failed, 100);
        assert_eq!(stats.batches_written, 2);
        assert_eq!(stats.batches_failed, 1);
        // No retry on the append-only batch: exactly three insert calls.
        assert_eq!(sink.insert_calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn empty_input_writes_nothing() {
        let sink = FlakySink::new(0, false);
        let writer = BatchWriter::new(&sink, 100, 3, 0);
        let stats = writer.write(date(), &[]).await.unwrap();
        assert_eq!(stats.rows_written, 0);
        assert_eq!(sink.insert_calls.load(Ordering::SeqCst), 0);
    }
}
