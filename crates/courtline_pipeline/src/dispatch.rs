//! Work dispatch across entities.
//!
//! Both modes hand each unit of work its inputs by value and run it on
//! a spawned task, so a panic inside one entity's work converts to a
//! `ProcessingError` skip instead of taking the run down. Sequential
//! mode exists for debugging and for destinations that dislike
//! concurrent readers.

use courtline_protocol::defaults::PROGRESS_LOG_INTERVAL;
use courtline_protocol::{ProcessOutcome, SkipCategory};
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::{JoinError, JoinSet};
use tracing::{error, info};

const DEFAULT_WORKERS: usize = 8;

/// How units of work are scheduled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutionMode {
    /// Spawned tasks bounded by a semaphore.
    Concurrent { workers: usize },
    /// One entity at a time, in roster order.
    Sequential,
}

impl Default for ExecutionMode {
    fn default() -> Self {
        ExecutionMode::Concurrent {
            workers: DEFAULT_WORKERS,
        }
    }
}

/// Requested worker count clamped to what the host can actually run.
fn effective_workers(requested: usize) -> usize {
    let cap = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(DEFAULT_WORKERS);
    requested.clamp(1, cap)
}

/// Runs one async unit of work per entity under the configured mode.
pub struct WorkDispatcher {
    mode: ExecutionMode,
}

impl WorkDispatcher {
    pub fn new(mode: ExecutionMode) -> Self {
        Self { mode }
    }

    /// Dispatch `items` through `work`. Concurrent mode returns outcomes
    /// in completion order; sequential mode in input order. Either way
    /// every input produces exactly one `(entity_id, outcome)` pair.
    pub async fn dispatch<I, F, Fut>(
        &self,
        items: Vec<(String, I)>,
        work: F,
    ) -> Vec<(String, ProcessOutcome)>
    where
        I: Send + 'static,
        F: Fn(String, I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = ProcessOutcome> + Send + 'static,
    {
        match self.mode {
            ExecutionMode::Sequential => sequential(items, work).await,
            ExecutionMode::Concurrent { workers } => {
                concurrent(items, work, effective_workers(workers)).await
            }
        }
    }
}

async fn sequential<I, F, Fut>(items: Vec<(String, I)>, work: F) -> Vec<(String, ProcessOutcome)>
where
    I: Send + 'static,
    F: Fn(String, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessOutcome> + Send + 'static,
{
    let work = Arc::new(work);
    let total = items.len();
    let mut outcomes = Vec::with_capacity(total);

    for (entity_id, input) in items {
        let work = Arc::clone(&work);
        let task_id = entity_id.clone();
        let handle = tokio::spawn(async move { work(task_id, input).await });
        let outcome = match handle.await {
            Ok(outcome) => outcome,
            Err(err) => panic_outcome(&entity_id, &err),
        };
        outcomes.push((entity_id, outcome));
        log_progress(outcomes.len(), total);
    }
    outcomes
}

async fn concurrent<I, F, Fut>(
    items: Vec<(String, I)>,
    work: F,
    workers: usize,
) -> Vec<(String, ProcessOutcome)>
where
    I: Send + 'static,
    F: Fn(String, I) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ProcessOutcome> + Send + 'static,
{
    let work = Arc::new(work);
    let semaphore = Arc::new(Semaphore::new(workers));
    let total = items.len();
    info!(total, workers, "dispatching concurrent work");

    let mut set: JoinSet<(String, ProcessOutcome)> = JoinSet::new();
    let mut names: HashMap<tokio::task::Id, String> = HashMap::with_capacity(total);

    for (entity_id, input) in items {
        let work = Arc::clone(&work);
        let semaphore = Arc::clone(&semaphore);
        let task_id = entity_id.clone();
        let handle = set.spawn(async move {
            // The semaphore is never closed, so acquisition cannot fail.
            let _permit = semaphore.acquire_owned().await.ok();
            let outcome = work(task_id.clone(), input).await;
            (task_id, outcome)
        });
        names.insert(handle.id(), entity_id);
    }

    let mut outcomes = Vec::with_capacity(total);
    while let Some(joined) = set.join_next_with_id().await {
        let pair = match joined {
            Ok((_, pair)) => pair,
            Err(err) => {
                let entity_id = names.get(&err.id()).cloned().unwrap_or_default();
                let outcome = panic_outcome(&entity_id, &err);
                (entity_id, outcome)
            }
        };
        outcomes.push(pair);
        log_progress(outcomes.len(), total);
    }
    outcomes
}

fn panic_outcome(entity_id: &str, err: &JoinError) -> ProcessOutcome {
    error!(entity_id, error = %err, "unit of work panicked");
    ProcessOutcome::skipped(
        SkipCategory::ProcessingError,
        format!("unit of work panicked: {}", err),
    )
}

fn log_progress(done: usize, total: usize) {
    if done == total || done % PROGRESS_LOG_INTERVAL == 0 {
        info!(done, total, "dispatch progress");
    }
}
