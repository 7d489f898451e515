//! Pipeline error taxonomy.
//!
//! Only configuration problems, a missing critical upstream in normal
//! season, and a wholly unreachable destination abort a run. Everything
//! per-entity converts to a typed `ProcessOutcome` at the work-unit
//! boundary and never propagates here.

use courtline_db::DbError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, PipelineError>;

#[derive(Error, Debug)]
pub enum PipelineError {
    /// Missing or invalid run parameter. Fatal, detected before work.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// A critical upstream source is missing or stale. Fatal in normal
    /// season; bootstrap runs degrade to placeholder mode instead.
    #[error("critical upstream unavailable: {source_name}")]
    UpstreamUnavailable { source_name: String },

    /// Storage failure outside the per-entity path.
    #[error(transparent)]
    Db(#[from] DbError),

    /// The write destination was wholly unreachable.
    #[error("write failure: {0}")]
    Write(String),
}

impl PipelineError {
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }
}
