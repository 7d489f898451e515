//! Shared value types for the Courtline feature pipeline.
//!
//! Everything here is plain data: records exchanged between the pipeline
//! components, the static source catalog, fixed defaults, and the
//! idempotency content hash. No I/O lives in this crate.

pub mod defaults;
pub mod hash;
pub mod sources;
pub mod types;

pub use hash::{canonical_number, content_hash, HashValue};
pub use sources::{CatalogError, ComputedKind, FieldKind, FieldSpec, SourceCatalog, UpstreamSourceSpec};
pub use types::{
    AnalysisScope, BreakerState, CircuitBreakerRecord, CompletenessWindow, FeatureRecord,
    FeatureValue, ProcessOutcome, QualityTier, RunSummary, SkipCategory, SourceSnapshot,
    SourceTier, WindowKind,
};
