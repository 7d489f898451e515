//! The per-entity feature pipeline: multi-source resolution with
//! fallback, completeness gating, circuit breaking, idempotent batched
//! writes, and the run driver that ties them together.

pub mod breaker;
pub mod completeness;
pub mod config;
pub mod dispatch;
pub mod error;
pub mod gate;
pub mod processor;
pub mod quality;
pub mod resolver;
pub mod run;
pub mod writer;

pub use breaker::{BreakerBook, BreakerStatus};
pub use completeness::{CalendarIndex, CompletenessEvaluator};
pub use config::{standard_windows, PipelineConfig, WindowSpec};
pub use dispatch::{ExecutionMode, WorkDispatcher};
pub use error::{PipelineError, Result};
pub use gate::GateDecision;
pub use processor::{EntityInput, EntityProcessor};
pub use resolver::{ResolvedFeatures, Resolver, SourceBundle};
pub use run::PipelineRun;
pub use writer::{BatchWriter, FeatureSink, SinkError, WriteStats};
