//! SQLite-backed storage for Courtline: the read-only analytical
//! warehouse, the append-only breaker ledger, and the merge-keyed
//! feature output table.

pub mod error;
pub mod features;
pub mod ledger;
pub mod pool;
pub mod schema;
pub mod warehouse;

pub use error::{DbError, Result};
pub use features::FeatureTable;
pub use ledger::LedgerStore;
pub use pool::{in_memory_pool, open_pool};
pub use schema::init_schema;
pub use warehouse::{
    EntityRef, GameLogRow, InjuryRow, PipelineStatusRow, RatingRow, ScheduleRow, TrackingRow,
    Warehouse,
};
