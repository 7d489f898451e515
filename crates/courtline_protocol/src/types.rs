//! Record types exchanged between pipeline components.
//!
//! `FeatureRecord` is the persisted unit (one per entity per analysis
//! date); everything else is ephemeral run state. All types are plain
//! serializable data so units of work can receive them by value.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Scope of a single pipeline run. Created once, immutable afterwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisScope {
    /// What kind of entity this run processes (currently always "player").
    pub entity_type: String,
    /// The date the features describe.
    pub analysis_date: NaiveDate,
    /// Season the date falls in (year the season started).
    pub season_year: i32,
    /// True when too little of the season has elapsed to demand full windows.
    pub is_bootstrap: bool,
    /// True within the first weeks of a season.
    pub is_season_boundary: bool,
}

impl AnalysisScope {
    pub fn new(analysis_date: NaiveDate, season_year: i32) -> Self {
        Self {
            entity_type: "player".to_string(),
            analysis_date,
            season_year,
            is_bootstrap: false,
            is_season_boundary: false,
        }
    }

    /// Whether soft completeness gates may be overridden this run.
    pub fn completeness_override(&self) -> bool {
        self.is_bootstrap || self.is_season_boundary
    }
}

/// Freshness audit for one upstream source, attached to the output record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSnapshot {
    pub rows_found: u32,
    pub last_updated: Option<NaiveDate>,
    pub completeness_pct: f64,
}

impl SourceSnapshot {
    /// Empty snapshot for a source with no rows at all.
    pub fn absent() -> Self {
        Self {
            rows_found: 0,
            last_updated: None,
            completeness_pct: 0.0,
        }
    }

    /// Days between the freshest row and the analysis date. `None` when
    /// the source never produced a row for this entity.
    pub fn staleness_days(&self, analysis_date: NaiveDate) -> Option<i64> {
        self.last_updated
            .map(|updated| (analysis_date - updated).num_days().max(0))
    }
}

/// How a completeness window measures its lookback.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WindowKind {
    /// Last N recorded events.
    Count,
    /// Last N elapsed days. Subject to gap widening.
    Days,
}

/// One evaluated completeness window. Recomputed every run, never
/// persisted on its own.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletenessWindow {
    pub name: String,
    pub kind: WindowKind,
    /// Effective size after any gap widening.
    pub size: u32,
    pub expected_count: u32,
    pub actual_count: u32,
    pub completeness_pct: f64,
    pub missing_count: u32,
    pub is_production_ready: bool,
}

impl CompletenessWindow {
    /// Window marked not-ready because its lookup failed.
    pub fn degraded(name: impl Into<String>, kind: WindowKind, size: u32) -> Self {
        Self {
            name: name.into(),
            kind,
            size,
            expected_count: 0,
            actual_count: 0,
            completeness_pct: 0.0,
            missing_count: 0,
            is_production_ready: false,
        }
    }
}

/// Resolution tier a feature value came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceTier {
    /// Preferred upstream source, fresh enough per its spec.
    Primary,
    /// Coarser fallback source.
    Secondary,
    /// Derived on the fly from other data.
    Computed,
    /// Configured static default.
    Default,
    /// Defaulted because a no-fallback upstream source had no row.
    /// Usually signals an upstream gap rather than a missing entity.
    DefaultUpstreamGap,
}

impl SourceTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            SourceTier::Primary => "primary",
            SourceTier::Secondary => "secondary",
            SourceTier::Computed => "computed",
            SourceTier::Default => "default",
            SourceTier::DefaultUpstreamGap => "default_upstream_gap",
        }
    }

    /// Both default variants weigh and report the same for scoring.
    pub fn is_default(&self) -> bool {
        matches!(self, SourceTier::Default | SourceTier::DefaultUpstreamGap)
    }
}

impl fmt::Display for SourceTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One resolved output field with the tier that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureValue {
    pub field: String,
    pub value: Option<f64>,
    pub tier: SourceTier,
}

impl FeatureValue {
    pub fn new(field: impl Into<String>, value: Option<f64>, tier: SourceTier) -> Self {
        Self {
            field: field.into(),
            value,
            tier,
        }
    }
}

/// Coarse quality label derived from the tier mix. Downstream trust
/// decisions key off this label, not the raw score.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityTier {
    Primary,
    PrimaryPartial,
    Secondary,
    Mixed,
    Unknown,
}

impl QualityTier {
    pub fn as_str(&self) -> &'static str {
        match self {
            QualityTier::Primary => "primary",
            QualityTier::PrimaryPartial => "primary_partial",
            QualityTier::Secondary => "secondary",
            QualityTier::Mixed => "mixed",
            QualityTier::Unknown => "unknown",
        }
    }
}

impl fmt::Display for QualityTier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Latest breaker state for an (entity, date) key, read from the ledger.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BreakerState {
    pub attempt_number: u32,
    pub tripped: bool,
    pub tripped_until: Option<DateTime<Utc>>,
}

impl BreakerState {
    /// State for a key with no ledger rows yet.
    pub fn fresh() -> Self {
        Self {
            attempt_number: 0,
            tripped: false,
            tripped_until: None,
        }
    }

    /// Whether the lockout is active at `now`. An expired lockout reads
    /// as clear; the ledger itself is never rewritten.
    pub fn is_locked_out(&self, now: DateTime<Utc>) -> bool {
        match (self.tripped, self.tripped_until) {
            (true, Some(until)) => now < until,
            _ => false,
        }
    }
}

impl Default for BreakerState {
    fn default() -> Self {
        Self::fresh()
    }
}

/// Append-only breaker ledger row. Current state for a key is the row
/// with the highest attempt_number.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerRecord {
    pub processor: String,
    pub entity_id: String,
    pub analysis_date: NaiveDate,
    pub attempt_number: u32,
    pub tripped: bool,
    pub tripped_until: Option<DateTime<Utc>>,
    pub recorded_at: DateTime<Utc>,
}

/// Why an entity was skipped this run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SkipCategory {
    /// Below the absolute minimum sample floor. Hard skip.
    InsufficientData,
    /// Own completeness windows not production-ready. Retryable.
    IncompleteData,
    /// A critical upstream pipeline is incomplete. Retryable.
    UpstreamIncomplete,
    /// Breaker lockout active; completeness was not re-evaluated.
    CircuitBreakerActive,
    /// Unexpected failure inside the unit of work. Always investigated.
    ProcessingError,
}

impl SkipCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            SkipCategory::InsufficientData => "INSUFFICIENT_DATA",
            SkipCategory::IncompleteData => "INCOMPLETE_DATA",
            SkipCategory::UpstreamIncomplete => "UPSTREAM_INCOMPLETE",
            SkipCategory::CircuitBreakerActive => "CIRCUIT_BREAKER_ACTIVE",
            SkipCategory::ProcessingError => "PROCESSING_ERROR",
        }
    }

    /// Whether a later run can reasonably expect a different outcome
    /// without operator intervention.
    pub fn retryable(&self) -> bool {
        match self {
            SkipCategory::InsufficientData => true,
            SkipCategory::IncompleteData => true,
            SkipCategory::UpstreamIncomplete => true,
            SkipCategory::CircuitBreakerActive => false,
            SkipCategory::ProcessingError => false,
        }
    }

    /// Whether this skip counts toward the circuit breaker.
    pub fn counts_toward_breaker(&self) -> bool {
        matches!(
            self,
            SkipCategory::IncompleteData | SkipCategory::UpstreamIncomplete
        )
    }
}

impl fmt::Display for SkipCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of processing one entity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ProcessOutcome {
    Success(Box<FeatureRecord>),
    Skipped {
        category: SkipCategory,
        reason: String,
        retryable: bool,
    },
}

impl ProcessOutcome {
    pub fn skipped(category: SkipCategory, reason: impl Into<String>) -> Self {
        ProcessOutcome::Skipped {
            category,
            reason: reason.into(),
            retryable: category.retryable(),
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, ProcessOutcome::Success(_))
    }

    pub fn skip_category(&self) -> Option<SkipCategory> {
        match self {
            ProcessOutcome::Skipped { category, .. } => Some(*category),
            ProcessOutcome::Success(_) => None,
        }
    }
}

/// The persisted feature record. One live row per (entity, date);
/// re-runs overwrite via delete-then-insert unless the content hash
/// says nothing changed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureRecord {
    pub entity_id: String,
    /// League-wide identifier when known (e.g. the official player id).
    pub universal_id: Option<String>,
    pub analysis_date: NaiveDate,
    pub values: Vec<FeatureValue>,
    pub quality_score: f64,
    pub quality_tier: QualityTier,
    pub windows: Vec<CompletenessWindow>,
    pub source_snapshots: HashMap<String, SourceSnapshot>,
    pub breaker_state: BreakerState,
    pub is_production_ready: bool,
    pub content_hash: String,
    pub computed_at: DateTime<Utc>,
}

impl FeatureRecord {
    pub fn value(&self, field: &str) -> Option<f64> {
        self.values
            .iter()
            .find(|v| v.field == field)
            .and_then(|v| v.value)
    }

    pub fn tier(&self, field: &str) -> Option<SourceTier> {
        self.values.iter().find(|v| v.field == field).map(|v| v.tier)
    }
}

/// Per-run totals by outcome. Emitted for monitoring, never persisted.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed_by_category: HashMap<SkipCategory, usize>,
    pub rows_written: u64,
    pub rows_failed: u64,
    pub batches_written: u32,
    pub batches_failed: u32,
    pub write_skipped_unchanged: bool,
    pub duration_ms: u64,
}

impl RunSummary {
    pub fn record_outcome(&mut self, outcome: &ProcessOutcome) {
        self.total += 1;
        match outcome.skip_category() {
            None => self.succeeded += 1,
            Some(category) => {
                *self.failed_by_category.entry(category).or_insert(0) += 1;
            }
        }
    }

    pub fn skipped(&self) -> usize {
        self.total - self.succeeded
    }

    /// Count for one category, 0 when absent.
    pub fn category_count(&self, category: SkipCategory) -> usize {
        self.failed_by_category.get(&category).copied().unwrap_or(0)
    }

    /// PROCESSING_ERROR is the only category that always warrants a look.
    pub fn needs_investigation(&self) -> bool {
        self.category_count(SkipCategory::ProcessingError) > 0
    }
}

impl fmt::Display for RunSummary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "processed {} entities: {} succeeded, {} skipped ({} ms)",
            self.total,
            self.succeeded,
            self.skipped(),
            self.duration_ms
        )?;
        let mut categories: Vec<_> = self.failed_by_category.iter().collect();
        categories.sort_by_key(|(cat, _)| cat.as_str());
        for (category, count) in categories {
            writeln!(f, "  {}: {}", category.as_str(), count)?;
        }
        write!(
            f,
            "wrote {} rows in {} batches ({} rows / {} batches failed)",
            self.rows_written, self.batches_written, self.rows_failed, self.batches_failed
        )
    }
}
