//! Per-entity decision sequence and record assembly.
//!
//! `EntityProcessor::process` is a pure function over prefetched value
//! data: breaker first (fail fast, no completeness re-query), then own
//! windows, then the upstream cascade, then the absolute sample floor,
//! and only then resolution, scoring and assembly. Soft gates honor the
//! bootstrap/season-boundary override; the floor never does.

use crate::completeness::{all_production_ready, CalendarIndex, CompletenessEvaluator};
use crate::config::PipelineConfig;
use crate::quality::score_values;
use crate::resolver::{Resolver, SourceBundle};
use chrono::{DateTime, Utc};
use courtline_protocol::hash::{content_hash, HashValue};
use courtline_protocol::{
    AnalysisScope, BreakerState, CompletenessWindow, FeatureRecord, FeatureValue, ProcessOutcome,
    QualityTier, SkipCategory,
};
use tracing::debug;

/// Everything a unit of work needs, by value. No live handles.
#[derive(Debug, Clone)]
pub struct EntityInput {
    pub entity_id: String,
    pub universal_id: Option<String>,
    pub breaker: BreakerState,
    /// Whether every critical upstream pipeline reported complete.
    pub upstream_complete: bool,
    /// Which upstream is blocking, for the skip reason.
    pub upstream_detail: String,
    pub bundle: SourceBundle,
    pub calendar: CalendarIndex,
}

pub struct EntityProcessor<'a> {
    config: &'a PipelineConfig,
    scope: &'a AnalysisScope,
}

impl<'a> EntityProcessor<'a> {
    pub fn new(config: &'a PipelineConfig, scope: &'a AnalysisScope) -> Self {
        Self { config, scope }
    }

    pub fn process(&self, input: EntityInput, now: DateTime<Utc>) -> ProcessOutcome {
        // 1. Breaker, before anything else. A live lockout means no
        //    completeness evaluation at all.
        if input.breaker.is_locked_out(now) {
            let until = input
                .breaker
                .tripped_until
                .map(|t| t.to_rfc3339())
                .unwrap_or_default();
            return ProcessOutcome::skipped(
                SkipCategory::CircuitBreakerActive,
                format!("breaker lockout active until {}", until),
            );
        }

        // 2. Own completeness windows.
        let event_dates: Vec<_> = input.bundle.game_logs.iter().map(|r| r.game_date).collect();
        let evaluator = CompletenessEvaluator::new(
            &self.config.windows,
            self.config.completeness_threshold_pct,
        );
        let windows = evaluator.evaluate(
            self.scope.analysis_date,
            &input.calendar,
            &event_dates,
            self.scope.completeness_override(),
        );
        if !all_production_ready(&windows) {
            let worst = windows
                .iter()
                .filter(|w| !w.is_production_ready)
                .min_by(|a, b| a.completeness_pct.total_cmp(&b.completeness_pct));
            let reason = match worst {
                Some(w) => format!(
                    "window {} at {:.1}% ({} of {} events)",
                    w.name, w.completeness_pct, w.actual_count, w.expected_count
                ),
                None => "no completeness windows evaluated".to_string(),
            };
            return ProcessOutcome::skipped(SkipCategory::IncompleteData, reason);
        }

        // 3. Upstream cascade.
        if !input.upstream_complete && !self.scope.completeness_override() {
            return ProcessOutcome::skipped(
                SkipCategory::UpstreamIncomplete,
                input.upstream_detail.clone(),
            );
        }

        // 4. Absolute floor. Never overridden.
        let games = input.bundle.game_logs.len() as u32;
        if games < self.config.min_games_absolute {
            return ProcessOutcome::skipped(
                SkipCategory::InsufficientData,
                format!(
                    "{} recorded games, absolute minimum is {}",
                    games, self.config.min_games_absolute
                ),
            );
        }

        // 5-8. Resolve, score, assemble, hash.
        let resolver = Resolver::new(
            &self.config.catalog,
            self.scope.analysis_date,
            self.config.recent_games_window,
        );
        let resolved = resolver.resolve(&input.entity_id, &input.bundle);
        let (quality_score, quality_tier) = score_values(&resolved.values);

        // Record-level readiness ignores the override: it reflects what
        // the data genuinely supports, cascade rule included.
        let genuinely_complete = windows
            .iter()
            .all(|w| w.completeness_pct >= self.config.completeness_threshold_pct);
        let is_production_ready = genuinely_complete && input.upstream_complete;

        let record = self.assemble(
            input,
            resolved.values,
            resolved.snapshots,
            windows,
            quality_score,
            quality_tier,
            is_production_ready,
            now,
        );
        debug!(
            entity_id = %record.entity_id,
            quality = %record.quality_tier,
            ready = record.is_production_ready,
            "entity processed"
        );
        ProcessOutcome::Success(Box::new(record))
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        input: EntityInput,
        values: Vec<FeatureValue>,
        snapshots: std::collections::HashMap<String, courtline_protocol::SourceSnapshot>,
        windows: Vec<CompletenessWindow>,
        quality_score: f64,
        quality_tier: QualityTier,
        is_production_ready: bool,
        now: DateTime<Utc>,
    ) -> FeatureRecord {
        let mut record = FeatureRecord {
            entity_id: input.entity_id,
            universal_id: input.universal_id,
            analysis_date: self.scope.analysis_date,
            values,
            quality_score,
            quality_tier,
            windows,
            source_snapshots: snapshots,
            breaker_state: input.breaker,
            is_production_ready,
            content_hash: String::new(),
            computed_at: now,
        };
        record.content_hash = record_content_hash(&record);
        record
    }

    /// Placeholder record for bootstrap runs with a missing critical
    /// upstream: every sourced field at its default, computed fields at
    /// their neutral values, quality unknown, never production-ready.
    pub fn placeholder(
        &self,
        entity_id: String,
        universal_id: Option<String>,
        now: DateTime<Utc>,
    ) -> FeatureRecord {
        let resolver = Resolver::new(
            &self.config.catalog,
            self.scope.analysis_date,
            self.config.recent_games_window,
        );
        let resolved = resolver.resolve(&entity_id, &SourceBundle::empty());

        let windows = self
            .config
            .windows
            .iter()
            .map(|spec| CompletenessWindow::degraded(&spec.name, spec.kind, spec.size))
            .collect();

        let mut record = FeatureRecord {
            entity_id,
            universal_id,
            analysis_date: self.scope.analysis_date,
            values: resolved.values,
            quality_score: 0.0,
            quality_tier: QualityTier::Unknown,
            windows,
            source_snapshots: resolved.snapshots,
            breaker_state: BreakerState::fresh(),
            is_production_ready: false,
            content_hash: String::new(),
            computed_at: now,
        };
        record.content_hash = record_content_hash(&record);
        record
    }
}

/// The declared meaningful-field subset for idempotency hashing:
/// identity, values with their tiers, the quality label and readiness.
/// Volatile metadata (timestamps, snapshots, breaker state) stays out.
pub fn record_content_hash(record: &FeatureRecord) -> String {
    let mut fields: Vec<(String, HashValue)> = Vec::with_capacity(record.values.len() * 2 + 4);
    fields.push((
        "entity_id".to_string(),
        HashValue::Text(record.entity_id.clone()),
    ));
    fields.push((
        "analysis_date".to_string(),
        HashValue::Date(record.analysis_date),
    ));
    fields.push((
        "quality_tier".to_string(),
        HashValue::Text(record.quality_tier.as_str().to_string()),
    ));
    fields.push((
        "is_production_ready".to_string(),
        HashValue::Text(record.is_production_ready.to_string()),
    ));
    for value in &record.values {
        fields.push((format!("value.{}", value.field), HashValue::from(value.value)));
        fields.push((
            format!("tier.{}", value.field),
            HashValue::Text(value.tier.as_str().to_string()),
        ));
    }
    content_hash(&fields)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate};
    use courtline_db::{GameLogRow, RatingRow, ScheduleRow};

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    fn scope(date: &str) -> AnalysisScope {
        AnalysisScope::new(d(date), 2025)
    }

    /// A fully healthy entity: `games` consecutive daily games ending
    /// the day before the analysis date, fresh rating, full calendar.
    fn healthy_input(games: i64, analysis: NaiveDate) -> EntityInput {
        let start = analysis - Duration::days(games);
        let dates: Vec<NaiveDate> = (0..games).map(|i| start + Duration::days(i)).collect();

        let game_logs: Vec<GameLogRow> = dates
            .iter()
            .map(|date| GameLogRow {
                entity_id: "p1".to_string(),
                game_date: *date,
                team: "BOS".to_string(),
                opponent: "NYK".to_string(),
                points: 20.0,
                minutes: 32.0,
                rebounds: 6.0,
                assists: 5.0,
                ft_made: 4.0,
                usage_rate: Some(0.24),
                won: true,
                loaded_at: *date,
            })
            .collect();

        let schedule: Vec<ScheduleRow> = dates
            .iter()
            .map(|date| ScheduleRow {
                team: "BOS".to_string(),
                game_date: *date,
                opponent: "NYK".to_string(),
            })
            .collect();

        EntityInput {
            entity_id: "p1".to_string(),
            universal_id: Some("nba-1".to_string()),
            breaker: BreakerState::fresh(),
            upstream_complete: true,
            upstream_detail: String::new(),
            bundle: SourceBundle {
                game_logs,
                tracking: Vec::new(),
                injury: None,
                rating: Some(RatingRow {
                    entity_id: "p1".to_string(),
                    rating_date: analysis - Duration::days(1),
                    offensive_rating: Some(114.0),
                    defensive_rating: Some(106.0),
                    load_index: Some(55.0),
                }),
                own_schedule: schedule.clone(),
                opponent_schedule: schedule,
            },
            calendar: CalendarIndex {
                team_dates: dates.clone(),
                league_active: dates,
            },
        }
    }

    #[test]
    fn healthy_entity_succeeds_with_primary_quality() {
        let config = PipelineConfig::standard();
        let scope = scope("2026-01-15");
        let processor = EntityProcessor::new(&config, &scope);

        let input = healthy_input(12, scope.analysis_date);
        let outcome = processor.process(input, Utc::now());

        let ProcessOutcome::Success(record) = outcome else {
            panic!("expected success, got {:?}", outcome);
        };
        assert_eq!(record.quality_tier, QualityTier::Primary);
        assert!(record.is_production_ready);
        assert!((0.0..=100.0).contains(&record.quality_score));
        assert_eq!(record.values.len(), config.catalog.fields().len());
        assert!(!record.content_hash.is_empty());
        assert_eq!(record.windows.len(), config.windows.len());
    }

    #[test]
    fn below_floor_is_insufficient_even_with_override() {
        let config = PipelineConfig::standard();
        let mut scope = scope("2026-01-15");
        scope.is_bootstrap = true; // override soft gates
        let processor = EntityProcessor::new(&config, &scope);

        let input = healthy_input(3, scope.analysis_date);
        let outcome = processor.process(input, Utc::now());
        match outcome {
            ProcessOutcome::Skipped {
                category,
                retryable,
                ..
            } => {
                assert_eq!(category, SkipCategory::InsufficientData);
                assert!(retryable);
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn active_breaker_fails_fast() {
        let config = PipelineConfig::standard();
        let scope = scope("2026-01-15");
        let processor = EntityProcessor::new(&config, &scope);
        let now = Utc::now();

        let mut input = healthy_input(12, scope.analysis_date);
        input.breaker = BreakerState {
            attempt_number: 3,
            tripped: true,
            tripped_until: Some(now + Duration::hours(12)),
        };
        let outcome = processor.process(input, now);
        assert_eq!(
            outcome.skip_category(),
            Some(SkipCategory::CircuitBreakerActive)
        );
    }

    #[test]
    fn expired_breaker_proceeds() {
        let config = PipelineConfig::standard();
        let scope = scope("2026-01-15");
        let processor = EntityProcessor::new(&config, &scope);
        let now = Utc::now();

        let mut input = healthy_input(12, scope.analysis_date);
        input.breaker = BreakerState {
            attempt_number: 3,
            tripped: true,
            tripped_until: Some(now - Duration::hours(1)),
        };
        assert!(processor.process(input, now).is_success());
    }

    #[test]
    fn incomplete_windows_skip_soft() {
        let config = PipelineConfig::standard();
        let scope = scope("2026-01-15");
        let processor = EntityProcessor::new(&config, &scope);

        let mut input = healthy_input(12, scope.analysis_date);
        // Drop the last three games from the data but not the calendar.
        input.bundle.game_logs.truncate(9);
        let outcome = processor.process(input, Utc::now());
        match outcome {
            ProcessOutcome::Skipped {
                category,
                retryable,
                reason,
            } => {
                assert_eq!(category, SkipCategory::IncompleteData);
                assert!(retryable);
                assert!(reason.contains('%'));
            }
            other => panic!("expected skip, got {:?}", other),
        }
    }

    #[test]
    fn upstream_cascade_blocks_without_override() {
        let config = PipelineConfig::standard();
        let scope = scope("2026-01-15");
        let processor = EntityProcessor::new(&config, &scope);

        let mut input = healthy_input(12, scope.analysis_date);
        input.upstream_complete = false;
        input.upstream_detail = "composite_ratings incomplete".to_string();
        let outcome = processor.process(input, Utc::now());
        assert_eq!(
            outcome.skip_category(),
            Some(SkipCategory::UpstreamIncomplete)
        );
    }

    #[test]
    fn upstream_cascade_overridden_yields_not_ready_record() {
        let config = PipelineConfig::standard();
        let mut scope = scope("2026-01-15");
        scope.is_season_boundary = true;
        let processor = EntityProcessor::new(&config, &scope);

        let mut input = healthy_input(12, scope.analysis_date);
        input.upstream_complete = false;
        input.upstream_detail = "composite_ratings incomplete".to_string();
        let outcome = processor.process(input, Utc::now());
        let ProcessOutcome::Success(record) = outcome else {
            panic!("expected success under override");
        };
        assert!(!record.is_production_ready);
    }

    #[test]
    fn hash_is_stable_across_identical_processing() {
        let config = PipelineConfig::standard();
        let scope = scope("2026-01-15");
        let processor = EntityProcessor::new(&config, &scope);

        let run = |now| match processor.process(healthy_input(12, scope.analysis_date), now) {
            ProcessOutcome::Success(record) => record.content_hash,
            other => panic!("expected success, got {:?}", other),
        };
        let now = Utc::now();
        // Different wall clocks, same data: timestamps are not hashed.
        assert_eq!(run(now), run(now + Duration::hours(2)));
    }

    #[test]
    fn hash_changes_when_a_value_changes() {
        let config = PipelineConfig::standard();
        let scope = scope("2026-01-15");
        let processor = EntityProcessor::new(&config, &scope);
        let now = Utc::now();

        let base = match processor.process(healthy_input(12, scope.analysis_date), now) {
            ProcessOutcome::Success(record) => record,
            other => panic!("expected success, got {:?}", other),
        };
        let mut input = healthy_input(12, scope.analysis_date);
        for row in &mut input.bundle.game_logs {
            row.points = 25.0;
        }
        let changed = match processor.process(input, now) {
            ProcessOutcome::Success(record) => record,
            other => panic!("expected success, got {:?}", other),
        };
        assert_ne!(base.content_hash, changed.content_hash);
    }

    #[test]
    fn placeholder_is_defaulted_and_never_ready() {
        let config = PipelineConfig::standard();
        let mut scope = scope("2025-10-25");
        scope.is_bootstrap = true;
        let processor = EntityProcessor::new(&config, &scope);
        let now = Utc::now();

        let record = processor.placeholder("p9".to_string(), None, now);
        assert_eq!(record.quality_tier, QualityTier::Unknown);
        assert_eq!(record.quality_score, 0.0);
        assert!(!record.is_production_ready);
        assert_eq!(record.values.len(), config.catalog.fields().len());

        // Stable run over run.
        let again = processor.placeholder("p9".to_string(), None, now + Duration::hours(3));
        assert_eq!(record.content_hash, again.content_hash);
    }
}
