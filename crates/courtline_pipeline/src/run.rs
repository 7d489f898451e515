//! Top-level run driver.
//!
//! One `execute` call is one (date, season) run: resolve the scope,
//! check the critical upstream markers, prefetch everything the units
//! of work need, dispatch, then do the run-level writes exactly once —
//! one breaker ledger append, one gated feature write.

use crate::breaker::BreakerBook;
use crate::completeness::CalendarIndex;
use crate::config::PipelineConfig;
use crate::dispatch::WorkDispatcher;
use crate::error::{PipelineError, Result};
use crate::gate;
use crate::processor::{EntityInput, EntityProcessor};
use crate::resolver::SourceBundle;
use crate::writer::BatchWriter;
use chrono::NaiveDate;
use courtline_db::{EntityRef, FeatureTable, LedgerStore, ScheduleRow, Warehouse};
use courtline_protocol::defaults::{
    BOOTSTRAP_ACTIVE_DAY_FLOOR, PROCESSOR_NAME, SEASON_BOUNDARY_DAYS,
};
use courtline_protocol::{AnalysisScope, FeatureRecord, ProcessOutcome, RunSummary};
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

pub struct PipelineRun {
    config: Arc<PipelineConfig>,
    warehouse: Warehouse,
    ledger: LedgerStore,
    features: FeatureTable,
}

impl PipelineRun {
    /// Build a run driver over one store. Rejects bad configuration
    /// before any work is scheduled.
    pub fn new(pool: Pool<Sqlite>, config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            warehouse: Warehouse::new(pool.clone()),
            ledger: LedgerStore::new(pool.clone()),
            features: FeatureTable::new(pool),
        })
    }

    pub async fn execute(&self, analysis_date: NaiveDate, season_year: i32) -> Result<RunSummary> {
        let started = Instant::now();
        let now = chrono::Utc::now();
        let run_id = uuid::Uuid::new_v4();

        let season_start = self
            .warehouse
            .season_start(season_year)
            .await?
            .ok_or_else(|| {
                PipelineError::configuration(format!(
                    "no schedule loaded for season {}",
                    season_year
                ))
            })?;
        let league_active = self
            .warehouse
            .league_active_dates(season_year, analysis_date)
            .await?;
        let scope = resolve_scope(analysis_date, season_year, season_start, &league_active);
        info!(
            %run_id,
            %analysis_date,
            season_year,
            bootstrap = scope.is_bootstrap,
            season_boundary = scope.is_season_boundary,
            "starting feature run"
        );

        let (upstream_complete, upstream_detail) = self.upstream_status(analysis_date).await?;
        if !upstream_complete && !scope.is_bootstrap && !scope.is_season_boundary {
            return Err(PipelineError::UpstreamUnavailable {
                source_name: upstream_detail,
            });
        }

        let roster = self.warehouse.roster(season_start, analysis_date).await?;
        info!(entities = roster.len(), "roster resolved");

        let mut summary = RunSummary::default();
        let mut book = BreakerBook::new(
            PROCESSOR_NAME,
            analysis_date,
            self.ledger
                .latest_states(PROCESSOR_NAME, analysis_date)
                .await?,
        );

        let records = if !upstream_complete && scope.is_bootstrap {
            // Bootstrap degradation: no per-entity gating is meaningful
            // without the upstream, so emit defaulted placeholders.
            warn!(
                detail = %upstream_detail,
                "bootstrap run with incomplete critical upstream; emitting placeholder records"
            );
            let processor = EntityProcessor::new(&self.config, &scope);
            let records: Vec<FeatureRecord> = roster
                .iter()
                .map(|e| processor.placeholder(e.entity_id.clone(), e.universal_id.clone(), now))
                .collect();
            summary.total = records.len();
            summary.succeeded = records.len();
            records
        } else {
            let items = self
                .prefetch(
                    &scope,
                    season_start,
                    &roster,
                    &book,
                    &league_active,
                    upstream_complete,
                    &upstream_detail,
                )
                .await?;

            let dispatcher = WorkDispatcher::new(self.config.mode);
            let config = Arc::clone(&self.config);
            let scope_shared = Arc::new(scope.clone());
            let outcomes = dispatcher
                .dispatch(items, move |_, input: EntityInput| {
                    let config = Arc::clone(&config);
                    let scope = Arc::clone(&scope_shared);
                    async move { EntityProcessor::new(&config, &scope).process(input, now) }
                })
                .await;

            let mut records = Vec::with_capacity(outcomes.len());
            for (entity_id, outcome) in outcomes {
                summary.record_outcome(&outcome);
                match outcome {
                    ProcessOutcome::Success(record) => records.push(*record),
                    ProcessOutcome::Skipped {
                        category, reason, ..
                    } => {
                        debug!(entity_id, %category, reason, "entity skipped");
                        if category.counts_toward_breaker() {
                            book.record_skip(&entity_id, now);
                        }
                    }
                }
            }
            records
        };

        // Run-level writes, on this task only.
        let pending = book.drain_pending();
        if !pending.is_empty() {
            self.ledger.append_batch(&pending).await?;
        }

        let prior = self.features.prior_hashes(analysis_date).await?;
        let decision = gate::evaluate(&records, &prior);
        if decision.write_needed {
            let writer = BatchWriter::new(
                &self.features,
                self.config.batch_size,
                self.config.write_max_attempts,
                self.config.write_backoff_ms,
            );
            let stats = writer.write(analysis_date, &records).await?;
            summary.rows_written = stats.rows_written;
            summary.rows_failed = stats.rows_failed;
            summary.batches_written = stats.batches_written;
            summary.batches_failed = stats.batches_failed;
        } else {
            summary.write_skipped_unchanged = !records.is_empty();
        }

        summary.duration_ms = started.elapsed().as_millis() as u64;
        info!(
            %run_id,
            total = summary.total,
            succeeded = summary.succeeded,
            skipped = summary.skipped(),
            rows_written = summary.rows_written,
            unchanged = summary.write_skipped_unchanged,
            duration_ms = summary.duration_ms,
            "feature run finished"
        );
        Ok(summary)
    }

    /// Per-run upstream cascade check against the completeness markers.
    async fn upstream_status(&self, analysis_date: NaiveDate) -> Result<(bool, String)> {
        let statuses = self.warehouse.pipeline_statuses(analysis_date).await?;
        let by_name: HashMap<&str, bool> = statuses
            .iter()
            .map(|s| (s.pipeline.as_str(), s.is_complete))
            .collect();

        let mut blocking = Vec::new();
        for source in self.config.catalog.critical_sources() {
            match by_name.get(source.name.as_str()) {
                Some(true) => {}
                Some(false) => blocking.push(format!("{} incomplete", source.name)),
                None => blocking.push(format!("{} unreported", source.name)),
            }
        }
        if blocking.is_empty() {
            Ok((true, String::new()))
        } else {
            Ok((false, blocking.join(", ")))
        }
    }

    /// Fetch everything the units of work need, up front. Workers get
    /// plain value snapshots and never touch the store.
    #[allow(clippy::too_many_arguments)]
    async fn prefetch(
        &self,
        scope: &AnalysisScope,
        season_start: NaiveDate,
        roster: &[EntityRef],
        book: &BreakerBook,
        league_active: &[NaiveDate],
        upstream_complete: bool,
        upstream_detail: &str,
    ) -> Result<Vec<(String, EntityInput)>> {
        let mut schedules: HashMap<String, Vec<ScheduleRow>> = HashMap::new();
        let mut items = Vec::with_capacity(roster.len());

        for entity in roster {
            let entity_id = entity.entity_id.as_str();
            let game_logs = self
                .warehouse
                .game_logs(entity_id, season_start, scope.analysis_date)
                .await?;
            let tracking = self
                .warehouse
                .tracking_rows(entity_id, season_start, scope.analysis_date)
                .await?;
            let injury = self
                .warehouse
                .latest_injury(entity_id, scope.analysis_date)
                .await?;
            let rating = self
                .warehouse
                .latest_rating(entity_id, scope.analysis_date)
                .await?;

            let team = game_logs.last().map(|r| r.team.clone());
            let own_schedule = match &team {
                Some(team) => {
                    self.team_schedule_cached(&mut schedules, team, scope.season_year)
                        .await?
                }
                None => Vec::new(),
            };
            let opponent = own_schedule
                .iter()
                .find(|r| r.game_date == scope.analysis_date)
                .map(|r| r.opponent.clone());
            let opponent_schedule = match &opponent {
                Some(team) => {
                    self.team_schedule_cached(&mut schedules, team, scope.season_year)
                        .await?
                }
                None => Vec::new(),
            };

            let calendar = CalendarIndex {
                team_dates: own_schedule.iter().map(|r| r.game_date).collect(),
                league_active: league_active.to_vec(),
            };

            items.push((
                entity.entity_id.clone(),
                EntityInput {
                    entity_id: entity.entity_id.clone(),
                    universal_id: entity.universal_id.clone(),
                    breaker: book.state(entity_id),
                    upstream_complete,
                    upstream_detail: upstream_detail.to_string(),
                    bundle: SourceBundle {
                        game_logs,
                        tracking,
                        injury,
                        rating,
                        own_schedule,
                        opponent_schedule,
                    },
                    calendar,
                },
            ));
        }
        Ok(items)
    }

    async fn team_schedule_cached(
        &self,
        cache: &mut HashMap<String, Vec<ScheduleRow>>,
        team: &str,
        season_year: i32,
    ) -> Result<Vec<ScheduleRow>> {
        if let Some(rows) = cache.get(team) {
            return Ok(rows.clone());
        }
        let rows = self.warehouse.team_schedule(team, season_year).await?;
        cache.insert(team.to_string(), rows.clone());
        Ok(rows)
    }
}

/// Bootstrap when too few league active days precede the date; season
/// boundary within the first weeks after the first scheduled game.
fn resolve_scope(
    analysis_date: NaiveDate,
    season_year: i32,
    season_start: NaiveDate,
    league_active: &[NaiveDate],
) -> AnalysisScope {
    let mut scope = AnalysisScope::new(analysis_date, season_year);
    scope.is_bootstrap = league_active.len() < BOOTSTRAP_ACTIVE_DAY_FLOOR;
    let since_start = (analysis_date - season_start).num_days();
    scope.is_season_boundary = (0..=SEASON_BOUNDARY_DAYS).contains(&since_start);
    scope
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn d(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn early_season_is_bootstrap_and_boundary() {
        let start = d("2025-10-21");
        let active: Vec<NaiveDate> = (0..3).map(|i| start + Duration::days(i)).collect();
        let scope = resolve_scope(d("2025-10-25"), 2025, start, &active);
        assert!(scope.is_bootstrap);
        assert!(scope.is_season_boundary);
        assert!(scope.completeness_override());
    }

    #[test]
    fn midseason_is_neither() {
        let start = d("2025-10-21");
        let active: Vec<NaiveDate> = (0..60).map(|i| start + Duration::days(i)).collect();
        let scope = resolve_scope(d("2026-01-15"), 2025, start, &active);
        assert!(!scope.is_bootstrap);
        assert!(!scope.is_season_boundary);
        assert!(!scope.completeness_override());
    }

    #[test]
    fn boundary_window_is_inclusive_of_day_21() {
        let start = d("2025-10-21");
        let active: Vec<NaiveDate> = (0..30).map(|i| start + Duration::days(i)).collect();
        assert!(resolve_scope(start + Duration::days(21), 2025, start, &active).is_season_boundary);
        assert!(!resolve_scope(start + Duration::days(22), 2025, start, &active).is_season_boundary);
        // Dates before the season start never count as boundary.
        assert!(!resolve_scope(start - Duration::days(1), 2025, start, &active).is_season_boundary);
    }
}
