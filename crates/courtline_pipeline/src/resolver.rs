//! Multi-source field resolution with fallback.
//!
//! Every output field resolves through its configured chain: primary
//! source, optional coarser secondary, computed formula, or default.
//! The tier that produced each value is tagged on the value so the
//! quality scorer and downstream consumers can see how trustworthy the
//! record is.
//!
//! No-fallback fields (precomputed upstream composites) are the one
//! place "default" usually means an upstream gap rather than a missing
//! entity; those are tagged `DefaultUpstreamGap` and logged distinctly.

use chrono::NaiveDate;
use courtline_db::{GameLogRow, InjuryRow, RatingRow, ScheduleRow, TrackingRow};
use courtline_protocol::defaults::{LEAGUE_AVG_FT_SHARE, MIN_SAMPLES_FOR_RATES};
use courtline_protocol::{
    ComputedKind, FeatureValue, FieldKind, SourceCatalog, SourceSnapshot, SourceTier,
    UpstreamSourceSpec,
};
use std::collections::HashMap;
use tracing::{debug, warn};

/// Everything fetched for one entity, passed into the unit of work by
/// value. Plain data only; no live handles cross the worker boundary.
#[derive(Debug, Clone, Default)]
pub struct SourceBundle {
    /// Boxscore rows this season, oldest first.
    pub game_logs: Vec<GameLogRow>,
    /// Tracking rows this season, oldest first.
    pub tracking: Vec<TrackingRow>,
    pub injury: Option<InjuryRow>,
    pub rating: Option<RatingRow>,
    /// Own team schedule for the season, oldest first.
    pub own_schedule: Vec<ScheduleRow>,
    /// Schedule of the opponent faced on the analysis date, if any.
    pub opponent_schedule: Vec<ScheduleRow>,
}

impl SourceBundle {
    /// Empty bundle, used by placeholder mode.
    pub fn empty() -> Self {
        Self::default()
    }
}

/// Output of resolution: values plus the per-source audit snapshots.
#[derive(Debug, Clone)]
pub struct ResolvedFeatures {
    pub values: Vec<FeatureValue>,
    pub snapshots: HashMap<String, SourceSnapshot>,
}

/// Resolves the catalog's fields against one entity's source bundle.
pub struct Resolver<'a> {
    catalog: &'a SourceCatalog,
    analysis_date: NaiveDate,
    recent_games_window: u32,
}

impl<'a> Resolver<'a> {
    pub fn new(catalog: &'a SourceCatalog, analysis_date: NaiveDate, recent_games_window: u32) -> Self {
        Self {
            catalog,
            analysis_date,
            recent_games_window,
        }
    }

    pub fn resolve(&self, entity_id: &str, bundle: &SourceBundle) -> ResolvedFeatures {
        let snapshots = self.build_snapshots(bundle);
        let mut values = Vec::with_capacity(self.catalog.fields().len());

        for field in self.catalog.fields() {
            let value = match &field.kind {
                FieldKind::Fallback { secondary } => self.resolve_fallback(
                    entity_id,
                    &field.name,
                    &field.source,
                    secondary,
                    field.default,
                    bundle,
                    &snapshots,
                ),
                FieldKind::PrimaryOnly => self.resolve_primary_only(
                    entity_id,
                    &field.name,
                    &field.source,
                    field.default,
                    bundle,
                    &snapshots,
                ),
                FieldKind::Computed(kind) => FeatureValue::new(
                    &field.name,
                    Some(self.compute(*kind, bundle)),
                    SourceTier::Computed,
                ),
            };
            values.push(value);
        }

        ResolvedFeatures { values, snapshots }
    }

    fn build_snapshots(&self, bundle: &SourceBundle) -> HashMap<String, SourceSnapshot> {
        let mut snapshots = HashMap::new();

        snapshots.insert(
            "player_game_logs".to_string(),
            snapshot_from(
                bundle.game_logs.len() as u32,
                bundle.game_logs.iter().map(|r| r.loaded_at).max(),
                self.catalog.source("player_game_logs"),
            ),
        );
        snapshots.insert(
            "player_tracking".to_string(),
            snapshot_from(
                bundle.tracking.len() as u32,
                bundle.tracking.iter().map(|r| r.loaded_at).max(),
                self.catalog.source("player_tracking"),
            ),
        );
        snapshots.insert(
            "injury_reports".to_string(),
            snapshot_from(
                bundle.injury.iter().count() as u32,
                bundle.injury.as_ref().map(|r| r.report_date),
                self.catalog.source("injury_reports"),
            ),
        );
        snapshots.insert(
            "composite_ratings".to_string(),
            snapshot_from(
                bundle.rating.iter().count() as u32,
                bundle.rating.as_ref().map(|r| r.rating_date),
                self.catalog.source("composite_ratings"),
            ),
        );

        snapshots
    }

    /// A source qualifies for the primary tier only while its snapshot
    /// is fresh enough per the spec and meets its row floor.
    fn source_usable(&self, name: &str, snapshots: &HashMap<String, SourceSnapshot>) -> bool {
        let (Some(spec), Some(snap)) = (self.catalog.source(name), snapshots.get(name)) else {
            return false;
        };
        if snap.rows_found < spec.expected_min_rows || snap.rows_found == 0 {
            return false;
        }
        match snap.staleness_days(self.analysis_date) {
            Some(days) => days <= spec.max_staleness_days,
            None => false,
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn resolve_fallback(
        &self,
        entity_id: &str,
        field: &str,
        primary: &str,
        secondary: &str,
        default: f64,
        bundle: &SourceBundle,
        snapshots: &HashMap<String, SourceSnapshot>,
    ) -> FeatureValue {
        if self.source_usable(primary, snapshots) {
            if let Some(value) = self.primary_stat(field, bundle) {
                return FeatureValue::new(field, Some(value), SourceTier::Primary);
            }
        }
        if self.source_usable(secondary, snapshots) {
            if let Some(value) = self.secondary_stat(field, bundle) {
                debug!(entity_id, field, "fell back to secondary source");
                return FeatureValue::new(field, Some(value), SourceTier::Secondary);
            }
        }
        debug!(entity_id, field, "no usable source; using configured default");
        FeatureValue::new(field, Some(default), SourceTier::Default)
    }

    fn resolve_primary_only(
        &self,
        entity_id: &str,
        field: &str,
        source: &str,
        default: f64,
        bundle: &SourceBundle,
        snapshots: &HashMap<String, SourceSnapshot>,
    ) -> FeatureValue {
        if self.source_usable(source, snapshots) {
            if let Some(value) = rating_stat(field, bundle.rating.as_ref()) {
                return FeatureValue::new(field, Some(value), SourceTier::Primary);
            }
        }
        // Distinct from an ordinary default: there is no independent
        // formula for this field, so absence points at the upstream.
        warn!(
            entity_id,
            field, source, "no-fallback source missing or stale; defaulting (upstream gap)"
        );
        FeatureValue::new(field, Some(default), SourceTier::DefaultUpstreamGap)
    }

    /// Recent-window average of a boxscore stat.
    fn primary_stat(&self, field: &str, bundle: &SourceBundle) -> Option<f64> {
        let recent = recent_slice(&bundle.game_logs, self.recent_games_window as usize);
        if recent.is_empty() {
            return None;
        }
        match field {
            "avg_points" => Some(mean(recent.iter().map(|r| r.points))),
            "avg_minutes" => Some(mean(recent.iter().map(|r| r.minutes))),
            "avg_rebounds" => Some(mean(recent.iter().map(|r| r.rebounds))),
            "avg_assists" => Some(mean(recent.iter().map(|r| r.assists))),
            "usage_rate" => mean_present(recent.iter().map(|r| r.usage_rate)),
            _ => None,
        }
    }

    /// Recent-window average of the coarser tracking stat.
    fn secondary_stat(&self, field: &str, bundle: &SourceBundle) -> Option<f64> {
        let recent = recent_slice(&bundle.tracking, self.recent_games_window as usize);
        if recent.is_empty() {
            return None;
        }
        match field {
            "avg_points" => mean_present(recent.iter().map(|r| r.points)),
            "avg_minutes" => mean_present(recent.iter().map(|r| r.minutes)),
            "avg_rebounds" => mean_present(recent.iter().map(|r| r.rebounds)),
            "avg_assists" => mean_present(recent.iter().map(|r| r.assists)),
            "usage_rate" => mean_present(recent.iter().map(|r| r.usage_rate)),
            _ => None,
        }
    }

    fn compute(&self, kind: ComputedKind, bundle: &SourceBundle) -> f64 {
        match kind {
            ComputedKind::RestAdvantage => rest_advantage(
                self.analysis_date,
                &bundle.own_schedule,
                &bundle.opponent_schedule,
            ),
            ComputedKind::InjuryRisk => injury_risk(bundle.injury.as_ref()),
            ComputedKind::ScoringTrend => scoring_trend(&bundle.game_logs),
            ComputedKind::MinutesChange => minutes_change(&bundle.game_logs),
            ComputedKind::FtShare => ft_share(&bundle.game_logs, self.recent_games_window as usize),
            ComputedKind::WinPct => win_pct(&bundle.game_logs),
        }
    }
}

fn snapshot_from(
    rows_found: u32,
    last_updated: Option<NaiveDate>,
    spec: Option<&UpstreamSourceSpec>,
) -> SourceSnapshot {
    let expected = spec.map(|s| s.expected_min_rows).unwrap_or(0);
    let completeness_pct = if expected == 0 {
        100.0
    } else {
        (rows_found as f64 / expected as f64 * 100.0).min(100.0)
    };
    SourceSnapshot {
        rows_found,
        last_updated,
        completeness_pct,
    }
}

fn rating_stat(field: &str, rating: Option<&RatingRow>) -> Option<f64> {
    let rating = rating?;
    match field {
        "offensive_rating" => rating.offensive_rating,
        "defensive_rating" => rating.defensive_rating,
        "load_index" => rating.load_index,
        _ => None,
    }
}

fn recent_slice<T>(rows: &[T], window: usize) -> &[T] {
    let start = rows.len().saturating_sub(window);
    &rows[start..]
}

fn mean(values: impl Iterator<Item = f64>) -> f64 {
    let collected: Vec<f64> = values.collect();
    if collected.is_empty() {
        0.0
    } else {
        collected.iter().sum::<f64>() / collected.len() as f64
    }
}

fn mean_present(values: impl Iterator<Item = Option<f64>>) -> Option<f64> {
    let present: Vec<f64> = values.flatten().collect();
    if present.is_empty() {
        None
    } else {
        Some(present.iter().sum::<f64>() / present.len() as f64)
    }
}

/// Days of rest a team has before `date`, from its schedule.
fn rest_days(date: NaiveDate, schedule: &[ScheduleRow]) -> Option<i64> {
    schedule
        .iter()
        .map(|r| r.game_date)
        .filter(|d| *d < date)
        .max()
        .map(|last| ((date - last).num_days() - 1).max(0))
}

/// Own rest minus opponent rest, clamped to [-2, 2]. Neutral when
/// either side has no prior game on record.
pub fn rest_advantage(date: NaiveDate, own: &[ScheduleRow], opponent: &[ScheduleRow]) -> f64 {
    match (rest_days(date, own), rest_days(date, opponent)) {
        (Some(own_rest), Some(opp_rest)) => ((own_rest - opp_rest).clamp(-2, 2)) as f64,
        _ => 0.0,
    }
}

/// Ordinal injury status. No report reads as available.
pub fn injury_risk(injury: Option<&InjuryRow>) -> f64 {
    let Some(report) = injury else {
        return 0.0;
    };
    match report.status.to_lowercase().as_str() {
        "available" => 0.0,
        "probable" => 1.0,
        "questionable" => 2.0,
        "doubtful" | "out" => 3.0,
        other => {
            debug!(status = other, "unrecognized injury status; treating as questionable");
            2.0
        }
    }
}

/// Percent-delta bucket shared by the trend-style fields:
/// >=+15 -> 2, >=+5 -> 1, (-5, +5) -> 0, (-15, -5] -> -1, <=-15 -> -2.
fn bucket_pct_delta(delta_pct: f64) -> f64 {
    if delta_pct >= 15.0 {
        2.0
    } else if delta_pct >= 5.0 {
        1.0
    } else if delta_pct > -5.0 {
        0.0
    } else if delta_pct > -15.0 {
        -1.0
    } else {
        -2.0
    }
}

const TREND_LEADING_GAMES: usize = 3;
const TREND_TRAILING_GAMES: usize = 7;

/// Leading vs trailing sub-window of recent scoring, bucketed.
pub fn scoring_trend(logs: &[GameLogRow]) -> f64 {
    if logs.len() < 2 * TREND_LEADING_GAMES {
        return 0.0;
    }
    let recent = recent_slice(logs, TREND_LEADING_GAMES + TREND_TRAILING_GAMES);
    let split = recent.len() - TREND_LEADING_GAMES;
    let trailing = mean(recent[..split].iter().map(|r| r.points));
    let leading = mean(recent[split..].iter().map(|r| r.points));
    if trailing <= 0.0 {
        return 0.0;
    }
    bucket_pct_delta((leading - trailing) / trailing * 100.0)
}

const MINUTES_RECENT_GAMES: usize = 5;

/// Recent-5 average minutes vs season average, bucketed.
pub fn minutes_change(logs: &[GameLogRow]) -> f64 {
    if (logs.len() as u32) < MIN_SAMPLES_FOR_RATES {
        return 0.0;
    }
    let season = mean(logs.iter().map(|r| r.minutes));
    if season <= 0.0 {
        return 0.0;
    }
    let recent = mean(recent_slice(logs, MINUTES_RECENT_GAMES).iter().map(|r| r.minutes));
    bucket_pct_delta((recent - season) / season * 100.0)
}

/// Free throws made as a share of points over the recent window,
/// clamped to [0, 0.5]. League average under the sample floor.
pub fn ft_share(logs: &[GameLogRow], window: usize) -> f64 {
    if (logs.len() as u32) < MIN_SAMPLES_FOR_RATES {
        return LEAGUE_AVG_FT_SHARE;
    }
    let recent = recent_slice(logs, window);
    let points: f64 = recent.iter().map(|r| r.points).sum();
    if points <= 0.0 {
        return LEAGUE_AVG_FT_SHARE;
    }
    let ft: f64 = recent.iter().map(|r| r.ft_made).sum();
    (ft / points).clamp(0.0, 0.5)
}

/// Wins over games to date; 0.5 under the sample floor.
pub fn win_pct(logs: &[GameLogRow]) -> f64 {
    if (logs.len() as u32) < MIN_SAMPLES_FOR_RATES {
        return 0.5;
    }
    logs.iter().filter(|r| r.won).count() as f64 / logs.len() as f64
}
