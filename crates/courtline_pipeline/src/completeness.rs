//! Multi-window completeness evaluation.
//!
//! Expected counts come from the season calendar, actuals from the
//! entity's recorded events. Day-based windows widen when a multi-day
//! scheduling gap (all-star break, postponements) immediately precedes
//! the analysis date, so a quiet league does not read as missing data.
//!
//! Windows evaluate independently: a bad spec or failed lookup degrades
//! that one window to not-ready and the rest still evaluate.

use crate::config::WindowSpec;
use chrono::{Duration, NaiveDate};
use courtline_protocol::defaults::GAP_LOOKBACK_DAYS;
use courtline_protocol::{CompletenessWindow, WindowKind};
use thiserror::Error;
use tracing::{debug, warn};

#[derive(Error, Debug)]
pub enum WindowError {
    #[error("window {0} has size 0")]
    ZeroSize(String),
}

/// Season calendar context for one entity. Plain data, safe to move
/// into a unit of work.
#[derive(Debug, Clone, Default)]
pub struct CalendarIndex {
    /// The entity's team game dates this season, sorted ascending.
    pub team_dates: Vec<NaiveDate>,
    /// League-wide active dates this season, sorted ascending.
    pub league_active: Vec<NaiveDate>,
}

impl CalendarIndex {
    /// Scheduling gap immediately preceding `analysis_date`: days
    /// between the most recent league active day (within the lookback
    /// horizon) and the analysis date, excluding both endpoints. Zero
    /// when the league played yesterday or no active day is in range.
    pub fn gap_before(&self, analysis_date: NaiveDate) -> i64 {
        let horizon = analysis_date - Duration::days(GAP_LOOKBACK_DAYS);
        let last_active = self
            .league_active
            .iter()
            .copied()
            .filter(|d| *d < analysis_date && *d >= horizon)
            .max();
        match last_active {
            Some(last) => ((analysis_date - last).num_days() - 1).max(0),
            None => 0,
        }
    }

    /// Scheduled team games strictly before the analysis date.
    fn scheduled_to_date(&self, analysis_date: NaiveDate) -> u32 {
        self.team_dates.iter().filter(|d| **d < analysis_date).count() as u32
    }

    /// Scheduled team games in [from, to).
    fn scheduled_in_range(&self, from: NaiveDate, to: NaiveDate) -> u32 {
        self.team_dates
            .iter()
            .filter(|d| **d >= from && **d < to)
            .count() as u32
    }
}

/// Evaluates the configured windows for one entity.
pub struct CompletenessEvaluator<'a> {
    specs: &'a [WindowSpec],
    threshold_pct: f64,
}

impl<'a> CompletenessEvaluator<'a> {
    pub fn new(specs: &'a [WindowSpec], threshold_pct: f64) -> Self {
        Self {
            specs,
            threshold_pct,
        }
    }

    /// Evaluate every window. `event_dates` are the entity's recorded
    /// event dates (ascending). `completeness_override` is the
    /// bootstrap/season-boundary override.
    pub fn evaluate(
        &self,
        analysis_date: NaiveDate,
        calendar: &CalendarIndex,
        event_dates: &[NaiveDate],
        completeness_override: bool,
    ) -> Vec<CompletenessWindow> {
        let gap = calendar.gap_before(analysis_date);
        if gap > 0 {
            debug!(gap, %analysis_date, "scheduling gap precedes analysis date; widening day windows");
        }

        self.specs
            .iter()
            .map(|spec| {
                match self.evaluate_one(spec, analysis_date, calendar, event_dates, gap, completeness_override)
                {
                    Ok(window) => window,
                    Err(err) => {
                        warn!(window = %spec.name, error = %err, "window evaluation failed; degrading to not-ready");
                        CompletenessWindow::degraded(&spec.name, spec.kind, spec.size)
                    }
                }
            })
            .collect()
    }

    fn evaluate_one(
        &self,
        spec: &WindowSpec,
        analysis_date: NaiveDate,
        calendar: &CalendarIndex,
        event_dates: &[NaiveDate],
        gap: i64,
        completeness_override: bool,
    ) -> Result<CompletenessWindow, WindowError> {
        if spec.size == 0 {
            return Err(WindowError::ZeroSize(spec.name.clone()));
        }

        // Count windows are unaffected by scheduling gaps.
        let effective_size = match spec.kind {
            WindowKind::Count => spec.size,
            WindowKind::Days => spec.size + gap.max(0) as u32,
        };

        let (expected, actual) = match spec.kind {
            WindowKind::Count => {
                let expected = calendar.scheduled_to_date(analysis_date).min(effective_size);
                let actual = (event_dates.iter().filter(|d| **d < analysis_date).count() as u32)
                    .min(effective_size);
                (expected, actual)
            }
            WindowKind::Days => {
                let from = analysis_date - Duration::days(effective_size as i64);
                let expected = calendar.scheduled_in_range(from, analysis_date);
                let actual = event_dates
                    .iter()
                    .filter(|d| **d >= from && **d < analysis_date)
                    .count() as u32;
                (expected, actual)
            }
        };

        let completeness_pct = if expected == 0 {
            100.0
        } else {
            actual as f64 / expected as f64 * 100.0
        };
        let missing_count = expected.saturating_sub(actual);
        let is_production_ready = completeness_pct >= self.threshold_pct || completeness_override;

        Ok(CompletenessWindow {
            name: spec.name.clone(),
            kind: spec.kind,
            size: effective_size,
            expected_count: expected,
            actual_count: actual,
            completeness_pct,
            missing_count,
            is_production_ready,
        })
    }
}

/// Whether every window passed its gate (override included).
pub fn all_production_ready(windows: &[CompletenessWindow]) -> bool {
    !windows.is_empty() && windows.iter().all(|w| w.is_production_ready)
}
