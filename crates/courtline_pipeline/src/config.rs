//! Run configuration, validated once at construction.

use crate::dispatch::ExecutionMode;
use crate::error::{PipelineError, Result};
use courtline_protocol::defaults;
use courtline_protocol::{SourceCatalog, WindowKind};
use serde::{Deserialize, Serialize};

/// One configured completeness window, before evaluation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowSpec {
    pub name: String,
    pub kind: WindowKind,
    pub size: u32,
}

impl WindowSpec {
    pub fn count(name: &str, size: u32) -> Self {
        Self {
            name: name.to_string(),
            kind: WindowKind::Count,
            size,
        }
    }

    pub fn days(name: &str, size: u32) -> Self {
        Self {
            name: name.to_string(),
            kind: WindowKind::Days,
            size,
        }
    }
}

/// Standard window set: two count windows plus one day window that is
/// subject to gap widening.
pub fn standard_windows() -> Vec<WindowSpec> {
    vec![
        WindowSpec::count("last_5", 5),
        WindowSpec::count("last_10", 10),
        WindowSpec::days("recent_days_14", 14),
    ]
}

/// Validated pipeline configuration. Built once, passed by reference.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub catalog: SourceCatalog,
    pub windows: Vec<WindowSpec>,
    pub mode: ExecutionMode,
    pub completeness_threshold_pct: f64,
    pub min_games_absolute: u32,
    pub recent_games_window: u32,
    pub batch_size: usize,
    pub write_max_attempts: u32,
    pub write_backoff_ms: u64,
}

impl PipelineConfig {
    /// Standard configuration with the default catalog and windows.
    pub fn standard() -> Self {
        Self {
            catalog: SourceCatalog::standard(),
            windows: standard_windows(),
            mode: ExecutionMode::default(),
            completeness_threshold_pct: defaults::COMPLETENESS_THRESHOLD_PCT,
            min_games_absolute: defaults::MIN_GAMES_ABSOLUTE,
            recent_games_window: 10,
            batch_size: defaults::WRITE_BATCH_SIZE,
            write_max_attempts: defaults::WRITE_MAX_ATTEMPTS,
            write_backoff_ms: defaults::WRITE_BACKOFF_MS,
        }
    }

    pub fn with_mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    /// Check internal consistency. Called by the pipeline constructor;
    /// a bad configuration never reaches per-entity work.
    pub fn validate(&self) -> Result<()> {
        if self.windows.is_empty() {
            return Err(PipelineError::configuration("no completeness windows"));
        }
        for window in &self.windows {
            if window.size == 0 {
                return Err(PipelineError::configuration(format!(
                    "window {} has size 0",
                    window.name
                )));
            }
        }
        if !(self.completeness_threshold_pct > 0.0 && self.completeness_threshold_pct <= 100.0) {
            return Err(PipelineError::configuration(format!(
                "completeness threshold {} out of range (0, 100]",
                self.completeness_threshold_pct
            )));
        }
        if self.batch_size == 0 {
            return Err(PipelineError::configuration("batch size is 0"));
        }
        if self.recent_games_window == 0 {
            return Err(PipelineError::configuration("recent games window is 0"));
        }
        if let ExecutionMode::Concurrent { workers } = self.mode {
            if workers == 0 {
                return Err(PipelineError::configuration("worker count is 0"));
            }
        }
        Ok(())
    }
}
