//! Shared logging setup for Courtline binaries.
//!
//! Each run appends to a date-stamped log file under the Courtline home
//! directory; old files are pruned so scheduled daily runs cannot fill
//! the disk. Console output goes to stderr with its own filter so `-v`
//! can raise verbosity without touching the file log.

use anyhow::{Context, Result};
use std::fs::{self, OpenOptions};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "courtline=info,courtline_pipeline=info,courtline_db=info";
const MAX_LOG_FILES: usize = 14;

/// Logging options for a binary.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Courtline home directory: `$COURTLINE_HOME` or `~/.courtline`.
pub fn courtline_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("COURTLINE_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".courtline")
}

/// Logs directory under the Courtline home.
pub fn logs_dir() -> PathBuf {
    courtline_home().join("logs")
}

/// Initialize tracing with a per-day file layer and a stderr layer.
pub fn init_logging(config: LogConfig<'_>) -> Result<()> {
    let dir = logs_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("failed to create log directory {}", dir.display()))?;
    prune_old_logs(&dir, config.app_name, MAX_LOG_FILES)?;

    let file_name = format!(
        "{}-{}.log",
        sanitize(config.app_name),
        chrono::Utc::now().format("%Y%m%d")
    );
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(dir.join(&file_name))
        .with_context(|| format!("failed to open log file {}", file_name))?;
    // &File is Write, so Arc<File> satisfies MakeWriter across layers.
    let file = std::sync::Arc::new(file);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter = if config.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::new("warn")
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(file)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(())
}

/// Remove the oldest log files for `app_name`, keeping at most `keep`.
/// Date-stamped names sort lexicographically, so a name sort is a
/// chronological sort.
fn prune_old_logs(dir: &std::path::Path, app_name: &str, keep: usize) -> Result<()> {
    let prefix = format!("{}-", sanitize(app_name));
    let mut logs: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("failed to read log directory {}", dir.display()))?
        .filter_map(|entry| entry.ok())
        .map(|entry| entry.path())
        .filter(|path| {
            path.file_name()
                .and_then(|n| n.to_str())
                .map(|n| n.starts_with(&prefix) && n.ends_with(".log"))
                .unwrap_or(false)
        })
        .collect();

    if logs.len() <= keep {
        return Ok(());
    }
    logs.sort();
    let excess = logs.len() - keep;
    for path in logs.into_iter().take(excess) {
        let _ = fs::remove_file(path);
    }
    Ok(())
}

fn sanitize(name: &str) -> String {
    name.chars()
        .map(|ch| {
            if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' {
                ch
            } else {
                '_'
            }
        })
        .collect()
}
