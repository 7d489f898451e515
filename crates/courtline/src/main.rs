//! Courtline command line.

use anyhow::{Context, Result};
use chrono::{Datelike, NaiveDate};
use clap::{Parser, Subcommand};
use courtline_db::{init_schema, open_pool};
use courtline_logging::{courtline_home, init_logging, LogConfig};
use courtline_pipeline::{ExecutionMode, PipelineConfig, PipelineRun};
use std::path::PathBuf;
use tracing::error;

#[derive(Parser)]
#[command(name = "courtline", version, about = "Daily per-player feature pipeline")]
struct Cli {
    /// Verbose console output.
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compute and store features for one analysis date.
    Run {
        /// Analysis date (YYYY-MM-DD).
        #[arg(long)]
        date: NaiveDate,

        /// Season start year. Inferred from the date when omitted.
        #[arg(long)]
        season: Option<i32>,

        /// SQLite database path.
        #[arg(long, env = "COURTLINE_DB")]
        db: Option<PathBuf>,

        /// Concurrent worker cap.
        #[arg(long, conflicts_with = "sequential")]
        workers: Option<usize>,

        /// Process entities one at a time.
        #[arg(long)]
        sequential: bool,
    },

    /// Create the schema in a new or existing database.
    InitDb {
        /// SQLite database path.
        #[arg(long, env = "COURTLINE_DB")]
        db: Option<PathBuf>,
    },
}

fn default_db_path() -> PathBuf {
    courtline_home().join("courtline.db")
}

/// Seasons straddle the new year: dates from August onward belong to
/// the season starting that calendar year.
fn infer_season(date: NaiveDate) -> i32 {
    if date.month() >= 8 {
        date.year()
    } else {
        date.year() - 1
    }
}

fn execution_mode(workers: Option<usize>, sequential: bool) -> ExecutionMode {
    if sequential {
        ExecutionMode::Sequential
    } else {
        match workers {
            Some(workers) => ExecutionMode::Concurrent { workers },
            None => ExecutionMode::default(),
        }
    }
}

async fn open_db(path: Option<PathBuf>) -> Result<sqlx::Pool<sqlx::Sqlite>> {
    let path = path.unwrap_or_else(default_db_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("creating database directory {}", parent.display()))?;
    }
    open_pool(&path)
        .await
        .with_context(|| format!("opening database {}", path.display()))
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(LogConfig {
        app_name: "courtline",
        verbose: cli.verbose,
    })?;

    match cli.command {
        Command::Run {
            date,
            season,
            db,
            workers,
            sequential,
        } => {
            let season = season.unwrap_or_else(|| infer_season(date));
            let pool = open_db(db).await?;
            init_schema(&pool).await.context("initializing schema")?;

            let config =
                PipelineConfig::standard().with_mode(execution_mode(workers, sequential));
            let run = PipelineRun::new(pool, config).context("building pipeline")?;
            let summary = match run.execute(date, season).await {
                Ok(summary) => summary,
                Err(err) => {
                    error!(error = %err, "run failed");
                    return Err(err).context("feature run failed");
                }
            };
            println!("{}", summary);
            if summary.needs_investigation() {
                eprintln!("warning: processing errors occurred; check the logs");
            }
        }
        Command::InitDb { db } => {
            let pool = open_db(db).await?;
            init_schema(&pool).await.context("initializing schema")?;
            println!("schema ready");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn season_inference_straddles_new_year() {
        assert_eq!(infer_season("2025-11-01".parse().unwrap()), 2025);
        assert_eq!(infer_season("2026-01-15".parse().unwrap()), 2025);
        assert_eq!(infer_season("2026-08-01".parse().unwrap()), 2026);
    }

    #[test]
    fn sequential_flag_wins_over_default() {
        assert_eq!(execution_mode(None, true), ExecutionMode::Sequential);
        assert_eq!(
            execution_mode(Some(3), false),
            ExecutionMode::Concurrent { workers: 3 }
        );
    }

    #[test]
    fn cli_parses() {
        use clap::CommandFactory;
        Cli::command().debug_assert();
    }
}
