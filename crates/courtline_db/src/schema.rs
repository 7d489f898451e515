//! Table definitions for the warehouse, ledger and feature output.
//!
//! Schema init is idempotent; every statement is CREATE IF NOT EXISTS.
//! Source tables are written by ingestion processors outside this
//! repository; this crate only reads them.

use crate::error::Result;
use sqlx::{Pool, Sqlite};

const STATEMENTS: &[&str] = &[
    // Primary source: per-game boxscore rows.
    r#"
    CREATE TABLE IF NOT EXISTS player_game_logs (
        entity_id TEXT NOT NULL,
        universal_id TEXT,
        game_date TEXT NOT NULL,
        team TEXT NOT NULL,
        opponent TEXT NOT NULL,
        points REAL NOT NULL,
        minutes REAL NOT NULL,
        rebounds REAL NOT NULL,
        assists REAL NOT NULL,
        ft_made REAL NOT NULL DEFAULT 0,
        usage_rate REAL,
        won INTEGER NOT NULL DEFAULT 0,
        loaded_at TEXT NOT NULL,
        UNIQUE(entity_id, game_date)
    )
    "#,
    // Secondary source: coarser tracking aggregates.
    r#"
    CREATE TABLE IF NOT EXISTS player_tracking (
        entity_id TEXT NOT NULL,
        game_date TEXT NOT NULL,
        points REAL,
        minutes REAL,
        rebounds REAL,
        assists REAL,
        usage_rate REAL,
        loaded_at TEXT NOT NULL,
        UNIQUE(entity_id, game_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS injury_reports (
        entity_id TEXT NOT NULL,
        report_date TEXT NOT NULL,
        status TEXT NOT NULL,
        loaded_at TEXT NOT NULL
    )
    "#,
    // Upstream-only composite scores; no independent formula exists.
    r#"
    CREATE TABLE IF NOT EXISTS composite_ratings (
        entity_id TEXT NOT NULL,
        rating_date TEXT NOT NULL,
        offensive_rating REAL,
        defensive_rating REAL,
        load_index REAL,
        loaded_at TEXT NOT NULL,
        UNIQUE(entity_id, rating_date)
    )
    "#,
    r#"
    CREATE TABLE IF NOT EXISTS team_schedule (
        team TEXT NOT NULL,
        game_date TEXT NOT NULL,
        opponent TEXT NOT NULL,
        season_year INTEGER NOT NULL,
        UNIQUE(team, game_date)
    )
    "#,
    // Completeness markers emitted by upstream pipelines.
    r#"
    CREATE TABLE IF NOT EXISTS pipeline_status (
        pipeline TEXT NOT NULL,
        analysis_date TEXT NOT NULL,
        is_complete INTEGER NOT NULL,
        completeness_pct REAL NOT NULL DEFAULT 0,
        updated_at TEXT NOT NULL,
        UNIQUE(pipeline, analysis_date)
    )
    "#,
    // Append-only breaker ledger; current state is the highest attempt.
    r#"
    CREATE TABLE IF NOT EXISTS breaker_ledger (
        processor TEXT NOT NULL,
        entity_id TEXT NOT NULL,
        analysis_date TEXT NOT NULL,
        attempt_number INTEGER NOT NULL,
        tripped INTEGER NOT NULL DEFAULT 0,
        tripped_until TEXT,
        recorded_at TEXT NOT NULL,
        UNIQUE(processor, entity_id, analysis_date, attempt_number)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_breaker_key ON breaker_ledger(processor, analysis_date, entity_id)",
    // Merge-keyed output.
    r#"
    CREATE TABLE IF NOT EXISTS player_features (
        entity_id TEXT NOT NULL,
        analysis_date TEXT NOT NULL,
        universal_id TEXT,
        payload_json TEXT NOT NULL,
        quality_score REAL NOT NULL,
        quality_tier TEXT NOT NULL,
        is_production_ready INTEGER NOT NULL,
        content_hash TEXT NOT NULL,
        computed_at TEXT NOT NULL,
        UNIQUE(entity_id, analysis_date)
    )
    "#,
    "CREATE INDEX IF NOT EXISTS idx_features_date ON player_features(analysis_date)",
];

/// Create all tables and indexes if missing.
pub async fn init_schema(pool: &Pool<Sqlite>) -> Result<()> {
    for statement in STATEMENTS {
        sqlx::query(statement).execute(pool).await?;
    }
    Ok(())
}
