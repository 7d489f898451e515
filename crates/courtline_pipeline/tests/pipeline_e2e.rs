//! End-to-end runs against an in-memory store: seed source tables,
//! execute, and inspect the persisted output and ledger.

use chrono::{Duration, NaiveDate};
use courtline_db::{in_memory_pool, init_schema, FeatureTable, LedgerStore};
use courtline_pipeline::{ExecutionMode, PipelineConfig, PipelineError, PipelineRun};
use courtline_protocol::defaults::PROCESSOR_NAME;
use courtline_protocol::{QualityTier, SkipCategory};
use sqlx::{Pool, Sqlite};

const SEASON: i32 = 2025;

fn d(s: &str) -> NaiveDate {
    s.parse().unwrap()
}

fn analysis() -> NaiveDate {
    d("2026-01-15")
}

async fn seed_schedule(pool: &Pool<Sqlite>, team: &str, opponent: &str, dates: &[NaiveDate]) {
    for date in dates {
        sqlx::query(
            "INSERT OR IGNORE INTO team_schedule (team, game_date, opponent, season_year)
             VALUES (?1, ?2, ?3, ?4)",
        )
        .bind(team)
        .bind(date.to_string())
        .bind(opponent)
        .bind(SEASON)
        .execute(pool)
        .await
        .unwrap();
    }
}

async fn seed_game_log(pool: &Pool<Sqlite>, entity: &str, team: &str, date: NaiveDate, points: f64) {
    sqlx::query(
        "INSERT INTO player_game_logs
            (entity_id, universal_id, game_date, team, opponent, points, minutes,
             rebounds, assists, ft_made, usage_rate, won, loaded_at)
         VALUES (?1, ?2, ?3, ?4, 'OPP', ?5, 32.0, 6.0, 5.0, 4.0, 0.24, 1, ?6)",
    )
    .bind(entity)
    .bind(format!("nba-{}", entity))
    .bind(date.to_string())
    .bind(team)
    .bind(points)
    .bind(date.to_string())
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_rating(pool: &Pool<Sqlite>, entity: &str, date: NaiveDate) {
    sqlx::query(
        "INSERT INTO composite_ratings
            (entity_id, rating_date, offensive_rating, defensive_rating, load_index, loaded_at)
         VALUES (?1, ?2, 114.0, 106.0, 55.0, ?2)",
    )
    .bind(entity)
    .bind(date.to_string())
    .execute(pool)
    .await
    .unwrap();
}

async fn seed_status(pool: &Pool<Sqlite>, pipeline: &str, date: NaiveDate, complete: bool) {
    sqlx::query(
        "INSERT OR REPLACE INTO pipeline_status
            (pipeline, analysis_date, is_complete, completeness_pct, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?2)",
    )
    .bind(pipeline)
    .bind(date.to_string())
    .bind(complete as i64)
    .bind(if complete { 100.0 } else { 40.0 })
    .execute(pool)
    .await
    .unwrap();
}

/// Midseason fixture. Three entities:
/// p1 plays every scheduled BOS game (healthy), p2 misses the last
/// three (incomplete windows), p3 plays a full but tiny CHA schedule
/// (under the absolute floor).
async fn seed_midseason(pool: &Pool<Sqlite>) {
    // Early-season game pins season_start well before the analysis date.
    seed_schedule(pool, "DET", "HOU", &[d("2025-10-21")]).await;

    let bos_dates: Vec<NaiveDate> = (0..12).map(|i| d("2026-01-03") + Duration::days(i)).collect();
    seed_schedule(pool, "BOS", "NYK", &bos_dates).await;
    let cha_dates: Vec<NaiveDate> = (0..3).map(|i| d("2026-01-12") + Duration::days(i)).collect();
    seed_schedule(pool, "CHA", "MIA", &cha_dates).await;

    for date in &bos_dates {
        seed_game_log(pool, "p1", "BOS", *date, 20.0).await;
    }
    for date in &bos_dates[..9] {
        seed_game_log(pool, "p2", "BOS", *date, 15.0).await;
    }
    for date in &cha_dates {
        seed_game_log(pool, "p3", "CHA", *date, 10.0).await;
    }

    seed_rating(pool, "p1", d("2026-01-14")).await;
    seed_rating(pool, "p2", d("2026-01-14")).await;
    seed_rating(pool, "p3", d("2026-01-14")).await;

    seed_status(pool, "player_game_logs", analysis(), true).await;
    seed_status(pool, "composite_ratings", analysis(), true).await;
}

fn sequential_config() -> PipelineConfig {
    PipelineConfig::standard().with_mode(ExecutionMode::Sequential)
}

#[tokio::test(flavor = "multi_thread")]
async fn midseason_run_writes_only_healthy_entities() {
    let pool = in_memory_pool().await.unwrap();
    init_schema(&pool).await.unwrap();
    seed_midseason(&pool).await;

    let run = PipelineRun::new(pool.clone(), sequential_config()).unwrap();
    let summary = run.execute(analysis(), SEASON).await.unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.category_count(SkipCategory::IncompleteData), 1);
    assert_eq!(summary.category_count(SkipCategory::InsufficientData), 1);
    assert_eq!(summary.rows_written, 1);
    assert!(!summary.needs_investigation());

    let features = FeatureTable::new(pool.clone());
    assert_eq!(features.count_for_date(analysis()).await.unwrap(), 1);
    let record = features.fetch("p1", analysis()).await.unwrap().unwrap();
    assert_eq!(record.quality_tier, QualityTier::Primary);
    assert!(record.is_production_ready);
    assert_eq!(record.content_hash.len(), 16);
    assert!(record.value("avg_points").is_some());

    // Only the incomplete entity accrues a breaker attempt; the floor
    // skip never counts.
    let states = LedgerStore::new(pool)
        .latest_states(PROCESSOR_NAME, analysis())
        .await
        .unwrap();
    assert_eq!(states["p2"].attempt_number, 1);
    assert!(!states["p2"].tripped);
    assert!(!states.contains_key("p1"));
    assert!(!states.contains_key("p3"));
}

#[tokio::test(flavor = "multi_thread")]
async fn unchanged_second_run_skips_the_write() {
    let pool = in_memory_pool().await.unwrap();
    init_schema(&pool).await.unwrap();
    seed_midseason(&pool).await;

    let run = PipelineRun::new(pool.clone(), sequential_config()).unwrap();
    run.execute(analysis(), SEASON).await.unwrap();
    let features = FeatureTable::new(pool.clone());
    let first = features.fetch("p1", analysis()).await.unwrap().unwrap();

    let second = run.execute(analysis(), SEASON).await.unwrap();
    assert!(second.write_skipped_unchanged);
    assert_eq!(second.rows_written, 0);

    let after = features.fetch("p1", analysis()).await.unwrap().unwrap();
    assert_eq!(after.content_hash, first.content_hash);
    // Skipped write means the stored row was not replaced.
    assert_eq!(after.computed_at, first.computed_at);
}

#[tokio::test(flavor = "multi_thread")]
async fn changed_source_data_forces_a_rewrite() {
    let pool = in_memory_pool().await.unwrap();
    init_schema(&pool).await.unwrap();
    seed_midseason(&pool).await;

    let run = PipelineRun::new(pool.clone(), sequential_config()).unwrap();
    run.execute(analysis(), SEASON).await.unwrap();
    let features = FeatureTable::new(pool.clone());
    let first = features.fetch("p1", analysis()).await.unwrap().unwrap();

    sqlx::query("UPDATE player_game_logs SET points = 30.0 WHERE entity_id = 'p1'")
        .execute(&pool)
        .await
        .unwrap();

    let summary = run.execute(analysis(), SEASON).await.unwrap();
    assert!(!summary.write_skipped_unchanged);
    assert_eq!(summary.rows_written, 1);

    let after = features.fetch("p1", analysis()).await.unwrap().unwrap();
    assert_ne!(after.content_hash, first.content_hash);
    assert_eq!(after.value("avg_points"), Some(30.0));
}

#[tokio::test(flavor = "multi_thread")]
async fn repeated_incompleteness_trips_the_breaker() {
    let pool = in_memory_pool().await.unwrap();
    init_schema(&pool).await.unwrap();
    seed_midseason(&pool).await;

    let run = PipelineRun::new(pool.clone(), sequential_config()).unwrap();
    for _ in 0..3 {
        run.execute(analysis(), SEASON).await.unwrap();
    }

    let states = LedgerStore::new(pool.clone())
        .latest_states(PROCESSOR_NAME, analysis())
        .await
        .unwrap();
    assert_eq!(states["p2"].attempt_number, 3);
    assert!(states["p2"].tripped);

    // Fourth run refuses the entity without another ledger row.
    let fourth = run.execute(analysis(), SEASON).await.unwrap();
    assert_eq!(fourth.category_count(SkipCategory::CircuitBreakerActive), 1);
    assert_eq!(fourth.category_count(SkipCategory::IncompleteData), 0);

    let states = LedgerStore::new(pool)
        .latest_states(PROCESSOR_NAME, analysis())
        .await
        .unwrap();
    assert_eq!(states["p2"].attempt_number, 3);
}

#[tokio::test(flavor = "multi_thread")]
async fn missing_critical_upstream_is_fatal_midseason() {
    let pool = in_memory_pool().await.unwrap();
    init_schema(&pool).await.unwrap();
    seed_midseason(&pool).await;
    seed_status(&pool, "composite_ratings", analysis(), false).await;

    let run = PipelineRun::new(pool, sequential_config()).unwrap();
    let err = run.execute(analysis(), SEASON).await.unwrap_err();
    match err {
        PipelineError::UpstreamUnavailable { source_name: source } => {
            assert!(source.contains("composite_ratings"));
        }
        other => panic!("expected upstream error, got {:?}", other),
    }
}

#[tokio::test(flavor = "multi_thread")]
async fn bootstrap_with_missing_upstream_emits_stable_placeholders() {
    let pool = in_memory_pool().await.unwrap();
    init_schema(&pool).await.unwrap();

    // Three active days before the analysis date: a bootstrap run.
    let early = d("2025-10-22");
    let dates: Vec<NaiveDate> = (0..3).map(|i| early + Duration::days(i)).collect();
    seed_schedule(&pool, "BOS", "NYK", &dates).await;
    for date in &dates[..2] {
        seed_game_log(&pool, "p1", "BOS", *date, 18.0).await;
    }
    seed_status(&pool, "player_game_logs", d("2025-10-25"), true).await;
    seed_status(&pool, "composite_ratings", d("2025-10-25"), false).await;

    let run = PipelineRun::new(pool.clone(), sequential_config()).unwrap();
    let summary = run.execute(d("2025-10-25"), SEASON).await.unwrap();
    assert_eq!(summary.total, 1);
    assert_eq!(summary.succeeded, 1);
    assert_eq!(summary.rows_written, 1);

    let features = FeatureTable::new(pool.clone());
    let record = features.fetch("p1", d("2025-10-25")).await.unwrap().unwrap();
    assert_eq!(record.quality_tier, QualityTier::Unknown);
    assert!(!record.is_production_ready);
    assert_eq!(record.quality_score, 0.0);

    // Placeholders hash stably, so the second run skips the write.
    let second = run.execute(d("2025-10-25"), SEASON).await.unwrap();
    assert!(second.write_skipped_unchanged);
}

#[tokio::test(flavor = "multi_thread")]
async fn concurrent_mode_matches_sequential_results() {
    let seq_pool = in_memory_pool().await.unwrap();
    init_schema(&seq_pool).await.unwrap();
    seed_midseason(&seq_pool).await;
    let conc_pool = in_memory_pool().await.unwrap();
    init_schema(&conc_pool).await.unwrap();
    seed_midseason(&conc_pool).await;

    let seq = PipelineRun::new(seq_pool.clone(), sequential_config())
        .unwrap()
        .execute(analysis(), SEASON)
        .await
        .unwrap();
    let conc = PipelineRun::new(
        conc_pool.clone(),
        PipelineConfig::standard().with_mode(ExecutionMode::Concurrent { workers: 4 }),
    )
    .unwrap()
    .execute(analysis(), SEASON)
    .await
    .unwrap();

    assert_eq!(seq.succeeded, conc.succeeded);
    assert_eq!(seq.failed_by_category, conc.failed_by_category);

    let seq_record = FeatureTable::new(seq_pool)
        .fetch("p1", analysis())
        .await
        .unwrap()
        .unwrap();
    let conc_record = FeatureTable::new(conc_pool)
        .fetch("p1", analysis())
        .await
        .unwrap()
        .unwrap();
    assert_eq!(seq_record.content_hash, conc_record.content_hash);
}
