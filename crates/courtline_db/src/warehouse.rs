//! Read-only queries against the analytical store.
//!
//! Dates are stored as ISO-8601 TEXT and parsed at the boundary; a row
//! with an unparseable date is a `DbError::Parse`, not a silent skip.

use crate::error::{DbError, Result};
use chrono::NaiveDate;
use sqlx::{Pool, Sqlite};

/// Entity identity as listed in the roster.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityRef {
    pub entity_id: String,
    pub universal_id: Option<String>,
}

/// One boxscore row (primary source).
#[derive(Debug, Clone)]
pub struct GameLogRow {
    pub entity_id: String,
    pub game_date: NaiveDate,
    pub team: String,
    pub opponent: String,
    pub points: f64,
    pub minutes: f64,
    pub rebounds: f64,
    pub assists: f64,
    pub ft_made: f64,
    pub usage_rate: Option<f64>,
    pub won: bool,
    pub loaded_at: NaiveDate,
}

/// One tracking row (coarser secondary source).
#[derive(Debug, Clone)]
pub struct TrackingRow {
    pub entity_id: String,
    pub game_date: NaiveDate,
    pub points: Option<f64>,
    pub minutes: Option<f64>,
    pub rebounds: Option<f64>,
    pub assists: Option<f64>,
    pub usage_rate: Option<f64>,
    pub loaded_at: NaiveDate,
}

/// Most recent injury report at or before the analysis date.
#[derive(Debug, Clone)]
pub struct InjuryRow {
    pub entity_id: String,
    pub report_date: NaiveDate,
    pub status: String,
}

/// Precomputed composite ratings from the upstream scoring pipeline.
#[derive(Debug, Clone)]
pub struct RatingRow {
    pub entity_id: String,
    pub rating_date: NaiveDate,
    pub offensive_rating: Option<f64>,
    pub defensive_rating: Option<f64>,
    pub load_index: Option<f64>,
}

/// One scheduled game for a team.
#[derive(Debug, Clone)]
pub struct ScheduleRow {
    pub team: String,
    pub game_date: NaiveDate,
    pub opponent: String,
}

/// Completeness marker written by an upstream pipeline.
#[derive(Debug, Clone)]
pub struct PipelineStatusRow {
    pub pipeline: String,
    pub is_complete: bool,
    pub completeness_pct: f64,
}

fn parse_date(text: &str, table: &str) -> Result<NaiveDate> {
    text.parse()
        .map_err(|_| DbError::parse(format!("{}: bad date '{}'", table, text)))
}

/// Read-only client for the analytical store. Cheap to clone; the pool
/// is shared, so one client can serve every worker concurrently.
#[derive(Clone)]
pub struct Warehouse {
    pool: Pool<Sqlite>,
}

impl Warehouse {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Entities with at least one boxscore row this season.
    pub async fn roster(&self, season_start: NaiveDate, through: NaiveDate) -> Result<Vec<EntityRef>> {
        let rows: Vec<(String, Option<String>)> = sqlx::query_as(
            r#"
            SELECT entity_id, MAX(universal_id)
            FROM player_game_logs
            WHERE game_date >= ?1 AND game_date < ?2
            GROUP BY entity_id
            ORDER BY entity_id
            "#,
        )
        .bind(season_start.to_string())
        .bind(through.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(entity_id, universal_id)| EntityRef {
                entity_id,
                universal_id,
            })
            .collect())
    }

    /// Boxscore rows for an entity in [from, through), oldest first.
    pub async fn game_logs(
        &self,
        entity_id: &str,
        from: NaiveDate,
        through: NaiveDate,
    ) -> Result<Vec<GameLogRow>> {
        type Row = (
            String,
            String,
            String,
            String,
            f64,
            f64,
            f64,
            f64,
            f64,
            Option<f64>,
            i64,
            String,
        );
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT entity_id, game_date, team, opponent, points, minutes,
                   rebounds, assists, ft_made, usage_rate, won, loaded_at
            FROM player_game_logs
            WHERE entity_id = ?1 AND game_date >= ?2 AND game_date < ?3
            ORDER BY game_date ASC
            "#,
        )
        .bind(entity_id)
        .bind(from.to_string())
        .bind(through.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(GameLogRow {
                    entity_id: r.0,
                    game_date: parse_date(&r.1, "player_game_logs")?,
                    team: r.2,
                    opponent: r.3,
                    points: r.4,
                    minutes: r.5,
                    rebounds: r.6,
                    assists: r.7,
                    ft_made: r.8,
                    usage_rate: r.9,
                    won: r.10 != 0,
                    loaded_at: parse_date(&r.11, "player_game_logs")?,
                })
            })
            .collect()
    }

    /// Tracking rows for an entity in [from, through), oldest first.
    pub async fn tracking_rows(
        &self,
        entity_id: &str,
        from: NaiveDate,
        through: NaiveDate,
    ) -> Result<Vec<TrackingRow>> {
        type Row = (
            String,
            String,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            Option<f64>,
            String,
        );
        let rows: Vec<Row> = sqlx::query_as(
            r#"
            SELECT entity_id, game_date, points, minutes, rebounds, assists,
                   usage_rate, loaded_at
            FROM player_tracking
            WHERE entity_id = ?1 AND game_date >= ?2 AND game_date < ?3
            ORDER BY game_date ASC
            "#,
        )
        .bind(entity_id)
        .bind(from.to_string())
        .bind(through.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(TrackingRow {
                    entity_id: r.0,
                    game_date: parse_date(&r.1, "player_tracking")?,
                    points: r.2,
                    minutes: r.3,
                    rebounds: r.4,
                    assists: r.5,
                    usage_rate: r.6,
                    loaded_at: parse_date(&r.7, "player_tracking")?,
                })
            })
            .collect()
    }

    /// Latest injury report at or before the analysis date.
    pub async fn latest_injury(
        &self,
        entity_id: &str,
        through: NaiveDate,
    ) -> Result<Option<InjuryRow>> {
        let row: Option<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT entity_id, report_date, status
            FROM injury_reports
            WHERE entity_id = ?1 AND report_date <= ?2
            ORDER BY report_date DESC
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .bind(through.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(InjuryRow {
                entity_id: r.0,
                report_date: parse_date(&r.1, "injury_reports")?,
                status: r.2,
            })
        })
        .transpose()
    }

    /// Latest composite rating at or before the analysis date.
    pub async fn latest_rating(
        &self,
        entity_id: &str,
        through: NaiveDate,
    ) -> Result<Option<RatingRow>> {
        type Row = (String, String, Option<f64>, Option<f64>, Option<f64>);
        let row: Option<Row> = sqlx::query_as(
            r#"
            SELECT entity_id, rating_date, offensive_rating, defensive_rating, load_index
            FROM composite_ratings
            WHERE entity_id = ?1 AND rating_date <= ?2
            ORDER BY rating_date DESC
            LIMIT 1
            "#,
        )
        .bind(entity_id)
        .bind(through.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|r| {
            Ok(RatingRow {
                entity_id: r.0,
                rating_date: parse_date(&r.1, "composite_ratings")?,
                offensive_rating: r.2,
                defensive_rating: r.3,
                load_index: r.4,
            })
        })
        .transpose()
    }

    /// Full season schedule for one team, oldest first.
    pub async fn team_schedule(&self, team: &str, season_year: i32) -> Result<Vec<ScheduleRow>> {
        let rows: Vec<(String, String, String)> = sqlx::query_as(
            r#"
            SELECT team, game_date, opponent
            FROM team_schedule
            WHERE team = ?1 AND season_year = ?2
            ORDER BY game_date ASC
            "#,
        )
        .bind(team)
        .bind(season_year)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|r| {
                Ok(ScheduleRow {
                    team: r.0,
                    game_date: parse_date(&r.1, "team_schedule")?,
                    opponent: r.2,
                })
            })
            .collect()
    }

    /// Distinct league-wide dates on which any game was scheduled,
    /// strictly before `through`, newest last.
    pub async fn league_active_dates(
        &self,
        season_year: i32,
        through: NaiveDate,
    ) -> Result<Vec<NaiveDate>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            r#"
            SELECT DISTINCT game_date
            FROM team_schedule
            WHERE season_year = ?1 AND game_date < ?2
            ORDER BY game_date ASC
            "#,
        )
        .bind(season_year)
        .bind(through.to_string())
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|(d,)| parse_date(&d, "team_schedule"))
            .collect()
    }

    /// First scheduled date of the season, if the schedule is loaded.
    pub async fn season_start(&self, season_year: i32) -> Result<Option<NaiveDate>> {
        let row: Option<(Option<String>,)> =
            sqlx::query_as("SELECT MIN(game_date) FROM team_schedule WHERE season_year = ?1")
                .bind(season_year)
                .fetch_optional(&self.pool)
                .await?;

        match row.and_then(|(d,)| d) {
            Some(d) => Ok(Some(parse_date(&d, "team_schedule")?)),
            None => Ok(None),
        }
    }

    /// Completeness markers for the analysis date, one per upstream
    /// pipeline that has reported.
    pub async fn pipeline_statuses(&self, analysis_date: NaiveDate) -> Result<Vec<PipelineStatusRow>> {
        let rows: Vec<(String, i64, f64)> = sqlx::query_as(
            r#"
            SELECT pipeline, is_complete, completeness_pct
            FROM pipeline_status
            WHERE analysis_date = ?1
            "#,
        )
        .bind(analysis_date.to_string())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|r| PipelineStatusRow {
                pipeline: r.0,
                is_complete: r.1 != 0,
                completeness_pct: r.2,
            })
            .collect())
    }
}
