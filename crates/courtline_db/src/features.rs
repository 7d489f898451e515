//! Merge-keyed feature output table.
//!
//! The full record rides along as JSON; the columns that exist as real
//! columns are the merge key, the quality/readiness summary and the
//! content hash the idempotency gate compares against.

use crate::error::{DbError, Result};
use chrono::NaiveDate;
use courtline_protocol::FeatureRecord;
use sqlx::{Pool, Sqlite};
use std::collections::HashMap;
use tracing::debug;

/// Output table client.
#[derive(Clone)]
pub struct FeatureTable {
    pool: Pool<Sqlite>,
}

impl FeatureTable {
    pub fn new(pool: Pool<Sqlite>) -> Self {
        Self { pool }
    }

    /// Content hashes currently stored for the analysis date.
    pub async fn prior_hashes(&self, analysis_date: NaiveDate) -> Result<HashMap<String, String>> {
        let rows: Vec<(String, String)> = sqlx::query_as(
            "SELECT entity_id, content_hash FROM player_features WHERE analysis_date = ?1",
        )
        .bind(analysis_date.to_string())
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().collect())
    }

    /// Delete existing rows for the (entity-set x date) scope. Returns
    /// rows removed. Surfaces `DbError::AppendOnly` when the destination
    /// is temporarily append-only.
    pub async fn delete_scope(
        &self,
        analysis_date: NaiveDate,
        entity_ids: &[String],
    ) -> Result<u64> {
        if entity_ids.is_empty() {
            return Ok(0);
        }
        let placeholders = (0..entity_ids.len())
            .map(|i| format!("?{}", i + 2))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "DELETE FROM player_features WHERE analysis_date = ?1 AND entity_id IN ({})",
            placeholders
        );
        let mut query = sqlx::query(&sql).bind(analysis_date.to_string());
        for entity_id in entity_ids {
            query = query.bind(entity_id);
        }
        let result = query.execute(&self.pool).await?;
        debug!(deleted = result.rows_affected(), %analysis_date, "cleared feature scope");
        Ok(result.rows_affected())
    }

    /// Insert one batch of records inside a transaction. All-or-nothing
    /// per batch; the caller handles retry and aggregation.
    pub async fn insert_batch(&self, records: &[FeatureRecord]) -> Result<u64> {
        if records.is_empty() {
            return Ok(0);
        }
        let mut tx = self.pool.begin().await?;
        for record in records {
            let payload = serde_json::to_string(record)?;
            sqlx::query(
                r#"
                INSERT INTO player_features
                    (entity_id, analysis_date, universal_id, payload_json,
                     quality_score, quality_tier, is_production_ready,
                     content_hash, computed_at)
                VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)
                "#,
            )
            .bind(&record.entity_id)
            .bind(record.analysis_date.to_string())
            .bind(record.universal_id.as_deref())
            .bind(&payload)
            .bind(record.quality_score)
            .bind(record.quality_tier.as_str())
            .bind(record.is_production_ready as i64)
            .bind(&record.content_hash)
            .bind(record.computed_at.to_rfc3339())
            .execute(&mut *tx)
            .await?;
        }
        tx.commit().await?;
        Ok(records.len() as u64)
    }

    /// Load one stored record back into its typed form.
    pub async fn fetch(
        &self,
        entity_id: &str,
        analysis_date: NaiveDate,
    ) -> Result<Option<FeatureRecord>> {
        let row: Option<(String,)> = sqlx::query_as(
            "SELECT payload_json FROM player_features WHERE entity_id = ?1 AND analysis_date = ?2",
        )
        .bind(entity_id)
        .bind(analysis_date.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|(payload,)| {
            serde_json::from_str(&payload)
                .map_err(|e| DbError::parse(format!("player_features payload: {}", e)))
        })
        .transpose()
    }

    /// Row count for an analysis date.
    pub async fn count_for_date(&self, analysis_date: NaiveDate) -> Result<u64> {
        let row: (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM player_features WHERE analysis_date = ?1")
                .bind(analysis_date.to_string())
                .fetch_one(&self.pool)
                .await?;
        Ok(row.0.max(0) as u64)
    }
}
