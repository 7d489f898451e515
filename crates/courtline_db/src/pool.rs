//! Connection pool helpers.

use crate::error::Result;
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::{Pool, Sqlite};
use std::path::Path;

const MAX_CONNECTIONS: u32 = 5;

/// Open (creating if needed) a SQLite database at `path`.
pub async fn open_pool(path: &Path) -> Result<Pool<Sqlite>> {
    let url = format!("sqlite:{}?mode=rwc", path.display());
    let pool = SqlitePoolOptions::new()
        .max_connections(MAX_CONNECTIONS)
        .connect(&url)
        .await?;
    Ok(pool)
}

/// In-memory database for tests.
pub async fn in_memory_pool() -> Result<Pool<Sqlite>> {
    // Single connection: each :memory: connection is its own database.
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect("sqlite::memory:")
        .await?;
    Ok(pool)
}
