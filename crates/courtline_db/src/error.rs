//! Error types for the storage layer.

use thiserror::Error;

/// Storage operation result type.
pub type Result<T> = std::result::Result<T, DbError>;

/// Storage errors.
#[derive(Error, Debug)]
pub enum DbError {
    /// SQLx error (connection, query, etc.)
    #[error("database error: {0}")]
    Sqlx(sqlx::Error),

    /// Destination is temporarily append-only: existing rows cannot be
    /// deleted or replaced, but inserts still land. Self-heals; callers
    /// treat it as a soft failure rather than aborting the run.
    #[error("destination temporarily append-only: {0}")]
    AppendOnly(String),

    /// Resource not found
    #[error("not found: {0}")]
    NotFound(String),

    /// Stored row failed to parse into its typed form
    #[error("row parse error: {0}")]
    Parse(String),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl DbError {
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    pub fn parse(msg: impl Into<String>) -> Self {
        Self::Parse(msg.into())
    }

    /// Whether this error is the tolerated append-only condition.
    pub fn is_append_only(&self) -> bool {
        matches!(self, DbError::AppendOnly(_))
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db_err) = &err {
            let msg = db_err.message().to_lowercase();
            if msg.contains("readonly") || msg.contains("read-only") {
                return DbError::AppendOnly(db_err.message().to_string());
            }
        }
        DbError::Sqlx(err)
    }
}
