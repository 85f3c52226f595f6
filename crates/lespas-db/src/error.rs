//! # Catalog Error Types
//!
//! ```text
//! sqlx::Error ──► DbError ──► SyncError::DatabaseError (lespas-sync)
//!                              └─ aborts the pass, queue left intact
//! ```

use thiserror::Error;

/// Catalog operation errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// The catalog file could not be opened or the pool was closed.
    #[error("Catalog unavailable: {0}")]
    Unavailable(String),

    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Another connection held the write lock past the busy timeout.
    #[error("Catalog busy: {0}")]
    Busy(String),

    /// Constraint violation or malformed SQL.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// A stored value could not be mapped back to a domain type, e.g. a
    /// timestamp outside the representable range or a non-numeric marker.
    #[error("Invalid stored {column}: {value}")]
    InvalidValue { column: &'static str, value: String },

    #[error("Internal catalog error: {0}")]
    Internal(String),
}

impl DbError {
    pub fn invalid_value(column: &'static str, value: impl ToString) -> Self {
        DbError::InvalidValue {
            column,
            value: value.to_string(),
        }
    }
}

impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();
                // SQLITE_BUSY / SQLITE_LOCKED surface as "database is locked"
                if msg.contains("locked") || msg.contains("busy") {
                    DbError::Busy(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }
            sqlx::Error::PoolTimedOut => DbError::Busy("pool timed out".to_string()),
            sqlx::Error::PoolClosed => DbError::Unavailable("pool is closed".to_string()),
            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

/// Result type for catalog operations.
pub type DbResult<T> = Result<T, DbError>;
