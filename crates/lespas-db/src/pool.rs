//! # Database Pool Management
//!
//! Connection pool creation and configuration for the SQLite catalog.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                      Catalog Connection Pool                            │
//! │                                                                         │
//! │  DbConfig::new(path) ← path, pool size, busy timeout                   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Database::new(config).await ← Create pool + run migrations            │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────┐                           │
//! │  │            SqlitePool                    │                           │
//! │  └─────────────────────────────────────────┘                           │
//! │       │                                                                 │
//! │       ├── db.albums()   ──► AlbumRepository                            │
//! │       ├── db.photos()   ──► PhotoRepository                            │
//! │       ├── db.actions()  ──► ActionRepository                           │
//! │       └── db.status()   ──► StatusRepository                           │
//! │                                                                         │
//! │  UI readers and the sync engine share the pool; WAL mode keeps         │
//! │  readers from blocking the engine's writes.                            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::path::PathBuf;
use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous};
use sqlx::SqlitePool;
use tracing::{debug, info};

use crate::error::{DbError, DbResult};
use crate::migrations;
use crate::repository::{ActionRepository, AlbumRepository, PhotoRepository, StatusRepository};

// =============================================================================
// Configuration
// =============================================================================

/// Where the catalog lives and how many connections may share it.
///
/// ```rust,ignore
/// let config = DbConfig::new(&sync_config.paths.database).max_connections(2);
/// ```
#[derive(Debug, Clone)]
pub struct DbConfig {
    pub database_path: PathBuf,

    /// Readers (UI) plus the one sync writer. Default: 4
    pub max_connections: u32,

    /// How long a write waits for the SQLite lock. Default: 5 seconds
    pub busy_timeout: Duration,

    /// Default: true
    pub run_migrations: bool,
}

impl DbConfig {
    /// The file is created if it doesn't exist.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        DbConfig {
            database_path: path.into(),
            max_connections: 4,
            busy_timeout: Duration::from_secs(5),
            run_migrations: true,
        }
    }

    pub fn max_connections(mut self, max: u32) -> Self {
        self.max_connections = max;
        self
    }

    pub fn run_migrations(mut self, run: bool) -> Self {
        self.run_migrations = run;
        self
    }

    /// Private in-memory catalog. One connection, since every SQLite
    /// connection to `:memory:` opens its own database.
    pub fn in_memory() -> Self {
        DbConfig {
            database_path: PathBuf::from(":memory:"),
            max_connections: 1,
            busy_timeout: Duration::from_secs(1),
            run_migrations: true,
        }
    }

    fn is_in_memory(&self) -> bool {
        self.database_path.as_os_str() == ":memory:"
    }
}

// =============================================================================
// Database
// =============================================================================

/// Catalog handle; clones share the pool.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Opens the catalog and brings its schema up to date.
    pub async fn new(config: DbConfig) -> DbResult<Self> {
        info!(path = %config.database_path.display(), "Opening catalog");

        let mut options = SqliteConnectOptions::new()
            .filename(&config.database_path)
            .create_if_missing(true)
            .foreign_keys(true)
            .busy_timeout(config.busy_timeout);
        if !config.is_in_memory() {
            options = options
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal);
        }

        // The in-memory database dies with its last connection.
        let pool = SqlitePoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| DbError::Unavailable(e.to_string()))?;
        debug!(max_connections = config.max_connections, "Catalog pool ready");

        let db = Database { pool };
        if config.run_migrations {
            migrations::run_migrations(&db.pool).await?;
        }
        Ok(db)
    }

    /// For queries not covered by repositories.
    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn albums(&self) -> AlbumRepository {
        AlbumRepository::new(self.pool.clone())
    }

    pub fn photos(&self) -> PhotoRepository {
        PhotoRepository::new(self.pool.clone())
    }

    /// The pending action queue.
    pub fn actions(&self) -> ActionRepository {
        ActionRepository::new(self.pool.clone())
    }

    /// Sync stage, backup watermark and backoff markers.
    pub fn status(&self) -> StatusRepository {
        StatusRepository::new(self.pool.clone())
    }

    pub async fn is_reachable(&self) -> bool {
        sqlx::query("SELECT 1").execute(&self.pool).await.is_ok()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
