//! # lespas-db: Catalog Database for Les Pas Sync
//!
//! Local album/photo catalog, the pending action queue and sync status
//! markers, stored in SQLite through sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Les Pas Data Flow                                │
//! │                                                                         │
//! │  UI enqueues actions          Sync engine reconciles                    │
//! │       │                              │                                  │
//! │       ▼                              ▼                                  │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     lespas-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repositories │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │◄───│ album, photo, │    │  (embedded)  │  │   │
//! │  │   │  SqlitePool   │    │ action, status│    │ 001_catalog  │  │   │
//! │  │   └───────────────┘    └───────────────┘    └──────────────┘  │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  SQLite file (path from SyncConfig [paths] database)                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lespas_db::{Database, DbConfig};
//!
//! let db = Database::new(DbConfig::new("lespas.db")).await?;
//! let albums = db.albums().list_visible().await?;
//! db.actions().enqueue(&Action::RefreshAlbumList).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{DbError, DbResult};
pub use pool::{Database, DbConfig};

pub use repository::{
    ActionRepository, AlbumRepository, PhotoRepository, StatusRepository,
};
