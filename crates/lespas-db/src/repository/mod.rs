//! # Repository Module
//!
//! Catalog repositories.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Sync engine                                                            │
//! │       │                                                                 │
//! │       │  db.photos().etags_by_album("1234")                             │
//! │       ▼                                                                 │
//! │  PhotoRepository                                                        │
//! │  ├── get_by_id / upsert / delete_by_id                                  │
//! │  ├── fix_photo (placeholder → remote id)                                │
//! │  └── list_by_album (capture date order)                                 │
//! │       │                                                                 │
//! │       │  SQL (runtime-checked sqlx::query / query_as)                   │
//! │       ▼                                                                 │
//! │  SQLite catalog                                                         │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Available Repositories
//!
//! - [`AlbumRepository`] - Albums, covers, sync progress
//! - [`PhotoRepository`] - Photos and identity promotion
//! - [`ActionRepository`] - Pending action queue
//! - [`StatusRepository`] - Process-wide sync markers

pub mod action;
pub mod album;
pub mod photo;
pub mod status;

pub use action::ActionRepository;
pub use album::AlbumRepository;
pub use photo::PhotoRepository;
pub use status::StatusRepository;

use chrono::{DateTime, Utc};

use crate::error::{DbError, DbResult};

/// Stored epoch millis back to a timestamp.
pub(crate) fn from_millis(column: &'static str, millis: i64) -> DbResult<DateTime<Utc>> {
    DateTime::from_timestamp_millis(millis).ok_or_else(|| DbError::invalid_value(column, millis))
}

#[cfg(test)]
pub(crate) mod fixtures {
    use chrono::{TimeZone, Utc};
    use lespas_core::{Album, Photo};

    use crate::{Database, DbConfig};

    pub async fn db() -> Database {
        Database::new(DbConfig::in_memory()).await.unwrap()
    }

    pub fn album(id: &str, name: &str) -> Album {
        let modified = Utc.with_ymd_and_hms(2023, 6, 1, 8, 0, 0).unwrap();
        Album::from_remote(id, name, format!("etag-{id}"), modified, 0)
    }

    pub fn photo(id: &str, album_id: &str, day: u32) -> Photo {
        let date = Utc.with_ymd_and_hms(2023, 5, day, 10, 0, 0).unwrap();
        Photo::from_remote(
            id,
            album_id,
            format!("{id}.jpg"),
            format!("etag-{id}"),
            "image/jpeg",
            date,
            date,
        )
    }
}
