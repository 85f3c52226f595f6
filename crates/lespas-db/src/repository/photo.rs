//! # Photo Repository
//!
//! Photo rows and identity promotion.
//!
//! ## Identity Promotion
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  local add          upload / listing             after fix_photo        │
//! │  ┌────────────┐     returns id 12345678          ┌────────────┐         │
//! │  │ id IMG1.jpg│  ─────────────────────────────►  │ id 12345678│         │
//! │  │ etag ""    │                                  │ etag "abc" │         │
//! │  └────────────┘                                  └────────────┘         │
//! │                                                                         │
//! │  A stale row already holding the remote id is dropped in the same       │
//! │  transaction, so exactly one row survives.                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::from_millis;
use lespas_core::{Gps, Photo};

const PHOTO_COLUMNS: &str = "id, album_id, name, etag, date_taken, last_modified, width, height, \
     mime_type, orientation, caption, latitude, longitude, altitude, bearing";

#[derive(sqlx::FromRow)]
struct PhotoRow {
    id: String,
    album_id: String,
    name: String,
    etag: String,
    date_taken: i64,
    last_modified: i64,
    width: i32,
    height: i32,
    mime_type: String,
    orientation: i32,
    caption: String,
    latitude: f64,
    longitude: f64,
    altitude: f64,
    bearing: f64,
}

impl PhotoRow {
    fn into_photo(self) -> DbResult<Photo> {
        Ok(Photo {
            date_taken: from_millis("photos.date_taken", self.date_taken)?,
            last_modified: from_millis("photos.last_modified", self.last_modified)?,
            id: self.id,
            album_id: self.album_id,
            name: self.name,
            etag: self.etag,
            width: self.width,
            height: self.height,
            mime_type: self.mime_type,
            orientation: self.orientation,
            caption: self.caption,
            gps: Gps {
                latitude: self.latitude,
                longitude: self.longitude,
                altitude: self.altitude,
                bearing: self.bearing,
            },
        })
    }
}

/// Repository for photo rows.
#[derive(Debug, Clone)]
pub struct PhotoRepository {
    pool: SqlitePool,
}

impl PhotoRepository {
    pub fn new(pool: SqlitePool) -> Self {
        PhotoRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Photo>> {
        let row = sqlx::query_as::<_, PhotoRow>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(PhotoRow::into_photo).transpose()
    }

    /// All photos of an album, oldest capture first.
    pub async fn list_by_album(&self, album_id: &str) -> DbResult<Vec<Photo>> {
        let rows = sqlx::query_as::<_, PhotoRow>(&format!(
            "SELECT {PHOTO_COLUMNS} FROM photos WHERE album_id = ?1 ORDER BY date_taken ASC, id ASC"
        ))
        .bind(album_id)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(PhotoRow::into_photo).collect()
    }

    pub async fn ids_by_album(&self, album_id: &str) -> DbResult<Vec<String>> {
        let ids = sqlx::query_scalar("SELECT id FROM photos WHERE album_id = ?1")
            .bind(album_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(ids)
    }

    /// `id → etag` for every photo in the album.
    pub async fn etags_by_album(&self, album_id: &str) -> DbResult<HashMap<String, String>> {
        let pairs: Vec<(String, String)> =
            sqlx::query_as("SELECT id, etag FROM photos WHERE album_id = ?1")
                .bind(album_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(pairs.into_iter().collect())
    }

    /// `id → name` for every photo in the album.
    pub async fn names_by_album(&self, album_id: &str) -> DbResult<HashMap<String, String>> {
        let pairs: Vec<(String, String)> =
            sqlx::query_as("SELECT id, name FROM photos WHERE album_id = ?1")
                .bind(album_id)
                .fetch_all(&self.pool)
                .await?;
        Ok(pairs.into_iter().collect())
    }

    /// Earliest and latest capture date in the album.
    pub async fn album_duration(
        &self,
        album_id: &str,
    ) -> DbResult<Option<(DateTime<Utc>, DateTime<Utc>)>> {
        let (min, max): (Option<i64>, Option<i64>) = sqlx::query_as(
            "SELECT MIN(date_taken), MAX(date_taken) FROM photos WHERE album_id = ?1",
        )
        .bind(album_id)
        .fetch_one(&self.pool)
        .await?;

        match (min, max) {
            (Some(min), Some(max)) => Ok(Some((
                from_millis("photos.date_taken", min)?,
                from_millis("photos.date_taken", max)?,
            ))),
            _ => Ok(None),
        }
    }

    pub async fn upsert(&self, photo: &Photo) -> DbResult<()> {
        debug!(photo_id = %photo.id, album_id = %photo.album_id, "Upserting photo");

        let sql = upsert_sql();
        bind_photo(sqlx::query(&sql), photo)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Upserts a batch in one transaction.
    pub async fn upsert_all(&self, photos: &[Photo]) -> DbResult<()> {
        let sql = upsert_sql();
        let mut tx = self.pool.begin().await?;
        for photo in photos {
            bind_photo(sqlx::query(&sql), photo).execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    pub async fn delete_by_id(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM photos WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn delete_by_album(&self, album_id: &str) -> DbResult<u64> {
        let result = sqlx::query("DELETE FROM photos WHERE album_id = ?1")
            .bind(album_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected())
    }

    pub async fn change_name(&self, id: &str, name: &str) -> DbResult<()> {
        sqlx::query("UPDATE photos SET name = ?2 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn update_date_taken(&self, id: &str, date_taken: DateTime<Utc>) -> DbResult<()> {
        sqlx::query("UPDATE photos SET date_taken = ?2 WHERE id = ?1")
            .bind(id)
            .bind(date_taken.timestamp_millis())
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Promotes a placeholder row to its remote id after an upload.
    ///
    /// Returns false when no row carries `old_id`.
    pub async fn fix_photo_id_etag(&self, old_id: &str, new_id: &str, etag: &str) -> DbResult<bool> {
        self.rekey(old_id, new_id, None, etag, None).await
    }

    /// Promotes a placeholder row found again in a remote listing.
    pub async fn fix_photo(
        &self,
        old_id: &str,
        new_id: &str,
        name: &str,
        etag: &str,
        last_modified: DateTime<Utc>,
    ) -> DbResult<bool> {
        self.rekey(old_id, new_id, Some(name), etag, Some(last_modified))
            .await
    }

    async fn rekey(
        &self,
        old_id: &str,
        new_id: &str,
        name: Option<&str>,
        etag: &str,
        last_modified: Option<DateTime<Utc>>,
    ) -> DbResult<bool> {
        debug!(old_id = %old_id, new_id = %new_id, "Promoting photo identity");

        let mut tx = self.pool.begin().await?;

        let placeholder: Option<String> = sqlx::query_scalar("SELECT id FROM photos WHERE id = ?1")
            .bind(old_id)
            .fetch_optional(&mut *tx)
            .await?;
        if placeholder.is_none() {
            tx.rollback().await?;
            return Ok(false);
        }

        if old_id != new_id {
            sqlx::query("DELETE FROM photos WHERE id = ?1")
                .bind(new_id)
                .execute(&mut *tx)
                .await?;
        }

        sqlx::query(
            "UPDATE photos SET id = ?2, etag = ?3, \
             name = COALESCE(?4, name), \
             last_modified = COALESCE(?5, last_modified) \
             WHERE id = ?1",
        )
        .bind(old_id)
        .bind(new_id)
        .bind(etag)
        .bind(name)
        .bind(last_modified.map(|d| d.timestamp_millis()))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(true)
    }

    /// Moves photos of a locally created album to its new remote id.
    pub async fn fix_new_photos_album_id(&self, old_album_id: &str, new_album_id: &str) -> DbResult<()> {
        sqlx::query("UPDATE photos SET album_id = ?2 WHERE album_id = ?1")
            .bind(old_album_id)
            .bind(new_album_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

fn upsert_sql() -> String {
    format!(
        "INSERT INTO photos ({PHOTO_COLUMNS}) \
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15) \
         ON CONFLICT(id) DO UPDATE SET \
            album_id = excluded.album_id, \
            name = excluded.name, \
            etag = excluded.etag, \
            date_taken = excluded.date_taken, \
            last_modified = excluded.last_modified, \
            width = excluded.width, \
            height = excluded.height, \
            mime_type = excluded.mime_type, \
            orientation = excluded.orientation, \
            caption = excluded.caption, \
            latitude = excluded.latitude, \
            longitude = excluded.longitude, \
            altitude = excluded.altitude, \
            bearing = excluded.bearing"
    )
}

fn bind_photo<'q>(
    query: sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>>,
    photo: &'q Photo,
) -> sqlx::query::Query<'q, sqlx::Sqlite, sqlx::sqlite::SqliteArguments<'q>> {
    query
        .bind(&photo.id)
        .bind(&photo.album_id)
        .bind(&photo.name)
        .bind(&photo.etag)
        .bind(photo.date_taken.timestamp_millis())
        .bind(photo.last_modified.timestamp_millis())
        .bind(photo.width)
        .bind(photo.height)
        .bind(&photo.mime_type)
        .bind(photo.orientation)
        .bind(&photo.caption)
        .bind(photo.gps.latitude)
        .bind(photo.gps.longitude)
        .bind(photo.gps.altitude)
        .bind(photo.gps.bearing)
}

// =============================================================================
// Unit Tests
// =============================================================================
