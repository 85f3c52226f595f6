//! # Album Repository
//!
//! Album rows, including the denormalized cover descriptor.
//!
//! ## Identity
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Created locally          Folder created remotely       Reconciled      │
//! │  id = provisional  ─────► id = remote folder id  ─────► etag set        │
//! │  etag = ""                etag = "" (still hidden)      (listable)      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::from_millis;
use lespas_core::{Album, AlbumFlags, Cover};

const ALBUM_COLUMNS: &str = "id, name, start_date, end_date, cover, cover_baseline, \
     cover_width, cover_height, cover_file_name, cover_mime_type, cover_orientation, \
     last_modified, sort_order, etag, flags, sync_progress, bgm_id, bgm_etag";

#[derive(sqlx::FromRow)]
struct AlbumRow {
    id: String,
    name: String,
    start_date: Option<i64>,
    end_date: Option<i64>,
    cover: String,
    cover_baseline: i32,
    cover_width: i32,
    cover_height: i32,
    cover_file_name: String,
    cover_mime_type: String,
    cover_orientation: i32,
    last_modified: i64,
    sort_order: i32,
    etag: String,
    flags: i64,
    sync_progress: f64,
    bgm_id: String,
    bgm_etag: String,
}

impl AlbumRow {
    fn into_album(self) -> DbResult<Album> {
        Ok(Album {
            start_date: self
                .start_date
                .map(|ms| from_millis("albums.start_date", ms))
                .transpose()?,
            end_date: self
                .end_date
                .map(|ms| from_millis("albums.end_date", ms))
                .transpose()?,
            cover: Cover {
                id: self.cover,
                baseline: self.cover_baseline,
                width: self.cover_width,
                height: self.cover_height,
                file_name: self.cover_file_name,
                mime_type: self.cover_mime_type,
                orientation: self.cover_orientation,
            },
            last_modified: from_millis("albums.last_modified", self.last_modified)?,
            flags: AlbumFlags::from_bits(self.flags as u32),
            sync_progress: self.sync_progress as f32,
            id: self.id,
            name: self.name,
            sort_order: self.sort_order,
            etag: self.etag,
            bgm_id: self.bgm_id,
            bgm_etag: self.bgm_etag,
        })
    }
}

/// Repository for album rows.
#[derive(Debug, Clone)]
pub struct AlbumRepository {
    pool: SqlitePool,
}

impl AlbumRepository {
    pub fn new(pool: SqlitePool) -> Self {
        AlbumRepository { pool }
    }

    pub async fn get_by_id(&self, id: &str) -> DbResult<Option<Album>> {
        let row = sqlx::query_as::<_, AlbumRow>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE id = ?1"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AlbumRow::into_album).transpose()
    }

    /// Album names are unique among folders under the resource root.
    pub async fn get_by_name(&self, name: &str) -> DbResult<Option<Album>> {
        let row = sqlx::query_as::<_, AlbumRow>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums WHERE name = ?1 LIMIT 1"
        ))
        .bind(name)
        .fetch_optional(&self.pool)
        .await?;

        row.map(AlbumRow::into_album).transpose()
    }

    pub async fn list_all(&self) -> DbResult<Vec<Album>> {
        let rows = sqlx::query_as::<_, AlbumRow>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums ORDER BY end_date DESC"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlbumRow::into_album).collect()
    }

    /// Confirmed albums that are not excluded from listings.
    pub async fn list_visible(&self) -> DbResult<Vec<Album>> {
        let rows = sqlx::query_as::<_, AlbumRow>(&format!(
            "SELECT {ALBUM_COLUMNS} FROM albums \
             WHERE etag != '' AND (flags & ?1) = 0 \
             ORDER BY end_date DESC"
        ))
        .bind(AlbumFlags::EXCLUDED.bits() as i64)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(AlbumRow::into_album).collect()
    }

    pub async fn count(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM albums")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    /// Insert or replace the whole row.
    pub async fn upsert(&self, album: &Album) -> DbResult<()> {
        debug!(album_id = %album.id, name = %album.name, etag = %album.etag, "Upserting album");

        sqlx::query(&format!(
            "INSERT INTO albums ({ALBUM_COLUMNS}) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18) \
             ON CONFLICT(id) DO UPDATE SET \
                name = excluded.name, \
                start_date = excluded.start_date, \
                end_date = excluded.end_date, \
                cover = excluded.cover, \
                cover_baseline = excluded.cover_baseline, \
                cover_width = excluded.cover_width, \
                cover_height = excluded.cover_height, \
                cover_file_name = excluded.cover_file_name, \
                cover_mime_type = excluded.cover_mime_type, \
                cover_orientation = excluded.cover_orientation, \
                last_modified = excluded.last_modified, \
                sort_order = excluded.sort_order, \
                etag = excluded.etag, \
                flags = excluded.flags, \
                sync_progress = excluded.sync_progress, \
                bgm_id = excluded.bgm_id, \
                bgm_etag = excluded.bgm_etag"
        ))
        .bind(&album.id)
        .bind(&album.name)
        .bind(album.start_date.map(|d| d.timestamp_millis()))
        .bind(album.end_date.map(|d| d.timestamp_millis()))
        .bind(&album.cover.id)
        .bind(album.cover.baseline)
        .bind(album.cover.width)
        .bind(album.cover.height)
        .bind(&album.cover.file_name)
        .bind(&album.cover.mime_type)
        .bind(album.cover.orientation)
        .bind(album.last_modified.timestamp_millis())
        .bind(album.sort_order)
        .bind(&album.etag)
        .bind(album.flags.bits() as i64)
        .bind(album.sync_progress as f64)
        .bind(&album.bgm_id)
        .bind(&album.bgm_etag)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    pub async fn delete_by_id(&self, id: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM albums WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn change_name(&self, id: &str, name: &str) -> DbResult<()> {
        sqlx::query("UPDATE albums SET name = ?2 WHERE id = ?1")
            .bind(id)
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Points the cover at `new_id` if it currently references `old_id`.
    ///
    /// Returns whether the cover changed.
    pub async fn replace_cover_id(&self, album_id: &str, old_id: &str, new_id: &str) -> DbResult<bool> {
        let result = sqlx::query("UPDATE albums SET cover = ?3 WHERE id = ?1 AND cover = ?2")
            .bind(album_id)
            .bind(old_id)
            .bind(new_id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_cover(&self, album_id: &str, cover: &Cover) -> DbResult<()> {
        sqlx::query(
            "UPDATE albums SET cover = ?2, cover_baseline = ?3, cover_width = ?4, \
             cover_height = ?5, cover_file_name = ?6, cover_mime_type = ?7, \
             cover_orientation = ?8 WHERE id = ?1",
        )
        .bind(album_id)
        .bind(&cover.id)
        .bind(cover.baseline)
        .bind(cover.width)
        .bind(cover.height)
        .bind(&cover.file_name)
        .bind(&cover.mime_type)
        .bind(cover.orientation)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn set_sort_order(&self, album_id: &str, sort_order: i32) -> DbResult<()> {
        sqlx::query("UPDATE albums SET sort_order = ?2 WHERE id = ?1")
            .bind(album_id)
            .bind(sort_order)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn change_cover_file_name(&self, album_id: &str, file_name: &str) -> DbResult<()> {
        sqlx::query("UPDATE albums SET cover_file_name = ?2 WHERE id = ?1")
            .bind(album_id)
            .bind(file_name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Re-keys a locally created album once its folder exists remotely.
    ///
    /// The tag stays empty: the album is confirmed by the next reconciliation.
    pub async fn fix_new_local_album_id(&self, old_id: &str, new_id: &str) -> DbResult<()> {
        debug!(old_id = %old_id, new_id = %new_id, "Re-keying local album");

        sqlx::query("UPDATE albums SET id = ?2, etag = '' WHERE id = ?1")
            .bind(old_id)
            .bind(new_id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    /// Progress plus the date range accumulated so far.
    pub async fn update_sync_progress(&self, album: &Album, progress: f32) -> DbResult<()> {
        sqlx::query("UPDATE albums SET sync_progress = ?2, start_date = ?3, end_date = ?4 WHERE id = ?1")
            .bind(&album.id)
            .bind(progress as f64)
            .bind(album.start_date.map(|d| d.timestamp_millis()))
            .bind(album.end_date.map(|d| d.timestamp_millis()))
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn set_bgm(&self, album_id: &str, bgm_id: &str, bgm_etag: &str) -> DbResult<()> {
        sqlx::query("UPDATE albums SET bgm_id = ?2, bgm_etag = ?3 WHERE id = ?1")
            .bind(album_id)
            .bind(bgm_id)
            .bind(bgm_etag)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::{TimeZone, Utc};

    #[tokio::test]
    async fn test_upsert_and_get() {
        let db = fixtures::db().await;
        let repo = db.albums();

        let mut album = fixtures::album("100", "Holiday");
        album.extend_range(Utc.with_ymd_and_hms(2023, 1, 2, 3, 4, 5).unwrap());
        repo.upsert(&album).await.unwrap();

        let stored = repo.get_by_id("100").await.unwrap().unwrap();
        assert_eq!(stored, album);
        assert_eq!(repo.get_by_name("Holiday").await.unwrap().unwrap().id, "100");
        assert!(repo.get_by_id("missing").await.unwrap().is_none());

        album.etag = "etag-2".into();
        repo.upsert(&album).await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 1);
        assert_eq!(repo.get_by_id("100").await.unwrap().unwrap().etag, "etag-2");
    }

    #[tokio::test]
    async fn test_list_visible_hides_unconfirmed_and_excluded() {
        let db = fixtures::db().await;
        let repo = db.albums();

        let excluded = fixtures::album("1", "New from server");
        let mut visible = fixtures::album("2", "Shown");
        visible.flags.remove(AlbumFlags::EXCLUDED);
        let mut pending = fixtures::album("3", "Created here");
        pending.flags.remove(AlbumFlags::EXCLUDED);
        pending.etag.clear();

        for album in [&excluded, &visible, &pending] {
            repo.upsert(album).await.unwrap();
        }

        let listed = repo.list_visible().await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].id, "2");
        assert_eq!(repo.list_all().await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_replace_cover_id_only_when_matching() {
        let db = fixtures::db().await;
        let repo = db.albums();

        let mut album = fixtures::album("100", "Holiday");
        album.cover.id = "IMG1.jpg".into();
        repo.upsert(&album).await.unwrap();

        assert!(!repo.replace_cover_id("100", "OTHER.jpg", "1").await.unwrap());
        assert!(repo.replace_cover_id("100", "IMG1.jpg", "12345678").await.unwrap());
        assert_eq!(repo.get_by_id("100").await.unwrap().unwrap().cover.id, "12345678");
    }

    #[tokio::test]
    async fn test_fix_new_local_album_id() {
        let db = fixtures::db().await;
        let repo = db.albums();

        let mut album = fixtures::album("local-1", "Created here");
        album.etag.clear();
        repo.upsert(&album).await.unwrap();

        repo.fix_new_local_album_id("local-1", "4567").await.unwrap();
        assert!(repo.get_by_id("local-1").await.unwrap().is_none());
        let fixed = repo.get_by_id("4567").await.unwrap().unwrap();
        assert!(fixed.etag.is_empty());
    }
}
