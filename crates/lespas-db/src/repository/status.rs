//! # Status Repository
//!
//! Process-wide sync markers kept as key/value rows.
//!
//! | key                | value                                      |
//! |--------------------|--------------------------------------------|
//! | `stage`            | last reported sync stage                   |
//! | `last_action`      | last action being applied, for diagnostics |
//! | `backup_watermark` | device media cursor, epoch seconds         |
//! | `retry_not_before` | earliest next pass start, epoch millis     |

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;

use crate::error::{DbError, DbResult};
use crate::repository::from_millis;

pub const KEY_STAGE: &str = "stage";
pub const KEY_LAST_ACTION: &str = "last_action";
pub const KEY_BACKUP_WATERMARK: &str = "backup_watermark";
pub const KEY_RETRY_NOT_BEFORE: &str = "retry_not_before";

/// Repository for sync status markers.
#[derive(Debug, Clone)]
pub struct StatusRepository {
    pool: SqlitePool,
}

impl StatusRepository {
    pub fn new(pool: SqlitePool) -> Self {
        StatusRepository { pool }
    }

    pub async fn get(&self, key: &str) -> DbResult<Option<String>> {
        let value = sqlx::query_scalar("SELECT value FROM sync_status WHERE key = ?1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(value)
    }

    pub async fn set(&self, key: &str, value: &str) -> DbResult<()> {
        sqlx::query(
            "INSERT INTO sync_status (key, value) VALUES (?1, ?2) \
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
        )
        .bind(key)
        .bind(value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn clear(&self, key: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM sync_status WHERE key = ?1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_i64(&self, key: &'static str) -> DbResult<Option<i64>> {
        match self.get(key).await? {
            Some(raw) => raw
                .parse::<i64>()
                .map(Some)
                .map_err(|_| DbError::invalid_value("sync_status.value", raw)),
            None => Ok(None),
        }
    }

    pub async fn set_stage(&self, stage: &str) -> DbResult<()> {
        self.set(KEY_STAGE, stage).await
    }

    pub async fn set_last_action(&self, description: &str) -> DbResult<()> {
        self.set(KEY_LAST_ACTION, description).await
    }

    /// Backup cursor in epoch seconds.
    pub async fn backup_watermark(&self) -> DbResult<Option<i64>> {
        self.get_i64(KEY_BACKUP_WATERMARK).await
    }

    pub async fn set_backup_watermark(&self, seconds: i64) -> DbResult<()> {
        self.set(KEY_BACKUP_WATERMARK, &seconds.to_string()).await
    }

    pub async fn retry_not_before(&self) -> DbResult<Option<DateTime<Utc>>> {
        self.get_i64(KEY_RETRY_NOT_BEFORE)
            .await?
            .map(|ms| from_millis("sync_status.retry_not_before", ms))
            .transpose()
    }

    /// `None` clears the marker.
    pub async fn set_retry_not_before(&self, at: Option<DateTime<Utc>>) -> DbResult<()> {
        match at {
            Some(at) => {
                self.set(KEY_RETRY_NOT_BEFORE, &at.timestamp_millis().to_string())
                    .await
            }
            None => self.clear(KEY_RETRY_NOT_BEFORE).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::repository::fixtures;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_markers() {
        let db = fixtures::db().await;
        let status = db.status();

        assert_eq!(status.backup_watermark().await.unwrap(), None);
        status.set_backup_watermark(1_700_000_000).await.unwrap();
        status.set_backup_watermark(1_700_000_001).await.unwrap();
        assert_eq!(status.backup_watermark().await.unwrap(), Some(1_700_000_001));

        let at = Utc.with_ymd_and_hms(2024, 2, 3, 4, 5, 6).unwrap();
        status.set_retry_not_before(Some(at)).await.unwrap();
        assert_eq!(status.retry_not_before().await.unwrap(), Some(at));
        status.set_retry_not_before(None).await.unwrap();
        assert_eq!(status.retry_not_before().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_non_numeric_marker_is_an_error() {
        let db = fixtures::db().await;
        let status = db.status();
        status.set(KEY_BACKUP_WATERMARK, "soon").await.unwrap();

        assert!(matches!(
            status.backup_watermark().await,
            Err(DbError::InvalidValue { .. })
        ));
    }
}
