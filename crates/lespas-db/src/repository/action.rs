//! # Action Repository
//!
//! The pending action queue.
//!
//! ## Queue Discipline
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  UI thread                         Sync pass                            │
//! │  enqueue(Action) ──► INSERT        pending() ──► ORDER BY id ASC        │
//! │                                         │                               │
//! │                                         ▼                               │
//! │                                    apply one action                     │
//! │                                         │                               │
//! │                                 success │ failure                       │
//! │                                    ▼    └──► row stays, pass ends       │
//! │                                 delete(id)                              │
//! │                                                                         │
//! │  The pass re-reads pending() until it is empty, so actions enqueued     │
//! │  while it runs (by the UI or by handlers) are applied in the same pass. │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use chrono::Utc;
use sqlx::SqlitePool;
use tracing::debug;

use crate::error::DbResult;
use crate::repository::from_millis;
use lespas_core::{Action, ActionRecord};

#[derive(sqlx::FromRow)]
struct ActionRow {
    id: i64,
    kind: i32,
    folder_id: String,
    folder_name: String,
    file_id: String,
    file_name: String,
    payload: String,
    date: i64,
    flags: i32,
}

impl ActionRow {
    fn into_record(self) -> DbResult<ActionRecord> {
        Ok(ActionRecord {
            id: Some(self.id),
            kind: self.kind,
            folder_id: self.folder_id,
            folder_name: self.folder_name,
            file_id: self.file_id,
            file_name: self.file_name,
            payload: self.payload,
            date: from_millis("actions.date", self.date)?,
            flags: self.flags,
        })
    }
}

/// Repository for the pending action queue.
#[derive(Debug, Clone)]
pub struct ActionRepository {
    pool: SqlitePool,
}

impl ActionRepository {
    pub fn new(pool: SqlitePool) -> Self {
        ActionRepository { pool }
    }

    /// Appends an action stamped with the current time. Returns its id.
    pub async fn enqueue(&self, action: &Action) -> DbResult<i64> {
        self.insert(&action.to_record(Utc::now())).await
    }

    /// Appends a raw record, ignoring any id it carries.
    pub async fn insert(&self, record: &ActionRecord) -> DbResult<i64> {
        debug!(kind = record.kind, folder = %record.folder_name, file = %record.file_name, "Queuing action");

        let result = sqlx::query(
            "INSERT INTO actions (kind, folder_id, folder_name, file_id, file_name, payload, date, flags) \
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )
        .bind(record.kind)
        .bind(&record.folder_id)
        .bind(&record.folder_name)
        .bind(&record.file_id)
        .bind(&record.file_name)
        .bind(&record.payload)
        .bind(record.date.timestamp_millis())
        .bind(record.flags)
        .execute(&self.pool)
        .await?;

        Ok(result.last_insert_rowid())
    }

    /// All pending records in enqueue order.
    pub async fn pending(&self) -> DbResult<Vec<ActionRecord>> {
        let rows = sqlx::query_as::<_, ActionRow>(
            "SELECT id, kind, folder_id, folder_name, file_id, file_name, payload, date, flags \
             FROM actions ORDER BY id ASC",
        )
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(ActionRow::into_record).collect()
    }

    pub async fn delete(&self, id: i64) -> DbResult<()> {
        sqlx::query("DELETE FROM actions WHERE id = ?1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    pub async fn count_pending(&self) -> DbResult<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM actions")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use crate::repository::fixtures;
    use lespas_core::{Action, ActionKind};

    #[tokio::test]
    async fn test_queue_is_fifo() {
        let db = fixtures::db().await;
        let repo = db.actions();

        let first = repo
            .enqueue(&Action::UpdateContentMeta {
                album_name: "Holiday".into(),
            })
            .await
            .unwrap();
        let second = repo.enqueue(&Action::RefreshAlbumList).await.unwrap();
        assert!(first < second);

        let pending = repo.pending().await.unwrap();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[0].id, Some(first));
        assert_eq!(pending[0].kind, ActionKind::UpdateContentMeta.code());
        assert_eq!(
            Action::from_record(&pending[0]).unwrap(),
            Action::UpdateContentMeta {
                album_name: "Holiday".into()
            }
        );

        repo.delete(first).await.unwrap();
        assert_eq!(repo.count_pending().await.unwrap(), 1);
        assert_eq!(repo.pending().await.unwrap()[0].id, Some(second));
    }
}
