//! # Sync Engine
//!
//! Runs one sync pass for one account and turns its failures into a coarse
//! outcome plus a persisted backoff.
//!
//! ## Pass Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                           run_pass()                                    │
//! │                                                                         │
//! │  now < retry_not_before? ──yes──► Deferred (no work)                    │
//! │        │ no                                                             │
//! │        ▼                                                                │
//! │  ┌──────────────┐  ┌──────────────┐  ┌──────────────┐  ┌─────────────┐ │
//! │  │ LocalActions │─►│RemoteChanges │─►│  MetaUpdate  │─►│   Backup    │ │
//! │  │ (applier)    │  │ (reconciler) │  │ (meta flush) │  │ (uploader)  │ │
//! │  └──────────────┘  └──────────────┘  └──────────────┘  └─────────────┘ │
//! │        │ any error unwinds here                                         │
//! │        ▼                                                                │
//! │  leftover dirty meta ──► UpdateAlbumMeta / UpdateContentMeta actions   │
//! │  error disposition   ──► outcome, retry_not_before                     │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The caller must not run two passes of one account concurrently.

use std::sync::Arc;

use chrono::{DateTime, TimeDelta, Utc};
use lespas_core::Action;
use lespas_db::Database;
use serde::Serialize;
use tracing::{debug, error, info, warn};

use crate::applier::ActionApplier;
use crate::backup::BackupUploader;
use crate::cache::MediaCache;
use crate::config::SyncConfig;
use crate::connectivity::{ConnectivityGuard, ConnectivityPolicy, Unmetered};
use crate::context::{PassContext, PassStats, SyncEnv};
use crate::error::{Disposition, SyncError, SyncResult};
use crate::media_store::{MediaStore, NoDeviceMedia};
use crate::meta_writer::MetaWriter;
use crate::progress::{NoOpEmitter, PassOutcome, SyncEventEmitter, SyncStage};
use crate::reconciler::Reconciler;
use crate::remote::RemoteStore;

// =============================================================================
// Pass Report
// =============================================================================

/// Result of one pass.
#[derive(Debug, Clone, Serialize)]
pub struct PassReport {
    pub outcome: PassOutcome,
    pub stats: PassStats,

    /// Set when the pass failed with a backoff, or was deferred by one.
    pub retry_not_before: Option<DateTime<Utc>>,

    /// Message of the error that ended the pass.
    pub error: Option<String>,
}

impl PassReport {
    fn new(outcome: PassOutcome, stats: PassStats) -> Self {
        PassReport {
            outcome,
            stats,
            retry_not_before: None,
            error: None,
        }
    }
}

// =============================================================================
// Sync Engine
// =============================================================================

pub struct SyncEngine {
    env: SyncEnv,
}

impl SyncEngine {
    pub fn env(&self) -> &SyncEnv {
        &self.env
    }

    /// Queues a local mutation for the next pass.
    pub async fn enqueue(&self, action: &Action) -> SyncResult<i64> {
        Ok(self.env.db.actions().enqueue(action).await?)
    }

    /// Runs one pass.
    ///
    /// Remote and policy failures end up in the report; only failures of
    /// the catalog while recording the outcome are returned as errors.
    pub async fn run_pass(&self) -> SyncResult<PassReport> {
        let status = self.env.db.status();

        if let Some(at) = status.retry_not_before().await? {
            if Utc::now() < at {
                info!(retry_not_before = %at, "Pass deferred by backoff");
                self.env.emitter.emit_finished(PassOutcome::Deferred);
                let mut report = PassReport::new(PassOutcome::Deferred, PassStats::default());
                report.retry_not_before = Some(at);
                return Ok(report);
            }
            status.set_retry_not_before(None).await?;
        }

        let mut ctx = PassContext::default();
        let result = self.run_phases(&mut ctx).await;
        let persisted = self.persist_dirty(&ctx).await;

        let mut report = PassReport::new(PassOutcome::Finished, ctx.stats.clone());
        if let Err(e) = result {
            self.record_failure(&e, &mut report).await?;
        }
        persisted?;

        self.stage(SyncStage::Finished).await?;
        self.env.emitter.emit_finished(report.outcome);
        info!(outcome = ?report.outcome, stats = ?report.stats, "Pass finished");
        Ok(report)
    }

    async fn run_phases(&self, ctx: &mut PassContext) -> SyncResult<()> {
        self.stage(SyncStage::Started).await?;
        self.env.connectivity.check()?;

        self.stage(SyncStage::LocalActions).await?;
        ActionApplier::new(&self.env).drain(ctx).await?;

        self.stage(SyncStage::RemoteChanges).await?;
        Reconciler::new(&self.env).run(ctx).await?;

        self.stage(SyncStage::MetaUpdate).await?;
        MetaWriter::new(&self.env).flush(ctx).await?;

        self.stage(SyncStage::Backup).await?;
        BackupUploader::new(&self.env).run(ctx).await?;
        Ok(())
    }

    async fn stage(&self, stage: SyncStage) -> SyncResult<()> {
        debug!(stage = %stage, "Sync stage");
        self.env.db.status().set_stage(stage.as_str()).await?;
        self.env.emitter.emit_stage(stage);
        Ok(())
    }

    /// Queues whatever metadata the pass could not write.
    async fn persist_dirty(&self, ctx: &PassContext) -> SyncResult<()> {
        if !ctx.has_dirty_meta() {
            return Ok(());
        }
        let actions = self.env.db.actions();
        for album_name in &ctx.album_meta_dirty {
            actions
                .enqueue(&Action::UpdateAlbumMeta {
                    album_name: album_name.clone(),
                })
                .await?;
        }
        for album_name in &ctx.content_meta_dirty {
            actions
                .enqueue(&Action::UpdateContentMeta {
                    album_name: album_name.clone(),
                })
                .await?;
        }
        debug!(
            album_meta = ctx.album_meta_dirty.len(),
            content_meta = ctx.content_meta_dirty.len(),
            "Queued pending meta updates"
        );
        Ok(())
    }

    async fn record_failure(&self, err: &SyncError, report: &mut PassReport) -> SyncResult<()> {
        let disposition = err.disposition();
        report.error = Some(err.to_string());

        report.outcome = match disposition {
            Disposition::Authenticate => {
                warn!(error = %err, "Pass needs re-authentication");
                PassOutcome::AuthenticationRequired
            }
            Disposition::Cancelled => {
                info!("Pass cancelled by connectivity policy");
                PassOutcome::NoConnectivity
            }
            Disposition::Backoff(delay) => {
                let at = Utc::now() + TimeDelta::from_std(delay).unwrap_or(TimeDelta::zero());
                warn!(error = %err, retry_not_before = %at, "Pass backing off");
                self.env.db.status().set_retry_not_before(Some(at)).await?;
                report.retry_not_before = Some(at);
                PassOutcome::GeneralError
            }
            Disposition::SkipAction | Disposition::Conflict | Disposition::Retry => {
                error!(error = %err, ?disposition, "Pass aborted");
                PassOutcome::GeneralError
            }
        };

        let retryable = !matches!(disposition, Disposition::Authenticate);
        self.env.emitter.emit_error(&err.to_string(), retryable);
        Ok(())
    }
}

// =============================================================================
// Builder Pattern
// =============================================================================

/// Builder for creating a SyncEngine with options.
pub struct SyncEngineBuilder {
    config: SyncConfig,
    db: Option<Database>,
    remote: Option<Arc<dyn RemoteStore>>,
    media: Option<Arc<dyn MediaStore>>,
    policy: Option<Arc<dyn ConnectivityPolicy>>,
    emitter: Option<Arc<dyn SyncEventEmitter>>,
    cache: Option<MediaCache>,
}

impl SyncEngineBuilder {
    pub fn new(config: SyncConfig) -> Self {
        SyncEngineBuilder {
            config,
            db: None,
            remote: None,
            media: None,
            policy: None,
            emitter: None,
            cache: None,
        }
    }

    pub fn with_database(mut self, db: Database) -> Self {
        self.db = Some(db);
        self
    }

    pub fn with_remote(mut self, remote: Arc<dyn RemoteStore>) -> Self {
        self.remote = Some(remote);
        self
    }

    pub fn with_media_store(mut self, media: Arc<dyn MediaStore>) -> Self {
        self.media = Some(media);
        self
    }

    pub fn with_connectivity(mut self, policy: Arc<dyn ConnectivityPolicy>) -> Self {
        self.policy = Some(policy);
        self
    }

    pub fn with_emitter(mut self, emitter: Arc<dyn SyncEventEmitter>) -> Self {
        self.emitter = Some(emitter);
        self
    }

    /// Overrides `paths.cache_dir`.
    pub fn with_cache(mut self, cache: MediaCache) -> Self {
        self.cache = Some(cache);
        self
    }

    pub fn build(self) -> SyncResult<SyncEngine> {
        let db = self
            .db
            .ok_or_else(|| SyncError::InvalidConfig("Database required".into()))?;
        let remote = self
            .remote
            .ok_or_else(|| SyncError::InvalidConfig("Remote store required".into()))?;

        let wifi_only = self.config.sync.wifi_only;
        let cache = self
            .cache
            .unwrap_or_else(|| MediaCache::new(&self.config.paths.cache_dir));

        Ok(SyncEngine {
            env: SyncEnv {
                config: Arc::new(self.config),
                db,
                remote,
                media: self.media.unwrap_or_else(|| Arc::new(NoDeviceMedia)),
                connectivity: ConnectivityGuard::new(
                    self.policy.unwrap_or_else(|| Arc::new(Unmetered)),
                    wifi_only,
                ),
                cache,
                emitter: self.emitter.unwrap_or_else(|| Arc::new(NoOpEmitter)),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::RemoteStore;
    use crate::testing::{at, downloaded, photo, seed, Harness};
    use lespas_core::{album_meta_file_name, AlbumMeta, ContentMeta, MIME_TYPE_JSON};

    #[tokio::test]
    async fn test_new_album_then_quiet_pass() {
        let h = Harness::new().await;
        h.remote.add_folder("lespas/Holiday", 10, "a1");
        h.remote.add_file("lespas/Holiday/IMG_1.jpg", 11, "p1", "image/jpeg", b"jpeg".to_vec(), at(2));

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(report.stats.photos_probed, 1);

        let album = h.db().albums().get_by_id("10").await.unwrap().unwrap();
        assert_eq!(album.etag, "a1");
        assert_eq!(album.cover.id, "11");
        assert!(!album.is_excluded());
        assert!(h.remote.has("lespas/Holiday/10.json"));
        assert!(h.remote.has("lespas/Holiday/10-content.json"));
        assert_eq!(h.db().actions().count_pending().await.unwrap(), 0);

        // Writing the documents retagged the folder: one more listing,
        // nothing fetched, probed or written
        let tag = h.remote.etag_of("lespas/Holiday").unwrap();
        assert_ne!(tag, "a1");
        h.remote.clear_calls();
        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(
            h.remote.calls(),
            vec!["list lespas".to_string(), "list lespas/Holiday".to_string()]
        );
        assert_eq!(report.stats.photos_probed, 0);
        assert_eq!(report.stats.meta_files_written, 0);
        assert_eq!(h.db().albums().get_by_id("10").await.unwrap().unwrap().etag, tag);

        h.remote.clear_calls();
        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(h.remote.calls(), vec!["list lespas".to_string()]);
        assert_eq!(report.stats.albums_changed, 0);
    }

    #[tokio::test]
    async fn test_content_written_by_another_client_is_trusted() {
        let h = Harness::new().await;
        let first = photo("11", "IMG_1.jpg", "p1", 2);
        seed(&h, &[first.clone()]).await;

        // Another client uploads a photo, then rewrites the content document
        let mut second = photo("12", "IMG_2.jpg", "p2", 3);
        second.caption = "dunes".into();
        h.remote
            .upload("lespas/Holiday/IMG_2.jpg", b"jpeg".to_vec(), "image/jpeg")
            .await
            .unwrap();
        second.id = h.remote.id_of("lespas/Holiday/IMG_2.jpg").unwrap().to_string();
        let content = ContentMeta::from_photos([&first, &second]).encode().unwrap();
        h.remote
            .upload("lespas/Holiday/10-content.json", content.into_bytes(), MIME_TYPE_JSON)
            .await
            .unwrap();
        h.remote.clear_calls();

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(report.stats.photos_quick_synced, 1);
        assert_eq!(report.stats.photos_probed, 0);
        assert!(!downloaded(&h, "lespas/Holiday/IMG_2.jpg"));
        let adopted = h.db().photos().get_by_id(&second.id).await.unwrap().unwrap();
        assert_eq!(adopted.caption, "dunes");
    }

    #[tokio::test]
    async fn test_uploaded_file_is_promoted_without_download() {
        let h = Harness::new().await;
        seed(&h, &[photo("11", "IMG_1.jpg", "p1", 2)]).await;

        // Placeholder row and cache file left by a local add
        h.db()
            .photos()
            .upsert(&photo("IMG_2.jpg", "IMG_2.jpg", "", 3))
            .await
            .unwrap();
        h.cache().write("IMG_2.jpg", b"local").await.unwrap();
        h.remote.add_file("lespas/Holiday/IMG_2.jpg", 12, "p2", "image/jpeg", b"local".to_vec(), at(4));
        h.remote.set_etag("lespas/Holiday", "a2");

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(report.stats.photos_probed, 0);

        let photos = h.db().photos();
        let promoted = photos.get_by_id("12").await.unwrap().unwrap();
        assert_eq!(promoted.etag, "p2");
        assert_eq!(promoted.name, "IMG_2.jpg");
        assert!(photos.get_by_id("IMG_2.jpg").await.unwrap().is_none());

        assert!(h.cache().exists("12").await);
        assert!(!h.cache().exists("IMG_2.jpg").await);
        assert!(!downloaded(&h, "lespas/Holiday/IMG_2.jpg"));
    }

    #[tokio::test]
    async fn test_quick_sync_adopts_content_document() {
        let h = Harness::new().await;
        let first = photo("11", "IMG_1.jpg", "p1", 2);
        let second = photo("12", "IMG_2.jpg", "p2", 3);
        seed(&h, &[first.clone()]).await;

        h.remote.add_file("lespas/Holiday/IMG_2.jpg", 12, "p2", "image/jpeg", b"jpeg".to_vec(), at(3));
        let content = ContentMeta::from_photos([&first, &second]).encode().unwrap();
        h.remote.add_file("lespas/Holiday/10-content.json", 91, "c2", MIME_TYPE_JSON, content.into_bytes(), at(5));
        h.remote.set_etag("lespas/Holiday", "a2");

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.stats.photos_quick_synced, 1);
        assert_eq!(report.stats.photos_probed, 0);
        assert!(!downloaded(&h, "lespas/Holiday/IMG_2.jpg"));

        let adopted = h.db().photos().get_by_id("12").await.unwrap().unwrap();
        assert_eq!(adopted.etag, "p2");
        assert_eq!(adopted.width, 400);
        let album = h.db().albums().get_by_id("10").await.unwrap().unwrap();
        assert_eq!(album.end_date, Some(at(3)));
    }

    #[tokio::test]
    async fn test_stale_content_document_falls_back_to_probe() {
        let h = Harness::new().await;
        seed(&h, &[photo("11", "IMG_1.jpg", "p1", 2)]).await;

        h.remote.add_file("lespas/Holiday/IMG_2.jpg", 12, "p2", "image/jpeg", b"jpeg".to_vec(), at(3));
        h.remote.set_etag("lespas/Holiday", "a2");
        h.remote.set_modified("lespas/Holiday", at(10));

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.stats.photos_quick_synced, 0);
        assert_eq!(report.stats.photos_probed, 1);
        assert!(downloaded(&h, "lespas/Holiday/IMG_2.jpg"));
        assert!(h
            .remote
            .calls()
            .contains(&"upload lespas/Holiday/10-content.json".to_string()));
        assert!(h.db().photos().get_by_id("12").await.unwrap().is_some());
    }

    /// Album 10 gains IMG_2 (id 12) while its content document is
    /// replaced by `content`, or removed when `None`.
    async fn pass_with_content(content: Option<Vec<u8>>) -> (Harness, PassReport) {
        let h = Harness::new().await;
        seed(&h, &[photo("11", "IMG_1.jpg", "p1", 2)]).await;
        h.remote.add_file("lespas/Holiday/IMG_2.jpg", 12, "p2", "image/jpeg", b"jpeg".to_vec(), at(3));
        match content {
            Some(bytes) => h.remote.add_file("lespas/Holiday/10-content.json", 91, "c2", MIME_TYPE_JSON, bytes, at(1)),
            None => h.remote.remove("lespas/Holiday/10-content.json"),
        }
        h.remote.set_etag("lespas/Holiday", "a2");
        let report = h.engine.run_pass().await.unwrap();
        (h, report)
    }

    fn assert_fell_back_to_probe(h: &Harness, report: &PassReport) {
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(report.stats.photos_quick_synced, 0);
        assert_eq!(report.stats.photos_probed, 1);
        assert!(downloaded(h, "lespas/Holiday/10-content.json"));
        assert!(downloaded(h, "lespas/Holiday/IMG_2.jpg"));
        assert!(h
            .remote
            .calls()
            .contains(&"upload lespas/Holiday/10-content.json".to_string()));
    }

    #[tokio::test]
    async fn test_missing_content_document_falls_back_to_probe() {
        let (h, report) = pass_with_content(None).await;
        assert_fell_back_to_probe(&h, &report);
        assert!(h.db().photos().get_by_id("12").await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_malformed_content_document_falls_back_to_probe() {
        let (h, report) = pass_with_content(Some(b"{\"lespas\":".to_vec())).await;
        assert_fell_back_to_probe(&h, &report);
    }

    #[tokio::test]
    async fn test_version_one_content_document_falls_back_to_probe() {
        let listed = [photo("11", "IMG_1.jpg", "p1", 2), photo("12", "IMG_2.jpg", "p2", 3)];
        let json = ContentMeta::from_photos(&listed).encode().unwrap();
        assert!(json.contains("\"version\":2"));
        let json = json.replace("\"version\":2", "\"version\":1");

        let (h, report) = pass_with_content(Some(json.into_bytes())).await;
        assert_fell_back_to_probe(&h, &report);
    }

    #[tokio::test]
    async fn test_ids_missing_from_content_document_are_probed() {
        let h = Harness::new().await;
        let first = photo("11", "IMG_1.jpg", "p1", 2);
        seed(&h, &[first.clone()]).await;
        h.remote.add_file("lespas/Holiday/IMG_2.jpg", 12, "p2", "image/jpeg", b"jpeg".to_vec(), at(3));
        h.remote.add_file("lespas/Holiday/IMG_3.jpg", 13, "p3", "image/jpeg", b"jpeg".to_vec(), at(4));
        let content = ContentMeta::from_photos([&first, &photo("12", "IMG_2.jpg", "p2", 3)])
            .encode()
            .unwrap();
        h.remote.add_file("lespas/Holiday/10-content.json", 91, "c2", MIME_TYPE_JSON, content.into_bytes(), at(5));
        h.remote.set_etag("lespas/Holiday", "a2");

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(report.stats.photos_quick_synced, 1);
        assert_eq!(report.stats.photos_probed, 1);
        assert!(!downloaded(&h, "lespas/Holiday/IMG_2.jpg"));
        assert!(downloaded(&h, "lespas/Holiday/IMG_3.jpg"));

        let photos = h.db().photos();
        assert!(photos.get_by_id("12").await.unwrap().is_some());
        assert!(photos.get_by_id("13").await.unwrap().is_some());
        let album = h.db().albums().get_by_id("10").await.unwrap().unwrap();
        assert!(!album.is_excluded());
    }

    #[tokio::test]
    async fn test_removed_cover_is_replaced() {
        let h = Harness::new().await;
        seed(
            &h,
            &[photo("11", "IMG_1.jpg", "p1", 2), photo("12", "IMG_2.jpg", "p2", 3)],
        )
        .await;
        h.remote.remove("lespas/Holiday/IMG_1.jpg");
        h.remote.set_etag("lespas/Holiday", "a2");

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(report.stats.photos_deleted, 1);

        assert!(h.db().photos().get_by_id("11").await.unwrap().is_none());
        let album = h.db().albums().get_by_id("10").await.unwrap().unwrap();
        assert_eq!(album.cover.id, "12");
        assert_eq!(album.start_date, Some(at(3)));
        assert_eq!(album.end_date, Some(at(3)));

        let written = h.remote.bytes("lespas/Holiday/10.json").unwrap();
        let meta = AlbumMeta::decode(&String::from_utf8(written).unwrap()).unwrap();
        assert_eq!(meta.cover.id, "12");
    }

    #[tokio::test]
    async fn test_emptied_album_is_removed() {
        let h = Harness::new().await;
        seed(&h, &[photo("11", "IMG_1.jpg", "p1", 2)]).await;
        h.remote.remove("lespas/Holiday/IMG_1.jpg");
        h.remote.set_etag("lespas/Holiday", "a2");

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.stats.albums_deleted, 1);
        assert!(h.db().albums().get_by_id("10").await.unwrap().is_none());

        let pending = h.db().actions().pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert!(matches!(
            Action::from_record(&pending[0]).unwrap(),
            Action::DeleteDirectory { ref album_name, .. } if album_name == "Holiday"
        ));
    }

    #[tokio::test]
    async fn test_album_removed_remotely() {
        let h = Harness::new().await;
        seed(&h, &[photo("11", "IMG_1.jpg", "p1", 2)]).await;
        h.cache().write("11", b"jpeg").await.unwrap();
        h.remote.remove("lespas/Holiday");

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.stats.albums_deleted, 1);
        assert!(h.db().albums().get_by_id("10").await.unwrap().is_none());
        assert!(h.db().photos().get_by_id("11").await.unwrap().is_none());
        assert!(!h.cache().exists("11").await);
        assert!(!h.cache().exists(&album_meta_file_name("10")).await);
    }

    #[tokio::test]
    async fn test_rename_without_retag_skips_download() {
        let h = Harness::new().await;
        seed(&h, &[photo("11", "IMG_1.jpg", "p1", 2)]).await;
        h.remote.remove("lespas/Holiday/IMG_1.jpg");
        h.remote.add_file(
            "lespas/Holiday/IMG_20240305_101500.jpg",
            11,
            "p1",
            "image/jpeg",
            b"jpeg".to_vec(),
            at(2),
        );
        h.remote.set_etag("lespas/Holiday", "a2");

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(report.stats.photos_probed, 0);
        assert!(!downloaded(&h, "lespas/Holiday/IMG_20240305_101500.jpg"));

        let renamed = h.db().photos().get_by_id("11").await.unwrap().unwrap();
        assert_eq!(renamed.name, "IMG_20240305_101500.jpg");
        let album = h.db().albums().get_by_id("10").await.unwrap().unwrap();
        assert_eq!(album.cover.file_name, "IMG_20240305_101500.jpg");
    }

    #[tokio::test]
    async fn test_locked_server_backs_off() {
        let h = Harness::new().await;
        h.remote.fail("list", "lespas", 423);

        let before = Utc::now();
        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::GeneralError);
        let retry = report.retry_not_before.unwrap();
        assert!(retry >= before + TimeDelta::seconds(90));
        let stored = h.db().status().retry_not_before().await.unwrap().unwrap();
        assert_eq!(stored.timestamp_millis(), retry.timestamp_millis());

        h.remote.clear_calls();
        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Deferred);
        assert!(h.remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_server_error_backs_off_longer() {
        let h = Harness::new().await;
        h.remote.fail("list", "lespas", 503);

        let before = Utc::now();
        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::GeneralError);
        assert!(report.retry_not_before.unwrap() >= before + TimeDelta::seconds(300));
    }

    #[tokio::test]
    async fn test_expired_backoff_is_cleared() {
        let h = Harness::new().await;
        let status = h.db().status();
        status
            .set_retry_not_before(Some(Utc::now() - TimeDelta::seconds(5)))
            .await
            .unwrap();

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::Finished);
        assert_eq!(status.retry_not_before().await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_unauthorized_needs_credentials() {
        let h = Harness::new().await;
        h.remote.fail("list", "lespas", 401);

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::AuthenticationRequired);
        assert!(report.retry_not_before.is_none());
        assert!(report.error.is_some());
    }

    struct Metered;

    impl ConnectivityPolicy for Metered {
        fn is_metered(&self) -> bool {
            true
        }
    }

    #[tokio::test]
    async fn test_metered_network_cancels_pass() {
        let mut config = crate::testing::config();
        config.sync.wifi_only = true;
        let remote = crate::testing::FakeRemote::new();
        let dir = tempfile::tempdir().unwrap();

        let engine = SyncEngineBuilder::new(config)
            .with_database(Database::new(lespas_db::DbConfig::in_memory()).await.unwrap())
            .with_remote(remote.clone())
            .with_connectivity(Arc::new(Metered))
            .with_cache(MediaCache::new(dir.path()))
            .build()
            .unwrap();

        let report = engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::NoConnectivity);
        assert!(report.retry_not_before.is_none());
        assert!(remote.calls().is_empty());
    }

    #[tokio::test]
    async fn test_unwritten_meta_is_queued() {
        let h = Harness::new().await;
        h.remote.add_folder("lespas/Holiday", 10, "a1");
        h.remote.add_file("lespas/Holiday/IMG_1.jpg", 11, "p1", "image/jpeg", b"jpeg".to_vec(), at(2));
        h.remote.fail("upload", "lespas/Holiday/10.json", 409);

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.outcome, PassOutcome::GeneralError);

        let kinds: Vec<_> = h
            .db()
            .actions()
            .pending()
            .await
            .unwrap()
            .iter()
            .map(|r| Action::from_record(r).unwrap().kind())
            .collect();
        assert!(kinds.contains(&lespas_core::ActionKind::UpdateAlbumMeta));
        assert!(kinds.contains(&lespas_core::ActionKind::UpdateContentMeta));
    }

    #[test]
    fn test_builder_requires_remote() {
        let result = SyncEngineBuilder::new(crate::testing::config()).build();
        assert!(matches!(result, Err(SyncError::InvalidConfig(_))));
    }
}
