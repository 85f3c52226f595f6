//! # Action Queue Applier
//!
//! Replays pending local mutations against the remote store.
//!
//! ## Drain Loop
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  loop {                                                                 │
//! │      pending = actions().pending()        re-read: handlers and the UI  │
//! │      if pending.is_empty() { break }      may enqueue during the pass   │
//! │      for record in pending {                                            │
//! │          connectivity.check()?                                          │
//! │          apply(action)                                                  │
//! │            ├─ Ok                    ──► delete(record)                  │
//! │            ├─ Err(SkipAction)       ──► delete(record), continue        │
//! │            └─ Err(anything else)    ──► return Err, record stays        │
//! │      }                                                                  │
//! │  }                                                                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Every handler is idempotent: a crash between the remote call and the
//! queue delete re-applies the action next pass, where "already exists"
//! and "not found" answers are tolerated.

use lespas_core::media::{base_name, is_video, normalize_remote_id, upload_mime};
use lespas_core::{
    album_meta_file_name, bgm_file_name, change_log_file_name, content_meta_file_name,
    thumbnail_file_name, Action, ActionRecord, AlbumFlags, ContentMeta, SharedPhotoMeta,
    TransferMode, BGM_FILE_NAME_ON_SERVER, MIME_TYPE_JSON,
};
use tracing::{debug, info, warn};

use crate::blog::BlogPublisher;
use crate::context::{PassContext, SyncEnv};
use crate::error::{Disposition, SyncResult};
use crate::remote::dav_path;

pub(crate) struct ActionApplier<'a> {
    env: &'a SyncEnv,
}

impl<'a> ActionApplier<'a> {
    pub fn new(env: &'a SyncEnv) -> Self {
        ActionApplier { env }
    }

    /// Applies pending actions until the queue is empty.
    pub async fn drain(&self, ctx: &mut PassContext) -> SyncResult<()> {
        let actions = self.env.db.actions();

        loop {
            let pending = actions.pending().await?;
            if pending.is_empty() {
                return Ok(());
            }

            for record in pending {
                self.env.connectivity.check()?;
                let Some(id) = record.id else { continue };

                let action = match Action::from_record(&record) {
                    Ok(action) => action,
                    Err(e) => {
                        warn!(id, kind = record.kind, error = %e, "Discarding unreadable action");
                        actions.delete(id).await?;
                        ctx.stats.actions_skipped += 1;
                        continue;
                    }
                };

                self.report(&record, &action).await?;

                match self.apply(&action, ctx).await {
                    Ok(()) => ctx.stats.actions_applied += 1,
                    Err(e) if e.disposition() == Disposition::SkipAction => {
                        warn!(id, kind = %action.kind(), error = %e, "Skipping action");
                        ctx.stats.actions_skipped += 1;
                    }
                    Err(e) => return Err(e),
                }
                actions.delete(id).await?;
            }
        }
    }

    async fn report(&self, record: &ActionRecord, action: &Action) -> SyncResult<()> {
        let kind = action.kind();
        self.env
            .emitter
            .emit_action(kind, &record.folder_name, &record.file_name);
        self.env
            .db
            .status()
            .set_last_action(&format!(
                "{kind} {}/{}",
                record.folder_name, record.file_name
            ))
            .await?;
        Ok(())
    }

    /// One handler per variant.
    pub async fn apply(&self, action: &Action, ctx: &mut PassContext) -> SyncResult<()> {
        debug!(kind = %action.kind(), "Applying action");
        let remote = &self.env.remote;

        match action {
            Action::AddFile {
                mime_type,
                album_name,
                photo_id,
                file_name,
                album_flags,
            } => {
                self.add_file(mime_type, album_name, photo_id, file_name, *album_flags, ctx)
                    .await
            }

            Action::DeleteFile {
                album_name,
                file_name,
                ..
            } => {
                remote
                    .delete(&self.env.album_file_path(album_name, file_name))
                    .await?;
                ctx.mark_content_meta(album_name);
                Ok(())
            }

            Action::DeleteDirectory { album_name, .. } => {
                remote.delete(&self.env.album_path(album_name)).await
            }

            Action::AddDirectory {
                album_id,
                album_name,
            } => self.add_directory(album_id, album_name, ctx).await,

            Action::RenameDirectory {
                old_name, new_name, ..
            } => {
                remote
                    .copy_or_move(
                        false,
                        &self.env.album_path(old_name),
                        &self.env.album_path(new_name),
                    )
                    .await?;
                Ok(())
            }

            Action::RenameFile {
                album_name,
                old_name,
                new_name,
            } => {
                remote
                    .copy_or_move(
                        false,
                        &self.env.album_file_path(album_name, old_name),
                        &self.env.album_file_path(album_name, new_name),
                    )
                    .await?;
                Ok(())
            }

            Action::UpdateAlbumMeta { album_name } => {
                ctx.mark_album_meta(album_name);
                Ok(())
            }

            Action::UpdateContentMeta { album_name } => {
                ctx.mark_content_meta(album_name);
                Ok(())
            }

            Action::AddFileToJointAlbum {
                mime_type,
                share_path,
                file_name,
                meta,
            } => {
                self.add_file_to_joint_album(mime_type, share_path, file_name, meta)
                    .await
            }

            Action::Transfer {
                mode,
                source_folder,
                target_folder,
                file_name,
                target_is_joint,
                meta,
            } => {
                let from = dav_path(&[source_folder.as_str(), file_name.as_str()]);
                let to = dav_path(&[target_folder.as_str(), base_name(file_name)]);
                match remote
                    .copy_or_move(*mode == TransferMode::Copy, &from, &to)
                    .await
                {
                    Ok(receipt) => {
                        if let (true, Some(meta)) = (*target_is_joint, meta) {
                            match normalize_remote_id(&receipt.file_id) {
                                Some(new_id) => self.log_change(meta, &new_id, file_name).await?,
                                None => warn!(file = %file_name, "Transfer returned no file id"),
                            }
                        }
                        Ok(())
                    }
                    Err(e) if e.is_already_exists() => {
                        debug!(to = %to, "Transfer target already exists");
                        Ok(())
                    }
                    Err(e) => Err(e),
                }
            }

            Action::UpdateJointAlbumContent {
                album_id,
                share_path,
            } => self.update_joint_album_content(album_id, share_path).await,

            Action::RefreshAlbumList => Ok(()),

            Action::UpdateAlbumBgm {
                album_id,
                album_name,
                mime_type,
            } => {
                let Some(bytes) = self.env.cache.read_optional(&bgm_file_name(album_id)).await? else {
                    debug!(album = %album_name, "No local background music to upload");
                    return Ok(());
                };
                remote
                    .upload(
                        &self.env.album_file_path(album_name, BGM_FILE_NAME_ON_SERVER),
                        bytes,
                        mime_type,
                    )
                    .await?;
                Ok(())
            }

            Action::DeleteAlbumBgm { album_name } => {
                remote
                    .delete(&self.env.album_file_path(album_name, BGM_FILE_NAME_ON_SERVER))
                    .await
            }

            Action::PatchProperties {
                folder,
                file_name,
                payload,
            } => remote.patch(&dav_path(&[folder.as_str(), file_name.as_str()]), payload).await,

            Action::DeleteCameraBackupFile { folder, file_name } => {
                remote
                    .delete(&dav_path(&[
                        self.env.config.dcim_root(),
                        folder.as_str(),
                        file_name.as_str(),
                    ]))
                    .await
            }

            Action::CreateBlogPost {
                album_id,
                album_name,
                theme,
            } => {
                info!(album = %album_name, theme = %theme, "Publishing blog post");
                BlogPublisher::new(self.env).create_post(album_id, theme).await
            }

            Action::DeleteBlogPost { album_id } => {
                BlogPublisher::new(self.env).delete_post(album_id).await
            }

            Action::UpdateBlogSiteTitle => BlogPublisher::new(self.env).update_index().await,
        }
    }

    // =========================================================================
    // Handlers
    // =========================================================================

    async fn add_file(
        &self,
        mime_type: &str,
        album_name: &str,
        photo_id: &str,
        file_name: &str,
        album_flags: AlbumFlags,
        ctx: &mut PassContext,
    ) -> SyncResult<()> {
        let cache = &self.env.cache;
        let Some(bytes) = cache.read_optional(file_name).await? else {
            info!(file = %file_name, "Local file gone, dropping upload");
            return Ok(());
        };

        let receipt = self
            .env
            .remote
            .upload(
                &self.env.album_file_path(album_name, file_name),
                bytes,
                upload_mime(mime_type),
            )
            .await?;

        if receipt.is_complete() {
            let Some(new_id) = normalize_remote_id(&receipt.file_id) else {
                warn!(file = %file_name, file_id = %receipt.file_id, "Unparseable file id");
                return Ok(());
            };

            if album_flags.contains(AlbumFlags::REMOTE) {
                cache.remove_quietly(file_name).await;
                cache.remove_quietly(&thumbnail_file_name(file_name)).await;
            } else {
                cache.rename_quietly(file_name, &new_id).await;
                if is_video(mime_type) {
                    cache
                        .rename_quietly(&thumbnail_file_name(file_name), &thumbnail_file_name(&new_id))
                        .await;
                }
            }

            self.env
                .db
                .photos()
                .fix_photo_id_etag(photo_id, &new_id, &receipt.etag)
                .await?;

            let albums = self.env.db.albums();
            if let Some(album) = albums.get_by_name(album_name).await? {
                if albums.replace_cover_id(&album.id, photo_id, &new_id).await? {
                    ctx.mark_album_meta(album_name);
                }
            }
        }

        ctx.mark_content_meta(album_name);
        Ok(())
    }

    async fn add_directory(
        &self,
        album_id: &str,
        album_name: &str,
        ctx: &mut PassContext,
    ) -> SyncResult<()> {
        let Some(raw_id) = self
            .env
            .remote
            .create_folder(&self.env.album_path(album_name))
            .await?
        else {
            debug!(album = %album_name, "Album folder already exists");
            return Ok(());
        };
        let Some(new_id) = normalize_remote_id(&raw_id) else {
            warn!(album = %album_name, folder_id = %raw_id, "Unparseable folder id");
            return Ok(());
        };

        info!(album = %album_name, old_id = %album_id, new_id = %new_id, "Album folder created");
        self.env
            .db
            .photos()
            .fix_new_photos_album_id(album_id, &new_id)
            .await?;
        self.env
            .db
            .albums()
            .fix_new_local_album_id(album_id, &new_id)
            .await?;
        self.env
            .cache
            .write(&album_meta_file_name(&new_id), b"")
            .await?;
        ctx.mark_album_meta(album_name);
        Ok(())
    }

    async fn add_file_to_joint_album(
        &self,
        mime_type: &str,
        share_path: &str,
        file_name: &str,
        meta: &SharedPhotoMeta,
    ) -> SyncResult<()> {
        let Some(bytes) = self.env.cache.read_optional(file_name).await? else {
            info!(file = %file_name, "Local file gone, dropping joint album upload");
            return Ok(());
        };

        let path = dav_path(&[share_path, file_name]);
        match self
            .env
            .remote
            .upload(&path, bytes, upload_mime(mime_type))
            .await
        {
            Ok(receipt) => {
                match normalize_remote_id(&receipt.file_id) {
                    Some(new_id) => self.log_change(meta, &new_id, file_name).await?,
                    None => warn!(file = %file_name, "Joint album upload returned no file id"),
                }
                self.env.cache.remove_quietly(file_name).await;
                Ok(())
            }
            Err(e) if e.is_already_exists() => {
                debug!(path = %path, "Joint album file already exists");
                Ok(())
            }
            Err(e) => Err(e),
        }
    }

    /// Appends an entry to the joint album's local change log.
    async fn log_change(
        &self,
        meta: &SharedPhotoMeta,
        new_id: &str,
        file_name: &str,
    ) -> SyncResult<()> {
        let log_name = change_log_file_name(&meta.album_id);
        let mut log = match self.env.cache.read_optional(&log_name).await? {
            Some(bytes) => decode_content(&bytes).unwrap_or_else(|| {
                warn!(log = %log_name, "Change log unreadable, starting a new one");
                ContentMeta::new(Vec::new())
            }),
            None => ContentMeta::new(Vec::new()),
        };
        log.merge(ContentMeta::new(vec![
            meta.to_photo_meta(new_id, base_name(file_name))
        ]));
        self.env
            .cache
            .write(&log_name, log.encode()?.as_bytes())
            .await
    }

    async fn update_joint_album_content(&self, album_id: &str, share_path: &str) -> SyncResult<()> {
        let log_name = change_log_file_name(album_id);
        let Some(log_bytes) = self.env.cache.read_optional(&log_name).await? else {
            debug!(album_id = %album_id, "No change log, nothing to merge");
            return Ok(());
        };

        let path = dav_path(&[share_path, content_meta_file_name(album_id).as_str()]);
        let remote_bytes = self.env.remote.download(&path, true).await?;
        let Some(mut content) = decode_content(&remote_bytes) else {
            warn!(path = %path, "Joint album content unreadable, keeping change log");
            return Ok(());
        };
        let Some(log) = decode_content(&log_bytes) else {
            warn!(log = %log_name, "Change log unreadable, discarding");
            self.env.cache.remove_quietly(&log_name).await;
            return Ok(());
        };

        content.merge(log);
        self.env
            .remote
            .upload(&path, content.encode()?.into_bytes(), MIME_TYPE_JSON)
            .await?;
        self.env.cache.remove_quietly(&log_name).await;
        Ok(())
    }
}

fn decode_content(bytes: &[u8]) -> Option<ContentMeta> {
    std::str::from_utf8(bytes)
        .ok()
        .and_then(|json| ContentMeta::decode(json).ok())
}
