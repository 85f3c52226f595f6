//! # Remote Reconciler
//!
//! Brings the local catalog in line with the remote album tree.
//!
//! ## Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  list {root}                                                            │
//! │    ├─ unseen folder          ──► new album (REMOTE | EXCLUDED)          │
//! │    ├─ tag differs            ──► changed album                          │
//! │    ├─ same tag, new name     ──► rename in place                        │
//! │    └─ local, tagged, missing ──► delete album, photos, cache files      │
//! │                                                                         │
//! │  per changed album:                                                     │
//! │    list {root}/{album}                                                  │
//! │      ├─ media, tag differs   ──► identity promotion or probe queue      │
//! │      ├─ media, renamed       ──► rename, re-derive date                 │
//! │      ├─ {id}*.json           ──► content snapshot time                  │
//! │      └─ .bgm                 ──► download when size differs             │
//! │    cover adoption ─► quick sync ─► probe ─► deletions ─► upsert         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{HashMap, HashSet};

use chrono::{DateTime, Utc};
use lespas_core::capture::parse_date_from_file_name;
use lespas_core::media::is_supported_media;
use lespas_core::{
    album_meta_file_name, bgm_file_name, content_meta_file_name, is_hidden_name,
    thumbnail_file_name, Action, Album, AlbumFlags, AlbumMeta, Cover, Photo,
    BGM_FILE_NAME_ON_SERVER, BLOG_FOLDER, META_SKEW_TOLERANCE_MS, MIME_TYPE_JSON,
};
use tracing::{debug, info, warn};

use crate::context::{PassContext, SyncEnv};
use crate::error::SyncResult;
use crate::probe::MediaProber;
use crate::quick_sync::QuickSync;
use crate::remote::DavEntry;

/// Blog folders are never albums.
pub fn is_blog_folder(name: &str) -> bool {
    name == BLOG_FOLDER || name == BLOG_FOLDER.trim_start_matches('.')
}

/// Sidecars and media found in one album listing.
#[derive(Debug, Default)]
struct AlbumListing<'l> {
    remote_ids: HashSet<String>,
    changed: Vec<Photo>,
    snapshot: Option<DateTime<Utc>>,
    album_meta: Option<&'l DavEntry>,
    has_content_meta: bool,
    bgm: Option<&'l DavEntry>,
}

pub(crate) struct Reconciler<'a> {
    env: &'a SyncEnv,
}

impl<'a> Reconciler<'a> {
    pub fn new(env: &'a SyncEnv) -> Self {
        Reconciler { env }
    }

    pub async fn run(&self, ctx: &mut PassContext) -> SyncResult<()> {
        let root = self.env.resource_root();
        let listing = match self.env.remote.list(root).await {
            Ok(listing) => listing,
            Err(e) if e.is_not_found() => {
                info!(root = %root, "Creating resource root");
                self.env.remote.create_folder(root).await?;
                Vec::new()
            }
            Err(e) => return Err(e),
        };

        let folders: Vec<&DavEntry> = listing
            .iter()
            .filter(|e| e.is_folder && !is_blog_folder(&e.name))
            .collect();
        let albums = self.env.db.albums();
        let local: HashMap<String, Album> = albums
            .list_all()
            .await?
            .into_iter()
            .map(|a| (a.id.clone(), a))
            .collect();

        // Albums removed remotely
        let remote_ids: HashSet<&str> = folders.iter().map(|e| e.id.as_str()).collect();
        for album in local.values() {
            if album.is_confirmed() && !remote_ids.contains(album.id.as_str()) {
                self.delete_album(album, ctx).await?;
            }
        }

        let mut changed = Vec::new();
        for entry in folders {
            match local.get(&entry.id) {
                None if is_hidden_name(&entry.name) => {
                    debug!(name = %entry.name, "Skipping new hidden album");
                }
                None => {
                    let mut album = Album::from_remote(
                        &entry.id,
                        &entry.name,
                        &entry.etag,
                        entry.modified,
                        self.env.config.sync.default_sort_order,
                    );
                    album.flags.set(AlbumFlags::SHARED, entry.is_shared);
                    changed.push(album);
                }
                Some(album) if album.etag != entry.etag => {
                    if is_hidden_name(&entry.name) {
                        if album.name != entry.name {
                            albums.change_name(&album.id, &entry.name).await?;
                        }
                        continue;
                    }
                    let mut album = album.clone();
                    album.name = entry.name.clone();
                    album.last_modified = entry.modified;
                    album.etag = entry.etag.clone();
                    album.flags.set(AlbumFlags::SHARED, entry.is_shared);
                    changed.push(album);
                }
                Some(album) if album.name != entry.name => {
                    debug!(old = %album.name, new = %entry.name, "Album renamed remotely");
                    albums.change_name(&album.id, &entry.name).await?;
                }
                Some(_) => {}
            }
        }

        for album in changed {
            self.env.connectivity.check()?;
            self.sync_album(album, ctx).await?;
        }
        Ok(())
    }

    async fn delete_album(&self, album: &Album, ctx: &mut PassContext) -> SyncResult<()> {
        info!(album = %album.name, "Album removed remotely");
        let photos = self.env.db.photos();
        let cache = &self.env.cache;

        for photo in photos.list_by_album(&album.id).await? {
            cache.remove_quietly(&photo.id).await;
            cache.remove_quietly(&photo.name).await;
            cache.remove_quietly(&thumbnail_file_name(&photo.id)).await;
        }
        photos.delete_by_album(&album.id).await?;
        self.env.db.albums().delete_by_id(&album.id).await?;
        cache.remove_quietly(&album_meta_file_name(&album.id)).await;
        cache.remove_quietly(&bgm_file_name(&album.id)).await;
        ctx.stats.albums_deleted += 1;
        Ok(())
    }

    async fn sync_album(&self, mut album: Album, ctx: &mut PassContext) -> SyncResult<()> {
        debug!(album = %album.name, id = %album.id, "Syncing album");
        let entries = self.env.remote.list(&self.env.album_path(&album.name)).await?;
        let mut found = self.classify(&mut album, &entries, ctx).await?;

        if !album.has_cover() {
            if found.changed.is_empty() {
                debug!(album = %album.name, "New album without media, skipped");
                return Ok(());
            }
            self.adopt_new_album_meta(&mut album, &found.changed, ctx)
                .await?;
        } else if let Some(meta_entry) = found.album_meta {
            self.refresh_album_meta(&mut album, meta_entry).await?;
        }

        if found.album_meta.is_none() {
            ctx.mark_album_meta(&album.name);
        }
        if !found.has_content_meta {
            ctx.mark_content_meta(&album.name);
        }
        if let Some(bgm) = found.bgm {
            self.sync_bgm(&mut album, bgm).await?;
        }

        if let Some(pos) = found.changed.iter().position(|p| p.id == album.cover.id) {
            let cover = found.changed.remove(pos);
            found.changed.insert(0, cover);
        }

        let listed_changes = found.changed.len();
        QuickSync::new(self.env)
            .apply(&mut album, &mut found.changed, found.snapshot, ctx)
            .await?;
        self.probe_changed(&mut album, found.changed, ctx).await?;

        let deleted = self.delete_photos(&mut album, &found.remote_ids, ctx).await?;
        if deleted.is_none() {
            return Ok(());
        }

        let albums = self.env.db.albums();
        if listed_changes > 0 || deleted == Some(true) {
            if let Some(stored) = albums.get_by_id(&album.id).await? {
                album.cover = stored.cover;
                album.sort_order = stored.sort_order;
            }
            if let Some((start, end)) = self.env.db.photos().album_duration(&album.id).await? {
                album.start_date = Some(start);
                album.end_date = Some(end);
            }
        }

        album.sync_progress = 1.0;
        albums.upsert(&album).await?;
        ctx.stats.albums_changed += 1;
        self.env.emitter.emit_album_progress(&album.name, 1.0);
        info!(album = %album.name, changes = listed_changes, "Album synced");
        Ok(())
    }

    /// Sorts the album listing into changes, renames and sidecars.
    async fn classify<'l>(
        &self,
        album: &mut Album,
        entries: &'l [DavEntry],
        ctx: &mut PassContext,
    ) -> SyncResult<AlbumListing<'l>> {
        let photos = self.env.db.photos();
        let local_etags = photos.etags_by_album(&album.id).await?;
        let local_names = photos.names_by_album(&album.id).await?;
        let mut found = AlbumListing::default();

        for entry in entries.iter().filter(|e| !e.is_folder) {
            if is_supported_media(&entry.mime_type, &entry.name) {
                found.remote_ids.insert(entry.id.clone());
                match local_etags.get(&entry.id) {
                    Some(etag) if *etag == entry.etag => {
                        if local_names.get(&entry.id) != Some(&entry.name) {
                            self.rename_photo(album, entry, ctx).await?;
                        }
                    }
                    _ => {
                        if self.env.cache.exists(&entry.name).await
                            && self.promote(album, entry, ctx).await?
                        {
                            continue;
                        }
                        found.changed.push(Photo::from_remote(
                            &entry.id,
                            &album.id,
                            &entry.name,
                            &entry.etag,
                            &entry.mime_type,
                            entry.modified,
                            entry.modified,
                        ));
                    }
                }
            } else if entry.mime_type == MIME_TYPE_JSON && entry.name.starts_with(album.id.as_str()) {
                found.snapshot = Some(
                    found
                        .snapshot
                        .map_or(entry.modified, |s| s.max(entry.modified)),
                );
                if entry.name == album_meta_file_name(&album.id) {
                    found.album_meta = Some(entry);
                } else if entry.name == content_meta_file_name(&album.id) {
                    found.has_content_meta = true;
                }
            } else if entry.name == BGM_FILE_NAME_ON_SERVER
                && (entry.mime_type.starts_with("audio/")
                    || entry.mime_type == "application/octet-stream")
            {
                found.bgm = Some(entry);
            }
        }
        Ok(found)
    }

    /// Re-keys the placeholder row of a file this device uploaded.
    ///
    /// Returns false when no placeholder row exists.
    async fn promote(&self, album: &mut Album, entry: &DavEntry, ctx: &mut PassContext) -> SyncResult<bool> {
        let promoted = self
            .env
            .db
            .photos()
            .fix_photo(&entry.name, &entry.id, &entry.name, &entry.etag, entry.modified)
            .await?;
        if !promoted {
            return Ok(false);
        }
        debug!(name = %entry.name, id = %entry.id, "Promoted uploaded file");

        let cache = &self.env.cache;
        cache.remove_quietly(&entry.id).await;
        cache.rename_quietly(&entry.name, &entry.id).await;
        if entry.mime_type.starts_with("video/") {
            cache
                .rename_quietly(&thumbnail_file_name(&entry.name), &thumbnail_file_name(&entry.id))
                .await;
        }

        if self
            .env
            .db
            .albums()
            .replace_cover_id(&album.id, &entry.name, &entry.id)
            .await?
            || album.cover.id == entry.name
        {
            album.cover.id = entry.id.clone();
            ctx.mark_album_meta(&album.name);
        }
        Ok(true)
    }

    async fn rename_photo(&self, album: &mut Album, entry: &DavEntry, ctx: &mut PassContext) -> SyncResult<()> {
        debug!(id = %entry.id, name = %entry.name, "Photo renamed remotely");
        let photos = self.env.db.photos();
        photos.change_name(&entry.id, &entry.name).await?;
        if let Some(date) = parse_date_from_file_name(&entry.name) {
            photos.update_date_taken(&entry.id, date).await?;
        }
        ctx.mark_content_meta(&album.name);

        if album.cover.id == entry.id {
            self.env
                .db
                .albums()
                .change_cover_file_name(&album.id, &entry.name)
                .await?;
            album.cover.file_name = entry.name.clone();
            ctx.mark_album_meta(&album.name);
        }
        Ok(())
    }

    /// A new album takes cover and sort order from its album document.
    async fn adopt_new_album_meta(&self, album: &mut Album, changed: &[Photo], ctx: &mut PassContext) -> SyncResult<()> {
        let Some(meta) = self.download_album_meta(album).await? else {
            ctx.mark_album_meta(&album.name);
            return Ok(());
        };

        let complete = meta.has_full_cover();
        album.cover = meta.cover;
        album.sort_order = meta.sort_order;
        album.flags.remove(AlbumFlags::EXCLUDED);

        if !complete {
            if let Some(photo) = changed.iter().find(|p| p.id == album.cover.id) {
                album.cover.mime_type = photo.mime_type.clone();
                album.cover.orientation = photo.orientation;
            }
            ctx.mark_album_meta(&album.name);
        }
        Ok(())
    }

    /// Adopts a remote album document written by another client.
    async fn refresh_album_meta(&self, album: &mut Album, remote: &DavEntry) -> SyncResult<()> {
        let local_name = album_meta_file_name(&album.id);
        let newer = match self.env.cache.modified(&local_name).await {
            Some(local) => (remote.modified - local).num_milliseconds() > META_SKEW_TOLERANCE_MS,
            None => true,
        };
        if !newer {
            return Ok(());
        }

        let Some(mut meta) = self.download_album_meta(album).await? else {
            return Ok(());
        };
        // The listing already carries the cover's current file name.
        if meta.cover.id == album.cover.id {
            meta.cover.file_name = album.cover.file_name.clone();
        }
        if meta.has_full_cover() {
            debug!(album = %album.name, cover = %meta.cover.id, "Adopting remote album meta");
            let albums = self.env.db.albums();
            albums.set_cover(&album.id, &meta.cover).await?;
            albums.set_sort_order(&album.id, meta.sort_order).await?;
            album.cover = meta.cover.clone();
            album.sort_order = meta.sort_order;
        }

        self.env.cache.write(&local_name, &meta.encode()?.into_bytes()).await?;
        self.env.cache.set_modified(&local_name, remote.modified).await?;
        Ok(())
    }

    /// `None` when the document is missing or unreadable.
    async fn download_album_meta(&self, album: &Album) -> SyncResult<Option<AlbumMeta>> {
        let path = self
            .env
            .album_file_path(&album.name, &album_meta_file_name(&album.id));
        let bytes = match self.env.remote.download(&path, true).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => return Ok(None),
            Err(e) => return Err(e),
        };
        match AlbumMeta::decode(&String::from_utf8_lossy(&bytes)) {
            Ok(meta) => Ok(Some(meta)),
            Err(e) => {
                warn!(album = %album.name, error = %e, "Malformed album meta");
                Ok(None)
            }
        }
    }

    async fn sync_bgm(&self, album: &mut Album, bgm: &DavEntry) -> SyncResult<()> {
        let local_name = bgm_file_name(&album.id);
        if self.env.cache.len(&local_name).await != Some(bgm.size) {
            let bytes = self
                .env
                .remote
                .download(&self.env.album_file_path(&album.name, BGM_FILE_NAME_ON_SERVER), false)
                .await?;
            self.env.cache.write(&local_name, &bytes).await?;
        }
        album.bgm_id = bgm.id.clone();
        album.bgm_etag = bgm.etag.clone();
        self.env
            .db
            .albums()
            .set_bgm(&album.id, &bgm.id, &bgm.etag)
            .await?;
        Ok(())
    }

    async fn probe_changed(&self, album: &mut Album, changed: Vec<Photo>, ctx: &mut PassContext) -> SyncResult<()> {
        if changed.is_empty() {
            return Ok(());
        }
        let prober = MediaProber::new(self.env);
        let photos = self.env.db.photos();
        let albums = self.env.db.albums();
        let total = changed.len();
        let mut shown = false;

        for (i, mut photo) in changed.into_iter().enumerate() {
            self.env.connectivity.check()?;
            match prober.probe(album, &mut photo).await {
                Ok(()) => {}
                Err(e) if e.is_not_found() => {
                    warn!(photo = %photo.name, "Vanished before probing");
                    continue;
                }
                Err(e) => return Err(e),
            }
            album.extend_range(photo.date_taken);
            photos.upsert(&photo).await?;
            ctx.stats.photos_probed += 1;

            let progress = (i + 1) as f32 / total as f32;
            if !shown {
                shown = true;
                if !album.has_cover() {
                    album.cover = Cover::from_photo(&photo);
                    ctx.mark_album_meta(&album.name);
                }
                album.flags.remove(AlbumFlags::EXCLUDED);
                let mut visible = album.clone();
                visible.etag = String::new();
                visible.sync_progress = 0.0;
                albums.upsert(&visible).await?;
            } else {
                albums.update_sync_progress(album, progress).await?;
            }
            self.env.emitter.emit_album_progress(&album.name, progress);
        }

        ctx.mark_content_meta(&album.name);
        Ok(())
    }

    /// Removes tagged photos missing from the listing.
    ///
    /// `Some(true)` when photos were removed, `Some(false)` when nothing
    /// changed, `None` when the album itself went away.
    async fn delete_photos(
        &self,
        album: &mut Album,
        remote_ids: &HashSet<String>,
        ctx: &mut PassContext,
    ) -> SyncResult<Option<bool>> {
        let photos = self.env.db.photos();
        let stale: Vec<String> = photos
            .etags_by_album(&album.id)
            .await?
            .into_iter()
            .filter(|(id, etag)| !etag.is_empty() && !remote_ids.contains(id))
            .map(|(id, _)| id)
            .collect();
        if stale.is_empty() {
            return Ok(Some(false));
        }

        for id in &stale {
            photos.delete_by_id(id).await?;
            self.env.cache.remove_quietly(id).await;
            self.env.cache.remove_quietly(&thumbnail_file_name(id)).await;
        }
        ctx.stats.photos_deleted += stale.len() as u32;
        debug!(album = %album.name, removed = stale.len(), "Photos removed remotely");

        let mut remaining = photos.list_by_album(&album.id).await?;
        if remaining.is_empty() {
            info!(album = %album.name, "Album emptied remotely, removing");
            self.env.db.albums().delete_by_id(&album.id).await?;
            self.env
                .db
                .actions()
                .enqueue(&Action::DeleteDirectory {
                    album_id: album.id.clone(),
                    album_name: album.name.clone(),
                })
                .await?;
            self.env
                .cache
                .remove_quietly(&album_meta_file_name(&album.id))
                .await;
            ctx.stats.albums_deleted += 1;
            return Ok(None);
        }

        remaining.sort_by_key(|p| p.date_taken);
        album.start_date = remaining.first().map(|p| p.date_taken);
        album.end_date = remaining.last().map(|p| p.date_taken);

        if !remaining.iter().any(|p| p.id == album.cover.id) {
            if let Some(earliest) = remaining.first() {
                album.cover = Cover::from_photo(earliest);
                self.env.db.albums().set_cover(&album.id, &album.cover).await?;
                ctx.mark_album_meta(&album.name);
            }
        }
        ctx.mark_content_meta(&album.name);
        Ok(Some(true))
    }
}
