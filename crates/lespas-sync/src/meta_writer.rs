//! # Metadata Flush
//!
//! Writes the album and content documents of every album marked dirty
//! during the pass.
//!
//! ```text
//! album_meta_dirty   ──► {root}/{album}/{albumId}.json          (+ local copy)
//! content_meta_dirty ──► {root}/{album}/{albumId}-content.json
//! ```
//!
//! A name leaves its set only once its document is written; leftovers are
//! queued as actions by the engine.

use lespas_core::{
    album_meta_file_name, content_meta_file_name, Album, AlbumMeta, ContentMeta, MIME_TYPE_JSON,
};
use tracing::{debug, info};

use crate::context::{PassContext, SyncEnv};
use crate::error::SyncResult;

pub(crate) struct MetaWriter<'a> {
    env: &'a SyncEnv,
}

impl<'a> MetaWriter<'a> {
    pub fn new(env: &'a SyncEnv) -> Self {
        MetaWriter { env }
    }

    pub async fn flush(&self, ctx: &mut PassContext) -> SyncResult<()> {
        let albums = self.env.db.albums();

        for name in ctx.album_meta_dirty.clone() {
            self.env.connectivity.check()?;
            match albums.get_by_name(&name).await? {
                Some(album) if !album.cover.is_confirmed() => {
                    debug!(album = %name, cover = %album.cover.id, "Cover not confirmed yet");
                    continue;
                }
                Some(album) => {
                    self.write_album_meta(&album).await?;
                    ctx.stats.meta_files_written += 1;
                }
                None => debug!(album = %name, "Dropping meta update of unknown album"),
            }
            ctx.album_meta_dirty.remove(&name);
        }

        for name in ctx.content_meta_dirty.clone() {
            self.env.connectivity.check()?;
            match albums.get_by_name(&name).await? {
                Some(album) => {
                    self.write_content_meta(&album).await?;
                    ctx.stats.meta_files_written += 1;
                }
                None => debug!(album = %name, "Dropping content update of unknown album"),
            }
            ctx.content_meta_dirty.remove(&name);
        }
        Ok(())
    }

    async fn write_album_meta(&self, album: &Album) -> SyncResult<()> {
        let file_name = album_meta_file_name(&album.id);
        let json = AlbumMeta::new(album.cover.clone(), album.sort_order).encode()?;

        self.env.cache.write(&file_name, json.as_bytes()).await?;
        self.env
            .remote
            .upload(
                &self.env.album_file_path(&album.name, &file_name),
                json.into_bytes(),
                MIME_TYPE_JSON,
            )
            .await?;
        info!(album = %album.name, cover = %album.cover.id, "Album meta written");
        Ok(())
    }

    async fn write_content_meta(&self, album: &Album) -> SyncResult<()> {
        let mut photos = self.env.db.photos().list_by_album(&album.id).await?;
        photos.sort_by_key(|p| p.date_taken);
        let json = ContentMeta::from_photos(&photos).encode()?;

        self.env
            .remote
            .upload(
                &self.env.album_file_path(&album.name, &content_meta_file_name(&album.id)),
                json.into_bytes(),
                MIME_TYPE_JSON,
            )
            .await?;
        info!(album = %album.name, photos = photos.len(), "Content meta written");
        Ok(())
    }
}
