//! # Quick Sync
//!
//! Trusts an album's content document instead of probing every changed
//! file, when the document is at least as new as the album folder.
//!
//! ```text
//! album.last_modified <= snapshot ?
//!   ├─ no  ──► full probe, content meta dirty
//!   └─ yes ──► download {albumId}-content.json
//!                ├─ 404 / malformed / v1 / missing orientation
//!                │      ──► full probe, content meta dirty
//!                └─ ok ──► listed changed photos adopted, the rest probed
//! ```

use chrono::{DateTime, Utc};
use lespas_core::{content_meta_file_name, Album, AlbumFlags, ContentMeta, Photo};
use tracing::{debug, info};

use crate::context::{PassContext, SyncEnv};
use crate::error::SyncResult;

/// Splits `changed` into photos described by `meta` (returned) and
/// photos still needing a probe (left in `changed`).
///
/// Returns `None`, leaving `changed` untouched, when the document cannot
/// be trusted.
pub fn adopt_snapshot(meta: ContentMeta, album_id: &str, changed: &mut Vec<Photo>) -> Option<Vec<Photo>> {
    if meta.version < 2 {
        return None;
    }
    if changed
        .iter()
        .any(|p| meta.missing_orientation.contains(&p.id))
    {
        return None;
    }

    let mut adopted = Vec::new();
    for entry in meta.photos {
        let Some(pos) = changed.iter().position(|p| p.id == entry.id) else {
            continue;
        };
        let listed = changed.remove(pos);
        adopted.push(entry.into_photo(album_id, &listed.etag, listed.last_modified));
    }
    Some(adopted)
}

pub(crate) struct QuickSync<'a> {
    env: &'a SyncEnv,
}

impl<'a> QuickSync<'a> {
    pub fn new(env: &'a SyncEnv) -> Self {
        QuickSync { env }
    }

    /// Upserts what the content document describes and removes those
    /// photos from `changed`.
    pub async fn apply(
        &self,
        album: &mut Album,
        changed: &mut Vec<Photo>,
        snapshot: Option<DateTime<Utc>>,
        ctx: &mut PassContext,
    ) -> SyncResult<()> {
        if !album.is_remote() || album.is_excluded() || changed.is_empty() {
            return Ok(());
        }
        let Some(snapshot) = snapshot.filter(|s| album.last_modified <= *s) else {
            debug!(album = %album.name, "Content document older than album, probing");
            ctx.mark_content_meta(&album.name);
            return Ok(());
        };

        let path = self
            .env
            .album_file_path(&album.name, &content_meta_file_name(&album.id));
        let bytes = match self.env.remote.download(&path, true).await {
            Ok(bytes) => bytes,
            Err(e) if e.is_not_found() => {
                ctx.mark_content_meta(&album.name);
                return Ok(());
            }
            Err(e) => return Err(e),
        };

        let adopted = match ContentMeta::decode(&String::from_utf8_lossy(&bytes)) {
            Ok(meta) => adopt_snapshot(meta, &album.id, changed),
            Err(e) => {
                debug!(album = %album.name, error = %e, "Malformed content document");
                None
            }
        };
        let Some(adopted) = adopted else {
            ctx.mark_content_meta(&album.name);
            return Ok(());
        };

        let photos = self.env.db.photos();
        for photo in &adopted {
            album.extend_range(photo.date_taken);
            photos.upsert(photo).await?;
        }
        ctx.stats.photos_quick_synced += adopted.len() as u32;

        if changed.is_empty() {
            album.flags.remove(AlbumFlags::EXCLUDED);
        }
        info!(
            album = %album.name,
            adopted = adopted.len(),
            remaining = changed.len(),
            snapshot = %snapshot,
            "Quick sync applied"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use lespas_core::{Gps, PhotoMeta};

    fn listed(id: &str) -> Photo {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Photo::from_remote(id, "7", format!("{id}.jpg"), format!("tag-{id}"), "image/jpeg", at, at)
    }

    fn entry(id: &str) -> PhotoMeta {
        PhotoMeta {
            id: id.into(),
            name: format!("{id}.jpg"),
            date_taken: Utc.with_ymd_and_hms(2020, 5, 5, 5, 5, 5).unwrap(),
            mime_type: "image/jpeg".into(),
            width: 640,
            height: 480,
            orientation: 90,
            caption: "hi".into(),
            gps: Gps::ABSENT,
        }
    }

    #[test]
    fn test_adopts_listed_ids_only() {
        let mut changed = vec![listed("1"), listed("2")];
        let meta = ContentMeta::new(vec![entry("2"), entry("9")]);

        let adopted = adopt_snapshot(meta, "7", &mut changed).unwrap();
        assert_eq!(adopted.len(), 1);
        assert_eq!(adopted[0].id, "2");
        assert_eq!(adopted[0].etag, "tag-2");
        assert_eq!(adopted[0].orientation, 90);
        assert_eq!(adopted[0].album_id, "7");
        assert_eq!(changed.len(), 1);
        assert_eq!(changed[0].id, "1");
    }

    #[test]
    fn test_untrusted_documents() {
        let mut changed = vec![listed("1")];

        let mut v1 = ContentMeta::new(vec![entry("1")]);
        v1.version = 1;
        assert!(adopt_snapshot(v1, "7", &mut changed).is_none());

        let mut partial = ContentMeta::new(vec![entry("1")]);
        partial.missing_orientation.insert("1".into());
        assert!(adopt_snapshot(partial, "7", &mut changed).is_none());

        assert_eq!(changed.len(), 1);
    }
}
