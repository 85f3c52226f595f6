//! # Remote Store Contract
//!
//! The WebDAV archive as seen by the engine. Transport mechanics (TLS,
//! pooling, credentials, percent-encoding) belong to the implementor.
//!
//! ## Path Layout
//! ```text
//! {dav home}/
//! ├── {resource root}/                 albums
//! │   ├── {album name}/
//! │   │   ├── IMG_0001.jpg
//! │   │   ├── {albumId}.json           album meta
//! │   │   ├── {albumId}-content.json   content meta
//! │   │   └── .bgm                     background music
//! │   └── .__picoblog__/               blog site (never an album)
//! └── {dcim root}/{device model}/...   camera backup archive
//! ```
//!
//! All paths passed to a [`RemoteStore`] are relative to the DAV home and
//! unencoded. Build them with [`dav_path`].

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::SyncResult;

/// One depth-one child returned by [`RemoteStore::list`].
#[derive(Debug, Clone, PartialEq)]
pub struct DavEntry {
    pub name: String,

    /// Numeric file id as used in the catalog.
    pub id: String,

    pub etag: String,
    pub modified: DateTime<Utc>,
    pub size: u64,

    /// Content type; empty for folders.
    pub mime_type: String,

    pub is_folder: bool,

    /// The entry is shared with or by another user.
    pub is_shared: bool,
}

/// Identity the server assigned to an uploaded, copied or moved file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadReceipt {
    /// Raw `OC-FileId` value; see [`lespas_core::media::normalize_remote_id`].
    pub file_id: String,
    pub etag: String,
}

impl UploadReceipt {
    pub fn new(file_id: impl Into<String>, etag: impl Into<String>) -> Self {
        UploadReceipt {
            file_id: file_id.into(),
            etag: etag.into(),
        }
    }

    /// The server returned both an id and a tag.
    pub fn is_complete(&self) -> bool {
        !self.file_id.is_empty() && !self.etag.is_empty()
    }
}

/// Remote archive operations used by a sync pass.
///
/// Failures with an HTTP status surface as [`crate::SyncError::Remote`] so
/// the pass can classify them.
#[async_trait]
pub trait RemoteStore: Send + Sync {
    /// Depth-one children of a folder, excluding the folder itself.
    async fn list(&self, path: &str) -> SyncResult<Vec<DavEntry>>;

    async fn upload(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> SyncResult<UploadReceipt>;

    /// `bypass_cache` forces a fresh copy past any HTTP cache.
    async fn download(&self, path: &str, bypass_cache: bool) -> SyncResult<Vec<u8>>;

    /// The first `len` bytes of a file. Stores without range reads return
    /// the whole file.
    async fn read_prefix(&self, path: &str, _len: u64) -> SyncResult<Vec<u8>> {
        self.download(path, false).await
    }

    async fn delete(&self, path: &str) -> SyncResult<()>;

    /// COPY when `copy`, otherwise MOVE.
    async fn copy_or_move(&self, copy: bool, from: &str, to: &str) -> SyncResult<UploadReceipt>;

    /// Returns the new folder's raw id, or `None` when it already existed.
    async fn create_folder(&self, path: &str) -> SyncResult<Option<String>>;

    async fn exists(&self, path: &str) -> SyncResult<bool>;

    /// PROPPATCH with a `<d:set><d:prop>` body fragment.
    async fn patch(&self, path: &str, properties: &str) -> SyncResult<()>;
}

/// Joins path segments with single slashes, skipping empty ones.
pub fn dav_path(segments: &[&str]) -> String {
    segments
        .iter()
        .map(|s| s.trim_matches('/'))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_dav_path() {
        assert_eq!(dav_path(&["lespas", "Holiday", "IMG1.jpg"]), "lespas/Holiday/IMG1.jpg");
        assert_eq!(dav_path(&["/lespas/", "", "Holiday/"]), "lespas/Holiday");
        assert_eq!(dav_path(&["DCIM", "Pixel 7/Camera", "a.jpg"]), "DCIM/Pixel 7/Camera/a.jpg");
        assert_eq!(dav_path(&[]), "");
    }

    #[test]
    fn test_receipt_completeness() {
        assert!(UploadReceipt::new("00012345ocabc", "e1").is_complete());
        assert!(!UploadReceipt::new("", "e1").is_complete());
        assert!(!UploadReceipt::default().is_complete());
    }
}
