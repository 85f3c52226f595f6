//! # Media Cache
//!
//! Flat directory holding media files, video thumbnails and local copies
//! of sidecar documents, all addressed by file name.
//!
//! ```text
//! cache/
//! ├── IMG_0001.jpg           placeholder, not uploaded yet
//! ├── 12345678               media, renamed to its remote id
//! ├── 12345678.thumbnail     video thumbnail
//! ├── 00000042.json          local album meta (mtime compared on sync)
//! ├── 00000042-changelog     pending joint album entries
//! └── 00000042.bgm           background music
//! ```
//!
//! The `*_quietly` helpers are best-effort cleanup: failures are logged at
//! debug level and never returned.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::SystemTime;

use chrono::{DateTime, Utc};
use tokio::fs;
use tracing::debug;

use crate::error::SyncResult;

#[derive(Debug, Clone)]
pub struct MediaCache {
    root: PathBuf,
}

impl MediaCache {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        MediaCache { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub async fn ensure_dir(&self) -> SyncResult<()> {
        fs::create_dir_all(&self.root).await?;
        Ok(())
    }

    pub fn path(&self, name: &str) -> PathBuf {
        self.root.join(name)
    }

    pub async fn exists(&self, name: &str) -> bool {
        fs::try_exists(self.path(name)).await.unwrap_or(false)
    }

    pub async fn read(&self, name: &str) -> SyncResult<Vec<u8>> {
        Ok(fs::read(self.path(name)).await?)
    }

    /// `None` when the file does not exist.
    pub async fn read_optional(&self, name: &str) -> SyncResult<Option<Vec<u8>>> {
        match fs::read(self.path(name)).await {
            Ok(bytes) => Ok(Some(bytes)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn write(&self, name: &str, bytes: &[u8]) -> SyncResult<()> {
        fs::write(self.path(name), bytes).await?;
        Ok(())
    }

    pub async fn len(&self, name: &str) -> Option<u64> {
        fs::metadata(self.path(name)).await.ok().map(|m| m.len())
    }

    pub async fn modified(&self, name: &str) -> Option<DateTime<Utc>> {
        let meta = fs::metadata(self.path(name)).await.ok()?;
        meta.modified().ok().map(DateTime::<Utc>::from)
    }

    /// Stamps a file with the remote modification time it mirrors.
    pub async fn set_modified(&self, name: &str, at: DateTime<Utc>) -> SyncResult<()> {
        let file = fs::OpenOptions::new()
            .write(true)
            .open(self.path(name))
            .await?
            .into_std()
            .await;
        let at = SystemTime::from(at);
        tokio::task::spawn_blocking(move || file.set_modified(at))
            .await
            .map_err(|e| crate::SyncError::Internal(e.to_string()))??;
        Ok(())
    }

    pub async fn rename_quietly(&self, from: &str, to: &str) {
        if let Err(e) = fs::rename(self.path(from), self.path(to)).await {
            debug!(from = %from, to = %to, error = %e, "Cache rename skipped");
        }
    }

    pub async fn remove_quietly(&self, name: &str) {
        if let Err(e) = fs::remove_file(self.path(name)).await {
            if e.kind() != ErrorKind::NotFound {
                debug!(file = %name, error = %e, "Cache removal skipped");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_read_write_rename_remove() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::new(dir.path().join("cache"));
        cache.ensure_dir().await.unwrap();

        assert_eq!(cache.read_optional("IMG1.jpg").await.unwrap(), None);
        cache.write("IMG1.jpg", b"jpeg").await.unwrap();
        assert_eq!(cache.len("IMG1.jpg").await, Some(4));

        cache.rename_quietly("IMG1.jpg", "12345678").await;
        assert!(!cache.exists("IMG1.jpg").await);
        assert_eq!(cache.read("12345678").await.unwrap(), b"jpeg");

        cache.remove_quietly("12345678").await;
        cache.remove_quietly("12345678").await;
        assert!(!cache.exists("12345678").await);

        // missing source is not an error
        cache.rename_quietly("nothing", "else").await;
    }

    #[tokio::test]
    async fn test_set_modified() {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::new(dir.path());
        cache.write("42.json", b"{}").await.unwrap();

        let at = Utc.with_ymd_and_hms(2022, 1, 2, 3, 4, 5).unwrap();
        cache.set_modified("42.json", at).await.unwrap();
        assert_eq!(cache.modified("42.json").await, Some(at));
    }
}
