//! Device media enumeration contract for the backup uploader.

use async_trait::async_trait;
use lespas_core::Gps;

use crate::error::SyncResult;

/// A camera file known to the device media store.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceMedia {
    /// Store-local id, opaque to the engine.
    pub id: String,
    pub name: String,

    /// Folder below the device's storage root, e.g. `DCIM/Camera/`.
    pub relative_path: String,

    pub mime_type: String,
    pub size: u64,

    /// When the file entered the store, epoch seconds.
    pub date_added: i64,

    /// Capture time, epoch millis; 0 when unknown.
    pub date_taken: i64,

    pub width: i32,
    pub height: i32,
    pub orientation: i32,
    pub gps: Gps,
}

impl DeviceMedia {
    /// Capture time reported to the server, falling back to the add time.
    pub fn effective_date_taken(&self) -> i64 {
        if self.date_taken == 0 {
            self.date_added * 1000
        } else {
            self.date_taken
        }
    }

    /// Subfolder of the device archive holding this file: the part of
    /// `relative_path` after `DCIM/`, e.g. `Camera` for `DCIM/Camera/`.
    /// Paths outside DCIM are kept whole.
    pub fn archive_subfolder(&self) -> &str {
        let path = self.relative_path.trim_end_matches('/');
        match path.find("DCIM/") {
            Some(pos) => &path[pos + "DCIM/".len()..],
            None if path == "DCIM" => "",
            None => path,
        }
    }
}

#[async_trait]
pub trait MediaStore: Send + Sync {
    /// Media added strictly after `watermark` (epoch seconds), oldest first.
    async fn media_added_after(&self, watermark: i64) -> SyncResult<Vec<DeviceMedia>>;

    async fn open(&self, item: &DeviceMedia) -> SyncResult<Vec<u8>>;
}

/// Store for hosts without a camera roll.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDeviceMedia;

#[async_trait]
impl MediaStore for NoDeviceMedia {
    async fn media_added_after(&self, _watermark: i64) -> SyncResult<Vec<DeviceMedia>> {
        Ok(Vec::new())
    }

    async fn open(&self, item: &DeviceMedia) -> SyncResult<Vec<u8>> {
        Err(crate::SyncError::Io(format!("no device media store for {}", item.name)))
    }
}
