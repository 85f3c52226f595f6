//! # Pass Context
//!
//! [`SyncEnv`] bundles the collaborators every phase uses; [`PassContext`]
//! is the mutable state one pass threads through its phases by `&mut`.
//!
//! ```text
//! run_pass()
//!   │  ctx = PassContext::default()
//!   ├─► ActionApplier::drain(&mut ctx)     marks dirty album names
//!   ├─► Reconciler::run(&mut ctx)          marks dirty album names
//!   ├─► MetaWriter::flush(&mut ctx)        clears names it wrote
//!   ├─► BackupUploader::run(&mut ctx)
//!   └─► persist_dirty(&ctx)                leftovers become queued actions
//! ```

use std::collections::BTreeSet;
use std::sync::Arc;

use lespas_db::Database;
use serde::Serialize;

use crate::cache::MediaCache;
use crate::config::SyncConfig;
use crate::connectivity::ConnectivityGuard;
use crate::media_store::MediaStore;
use crate::progress::SyncEventEmitter;
use crate::remote::{dav_path, RemoteStore};

/// Shared collaborators of a pass.
#[derive(Clone)]
pub struct SyncEnv {
    pub config: Arc<SyncConfig>,
    pub db: Database,
    pub remote: Arc<dyn RemoteStore>,
    pub media: Arc<dyn MediaStore>,
    pub connectivity: ConnectivityGuard,
    pub cache: MediaCache,
    pub emitter: Arc<dyn SyncEventEmitter>,
}

impl SyncEnv {
    pub fn resource_root(&self) -> &str {
        self.config.resource_root()
    }

    /// `{root}/{album}`
    pub fn album_path(&self, album_name: &str) -> String {
        dav_path(&[self.resource_root(), album_name])
    }

    /// `{root}/{album}/{file}`
    pub fn album_file_path(&self, album_name: &str, file_name: &str) -> String {
        dav_path(&[self.resource_root(), album_name, file_name])
    }
}

/// Counters reported at the end of a pass.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct PassStats {
    pub actions_applied: u32,
    pub actions_skipped: u32,
    pub albums_changed: u32,
    pub albums_deleted: u32,
    pub photos_probed: u32,
    pub photos_quick_synced: u32,
    pub photos_deleted: u32,
    pub meta_files_written: u32,
    pub files_backed_up: u32,
}

/// Mutable state of one pass.
#[derive(Debug, Default)]
pub struct PassContext {
    /// Album names whose album meta document must be rewritten.
    pub album_meta_dirty: BTreeSet<String>,

    /// Album names whose content meta document must be rewritten.
    pub content_meta_dirty: BTreeSet<String>,

    pub stats: PassStats,
}

impl PassContext {
    pub fn mark_album_meta(&mut self, album_name: &str) {
        self.album_meta_dirty.insert(album_name.to_string());
    }

    pub fn mark_content_meta(&mut self, album_name: &str) {
        self.content_meta_dirty.insert(album_name.to_string());
    }

    pub fn has_dirty_meta(&self) -> bool {
        !self.album_meta_dirty.is_empty() || !self.content_meta_dirty.is_empty()
    }
}
