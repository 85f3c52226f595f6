//! In-memory collaborators for pass-level tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use lespas_core::{
    album_meta_file_name, Album, AlbumFlags, AlbumMeta, ContentMeta, Cover, Photo, MIME_TYPE_JSON,
};
use lespas_db::{Database, DbConfig};
use tempfile::TempDir;

use crate::cache::MediaCache;
use crate::config::SyncConfig;
use crate::engine::{SyncEngine, SyncEngineBuilder};
use crate::error::{SyncError, SyncResult};
use crate::media_store::{DeviceMedia, MediaStore};
use crate::remote::{DavEntry, RemoteStore, UploadReceipt};

pub const ROOT: &str = "lespas";

pub fn at(day: u32) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, day, 12, 0, 0).unwrap()
}

// =============================================================================
// Fake Remote
// =============================================================================

#[derive(Debug, Clone)]
struct Node {
    id: u64,
    etag: String,
    modified: DateTime<Utc>,
    mime_type: String,
    is_folder: bool,
    bytes: Vec<u8>,
}

#[derive(Debug, Default)]
struct RemoteState {
    nodes: BTreeMap<String, Node>,
    calls: Vec<String>,
    failures: HashMap<String, u16>,
    next_id: u64,
    next_tag: u64,
}

impl RemoteState {
    fn id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn tag(&mut self) -> String {
        self.next_tag += 1;
        format!("fake-{}", self.next_tag)
    }

    fn check(&mut self, op: &str, path: &str) -> SyncResult<()> {
        self.calls.push(format!("{op} {path}"));
        match self.failures.get(&format!("{op} {path}")) {
            Some(status) => Err(SyncError::remote(*status, "injected")),
            None => Ok(()),
        }
    }

    /// Every ancestor folder of a written path gets a new tag and
    /// modification time, as a WebDAV server does.
    fn touch_parents(&mut self, path: &str, now: DateTime<Utc>) {
        let mut current = path;
        while let Some((parent, _)) = current.rsplit_once('/') {
            let tag = self.tag();
            if let Some(node) = self.nodes.get_mut(parent) {
                node.etag = tag;
                node.modified = now;
            }
            current = parent;
        }
    }

    fn parent_exists(&self, path: &str) -> bool {
        match path.rsplit_once('/') {
            Some((parent, _)) => self.nodes.get(parent).is_some_and(|n| n.is_folder),
            None => true,
        }
    }
}

/// WebDAV stand-in: a flat map of paths, a call log and injectable
/// status failures keyed by `"{op} {path}"`.
///
/// Setup helpers (`add_*`, `set_*`, `remove`) leave folder tags alone;
/// writes through `RemoteStore` retag every ancestor folder.
#[derive(Debug, Default)]
pub struct FakeRemote {
    state: Mutex<RemoteState>,
}

fn clean(path: &str) -> String {
    path.trim_matches('/').to_string()
}

/// Raw server id for a numeric id, as returned in upload answers.
pub fn raw_id(id: u64) -> String {
    format!("{id:08}ocfake01")
}

impl FakeRemote {
    pub fn new() -> Arc<Self> {
        let remote = FakeRemote::default();
        remote.state().next_id = 1000;
        Arc::new(remote)
    }

    fn state(&self) -> MutexGuard<'_, RemoteState> {
        self.state.lock().unwrap()
    }

    pub fn add_folder(&self, path: &str, id: u64, etag: &str) {
        self.state().nodes.insert(
            clean(path),
            Node {
                id,
                etag: etag.into(),
                modified: at(1),
                mime_type: "httpd/unix-directory".into(),
                is_folder: true,
                bytes: Vec::new(),
            },
        );
    }

    pub fn add_file(&self, path: &str, id: u64, etag: &str, mime_type: &str, bytes: Vec<u8>, modified: DateTime<Utc>) {
        self.state().nodes.insert(
            clean(path),
            Node {
                id,
                etag: etag.into(),
                modified,
                mime_type: mime_type.into(),
                is_folder: false,
                bytes,
            },
        );
    }

    pub fn set_etag(&self, path: &str, etag: &str) {
        if let Some(node) = self.state().nodes.get_mut(&clean(path)) {
            node.etag = etag.into();
        }
    }

    pub fn set_modified(&self, path: &str, modified: DateTime<Utc>) {
        if let Some(node) = self.state().nodes.get_mut(&clean(path)) {
            node.modified = modified;
        }
    }

    pub fn remove(&self, path: &str) {
        self.state().nodes.remove(&clean(path));
    }

    pub fn fail(&self, op: &str, path: &str, status: u16) {
        self.state()
            .failures
            .insert(format!("{op} {}", clean(path)), status);
    }

    pub fn has(&self, path: &str) -> bool {
        self.state().nodes.contains_key(&clean(path))
    }

    pub fn bytes(&self, path: &str) -> Option<Vec<u8>> {
        self.state().nodes.get(&clean(path)).map(|n| n.bytes.clone())
    }

    pub fn etag_of(&self, path: &str) -> Option<String> {
        self.state().nodes.get(&clean(path)).map(|n| n.etag.clone())
    }

    pub fn id_of(&self, path: &str) -> Option<u64> {
        self.state().nodes.get(&clean(path)).map(|n| n.id)
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn clear_calls(&self) {
        self.state().calls.clear();
    }
}

#[async_trait]
impl RemoteStore for FakeRemote {
    async fn list(&self, path: &str) -> SyncResult<Vec<DavEntry>> {
        let path = clean(path);
        let mut state = self.state();
        state.check("list", &path)?;
        if !state.nodes.get(&path).is_some_and(|n| n.is_folder) {
            return Err(SyncError::remote(404, "Not Found"));
        }

        let prefix = format!("{path}/");
        let entries = state
            .nodes
            .iter()
            .filter_map(|(key, node)| {
                let name = key.strip_prefix(&prefix)?;
                (!name.contains('/')).then(|| DavEntry {
                    name: name.to_string(),
                    id: node.id.to_string(),
                    etag: node.etag.clone(),
                    modified: node.modified,
                    size: node.bytes.len() as u64,
                    mime_type: node.mime_type.clone(),
                    is_folder: node.is_folder,
                    is_shared: false,
                })
            })
            .collect();
        Ok(entries)
    }

    async fn upload(&self, path: &str, bytes: Vec<u8>, mime_type: &str) -> SyncResult<UploadReceipt> {
        let path = clean(path);
        let mut state = self.state();
        state.check("upload", &path)?;
        if !state.parent_exists(&path) {
            return Err(SyncError::remote(404, "Not Found"));
        }

        let existing = state.nodes.get(&path).map(|n| n.id);
        let id = match existing {
            Some(id) => id,
            None => state.id(),
        };
        let etag = state.tag();
        let now = Utc::now();
        state.touch_parents(&path, now);
        state.nodes.insert(
            path,
            Node {
                id,
                etag: etag.clone(),
                modified: now,
                mime_type: mime_type.into(),
                is_folder: false,
                bytes,
            },
        );
        Ok(UploadReceipt::new(raw_id(id), etag))
    }

    async fn download(&self, path: &str, _bypass_cache: bool) -> SyncResult<Vec<u8>> {
        let path = clean(path);
        let mut state = self.state();
        state.check("download", &path)?;
        state
            .nodes
            .get(&path)
            .filter(|n| !n.is_folder)
            .map(|n| n.bytes.clone())
            .ok_or_else(|| SyncError::remote(404, "Not Found"))
    }

    async fn delete(&self, path: &str) -> SyncResult<()> {
        let path = clean(path);
        let mut state = self.state();
        state.check("delete", &path)?;
        if state.nodes.remove(&path).is_none() {
            return Err(SyncError::remote(404, "Not Found"));
        }
        let prefix = format!("{path}/");
        state.nodes.retain(|key, _| !key.starts_with(&prefix));
        state.touch_parents(&path, Utc::now());
        Ok(())
    }

    async fn copy_or_move(&self, copy: bool, from: &str, to: &str) -> SyncResult<UploadReceipt> {
        let (from, to) = (clean(from), clean(to));
        let mut state = self.state();
        state.check(if copy { "copy" } else { "move" }, &format!("{from} -> {to}"))?;
        if state.nodes.contains_key(&to) {
            return Err(SyncError::remote(403, "Forbidden"));
        }

        let prefix = format!("{from}/");
        let moved: Vec<(String, Node)> = state
            .nodes
            .iter()
            .filter(|(key, _)| **key == from || key.starts_with(&prefix))
            .map(|(key, node)| (key.clone(), node.clone()))
            .collect();
        if moved.is_empty() {
            return Err(SyncError::remote(404, "Not Found"));
        }

        let mut receipt = UploadReceipt::default();
        for (key, mut node) in moved {
            if copy {
                node.id = state.id();
            } else {
                state.nodes.remove(&key);
            }
            let target = format!("{to}{}", &key[from.len()..]);
            if target == to {
                receipt = UploadReceipt::new(raw_id(node.id), node.etag.clone());
            }
            state.nodes.insert(target, node);
        }
        state.touch_parents(&to, Utc::now());
        if !copy {
            state.touch_parents(&from, Utc::now());
        }
        Ok(receipt)
    }

    async fn create_folder(&self, path: &str) -> SyncResult<Option<String>> {
        let path = clean(path);
        let mut state = self.state();
        state.check("mkcol", &path)?;
        if state.nodes.contains_key(&path) {
            return Ok(None);
        }
        if !state.parent_exists(&path) {
            return Err(SyncError::remote(409, "Conflict"));
        }
        let id = state.id();
        let etag = state.tag();
        state.touch_parents(&path, Utc::now());
        state.nodes.insert(
            path,
            Node {
                id,
                etag,
                modified: Utc::now(),
                mime_type: "httpd/unix-directory".into(),
                is_folder: true,
                bytes: Vec::new(),
            },
        );
        Ok(Some(raw_id(id)))
    }

    async fn exists(&self, path: &str) -> SyncResult<bool> {
        let path = clean(path);
        let mut state = self.state();
        state.check("exists", &path)?;
        Ok(state.nodes.contains_key(&path))
    }

    async fn patch(&self, path: &str, _properties: &str) -> SyncResult<()> {
        let path = clean(path);
        let mut state = self.state();
        state.check("patch", &path)?;
        if state.nodes.contains_key(&path) {
            Ok(())
        } else {
            Err(SyncError::remote(404, "Not Found"))
        }
    }
}

// =============================================================================
// Fake Device Media
// =============================================================================

#[derive(Debug, Default)]
pub struct FakeMediaStore {
    items: Mutex<Vec<(DeviceMedia, Vec<u8>)>>,
}

impl FakeMediaStore {
    pub fn push(&self, item: DeviceMedia, bytes: Vec<u8>) {
        self.items.lock().unwrap().push((item, bytes));
    }
}

#[async_trait]
impl MediaStore for FakeMediaStore {
    async fn media_added_after(&self, watermark: i64) -> SyncResult<Vec<DeviceMedia>> {
        let mut items: Vec<DeviceMedia> = self
            .items
            .lock()
            .unwrap()
            .iter()
            .filter(|(item, _)| item.date_added > watermark)
            .map(|(item, _)| item.clone())
            .collect();
        items.sort_by_key(|item| item.date_added);
        Ok(items)
    }

    async fn open(&self, item: &DeviceMedia) -> SyncResult<Vec<u8>> {
        self.items
            .lock()
            .unwrap()
            .iter()
            .find(|(stored, _)| stored.id == item.id)
            .map(|(_, bytes)| bytes.clone())
            .ok_or_else(|| SyncError::Io(format!("{} vanished", item.name)))
    }
}

// =============================================================================
// Harness
// =============================================================================

pub fn config() -> SyncConfig {
    let mut config = SyncConfig::default();
    config.account.server_url = "https://cloud.example.com/nextcloud".into();
    config.account.user = "alice".into();
    config.paths.resource_root = ROOT.into();
    config.sync.wifi_only = false;
    config
}

/// Engine over a fresh in-memory catalog and a temporary cache.
pub struct Harness {
    pub engine: SyncEngine,
    pub remote: Arc<FakeRemote>,
    pub media: Arc<FakeMediaStore>,
    _dir: TempDir,
}

impl Harness {
    pub async fn new() -> Harness {
        Self::with_config(config()).await
    }

    pub async fn with_config(config: SyncConfig) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let cache = MediaCache::new(dir.path().join("cache"));
        cache.ensure_dir().await.unwrap();

        let remote = FakeRemote::new();
        remote.add_folder(ROOT, 1, "root");
        let media = Arc::new(FakeMediaStore::default());
        let db = Database::new(DbConfig::in_memory()).await.unwrap();

        let engine = SyncEngineBuilder::new(config)
            .with_database(db)
            .with_remote(remote.clone())
            .with_media_store(media.clone())
            .with_cache(cache)
            .build()
            .unwrap();

        Harness {
            engine,
            remote,
            media,
            _dir: dir,
        }
    }

    pub fn db(&self) -> &Database {
        &self.engine.env().db
    }

    pub fn cache(&self) -> &MediaCache {
        &self.engine.env().cache
    }
}

// =============================================================================
// Fixtures
// =============================================================================

/// A 400x300 JPEG of album 10 taken and modified on `day`.
pub fn photo(id: &str, name: &str, etag: &str, day: u32) -> Photo {
    let mut photo = Photo::from_remote(id, "10", name, etag, "image/jpeg", at(day), at(day));
    photo.width = 400;
    photo.height = 300;
    photo
}

/// A synced album "Holiday" (id 10, tag `a1`) holding `photos`, with its
/// documents on the server and a local copy of the album document, all
/// dated day 1. The first photo is the cover.
pub async fn seed(h: &Harness, photos: &[Photo]) -> Album {
    let mut album = Album::from_remote("10", "Holiday", "a1", at(1), 0);
    album.flags.remove(AlbumFlags::EXCLUDED);
    album.cover = Cover::from_photo(&photos[0]);

    h.remote.add_folder("lespas/Holiday", 10, "a1");
    for p in photos {
        album.extend_range(p.date_taken);
        h.db().photos().upsert(p).await.unwrap();
        h.remote.add_file(
            &format!("lespas/Holiday/{}", p.name),
            p.id.parse().unwrap(),
            &p.etag,
            "image/jpeg",
            b"jpeg".to_vec(),
            p.last_modified,
        );
    }
    h.db().albums().upsert(&album).await.unwrap();

    let meta = AlbumMeta::new(album.cover.clone(), 0).encode().unwrap();
    h.remote.add_file("lespas/Holiday/10.json", 90, "m1", MIME_TYPE_JSON, meta.clone().into_bytes(), at(1));
    h.cache().write(&album_meta_file_name("10"), meta.as_bytes()).await.unwrap();
    h.cache().set_modified(&album_meta_file_name("10"), at(1)).await.unwrap();

    let content = ContentMeta::from_photos(photos).encode().unwrap();
    h.remote.add_file("lespas/Holiday/10-content.json", 91, "c1", MIME_TYPE_JSON, content.into_bytes(), at(1));
    album
}

/// True when the pass downloaded `path`.
pub fn downloaded(h: &Harness, path: &str) -> bool {
    h.remote.calls().contains(&format!("download {path}"))
}
