//! # lespas-core: Pure Domain Logic for Les Pas Sync
//!
//! Albums, photos, queued actions and the rules around them, with zero I/O.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Les Pas Sync Architecture                        │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │          Gallery / viewer / dialogs (outside this workspace)     │   │
//! │  │     enqueue actions ──► read catalog                            │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ lespas-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌──────────┐  ┌──────────┐  ┌──────────┐  ┌──────────────┐   │   │
//! │  │   │  types   │  │  action  │  │   meta   │  │ cover/media/ │   │   │
//! │  │   │  Album   │  │  Action  │  │  JSON v1 │  │   capture    │   │   │
//! │  │   │  Photo   │  │  Record  │  │  JSON v2 │  │    rules     │   │   │
//! │  │   └──────────┘  └──────────┘  └──────────┘  └──────────────┘   │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK • PURE FUNCTIONS           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │          lespas-db (catalog)  ·  lespas-sync (engine)           │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Album, Photo, Cover, flags and GPS sentinels
//! - [`action`] - Pending action enum and its persisted record form
//! - [`meta`] - Album and content meta document codec
//! - [`cover`] - Default cover baseline and 21:9 crop geometry
//! - [`media`] - MIME rules and remote id normalization
//! - [`capture`] - Capture date rules (filename dates, tie-break)
//! - [`error`] - Domain error types

// =============================================================================
// Module Declarations
// =============================================================================

pub mod action;
pub mod capture;
pub mod cover;
pub mod error;
pub mod media;
pub mod meta;
pub mod types;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use action::{Action, ActionKind, ActionRecord, SharedPhotoMeta, TransferMode};
pub use error::{CoreError, MetaError};
pub use meta::{AlbumMeta, ContentMeta, PhotoMeta};
pub use types::*;

// =============================================================================
// Remote Naming Conventions
// =============================================================================

/// Suffix of the per-album content meta document, `{albumId}-content.json`.
pub const CONTENT_META_FILE_SUFFIX: &str = "-content.json";

/// Suffix of the local change log kept for joint albums.
pub const CHANGE_LOG_FILE_SUFFIX: &str = "-changelog";

/// Background music file name inside an album folder.
pub const BGM_FILE_NAME_ON_SERVER: &str = ".bgm";

/// Suffix of the local copy of an album's background music, `{albumId}.bgm`.
pub const BGM_FILE_SUFFIX: &str = ".bgm";

/// Suffix of a video thumbnail kept next to the cached media file.
pub const THUMBNAIL_SUFFIX: &str = ".thumbnail";

/// Blog site folder inside the resource root. Never synced as an album.
pub const BLOG_FOLDER: &str = ".__picoblog__";

pub const MIME_TYPE_JSON: &str = "application/json";
pub const MIME_TYPE_MARKDOWN: &str = "text/markdown";
pub const MIME_TYPE_JPEG: &str = "image/jpeg";

/// Album meta documents newer than the local copy by more than this are
/// assumed to come from another client.
pub const META_SKEW_TOLERANCE_MS: i64 = 180_000;

/// `{albumId}.json`
pub fn album_meta_file_name(album_id: &str) -> String {
    format!("{album_id}.json")
}

/// `{albumId}-content.json`
pub fn content_meta_file_name(album_id: &str) -> String {
    format!("{album_id}{CONTENT_META_FILE_SUFFIX}")
}

/// `{albumId}-changelog`
pub fn change_log_file_name(album_id: &str) -> String {
    format!("{album_id}{CHANGE_LOG_FILE_SUFFIX}")
}

/// `{albumId}.bgm`
pub fn bgm_file_name(album_id: &str) -> String {
    format!("{album_id}{BGM_FILE_SUFFIX}")
}

/// `{mediaId}.thumbnail`
pub fn thumbnail_file_name(media: &str) -> String {
    format!("{media}{THUMBNAIL_SUFFIX}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sidecar_names() {
        assert_eq!(album_meta_file_name("1234"), "1234.json");
        assert_eq!(content_meta_file_name("1234"), "1234-content.json");
        assert_eq!(change_log_file_name("1234"), "1234-changelog");
        assert_eq!(bgm_file_name("1234"), "1234.bgm");
        assert_eq!(thumbnail_file_name("IMG1.mp4"), "IMG1.mp4.thumbnail");
    }
}
