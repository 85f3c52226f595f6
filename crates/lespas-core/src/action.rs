//! # Pending Actions
//!
//! Local mutations waiting to be applied to the remote store.
//!
//! ## Two Representations
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │   UI / dialogs                      Sync engine                         │
//! │        │                                 ▲                              │
//! │        │ Action::to_record()             │ Action::from_record()        │
//! │        ▼                                 │                              │
//! │   ┌───────────────────────────────────────────────────────────┐        │
//! │   │ ActionRecord (row in the `actions` table)                 │        │
//! │   │  kind │ folder_id │ folder_name │ file_id │ file_name │   │        │
//! │   │       │ payload   │ date        │ flags               │   │        │
//! │   └───────────────────────────────────────────────────────────┘        │
//! │                                                                         │
//! │   The record keeps five free-form strings whose meaning depends on      │
//! │   `kind`. The enum gives every variant named, typed fields.             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Ordering
//! Records are applied strictly by ascending `id` (enqueue order).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::meta::PhotoMeta;
use crate::types::{AlbumFlags, Gps};

// =============================================================================
// Action Kind
// =============================================================================

/// Persisted discriminant of an action record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[repr(i32)]
pub enum ActionKind {
    AddFile = 1,
    DeleteFile = 2,
    DeleteDirectory = 3,
    AddDirectory = 4,
    RenameDirectory = 5,
    RenameFile = 6,
    UpdateAlbumMeta = 7,
    UpdateContentMeta = 8,
    AddFileToJointAlbum = 9,
    Copy = 10,
    Move = 11,
    UpdateJointAlbumContent = 12,
    RefreshAlbumList = 13,
    UpdateAlbumBgm = 14,
    DeleteAlbumBgm = 15,
    PatchProperties = 16,
    DeleteCameraBackupFile = 17,
    CreateBlogPost = 18,
    DeleteBlogPost = 19,
    UpdateBlogSiteTitle = 20,
}

impl ActionKind {
    pub fn code(&self) -> i32 {
        *self as i32
    }

    pub fn from_code(code: i32) -> Result<Self, CoreError> {
        let kind = match code {
            1 => ActionKind::AddFile,
            2 => ActionKind::DeleteFile,
            3 => ActionKind::DeleteDirectory,
            4 => ActionKind::AddDirectory,
            5 => ActionKind::RenameDirectory,
            6 => ActionKind::RenameFile,
            7 => ActionKind::UpdateAlbumMeta,
            8 => ActionKind::UpdateContentMeta,
            9 => ActionKind::AddFileToJointAlbum,
            10 => ActionKind::Copy,
            11 => ActionKind::Move,
            12 => ActionKind::UpdateJointAlbumContent,
            13 => ActionKind::RefreshAlbumList,
            14 => ActionKind::UpdateAlbumBgm,
            15 => ActionKind::DeleteAlbumBgm,
            16 => ActionKind::PatchProperties,
            17 => ActionKind::DeleteCameraBackupFile,
            18 => ActionKind::CreateBlogPost,
            19 => ActionKind::DeleteBlogPost,
            20 => ActionKind::UpdateBlogSiteTitle,
            other => return Err(CoreError::UnknownActionKind(other)),
        };
        Ok(kind)
    }

    /// Short name used in logs and progress events.
    pub fn as_str(&self) -> &'static str {
        match self {
            ActionKind::AddFile => "add_file",
            ActionKind::DeleteFile => "delete_file",
            ActionKind::DeleteDirectory => "delete_directory",
            ActionKind::AddDirectory => "add_directory",
            ActionKind::RenameDirectory => "rename_directory",
            ActionKind::RenameFile => "rename_file",
            ActionKind::UpdateAlbumMeta => "update_album_meta",
            ActionKind::UpdateContentMeta => "update_content_meta",
            ActionKind::AddFileToJointAlbum => "add_file_to_joint_album",
            ActionKind::Copy => "copy",
            ActionKind::Move => "move",
            ActionKind::UpdateJointAlbumContent => "update_joint_album_content",
            ActionKind::RefreshAlbumList => "refresh_album_list",
            ActionKind::UpdateAlbumBgm => "update_album_bgm",
            ActionKind::DeleteAlbumBgm => "delete_album_bgm",
            ActionKind::PatchProperties => "patch_properties",
            ActionKind::DeleteCameraBackupFile => "delete_camera_backup_file",
            ActionKind::CreateBlogPost => "create_blog_post",
            ActionKind::DeleteBlogPost => "delete_blog_post",
            ActionKind::UpdateBlogSiteTitle => "update_blog_site_title",
        }
    }
}

impl std::fmt::Display for ActionKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Action Record
// =============================================================================

/// One row of the pending action queue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionRecord {
    /// Queue position; `None` until inserted.
    pub id: Option<i64>,
    pub kind: i32,
    pub folder_id: String,
    pub folder_name: String,
    pub file_id: String,
    pub file_name: String,
    pub payload: String,
    pub date: DateTime<Utc>,
    pub flags: i32,
}

impl ActionRecord {
    fn new(kind: ActionKind, date: DateTime<Utc>) -> Self {
        ActionRecord {
            id: None,
            kind: kind.code(),
            folder_id: String::new(),
            folder_name: String::new(),
            file_id: String::new(),
            file_name: String::new(),
            payload: String::new(),
            date,
            flags: 0,
        }
    }

    fn folder(mut self, id: &str, name: &str) -> Self {
        self.folder_id = id.to_string();
        self.folder_name = name.to_string();
        self
    }

    fn file(mut self, id: &str, name: &str) -> Self {
        self.file_id = id.to_string();
        self.file_name = name.to_string();
        self
    }

    fn payload(mut self, payload: String) -> Self {
        self.payload = payload;
        self
    }

    fn flags(mut self, flags: i32) -> Self {
        self.flags = flags;
        self
    }
}

// =============================================================================
// Action
// =============================================================================

/// Remote copy or move.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferMode {
    Copy,
    Move,
}

impl TransferMode {
    pub fn is_copy(&self) -> bool {
        matches!(self, TransferMode::Copy)
    }
}

/// A pending local mutation.
///
/// Paths are relative to the resource root unless stated otherwise.
#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    /// Upload a cached media file into an album folder.
    AddFile {
        mime_type: String,
        album_name: String,
        /// Placeholder id of the photo row, usually the filename.
        photo_id: String,
        file_name: String,
        album_flags: AlbumFlags,
    },

    DeleteFile {
        album_id: String,
        album_name: String,
        photo_id: String,
        file_name: String,
    },

    DeleteDirectory {
        album_id: String,
        album_name: String,
    },

    /// Create an album folder; a new folder id re-keys the provisional album.
    AddDirectory {
        album_id: String,
        album_name: String,
    },

    RenameDirectory {
        album_id: String,
        old_name: String,
        new_name: String,
    },

    RenameFile {
        album_name: String,
        old_name: String,
        new_name: String,
    },

    UpdateAlbumMeta {
        album_name: String,
    },

    UpdateContentMeta {
        album_name: String,
    },

    /// Upload a local file into a joint album shared by another user.
    ///
    /// `share_path` is relative to the DAV home.
    AddFileToJointAlbum {
        mime_type: String,
        share_path: String,
        file_name: String,
        meta: SharedPhotoMeta,
    },

    /// Copy or move `{source_folder}/{file_name}` into `target_folder`.
    ///
    /// Both folders are relative to the DAV home.
    Transfer {
        mode: TransferMode,
        source_folder: String,
        target_folder: String,
        file_name: String,
        target_is_joint: bool,
        meta: Option<SharedPhotoMeta>,
    },

    /// Merge the local change log into a joint album's content document.
    UpdateJointAlbumContent {
        album_id: String,
        share_path: String,
    },

    RefreshAlbumList,

    UpdateAlbumBgm {
        album_id: String,
        album_name: String,
        mime_type: String,
    },

    DeleteAlbumBgm {
        album_name: String,
    },

    /// PROPPATCH `{folder}/{file_name}` with a `<d:set>` property fragment.
    ///
    /// `folder` is relative to the DAV home.
    PatchProperties {
        folder: String,
        file_name: String,
        payload: String,
    },

    /// Delete a file from the device archive, `folder` relative to the DCIM root.
    DeleteCameraBackupFile {
        folder: String,
        file_name: String,
    },

    CreateBlogPost {
        album_id: String,
        album_name: String,
        theme: String,
    },

    DeleteBlogPost {
        album_id: String,
    },

    UpdateBlogSiteTitle,
}

impl Action {
    pub fn kind(&self) -> ActionKind {
        match self {
            Action::AddFile { .. } => ActionKind::AddFile,
            Action::DeleteFile { .. } => ActionKind::DeleteFile,
            Action::DeleteDirectory { .. } => ActionKind::DeleteDirectory,
            Action::AddDirectory { .. } => ActionKind::AddDirectory,
            Action::RenameDirectory { .. } => ActionKind::RenameDirectory,
            Action::RenameFile { .. } => ActionKind::RenameFile,
            Action::UpdateAlbumMeta { .. } => ActionKind::UpdateAlbumMeta,
            Action::UpdateContentMeta { .. } => ActionKind::UpdateContentMeta,
            Action::AddFileToJointAlbum { .. } => ActionKind::AddFileToJointAlbum,
            Action::Transfer { mode: TransferMode::Copy, .. } => ActionKind::Copy,
            Action::Transfer { mode: TransferMode::Move, .. } => ActionKind::Move,
            Action::UpdateJointAlbumContent { .. } => ActionKind::UpdateJointAlbumContent,
            Action::RefreshAlbumList => ActionKind::RefreshAlbumList,
            Action::UpdateAlbumBgm { .. } => ActionKind::UpdateAlbumBgm,
            Action::DeleteAlbumBgm { .. } => ActionKind::DeleteAlbumBgm,
            Action::PatchProperties { .. } => ActionKind::PatchProperties,
            Action::DeleteCameraBackupFile { .. } => ActionKind::DeleteCameraBackupFile,
            Action::CreateBlogPost { .. } => ActionKind::CreateBlogPost,
            Action::DeleteBlogPost { .. } => ActionKind::DeleteBlogPost,
            Action::UpdateBlogSiteTitle => ActionKind::UpdateBlogSiteTitle,
        }
    }

    /// Flattens the action into its queue row.
    pub fn to_record(&self, date: DateTime<Utc>) -> ActionRecord {
        let record = ActionRecord::new(self.kind(), date);
        match self {
            Action::AddFile {
                mime_type,
                album_name,
                photo_id,
                file_name,
                album_flags,
            } => record
                .folder(mime_type, album_name)
                .file(photo_id, file_name)
                .flags(album_flags.bits() as i32),
            Action::DeleteFile {
                album_id,
                album_name,
                photo_id,
                file_name,
            } => record.folder(album_id, album_name).file(photo_id, file_name),
            Action::DeleteDirectory { album_id, album_name }
            | Action::AddDirectory { album_id, album_name } => record.folder(album_id, album_name),
            Action::RenameDirectory {
                album_id,
                old_name,
                new_name,
            } => record.folder(album_id, old_name).file("", new_name),
            Action::RenameFile {
                album_name,
                old_name,
                new_name,
            } => record.folder("", album_name).file(old_name, new_name),
            Action::UpdateAlbumMeta { album_name } | Action::UpdateContentMeta { album_name } => {
                record.folder("", album_name)
            }
            Action::AddFileToJointAlbum {
                mime_type,
                share_path,
                file_name,
                meta,
            } => record
                .folder(mime_type, share_path)
                .file("", file_name)
                .payload(meta.encode()),
            Action::Transfer {
                source_folder,
                target_folder,
                file_name,
                target_is_joint,
                meta,
                ..
            } => record
                .folder(source_folder, target_folder)
                .file("", file_name)
                .payload(meta.as_ref().map(SharedPhotoMeta::encode).unwrap_or_default())
                .flags(i32::from(*target_is_joint)),
            Action::UpdateJointAlbumContent { album_id, share_path } => {
                record.folder(album_id, share_path)
            }
            Action::RefreshAlbumList | Action::UpdateBlogSiteTitle => record,
            Action::UpdateAlbumBgm {
                album_id,
                album_name,
                mime_type,
            } => record.folder(album_id, album_name).file("", mime_type),
            Action::DeleteAlbumBgm { album_name } => record.folder("", album_name),
            Action::PatchProperties {
                folder,
                file_name,
                payload,
            } => record
                .folder("", folder)
                .file("", file_name)
                .payload(payload.clone()),
            Action::DeleteCameraBackupFile { folder, file_name } => {
                record.folder("", folder).file("", file_name)
            }
            Action::CreateBlogPost {
                album_id,
                album_name,
                theme,
            } => record.folder(album_id, album_name).file(theme, ""),
            Action::DeleteBlogPost { album_id } => record.folder(album_id, ""),
        }
    }

    /// Interprets a queue row.
    pub fn from_record(record: &ActionRecord) -> Result<Self, CoreError> {
        let kind = ActionKind::from_code(record.kind)?;
        let r = record;
        let action = match kind {
            ActionKind::AddFile => Action::AddFile {
                mime_type: r.folder_id.clone(),
                album_name: r.folder_name.clone(),
                photo_id: r.file_id.clone(),
                file_name: r.file_name.clone(),
                album_flags: AlbumFlags::from_bits(r.flags as u32),
            },
            ActionKind::DeleteFile => Action::DeleteFile {
                album_id: r.folder_id.clone(),
                album_name: r.folder_name.clone(),
                photo_id: r.file_id.clone(),
                file_name: r.file_name.clone(),
            },
            ActionKind::DeleteDirectory => Action::DeleteDirectory {
                album_id: r.folder_id.clone(),
                album_name: r.folder_name.clone(),
            },
            ActionKind::AddDirectory => Action::AddDirectory {
                album_id: r.folder_id.clone(),
                album_name: r.folder_name.clone(),
            },
            ActionKind::RenameDirectory => Action::RenameDirectory {
                album_id: r.folder_id.clone(),
                old_name: r.folder_name.clone(),
                new_name: r.file_name.clone(),
            },
            ActionKind::RenameFile => Action::RenameFile {
                album_name: r.folder_name.clone(),
                old_name: r.file_id.clone(),
                new_name: r.file_name.clone(),
            },
            ActionKind::UpdateAlbumMeta => Action::UpdateAlbumMeta {
                album_name: r.folder_name.clone(),
            },
            ActionKind::UpdateContentMeta => Action::UpdateContentMeta {
                album_name: r.folder_name.clone(),
            },
            ActionKind::AddFileToJointAlbum => Action::AddFileToJointAlbum {
                mime_type: r.folder_id.clone(),
                share_path: r.folder_name.clone(),
                file_name: r.file_name.clone(),
                meta: SharedPhotoMeta::decode(&r.payload)?,
            },
            ActionKind::Copy | ActionKind::Move => Action::Transfer {
                mode: if kind == ActionKind::Copy {
                    TransferMode::Copy
                } else {
                    TransferMode::Move
                },
                source_folder: r.folder_id.clone(),
                target_folder: r.folder_name.clone(),
                file_name: r.file_name.clone(),
                target_is_joint: r.flags != 0,
                meta: if r.payload.is_empty() {
                    None
                } else {
                    Some(SharedPhotoMeta::decode(&r.payload)?)
                },
            },
            ActionKind::UpdateJointAlbumContent => Action::UpdateJointAlbumContent {
                album_id: r.folder_id.clone(),
                share_path: r.folder_name.clone(),
            },
            ActionKind::RefreshAlbumList => Action::RefreshAlbumList,
            ActionKind::UpdateAlbumBgm => Action::UpdateAlbumBgm {
                album_id: r.folder_id.clone(),
                album_name: r.folder_name.clone(),
                mime_type: r.file_name.clone(),
            },
            ActionKind::DeleteAlbumBgm => Action::DeleteAlbumBgm {
                album_name: r.folder_name.clone(),
            },
            ActionKind::PatchProperties => Action::PatchProperties {
                folder: r.folder_name.clone(),
                file_name: r.file_name.clone(),
                payload: r.payload.clone(),
            },
            ActionKind::DeleteCameraBackupFile => Action::DeleteCameraBackupFile {
                folder: r.folder_name.clone(),
                file_name: r.file_name.clone(),
            },
            ActionKind::CreateBlogPost => Action::CreateBlogPost {
                album_id: r.folder_id.clone(),
                album_name: r.folder_name.clone(),
                theme: r.file_id.clone(),
            },
            ActionKind::DeleteBlogPost => Action::DeleteBlogPost {
                album_id: r.folder_id.clone(),
            },
            ActionKind::UpdateBlogSiteTitle => Action::UpdateBlogSiteTitle,
        };
        Ok(action)
    }
}

// =============================================================================
// Shared Photo Meta
// =============================================================================

/// Photo meta carried by actions that target joint albums.
///
/// Encoded as eleven `|`-separated fields:
/// `albumId|dateTakenMillis|mime|width|height|orientation|caption|lat|lon|alt|bearing`.
/// The caption sits between six leading and four trailing fields, so it may
/// itself contain `|`.
#[derive(Debug, Clone, PartialEq)]
pub struct SharedPhotoMeta {
    /// Id of the joint album, names its change log.
    pub album_id: String,
    pub date_taken: DateTime<Utc>,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    pub orientation: i32,
    pub caption: String,
    pub gps: Gps,
}

const LEADING_FIELDS: usize = 6;
const TRAILING_FIELDS: usize = 4;

impl SharedPhotoMeta {
    pub fn encode(&self) -> String {
        format!(
            "{}|{}|{}|{}|{}|{}|{}|{}|{}|{}|{}",
            self.album_id,
            self.date_taken.timestamp_millis(),
            self.mime_type,
            self.width,
            self.height,
            self.orientation,
            self.caption,
            self.gps.latitude,
            self.gps.longitude,
            self.gps.altitude,
            self.gps.bearing,
        )
    }

    pub fn decode(payload: &str) -> Result<Self, CoreError> {
        let invalid = |reason: String| CoreError::invalid_payload("joint album", reason);

        let leading: Vec<&str> = payload.splitn(LEADING_FIELDS + 1, '|').collect();
        if leading.len() != LEADING_FIELDS + 1 {
            return Err(invalid(format!("expected 11 fields in '{payload}'")));
        }
        let rest = leading[LEADING_FIELDS];
        let mut trailing: Vec<&str> = rest.rsplitn(TRAILING_FIELDS + 1, '|').collect();
        if trailing.len() != TRAILING_FIELDS + 1 {
            return Err(invalid(format!("expected 11 fields in '{payload}'")));
        }
        trailing.reverse();

        let int = |s: &str, field: &str| {
            s.parse::<i32>()
                .map_err(|_| invalid(format!("{field} '{s}' is not an integer")))
        };
        let float = |s: &str, field: &str| {
            s.parse::<f64>()
                .map_err(|_| invalid(format!("{field} '{s}' is not a number")))
        };

        let millis = leading[1]
            .parse::<i64>()
            .map_err(|_| invalid(format!("date '{}' is not epoch millis", leading[1])))?;
        let date_taken = DateTime::from_timestamp_millis(millis)
            .ok_or_else(|| invalid(format!("date {millis} out of range")))?;

        Ok(SharedPhotoMeta {
            album_id: leading[0].to_string(),
            date_taken,
            mime_type: leading[2].to_string(),
            width: int(leading[3], "width")?,
            height: int(leading[4], "height")?,
            orientation: int(leading[5], "orientation")?,
            caption: trailing[0].to_string(),
            gps: Gps {
                latitude: float(trailing[1], "latitude")?,
                longitude: float(trailing[2], "longitude")?,
                altitude: float(trailing[3], "altitude")?,
                bearing: float(trailing[4], "bearing")?,
            },
        })
    }

    /// Content meta entry for the file once it has a remote id.
    pub fn to_photo_meta(&self, id: &str, name: &str) -> PhotoMeta {
        PhotoMeta {
            id: id.to_string(),
            name: name.to_string(),
            date_taken: self.date_taken,
            mime_type: self.mime_type.clone(),
            width: self.width,
            height: self.height,
            orientation: self.orientation,
            caption: self.caption.clone(),
            gps: self.gps,
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
