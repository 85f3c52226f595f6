//! # Meta Documents
//!
//! JSON documents stored next to the media in every album folder.
//!
//! ## Documents
//! ```text
//! {albumId}.json
//!   {"lespas":{"cover":{"id","filename","baseline","width","height",
//!                       "mimetype","orientation"},"sort":N,"version":2}}
//!
//! {albumId}-content.json
//!   {"lespas":{"version":2,"photos":[{"id","name","stime","mime","width",
//!              "height","orientation","caption","latitude","longitude",
//!              "altitude","bearing"}, ...]}}
//! ```
//!
//! ## Compatibility
//! Version 1 documents lack `mimetype`/`orientation` on the cover and
//! `orientation`/`caption`/GPS on photos. A missing `version` means 1.
//! Decoding always succeeds for such documents; absent fields fall back to
//! defaults and are reported so callers can decide whether to trust them.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{MetaError, MetaResult};
use crate::types::{Cover, Gps, Photo};

/// Version written by this crate.
pub const META_VERSION: u32 = 2;

// =============================================================================
// Wire Format
// =============================================================================

#[derive(Serialize, Deserialize)]
struct Envelope<T> {
    lespas: Option<T>,
}

#[derive(Serialize, Deserialize)]
struct AlbumBody {
    cover: Option<CoverBody>,
    #[serde(default)]
    sort: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
}

#[derive(Serialize, Deserialize)]
struct CoverBody {
    id: String,
    #[serde(default)]
    filename: String,
    #[serde(default)]
    baseline: i32,
    #[serde(default)]
    width: i32,
    #[serde(default)]
    height: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    mimetype: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    orientation: Option<i32>,
}

#[derive(Serialize, Deserialize)]
struct ContentBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    version: Option<u32>,
    #[serde(default)]
    photos: Vec<PhotoBody>,
}

#[derive(Serialize, Deserialize)]
struct PhotoBody {
    id: String,
    name: String,
    #[serde(with = "chrono::serde::ts_milliseconds")]
    stime: DateTime<Utc>,
    mime: String,
    width: i32,
    height: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    orientation: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    caption: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    latitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    longitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    altitude: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    bearing: Option<f64>,
}

/// Five decimal places, as stored on the server.
fn round_gps(value: f64) -> f64 {
    (value * 1e5).round() / 1e5
}

// =============================================================================
// Album Meta
// =============================================================================

/// Decoded album document.
#[derive(Debug, Clone, PartialEq)]
pub struct AlbumMeta {
    pub version: u32,

    /// Cover descriptor. Version 1 documents leave `mime_type` empty and
    /// `orientation` at 0.
    pub cover: Cover,

    pub sort_order: i32,
}

impl AlbumMeta {
    pub fn new(cover: Cover, sort_order: i32) -> Self {
        AlbumMeta {
            version: META_VERSION,
            cover,
            sort_order,
        }
    }

    /// True when the cover carries MIME type and orientation (version 2+).
    pub fn has_full_cover(&self) -> bool {
        !self.cover.mime_type.is_empty()
    }

    /// Always writes the current version.
    pub fn encode(&self) -> MetaResult<String> {
        let body = AlbumBody {
            cover: Some(CoverBody {
                id: self.cover.id.clone(),
                filename: self.cover.file_name.clone(),
                baseline: self.cover.baseline,
                width: self.cover.width,
                height: self.cover.height,
                mimetype: Some(self.cover.mime_type.clone()),
                orientation: Some(self.cover.orientation),
            }),
            sort: self.sort_order,
            version: Some(META_VERSION),
        };
        Ok(serde_json::to_string(&Envelope { lespas: Some(body) })?)
    }

    pub fn decode(json: &str) -> MetaResult<Self> {
        let envelope: Envelope<AlbumBody> = serde_json::from_str(json)?;
        let body = envelope.lespas.ok_or(MetaError::MissingObject("lespas"))?;
        let cover = body.cover.ok_or(MetaError::MissingObject("cover"))?;

        Ok(AlbumMeta {
            version: body.version.unwrap_or(1),
            cover: Cover {
                id: cover.id,
                baseline: cover.baseline,
                width: cover.width,
                height: cover.height,
                file_name: cover.filename,
                mime_type: cover.mimetype.unwrap_or_default(),
                orientation: cover.orientation.unwrap_or(0),
            },
            sort_order: body.sort,
        })
    }
}

// =============================================================================
// Content Meta
// =============================================================================

/// One photo entry of a content document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PhotoMeta {
    pub id: String,
    pub name: String,
    pub date_taken: DateTime<Utc>,
    pub mime_type: String,
    pub width: i32,
    pub height: i32,
    pub orientation: i32,
    pub caption: String,
    pub gps: Gps,
}

impl PhotoMeta {
    /// Catalog row for this entry; tag and last-modified come from the listing.
    pub fn into_photo(
        self,
        album_id: &str,
        etag: &str,
        last_modified: DateTime<Utc>,
    ) -> Photo {
        Photo {
            id: self.id,
            album_id: album_id.to_string(),
            name: self.name,
            etag: etag.to_string(),
            date_taken: self.date_taken,
            last_modified,
            width: self.width,
            height: self.height,
            mime_type: self.mime_type,
            orientation: self.orientation,
            caption: self.caption,
            gps: self.gps,
        }
    }
}

/// Decoded content document.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContentMeta {
    pub version: u32,
    pub photos: Vec<PhotoMeta>,

    /// Ids of entries written without `orientation` (older clients).
    pub missing_orientation: BTreeSet<String>,
}

impl ContentMeta {
    pub fn new(photos: Vec<PhotoMeta>) -> Self {
        ContentMeta {
            version: META_VERSION,
            photos,
            missing_orientation: BTreeSet::new(),
        }
    }

    pub fn from_photos<'a>(photos: impl IntoIterator<Item = &'a Photo>) -> Self {
        Self::new(photos.into_iter().map(Photo::to_meta).collect())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.photos.iter().any(|p| p.id == id)
    }

    /// Merges entries whose ids are not present yet. Existing entries win.
    pub fn merge(&mut self, other: ContentMeta) {
        for photo in other.photos {
            if !self.contains(&photo.id) {
                self.photos.push(photo);
            }
        }
    }

    /// Always writes the current version, GPS rounded to five decimals.
    pub fn encode(&self) -> MetaResult<String> {
        let photos = self
            .photos
            .iter()
            .map(|p| PhotoBody {
                id: p.id.clone(),
                name: p.name.clone(),
                stime: p.date_taken,
                mime: p.mime_type.clone(),
                width: p.width,
                height: p.height,
                orientation: Some(p.orientation),
                caption: Some(p.caption.clone()),
                latitude: Some(round_gps(p.gps.latitude)),
                longitude: Some(round_gps(p.gps.longitude)),
                altitude: Some(round_gps(p.gps.altitude)),
                bearing: Some(round_gps(p.gps.bearing)),
            })
            .collect();

        let body = ContentBody {
            version: Some(META_VERSION),
            photos,
        };
        Ok(serde_json::to_string(&Envelope { lespas: Some(body) })?)
    }

    pub fn decode(json: &str) -> MetaResult<Self> {
        let envelope: Envelope<ContentBody> = serde_json::from_str(json)?;
        let body = envelope.lespas.ok_or(MetaError::MissingObject("lespas"))?;

        let mut missing_orientation = BTreeSet::new();
        let photos = body
            .photos
            .into_iter()
            .map(|p| {
                if p.orientation.is_none() {
                    missing_orientation.insert(p.id.clone());
                }
                let unknown = Gps::UNKNOWN;
                PhotoMeta {
                    id: p.id,
                    name: p.name,
                    date_taken: p.stime,
                    mime_type: p.mime,
                    width: p.width,
                    height: p.height,
                    orientation: p.orientation.unwrap_or(0),
                    caption: p.caption.unwrap_or_default(),
                    gps: Gps {
                        latitude: p.latitude.unwrap_or(unknown.latitude),
                        longitude: p.longitude.unwrap_or(unknown.longitude),
                        altitude: p.altitude.unwrap_or(unknown.altitude),
                        bearing: p.bearing.unwrap_or(unknown.bearing),
                    },
                }
            })
            .collect();

        Ok(ContentMeta {
            version: body.version.unwrap_or(1),
            photos,
            missing_orientation,
        })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
