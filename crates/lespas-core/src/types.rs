//! # Domain Types
//!
//! Catalog types shared by the database layer and the sync engine.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Album       │   │     Photo       │   │     Cover       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  id (remote)    │◄──│  album_id       │   │  id (photo)     │       │
//! │  │  name, etag     │   │  id (remote or  │   │  baseline       │       │
//! │  │  date range     │   │   filename)     │   │  width/height   │       │
//! │  │  cover ─────────┼──►│  etag, name     │   │  file/mime/rot  │       │
//! │  │  flags, sort    │   │  dims, gps      │   └─────────────────┘       │
//! │  └─────────────────┘   └─────────────────┘                              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Confirmation Rule
//! An empty `etag` means "not yet confirmed on the remote". Such albums are
//! hidden from listings; such photos still carry their filename as id.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::cover;
use crate::meta::PhotoMeta;

/// Tag of anything that has not reached the remote yet.
pub const ETAG_NOT_YET_UPLOADED: &str = "";

/// Cover id of an album whose cover is not known yet.
pub const NO_COVER: &str = "";

/// GPS value of a photo that was probed and has no location.
pub const NO_GPS_DATA: f64 = -1000.0;

/// GPS value of a photo that has never been probed.
pub const GPS_DATA_UNKNOWN: f64 = -999.0;

/// Fallback MIME type for media without one.
pub const DEFAULT_MIME_TYPE: &str = "image/jpeg";

// =============================================================================
// Album Flags
// =============================================================================

/// Bit flags stored with every album.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AlbumFlags(u32);

impl AlbumFlags {
    /// Album folder is shared with other users.
    pub const SHARED: AlbumFlags = AlbumFlags(0b0001);

    /// Media stays on the server; the device keeps no full copies.
    pub const REMOTE: AlbumFlags = AlbumFlags(0b0010);

    /// Hidden from the album list (no cover yet).
    pub const EXCLUDED: AlbumFlags = AlbumFlags(0b0100);

    /// Flags given to albums created by another client.
    pub const DEFAULT: AlbumFlags = AlbumFlags::REMOTE;

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        AlbumFlags(bits)
    }

    #[inline]
    pub const fn bits(&self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(&self, other: AlbumFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: AlbumFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: AlbumFlags) {
        self.0 &= !other.0;
    }

    pub fn set(&mut self, other: AlbumFlags, on: bool) {
        if on {
            self.insert(other)
        } else {
            self.remove(other)
        }
    }
}

impl std::ops::BitOr for AlbumFlags {
    type Output = AlbumFlags;

    fn bitor(self, rhs: Self) -> Self::Output {
        AlbumFlags(self.0 | rhs.0)
    }
}

// =============================================================================
// Sort Order
// =============================================================================

/// How an album's photos are ordered for display and publishing.
///
/// The stored integer may carry view options above the hundreds digit;
/// only `code % 100` selects the ordering.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortOrder {
    DateTakenAsc,
    DateTakenDesc,
    NameAsc,
    NameDesc,
    Unsorted,
}

impl SortOrder {
    pub const DATE_TAKEN_ASC: i32 = 0;
    pub const DATE_TAKEN_DESC: i32 = 1;
    pub const NAME_ASC: i32 = 2;
    pub const NAME_DESC: i32 = 3;

    pub fn from_code(code: i32) -> Self {
        match code % 100 {
            Self::DATE_TAKEN_ASC => SortOrder::DateTakenAsc,
            Self::DATE_TAKEN_DESC => SortOrder::DateTakenDesc,
            Self::NAME_ASC => SortOrder::NameAsc,
            Self::NAME_DESC => SortOrder::NameDesc,
            _ => SortOrder::Unsorted,
        }
    }

    /// Sorts photos in place. Name ordering ignores case.
    pub fn sort(&self, photos: &mut [Photo]) {
        match self {
            SortOrder::DateTakenAsc => photos.sort_by(|a, b| a.date_taken.cmp(&b.date_taken)),
            SortOrder::DateTakenDesc => photos.sort_by(|a, b| b.date_taken.cmp(&a.date_taken)),
            SortOrder::NameAsc => {
                photos.sort_by(|a, b| a.name.to_lowercase().cmp(&b.name.to_lowercase()))
            }
            SortOrder::NameDesc => {
                photos.sort_by(|a, b| b.name.to_lowercase().cmp(&a.name.to_lowercase()))
            }
            SortOrder::Unsorted => {}
        }
    }
}

// =============================================================================
// Cover
// =============================================================================

/// Album cover descriptor.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Cover {
    /// Photo id of the cover, [`NO_COVER`] when unknown.
    pub id: String,

    /// Top edge of the 21:9 crop band, in stored-orientation pixels.
    pub baseline: i32,

    pub width: i32,
    pub height: i32,
    pub file_name: String,
    pub mime_type: String,

    /// Clockwise rotation in degrees (0, 90, 180, 270).
    pub orientation: i32,
}

impl Cover {
    /// Cover built from a photo with the default centered crop.
    pub fn from_photo(photo: &Photo) -> Self {
        Cover {
            id: photo.id.clone(),
            baseline: cover::default_baseline(photo.width, photo.height, photo.orientation),
            width: photo.width,
            height: photo.height,
            file_name: photo.name.clone(),
            mime_type: photo.mime_type.clone(),
            orientation: photo.orientation,
        }
    }

    /// Cover ids still holding a filename (placeholder) contain a dot.
    pub fn is_confirmed(&self) -> bool {
        !self.id.is_empty() && !self.id.contains('.')
    }
}

// =============================================================================
// Album
// =============================================================================

/// A media album, one remote folder under the resource root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Album {
    /// Remote folder id, or a provisional local id until created remotely.
    pub id: String,

    pub name: String,

    /// Earliest capture date among the album's photos.
    pub start_date: Option<DateTime<Utc>>,

    /// Latest capture date among the album's photos.
    pub end_date: Option<DateTime<Utc>>,

    pub cover: Cover,

    pub last_modified: DateTime<Utc>,

    /// Raw sort order code, see [`SortOrder::from_code`].
    pub sort_order: i32,

    /// Remote content tag; empty while not confirmed.
    pub etag: String,

    pub flags: AlbumFlags,

    /// Progress of the running content sync, 1.0 when idle.
    pub sync_progress: f32,

    pub bgm_id: String,
    pub bgm_etag: String,
}

impl Album {
    /// An album first seen in the remote listing.
    ///
    /// Starts excluded from listings and without a cover.
    pub fn from_remote(
        id: impl Into<String>,
        name: impl Into<String>,
        etag: impl Into<String>,
        last_modified: DateTime<Utc>,
        sort_order: i32,
    ) -> Self {
        Album {
            id: id.into(),
            name: name.into(),
            start_date: None,
            end_date: None,
            cover: Cover::default(),
            last_modified,
            sort_order,
            etag: etag.into(),
            flags: AlbumFlags::DEFAULT | AlbumFlags::EXCLUDED,
            sync_progress: 1.0,
            bgm_id: String::new(),
            bgm_etag: String::new(),
        }
    }

    pub fn is_remote(&self) -> bool {
        self.flags.contains(AlbumFlags::REMOTE)
    }

    pub fn is_excluded(&self) -> bool {
        self.flags.contains(AlbumFlags::EXCLUDED)
    }

    pub fn is_shared(&self) -> bool {
        self.flags.contains(AlbumFlags::SHARED)
    }

    /// Folder names starting with a dot are hidden albums.
    pub fn is_hidden(&self) -> bool {
        is_hidden_name(&self.name)
    }

    pub fn is_confirmed(&self) -> bool {
        !self.etag.is_empty()
    }

    pub fn has_cover(&self) -> bool {
        self.cover.id != NO_COVER
    }

    /// Visible in album listings.
    pub fn is_listable(&self) -> bool {
        self.is_confirmed() && !self.is_excluded()
    }

    /// Widens the date range to include `date`.
    pub fn extend_range(&mut self, date: DateTime<Utc>) {
        self.start_date = Some(self.start_date.map_or(date, |start| start.min(date)));
        self.end_date = Some(self.end_date.map_or(date, |end| end.max(date)));
    }

    pub fn sort(&self) -> SortOrder {
        SortOrder::from_code(self.sort_order)
    }
}

/// Hidden folder rule shared by albums and media files.
pub fn is_hidden_name(name: &str) -> bool {
    name.starts_with('.')
}

// =============================================================================
// GPS
// =============================================================================

/// Photo location.
///
/// All four fields hold [`GPS_DATA_UNKNOWN`] before probing and
/// [`NO_GPS_DATA`] once probing found no location.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gps {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: f64,
    pub bearing: f64,
}

impl Gps {
    pub const UNKNOWN: Gps = Gps {
        latitude: GPS_DATA_UNKNOWN,
        longitude: GPS_DATA_UNKNOWN,
        altitude: GPS_DATA_UNKNOWN,
        bearing: GPS_DATA_UNKNOWN,
    };

    pub const ABSENT: Gps = Gps {
        latitude: NO_GPS_DATA,
        longitude: NO_GPS_DATA,
        altitude: NO_GPS_DATA,
        bearing: NO_GPS_DATA,
    };

    /// Location with latitude/longitude only.
    pub fn position(latitude: f64, longitude: f64) -> Self {
        Gps {
            latitude,
            longitude,
            altitude: NO_GPS_DATA,
            bearing: NO_GPS_DATA,
        }
    }

    pub fn is_unknown(&self) -> bool {
        self.latitude == GPS_DATA_UNKNOWN
    }

    pub fn has_position(&self) -> bool {
        self.latitude != GPS_DATA_UNKNOWN && self.latitude != NO_GPS_DATA
    }
}

impl Default for Gps {
    fn default() -> Self {
        Gps::UNKNOWN
    }
}

// =============================================================================
// Photo
// =============================================================================

/// A media item (still image or video) in an album.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Photo {
    /// Remote file id, or the filename before the first upload.
    pub id: String,

    pub album_id: String,
    pub name: String,

    /// Remote content tag; empty while not confirmed.
    pub etag: String,

    pub date_taken: DateTime<Utc>,
    pub last_modified: DateTime<Utc>,
    pub width: i32,
    pub height: i32,
    pub mime_type: String,

    /// Clockwise rotation in degrees (0, 90, 180, 270).
    pub orientation: i32,

    pub caption: String,
    pub gps: Gps,
}

impl Photo {
    /// A photo seen in a remote listing that still needs probing.
    ///
    /// `placeholder_date` stands in for the capture date until probing
    /// finds a better one.
    pub fn from_remote(
        id: impl Into<String>,
        album_id: impl Into<String>,
        name: impl Into<String>,
        etag: impl Into<String>,
        mime_type: impl Into<String>,
        last_modified: DateTime<Utc>,
        placeholder_date: DateTime<Utc>,
    ) -> Self {
        Photo {
            id: id.into(),
            album_id: album_id.into(),
            name: name.into(),
            etag: etag.into(),
            date_taken: placeholder_date,
            last_modified,
            width: 0,
            height: 0,
            mime_type: mime_type.into(),
            orientation: 0,
            caption: String::new(),
            gps: Gps::UNKNOWN,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        !self.etag.is_empty()
    }

    pub fn is_video(&self) -> bool {
        crate::media::is_video(&self.mime_type)
    }

    /// Height as displayed, after applying orientation.
    pub fn upright_height(&self) -> i32 {
        if is_sideways(self.orientation) {
            self.width
        } else {
            self.height
        }
    }

    /// The content meta entry describing this photo.
    pub fn to_meta(&self) -> PhotoMeta {
        PhotoMeta {
            id: self.id.clone(),
            name: self.name.clone(),
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

/// 90° and 270° swap width and height on display.
pub fn is_sideways(orientation: i32) -> bool {
    orientation == 90 || orientation == 270
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn photo(name: &str, day: u32) -> Photo {
        let date = Utc.with_ymd_and_hms(2023, 5, day, 12, 0, 0).unwrap();
        Photo::from_remote(name, "album", name, "tag", "image/jpeg", date, date)
    }

    #[test]
    fn test_flags() {
        let mut flags = AlbumFlags::DEFAULT | AlbumFlags::EXCLUDED;
        assert!(flags.contains(AlbumFlags::REMOTE));
        assert!(flags.contains(AlbumFlags::EXCLUDED));
        assert!(!flags.contains(AlbumFlags::SHARED));

        flags.remove(AlbumFlags::EXCLUDED);
        assert!(!flags.contains(AlbumFlags::EXCLUDED));

        flags.set(AlbumFlags::SHARED, true);
        assert_eq!(flags.bits(), AlbumFlags::REMOTE.bits() | AlbumFlags::SHARED.bits());
    }

    #[test]
    fn test_album_from_remote_is_not_listable_until_cover() {
        let album = Album::from_remote("100", "Trip", "etag", Utc::now(), 0);
        assert!(album.is_confirmed());
        assert!(album.is_excluded());
        assert!(!album.has_cover());
        assert!(!album.is_listable());
    }

    #[test]
    fn test_extend_range() {
        let mut album = Album::from_remote("100", "Trip", "etag", Utc::now(), 0);
        let may3 = photo("a.jpg", 3).date_taken;
        let may1 = photo("b.jpg", 1).date_taken;

        album.extend_range(may3);
        album.extend_range(may1);

        assert_eq!(album.start_date, Some(may1));
        assert_eq!(album.end_date, Some(may3));
    }

    #[test]
    fn test_sort_order_ignores_view_options() {
        assert_eq!(SortOrder::from_code(101), SortOrder::DateTakenDesc);
        assert_eq!(SortOrder::from_code(2), SortOrder::NameAsc);
        assert_eq!(SortOrder::from_code(42), SortOrder::Unsorted);
    }

    #[test]
    fn test_sort_by_name_is_case_insensitive() {
        let mut photos = vec![photo("b.jpg", 1), photo("A.jpg", 2), photo("c.jpg", 3)];
        SortOrder::NameAsc.sort(&mut photos);
        let names: Vec<_> = photos.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["A.jpg", "b.jpg", "c.jpg"]);

        SortOrder::DateTakenDesc.sort(&mut photos);
        assert_eq!(photos[0].name, "c.jpg");
    }

    #[test]
    fn test_gps_sentinels_are_distinct() {
        assert!(Gps::UNKNOWN.is_unknown());
        assert!(!Gps::ABSENT.is_unknown());
        assert!(!Gps::ABSENT.has_position());
        assert!(Gps::position(22.3, 114.1).has_position());
        assert_eq!(Photo::from_remote("1", "a", "n", "t", "image/png", Utc::now(), Utc::now()).gps, Gps::UNKNOWN);
    }

    #[test]
    fn test_cover_confirmation() {
        let mut cover = Cover::from_photo(&photo("IMG1.jpg", 1));
        assert!(!cover.is_confirmed());
        cover.id = "12345678".into();
        assert!(cover.is_confirmed());
    }
}
