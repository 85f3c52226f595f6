//! # MP4 / QuickTime Box Reader
//!
//! Reads just enough of an ISO-BMFF container to describe a video.
//!
//! ```text
//! ftyp
//! moov
//! ├── mvhd            creation_time (seconds since 1904-01-01)
//! ├── trak
//! │   ├── tkhd        matrix (rotation), width/height (16.16 fixed)
//! │   └── mdia
//! │       └── hdlr    handler "vide" marks the video track
//! └── udta
//!     └── ©xyz        ISO 6709 location, e.g. "+37.7858-122.4064/"
//! mdat
//! ```

use chrono::{DateTime, Utc};

/// Seconds between 1904-01-01 and 1970-01-01.
const MAC_EPOCH_OFFSET: i64 = 2_082_844_800;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct VideoFields {
    pub width: u32,
    pub height: u32,

    /// Degrees clockwise from the track matrix.
    pub orientation: i32,

    pub date_taken: Option<DateTime<Utc>>,

    /// Latitude and longitude; videos carry no altitude or bearing here.
    pub location: Option<(f64, f64)>,
}

/// Parses the `moov` box. `None` when it is absent from `bytes`, which
/// happens when a prefix ends before a trailing `moov`.
pub fn read_mp4(bytes: &[u8]) -> Option<VideoFields> {
    let moov = find_box(bytes, b"moov")?;
    let mut fields = VideoFields::default();

    if let Some(mvhd) = find_box(moov, b"mvhd") {
        fields.date_taken = creation_time(mvhd);
    }

    for trak in boxes(moov).filter(|(kind, _)| kind == b"trak").map(|(_, body)| body) {
        let is_video = find_box(trak, b"mdia")
            .and_then(|mdia| find_box(mdia, b"hdlr"))
            .is_some_and(|hdlr| hdlr.get(8..12) == Some(b"vide".as_slice()));
        if !is_video {
            continue;
        }
        if let Some(tkhd) = find_box(trak, b"tkhd") {
            if let Some((width, height, orientation)) = track_header(tkhd) {
                fields.width = width;
                fields.height = height;
                fields.orientation = orientation;
            }
        }
        break;
    }

    fields.location = find_box(moov, b"udta")
        .and_then(|udta| find_box(udta, b"\xA9xyz"))
        .and_then(iso6709);

    Some(fields)
}

/// Iterates `(type, body)` over sibling boxes, stopping at the first
/// truncated one.
fn boxes<'a>(mut data: &'a [u8]) -> impl Iterator<Item = ([u8; 4], &'a [u8])> + 'a {
    std::iter::from_fn(move || {
        if data.len() < 8 {
            return None;
        }
        let size32 = u32::from_be_bytes(data[0..4].try_into().ok()?) as u64;
        let kind: [u8; 4] = data[4..8].try_into().ok()?;
        let (header, size) = match size32 {
            0 => (8, data.len() as u64),
            1 => {
                let large = u64::from_be_bytes(data.get(8..16)?.try_into().ok()?);
                (16, large)
            }
            n => (8, n),
        };
        let size = usize::try_from(size).ok()?;
        if size < header || size > data.len() {
            return None;
        }
        let body = &data[header..size];
        data = &data[size..];
        Some((kind, body))
    })
}

fn find_box<'a>(data: &'a [u8], kind: &[u8; 4]) -> Option<&'a [u8]> {
    boxes(data).find(|(k, _)| k == kind).map(|(_, body)| body)
}

fn creation_time(mvhd: &[u8]) -> Option<DateTime<Utc>> {
    let seconds = match *mvhd.first()? {
        1 => u64::from_be_bytes(mvhd.get(4..12)?.try_into().ok()?) as i64,
        _ => u32::from_be_bytes(mvhd.get(4..8)?.try_into().ok()?) as i64,
    };
    if seconds == 0 {
        return None;
    }
    DateTime::from_timestamp(seconds - MAC_EPOCH_OFFSET, 0)
}

fn track_header(tkhd: &[u8]) -> Option<(u32, u32, i32)> {
    let matrix_at = match *tkhd.first()? {
        1 => 52,
        _ => 40,
    };
    let word = |at: usize| -> Option<i32> {
        Some(i32::from_be_bytes(tkhd.get(at..at + 4)?.try_into().ok()?))
    };

    let (a, b) = (word(matrix_at)?, word(matrix_at + 4)?);
    let orientation = match (a.signum(), b.signum()) {
        (0, 1) => 90,
        (-1, 0) => 180,
        (0, -1) => 270,
        _ => 0,
    };

    let width = word(matrix_at + 36)? as u32 >> 16;
    let height = word(matrix_at + 40)? as u32 >> 16;
    Some((width, height, orientation))
}

/// `©xyz` body: 2-byte length, 2-byte language, then the ISO 6709 text.
fn iso6709(body: &[u8]) -> Option<(f64, f64)> {
    let text = std::str::from_utf8(body.get(4..)?).ok()?;
    let text = text.trim_end_matches(['/', '\0']);

    let mut starts = text
        .char_indices()
        .filter(|(_, c)| *c == '+' || *c == '-')
        .map(|(i, _)| i);
    let lat_at = starts.next()?;
    let lon_at = starts.next()?;
    let end = starts.next().unwrap_or(text.len());

    let latitude = text.get(lat_at..lon_at)?.parse::<f64>().ok()?;
    let longitude = text.get(lon_at..end)?.parse::<f64>().ok()?;
    Some((latitude, longitude))
}
