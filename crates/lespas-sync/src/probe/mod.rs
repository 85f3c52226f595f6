//! # Media Probe
//!
//! Finds dimensions, orientation, capture date, caption and location of a
//! changed photo.
//!
//! ## Fetch Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  remote-origin album                 local album                        │
//! │                                                                         │
//! │  read_prefix(probe_prefix_bytes)     download whole file                │
//! │        │                             write cache/{photoId}              │
//! │        ▼                                    │                           │
//! │  EXIF / moov found? ──no──► download whole  │                           │
//! │        │                                    │                           │
//! │        ▼                                    ▼                           │
//! │  gif/webp ──► full decode (true size, animation → image/agif|awebp)    │
//! │  no size  ──► header decode                                             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod exif;
pub mod mp4;

use std::io::Cursor;

use chrono::{DateTime, Utc};
use image::codecs::gif::GifDecoder;
use image::codecs::webp::WebPDecoder;
use image::{AnimationDecoder, ImageDecoder, ImageReader};
use lespas_core::capture::{parse_date_from_file_name, resolve_capture_date};
use lespas_core::media::{animated_mime, has_exif, may_be_animated};
use lespas_core::{Album, Gps, Photo};
use tracing::{debug, warn};

use crate::context::SyncEnv;
use crate::error::{SyncError, SyncResult};

/// What a probe learned about one file.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbedMedia {
    pub width: i32,
    pub height: i32,
    pub orientation: i32,
    pub mime_type: String,
    pub date_taken: Option<DateTime<Utc>>,
    pub caption: String,
    pub gps: Gps,
}

impl ProbedMedia {
    fn empty(mime_type: &str) -> Self {
        ProbedMedia {
            width: 0,
            height: 0,
            orientation: 0,
            mime_type: mime_type.to_string(),
            date_taken: None,
            caption: String::new(),
            gps: Gps::ABSENT,
        }
    }

    /// Copies the findings onto a photo record. The capture date prefers
    /// the probed date, then the file name, and falls back to the remote
    /// modification time.
    pub fn apply_to(self, photo: &mut Photo) {
        let candidate = self
            .date_taken
            .or_else(|| parse_date_from_file_name(&photo.name));
        photo.date_taken = resolve_capture_date(candidate, photo.last_modified);
        photo.width = self.width;
        photo.height = self.height;
        photo.orientation = self.orientation;
        photo.mime_type = self.mime_type;
        photo.caption = self.caption;
        photo.gps = self.gps;
    }
}

// =============================================================================
// Byte-level Probes
// =============================================================================

/// EXIF-based probe of a still image. Dimensions stay 0 when the EXIF
/// block lacks them.
pub fn probe_image(bytes: &[u8], mime_type: &str) -> ProbedMedia {
    let mut probed = ProbedMedia::empty(mime_type);
    let Some(fields) = has_exif(mime_type).then(|| exif::read_exif(bytes)).flatten() else {
        return probed;
    };

    probed.width = fields.width as i32;
    probed.height = fields.height as i32;
    probed.orientation = fields.orientation;
    probed.date_taken = fields.date_taken;
    probed.caption = fields.caption;
    probed.gps = fields.gps.unwrap_or(Gps::ABSENT);
    probed
}

/// `None` when the bytes hold no `moov` box.
pub fn probe_video(bytes: &[u8], mime_type: &str) -> Option<ProbedMedia> {
    let fields = mp4::read_mp4(bytes)?;
    let mut probed = ProbedMedia::empty(mime_type);
    probed.width = fields.width as i32;
    probed.height = fields.height as i32;
    probed.orientation = fields.orientation;
    probed.date_taken = fields.date_taken;
    probed.gps = fields
        .location
        .map(|(lat, lon)| Gps::position(lat, lon))
        .unwrap_or(Gps::ABSENT);
    Some(probed)
}

/// Full decode of a GIF or WebP: `(width, height, animated)`.
pub fn decode_animation(bytes: &[u8], mime_type: &str) -> SyncResult<(u32, u32, bool)> {
    match mime_type {
        "image/gif" => {
            let decoder = GifDecoder::new(Cursor::new(bytes))?;
            let (width, height) = decoder.dimensions();
            let frames = decoder.into_frames().take(2).count();
            Ok((width, height, frames > 1))
        }
        "image/webp" => {
            let decoder = WebPDecoder::new(Cursor::new(bytes))?;
            let (width, height) = decoder.dimensions();
            Ok((width, height, decoder.has_animation()))
        }
        other => Err(SyncError::Media(format!("{other} cannot be animated"))),
    }
}

/// Dimensions from the image header, without decoding pixels.
pub fn header_dimensions(bytes: &[u8]) -> SyncResult<(u32, u32)> {
    Ok(ImageReader::new(Cursor::new(bytes))
        .with_guessed_format()?
        .into_dimensions()?)
}

// =============================================================================
// Remote-aware Prober
// =============================================================================

/// Probes changed photos of one album, fetching as little as it can.
pub(crate) struct MediaProber<'a> {
    env: &'a SyncEnv,
}

/// Bytes fetched so far and whether they are the whole file.
struct Fetched {
    bytes: Vec<u8>,
    complete: bool,
}

impl<'a> MediaProber<'a> {
    pub fn new(env: &'a SyncEnv) -> Self {
        MediaProber { env }
    }

    /// Probes `photo` in place. Remote failures propagate; undecodable
    /// media is logged and keeps whatever was found.
    pub async fn probe(&self, album: &Album, photo: &mut Photo) -> SyncResult<()> {
        let path = self.env.album_file_path(&album.name, &photo.name);
        let mut fetched = self.fetch_initial(album, photo, &path).await?;
        let mime_type = photo.mime_type.clone();

        let probed = if photo.is_video() {
            match probe_video(&fetched.bytes, &mime_type) {
                Some(probed) => probed,
                None if !fetched.complete => {
                    self.fetch_whole(&path, &mut fetched).await?;
                    probe_video(&fetched.bytes, &mime_type)
                        .unwrap_or_else(|| ProbedMedia::empty(&mime_type))
                }
                None => {
                    debug!(file = %photo.name, "No moov box found");
                    ProbedMedia::empty(&mime_type)
                }
            }
        } else {
            let mut probed = probe_image(&fetched.bytes, &mime_type);

            if may_be_animated(&mime_type) {
                self.fetch_whole(&path, &mut fetched).await?;
                match decode_animation(&fetched.bytes, &mime_type) {
                    Ok((width, height, animated)) => {
                        probed.width = width as i32;
                        probed.height = height as i32;
                        if animated {
                            probed.mime_type = animated_mime(&mime_type);
                        }
                    }
                    Err(e) => warn!(file = %photo.name, error = %e, "Animation probe failed"),
                }
            } else if probed.width == 0 {
                let mut dims = header_dimensions(&fetched.bytes);
                if dims.is_err() && !fetched.complete {
                    self.fetch_whole(&path, &mut fetched).await?;
                    dims = header_dimensions(&fetched.bytes);
                }
                match dims {
                    Ok((width, height)) => {
                        probed.width = width as i32;
                        probed.height = height as i32;
                    }
                    Err(e) => warn!(file = %photo.name, error = %e, "Image header unreadable"),
                }
            }
            probed
        };

        probed.apply_to(photo);
        Ok(())
    }

    async fn fetch_initial(&self, album: &Album, photo: &Photo, path: &str) -> SyncResult<Fetched> {
        if album.is_remote() {
            let limit = self.env.config.sync.probe_prefix_bytes;
            let bytes = self.env.remote.read_prefix(path, limit).await?;
            let complete = (bytes.len() as u64) < limit;
            Ok(Fetched { bytes, complete })
        } else {
            let bytes = self.env.remote.download(path, false).await?;
            self.env.cache.write(&photo.id, &bytes).await?;
            Ok(Fetched {
                bytes,
                complete: true,
            })
        }
    }

    async fn fetch_whole(&self, path: &str, fetched: &mut Fetched) -> SyncResult<()> {
        if !fetched.complete {
            fetched.bytes = self.env.remote.download(path, false).await?;
            fetched.complete = true;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use image::codecs::gif::GifEncoder;
    use image::{Frame, RgbaImage};
    use lespas_core::NO_GPS_DATA;

    fn png(width: u32, height: u32) -> Vec<u8> {
        let mut out = Vec::new();
        image::RgbImage::new(width, height)
            .write_to(&mut Cursor::new(&mut out), image::ImageFormat::Png)
            .unwrap();
        out
    }

    fn animated_gif() -> Vec<u8> {
        let mut out = Vec::new();
        {
            let mut encoder = GifEncoder::new(&mut out);
            encoder
                .encode_frames(vec![
                    Frame::new(RgbaImage::new(6, 5)),
                    Frame::new(RgbaImage::from_pixel(6, 5, image::Rgba([255, 0, 0, 255]))),
                ])
                .unwrap();
        }
        out
    }

    fn photo(name: &str, mime: &str) -> Photo {
        let modified = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        Photo::from_remote("1", "A", name, "e", mime, modified, modified)
    }

    #[test]
    fn test_probe_image_with_exif() {
        let bytes = super::exif::tests::jpeg_with_exif(&super::exif::tests::sample_fields());
        let mut p = photo("IMG.jpg", "image/jpeg");
        probe_image(&bytes, "image/jpeg").apply_to(&mut p);

        assert_eq!((p.width, p.height, p.orientation), (4000, 3000, 90));
        assert_eq!(p.date_taken, Utc.with_ymd_and_hms(2023, 4, 5, 12, 34, 56).unwrap());
        assert_eq!(p.caption, "Harbour at dusk");
        assert!(p.gps.has_position());
    }

    #[test]
    fn test_probe_without_gps_stores_no_gps_data() {
        let bytes = png(3, 2);
        let mut p = photo("holiday.png", "image/png");
        assert!(p.gps.is_unknown());

        let mut probed = probe_image(&bytes, "image/png");
        assert_eq!(probed.width, 0);
        let (w, h) = header_dimensions(&bytes).unwrap();
        probed.width = w as i32;
        probed.height = h as i32;
        probed.apply_to(&mut p);

        assert_eq!((p.width, p.height), (3, 2));
        assert_eq!(p.gps, Gps::ABSENT);
        assert_eq!(p.gps.latitude, NO_GPS_DATA);
        // no metadata date: remote modification time wins
        assert_eq!(p.date_taken, p.last_modified);
    }

    #[test]
    fn test_filename_date_used_when_earlier() {
        let mut p = photo("IMG_20230405_123456.png", "image/png");
        probe_image(&png(1, 1), "image/png").apply_to(&mut p);
        assert_eq!(p.date_taken, Utc.with_ymd_and_hms(2023, 4, 5, 12, 34, 56).unwrap());

        // a date newer than the remote copy is not trusted
        let mut p = photo("IMG_20250405_123456.png", "image/png");
        probe_image(&png(1, 1), "image/png").apply_to(&mut p);
        assert_eq!(p.date_taken, p.last_modified);
    }

    #[test]
    fn test_animation_detection() {
        let (w, h, animated) = decode_animation(&animated_gif(), "image/gif").unwrap();
        assert_eq!((w, h), (6, 5));
        assert!(animated);
        assert!(decode_animation(b"", "image/jpeg").is_err());
    }

    #[test]
    fn test_probe_video() {
        let bytes = super::mp4::tests::sample_mp4(false);
        let probed = probe_video(&bytes, "video/mp4").unwrap();
        assert_eq!((probed.width, probed.height, probed.orientation), (1920, 1080, 90));
        assert!(probed.gps.has_position());
        assert_eq!(probed.gps.altitude, NO_GPS_DATA);
    }
}
