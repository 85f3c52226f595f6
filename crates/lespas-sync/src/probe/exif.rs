//! EXIF extraction with `kamadak-exif`.

use std::io::Cursor;

use chrono::{DateTime, NaiveDate, Utc};
use exif::{Exif, In, Reader, Tag, Value};
use lespas_core::{Gps, NO_GPS_DATA};

/// Fields read from an EXIF block. Absent tags stay `None`/zero.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExifFields {
    pub width: u32,
    pub height: u32,

    /// Degrees clockwise: 0, 90, 180 or 270.
    pub orientation: i32,

    /// `DateTimeOriginal`, then `DateTime`.
    pub date_taken: Option<DateTime<Utc>>,

    pub caption: String,
    pub gps: Option<Gps>,
}

/// Parses the EXIF block of a JPEG, PNG, WebP, HEIF or TIFF container.
///
/// Returns `None` when the bytes carry no readable EXIF. A truncated file
/// works as long as the EXIF segment is complete.
pub fn read_exif(bytes: &[u8]) -> Option<ExifFields> {
    let exif = Reader::new()
        .read_from_container(&mut Cursor::new(bytes))
        .ok()?;

    Some(ExifFields {
        width: uint(&exif, &[Tag::PixelXDimension, Tag::ImageWidth]).unwrap_or(0),
        height: uint(&exif, &[Tag::PixelYDimension, Tag::ImageLength]).unwrap_or(0),
        orientation: uint(&exif, &[Tag::Orientation])
            .map(orientation_degrees)
            .unwrap_or(0),
        date_taken: date(&exif, Tag::DateTimeOriginal).or_else(|| date(&exif, Tag::DateTime)),
        caption: ascii(&exif, Tag::ImageDescription).unwrap_or_default(),
        gps: gps(&exif),
    })
}

/// Maps the EXIF orientation code to clockwise degrees. Mirrored codes
/// keep their rotation part.
pub fn orientation_degrees(code: u32) -> i32 {
    match code {
        3 | 4 => 180,
        5 | 6 => 90,
        7 | 8 => 270,
        _ => 0,
    }
}

fn uint(exif: &Exif, tags: &[Tag]) -> Option<u32> {
    tags.iter().find_map(|tag| {
        exif.get_field(*tag, In::PRIMARY)
            .and_then(|f| f.value.get_uint(0))
            .filter(|v| *v > 0)
    })
}

fn ascii(exif: &Exif, tag: Tag) -> Option<String> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Ascii(parts) => {
            let text = parts
                .iter()
                .map(|p| String::from_utf8_lossy(p).trim().to_string())
                .collect::<Vec<_>>()
                .join(" ");
            let text = text.trim().to_string();
            (!text.is_empty()).then_some(text)
        }
        _ => None,
    }
}

// EXIF dates carry no zone; they are taken as UTC.
fn date(exif: &Exif, tag: Tag) -> Option<DateTime<Utc>> {
    let field = exif.get_field(tag, In::PRIMARY)?;
    let Value::Ascii(parts) = &field.value else {
        return None;
    };
    let dt = exif::DateTime::from_ascii(parts.first()?).ok()?;
    NaiveDate::from_ymd_opt(dt.year.into(), dt.month.into(), dt.day.into())?
        .and_hms_opt(dt.hour.into(), dt.minute.into(), dt.second.into())
        .map(|naive| naive.and_utc())
}

fn rationals(exif: &Exif, tag: Tag) -> Option<Vec<f64>> {
    match &exif.get_field(tag, In::PRIMARY)?.value {
        Value::Rational(values) => Some(values.iter().map(|r| r.to_f64()).collect()),
        _ => None,
    }
}

fn degrees(exif: &Exif, tag: Tag, reference: Tag, negative: &str) -> Option<f64> {
    let dms = rationals(exif, tag)?;
    let value = match dms.as_slice() {
        [d, m, s, ..] => d + m / 60.0 + s / 3600.0,
        [d] => *d,
        _ => return None,
    };
    let negate = ascii(exif, reference).is_some_and(|r| r.eq_ignore_ascii_case(negative));
    Some(if negate { -value } else { value })
}

fn gps(exif: &Exif) -> Option<Gps> {
    let latitude = degrees(exif, Tag::GPSLatitude, Tag::GPSLatitudeRef, "S")?;
    let longitude = degrees(exif, Tag::GPSLongitude, Tag::GPSLongitudeRef, "W")?;
    if !latitude.is_finite() || !longitude.is_finite() {
        return None;
    }

    let below_sea_level = exif
        .get_field(Tag::GPSAltitudeRef, In::PRIMARY)
        .and_then(|f| f.value.get_uint(0))
        == Some(1);
    let altitude = rationals(exif, Tag::GPSAltitude)
        .and_then(|v| v.first().copied())
        .map(|a| if below_sea_level { -a } else { a })
        .unwrap_or(NO_GPS_DATA);
    let bearing = rationals(exif, Tag::GPSImgDirection)
        .and_then(|v| v.first().copied())
        .unwrap_or(NO_GPS_DATA);

    Some(Gps {
        latitude,
        longitude,
        altitude,
        bearing,
    })
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use chrono::TimeZone;
    use exif::experimental::Writer;
    use exif::{Field, Rational};

    fn field(tag: Tag, value: Value) -> Field {
        Field {
            tag,
            ifd_num: In::PRIMARY,
            value,
        }
    }

    fn rational(values: &[(u32, u32)]) -> Value {
        Value::Rational(
            values
                .iter()
                .map(|&(num, denom)| Rational { num, denom })
                .collect(),
        )
    }

    /// A JPEG whose APP1 segment carries the given fields.
    pub(crate) fn jpeg_with_exif(fields: &[Field]) -> Vec<u8> {
        let mut writer = Writer::new();
        for f in fields {
            writer.push_field(f);
        }
        let mut tiff = Cursor::new(Vec::new());
        writer.write(&mut tiff, false).unwrap();
        let tiff = tiff.into_inner();

        let mut jpeg = Vec::new();
        image::RgbImage::new(8, 4)
            .write_to(&mut Cursor::new(&mut jpeg), image::ImageFormat::Jpeg)
            .unwrap();

        let segment_len = (2 + 6 + tiff.len()) as u16;
        let mut out = vec![0xFF, 0xD8, 0xFF, 0xE1];
        out.extend_from_slice(&segment_len.to_be_bytes());
        out.extend_from_slice(b"Exif\0\0");
        out.extend_from_slice(&tiff);
        out.extend_from_slice(&jpeg[2..]);
        out
    }

    pub(crate) fn sample_fields() -> Vec<Field> {
        vec![
            field(Tag::Orientation, Value::Short(vec![6])),
            field(Tag::ImageDescription, Value::Ascii(vec![b"Harbour at dusk".to_vec()])),
            field(Tag::DateTimeOriginal, Value::Ascii(vec![b"2023:04:05 12:34:56".to_vec()])),
            field(Tag::PixelXDimension, Value::Long(vec![4000])),
            field(Tag::PixelYDimension, Value::Long(vec![3000])),
            field(Tag::GPSLatitudeRef, Value::Ascii(vec![b"N".to_vec()])),
            field(Tag::GPSLatitude, rational(&[(37, 1), (30, 1), (0, 1)])),
            field(Tag::GPSLongitudeRef, Value::Ascii(vec![b"W".to_vec()])),
            field(Tag::GPSLongitude, rational(&[(122, 1), (15, 1), (0, 1)])),
            field(Tag::GPSAltitude, rational(&[(125, 10)])),
        ]
    }

    #[test]
    fn test_read_exif_fields() {
        let bytes = jpeg_with_exif(&sample_fields());
        let fields = read_exif(&bytes).unwrap();

        assert_eq!(fields.width, 4000);
        assert_eq!(fields.height, 3000);
        assert_eq!(fields.orientation, 90);
        assert_eq!(fields.caption, "Harbour at dusk");
        assert_eq!(
            fields.date_taken,
            Some(Utc.with_ymd_and_hms(2023, 4, 5, 12, 34, 56).unwrap())
        );

        let gps = fields.gps.unwrap();
        assert!((gps.latitude - 37.5).abs() < 1e-9);
        assert!((gps.longitude + 122.25).abs() < 1e-9);
        assert!((gps.altitude - 12.5).abs() < 1e-9);
        assert_eq!(gps.bearing, NO_GPS_DATA);
    }

    #[test]
    fn test_no_exif() {
        let mut png = Vec::new();
        image::RgbImage::new(2, 2)
            .write_to(&mut Cursor::new(&mut png), image::ImageFormat::Png)
            .unwrap();
        assert_eq!(read_exif(&png), None);
        assert_eq!(read_exif(b"not an image"), None);
    }

    #[test]
    fn test_orientation_codes() {
        assert_eq!(orientation_degrees(1), 0);
        assert_eq!(orientation_degrees(3), 180);
        assert_eq!(orientation_degrees(6), 90);
        assert_eq!(orientation_degrees(8), 270);
        assert_eq!(orientation_degrees(0), 0);
    }
}
