//! Capture date rules.

use chrono::{DateTime, NaiveDate, NaiveDateTime, NaiveTime, Utc};

/// Finds a `yyyyMMddHHmmss` or `yyyyMMdd_HHmmss` timestamp in a filename,
/// e.g. `IMG_20230405_123456.jpg` or `PXL20230405123456789.mp4`.
///
/// The first digit run that forms a valid date and time wins.
pub fn parse_date_from_file_name(name: &str) -> Option<DateTime<Utc>> {
    let bytes = name.as_bytes();
    let digits_at = |start: usize, len: usize| {
        bytes
            .get(start..start + len)
            .is_some_and(|s| s.iter().all(u8::is_ascii_digit))
    };

    for start in 0..bytes.len() {
        if start > 0 && bytes[start - 1].is_ascii_digit() {
            continue;
        }
        if !digits_at(start, 8) {
            continue;
        }
        let time_start = if bytes.get(start + 8) == Some(&b'_') {
            start + 9
        } else {
            start + 8
        };
        if !digits_at(time_start, 6) {
            continue;
        }

        // all slices are ASCII digits
        let date = NaiveDate::parse_from_str(&name[start..start + 8], "%Y%m%d").ok();
        let time = NaiveTime::parse_from_str(&name[time_start..time_start + 6], "%H%M%S").ok();
        if let (Some(date), Some(time)) = (date, time) {
            return Some(NaiveDateTime::new(date, time).and_utc());
        }
    }
    None
}

/// Picks the capture date of a probed file.
///
/// A metadata date is trusted only when it predates the file's remote
/// modification time; otherwise the modification time is used.
pub fn resolve_capture_date(
    probed: Option<DateTime<Utc>>,
    last_modified: DateTime<Utc>,
) -> DateTime<Utc> {
    match probed {
        Some(date) if date < last_modified => date,
        _ => last_modified,
    }
}
