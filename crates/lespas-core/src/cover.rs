//! # Cover Geometry
//!
//! Album covers show a 21:9 band of one photo. The band's top edge
//! (`baseline`) is measured on the upright image.
//!
//! ```text
//!        upright image
//!   ┌───────────────────────┐
//!   │                       │
//!   ├───────────────────────┤ ◄── baseline
//!   │    band: width*9/21   │
//!   ├───────────────────────┤
//!   │                       │
//!   └───────────────────────┘
//! ```
//!
//! Stored width/height are the raw (pre-rotation) pixel dimensions.

use crate::types::is_sideways;

/// Baseline that centers the band vertically.
pub fn default_baseline(width: i32, height: i32, orientation: i32) -> i32 {
    let (upright_width, upright_height) = upright(width, height, orientation);
    (upright_height - upright_width * 9 / 21) / 2
}

/// Height of the band for an upright width.
pub fn band_height(upright_width: i32) -> i32 {
    upright_width * 9 / 21
}

fn upright(width: i32, height: i32, orientation: i32) -> (i32, i32) {
    if is_sideways(orientation) {
        (height, width)
    } else {
        (width, height)
    }
}

/// Pixel rectangle in raw image coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// The band as a rectangle of the raw image, clamped to its bounds.
///
/// Rotating the returned region by `orientation` yields the upright band.
pub fn crop_rect(width: i32, height: i32, orientation: i32, baseline: i32) -> CropRect {
    let (upright_width, upright_height) = upright(width, height, orientation);
    let top = baseline.clamp(0, upright_height.max(0));
    let bottom = (top + band_height(upright_width)).min(upright_height);
    let span = (bottom - top).max(0);

    let (x, y, w, h) = match orientation {
        // clockwise 90: upright rows are raw columns
        90 => (top, 0, span, height),
        180 => (0, height - bottom, width, span),
        270 => (width - bottom, 0, span, height),
        _ => (0, top, width, span),
    };

    CropRect {
        x: x.max(0) as u32,
        y: y.max(0) as u32,
        width: w.max(0) as u32,
        height: h.max(0) as u32,
    }
}
