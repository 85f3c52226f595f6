//! MIME type rules and remote id handling.

/// Image subtypes synced as album media. `agif`/`awebp` are the internal
/// subtypes of animated GIF and WebP.
pub const SUPPORTED_PICTURE_FORMATS: [&str; 10] = [
    "jpeg", "png", "gif", "webp", "bmp", "heif", "heic", "agif", "awebp", "avif",
];

const EXIF_FORMATS: [&str; 6] = ["jpeg", "png", "webp", "heif", "heic", "tiff"];

/// Whether a remote entry is album media rather than a sidecar.
pub fn is_supported_media(mime_type: &str, name: &str) -> bool {
    if crate::types::is_hidden_name(name) {
        return false;
    }
    match mime_type.strip_prefix("image/") {
        Some(subtype) => SUPPORTED_PICTURE_FORMATS.contains(&subtype),
        None => is_video(mime_type),
    }
}

pub fn is_video(mime_type: &str) -> bool {
    mime_type.starts_with("video/")
}

pub fn is_animated(mime_type: &str) -> bool {
    mime_type == "image/agif" || mime_type == "image/awebp"
}

/// Media played rather than shown as a still.
pub fn is_playable(mime_type: &str) -> bool {
    is_video(mime_type) || is_animated(mime_type)
}

/// Formats whose container may carry EXIF.
pub fn has_exif(mime_type: &str) -> bool {
    mime_type
        .strip_prefix("image/")
        .is_some_and(|subtype| EXIF_FORMATS.contains(&subtype))
}

/// GIF and WebP need a full decode to tell animated from still.
pub fn may_be_animated(mime_type: &str) -> bool {
    mime_type == "image/gif" || mime_type == "image/webp"
}

/// MIME type marking an animated GIF/WebP.
pub fn animated_mime(mime_type: &str) -> String {
    match mime_type.strip_prefix("image/") {
        Some(subtype) => format!("image/a{subtype}"),
        None => mime_type.to_string(),
    }
}

/// MIME type sent to the server; internal animated subtypes map back.
pub fn upload_mime(mime_type: &str) -> &str {
    match mime_type {
        "image/agif" => "image/gif",
        "image/awebp" => "image/webp",
        other => other,
    }
}

/// Remote file ids are zero-padded with an instance suffix, e.g.
/// `00012345ocabc123`. The first eight characters hold the numeric id.
///
/// Returns `None` when those characters are not a number.
pub fn normalize_remote_id(raw: &str) -> Option<String> {
    let head: String = raw.chars().take(8).collect();
    head.parse::<u64>().ok().map(|id| id.to_string())
}

/// `IMG_0001.jpg` → `IMG_0001`
pub fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(0) | None => name,
        Some(idx) => &name[..idx],
    }
}

/// Last path segment.
pub fn base_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}
