//! # Blog Publisher
//!
//! Renders an album into a Pico-style static site kept inside the
//! resource root.
//!
//! ## Site Layout
//! ```text
//! {root}/.__picoblog__/
//! ├── content/
//! │   ├── index.md              site header (title, author, host)
//! │   └── {albumId}.md          one post per album
//! └── assets/
//!     └── {albumId}/
//!         ├── IMG_0001.jpg      downsampled, upright, JPEG q90
//!         ├── anim.gif          animated media, copied verbatim
//!         └── IMG_0001          cover: 21:9 band, no extension
//! ```
//!
//! Registering the site with the server's web app is left to the host.

use std::io::Cursor;

use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::DynamicImage;
use lespas_core::cover::crop_rect;
use lespas_core::media::{is_animated, is_playable, strip_extension};
use lespas_core::{Album, Photo, BLOG_FOLDER, MIME_TYPE_JPEG, MIME_TYPE_MARKDOWN};
use tracing::{debug, info, warn};

use crate::context::SyncEnv;
use crate::error::{Disposition, SyncError, SyncResult};
use crate::remote::{dav_path, DavEntry};

const CONTENT_FOLDER: &str = "content";
const ASSETS_FOLDER: &str = "assets";
const INDEX_FILE: &str = "index.md";
const ASSETS_URL: &str = "%assets_url%";

/// Long edge limit of a post image.
const MAX_ASSET_EDGE: u32 = 1600;
const COVER_SAMPLE_SIZE: u32 = 2;
const JPEG_QUALITY: u8 = 90;

// =============================================================================
// Themes
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Theme {
    /// Two columns, each image appended to the shorter one.
    Cascade,

    /// Captioned images get a full-width row; the rest form rows of three.
    Magazine,
}

impl Theme {
    pub fn from_code(code: &str) -> Option<Theme> {
        match code {
            "1" => Some(Theme::Cascade),
            "2" => Some(Theme::Magazine),
            _ => None,
        }
    }
}

// =============================================================================
// Rendering
// =============================================================================

pub fn render_index(title: &str, author: &str, host: &str) -> String {
    format!(
        "---\n\
         Title: {title}\n\
         Author: {author}\n\
         Host: {host}\n\
         Template : index\n\
         Robots: noindex, nofollow, noimageindex\n\
         Purpose: pico_categories_page\n\
         numPerPage: 12\n\
         ---\n"
    )
}

/// Cover photo and crop baseline for a post. A video cover is replaced by
/// the first image, banded through its middle.
pub fn choose_cover<'p>(album: &Album, photos: &'p [Photo]) -> Option<(&'p Photo, i32)> {
    if album.cover.mime_type.starts_with("video/") {
        photos
            .iter()
            .find(|p| p.mime_type.starts_with("image/"))
            .map(|p| (p, p.upright_height() / 2))
    } else {
        photos
            .iter()
            .find(|p| p.id == album.cover.id)
            .map(|p| (p, album.cover.baseline))
    }
}

/// Asset name of the cover; stills lose their extension so the band does
/// not collide with the photo's own asset.
pub fn cover_asset_name(cover: &Photo) -> String {
    if is_playable(&cover.mime_type) {
        cover.name.clone()
    } else {
        strip_extension(&cover.name).to_string()
    }
}

fn asset_url(album_id: &str, name: &str) -> String {
    format!("{ASSETS_URL}/{album_id}/{name}")
}

fn caption_html(caption: &str) -> String {
    caption.replace('\n', "<br>")
}

/// Post markdown: YAML front matter plus the theme's layout blocks.
/// `photos` must already be in album order.
pub fn render_post(album: &Album, photos: &[Photo], theme: Option<Theme>, cover_asset: &str) -> String {
    let date = album
        .end_date
        .map(|d| d.format("%Y-%m-%d").to_string())
        .unwrap_or_default();
    let featured = format!("{}/{cover_asset}", album.id);

    let mut post = format!(
        "---\n\
         Title: {}\n\
         Template : single\n\
         Date: {date}\n\
         Thumbnail: {featured}\n\
         Featured: {featured}\n\
         Robots: noindex, nofollow, noimageindex\n\
         Purpose: pico_categories_page\n\
         ---\n\n",
        album.name
    );

    match theme {
        Some(Theme::Cascade) => post.push_str(&render_cascade(&album.id, photos)),
        Some(Theme::Magazine) => post.push_str(&render_magazine(&album.id, photos)),
        None => {}
    }
    post
}

fn render_cascade(album_id: &str, photos: &[Photo]) -> String {
    let mut columns = [String::new(), String::new()];
    let mut bottoms = [0i64, 0i64];

    for photo in photos.iter().filter(|p| !p.is_video()) {
        let url = asset_url(album_id, &photo.name);
        let column = if bottoms[0] <= bottoms[1] { 0 } else { 1 };
        columns[column].push_str(&format!(
            "<div class=\"fh5co-item animate-box\">\n\
             <figure><a href=\"{url}\" class=\"image-popup\"><img src=\"{url}\">\
             <div class=\"fh5co-item-text-wrap\"><div class=\"fh5co-item-text\"><h2><i class=\"icon-zoom-in\"></i></h2></div></div></a>\
             <figcaption-epic>{}</figcaption-epic></figure>\n\
             </div>\n",
            caption_html(&photo.caption)
        ));
        bottoms[column] += i64::from(photo.upright_height());
    }

    format!(
        "<div class=\"fh5co-grid\">\n\
         <div class=\"fh5co-col-1\">\n{}</div>\n\
         <div class=\"fh5co-col-2\">\n{}</div>\n\
         </div>\n",
        columns[0], columns[1]
    )
}

fn render_magazine(album_id: &str, photos: &[Photo]) -> String {
    let mut out = String::new();
    let mut grid: Vec<&Photo> = Vec::with_capacity(3);

    for (index, photo) in photos.iter().enumerate() {
        if photo.is_video() {
            continue;
        }
        if photo.caption.is_empty() {
            grid.push(photo);
            if grid.len() == 3 {
                out.push_str(&magazine_grid(album_id, &grid));
                grid.clear();
            }
            continue;
        }

        if !grid.is_empty() {
            out.push_str(&magazine_grid(album_id, &grid));
            grid.clear();
        }
        let url = asset_url(album_id, &photo.name);
        let caption = caption_html(&photo.caption);
        let row = if index % 2 == 0 {
            format!(
                "<div class=\"row rp-b\">\n\
                 <div class=\"col-lg-6 col-md-12 animate-box\">\n\
                 <figure><img src=\"{url}\" class=\"img-responsive\"></figure>\n\
                 </div>\n\
                 <div class=\"col-lg-6 col-md-12 cp-l animate-box\">\n{caption}\n</div>\n\
                 </div>\n\n"
            )
        } else {
            format!(
                "<div class=\"row rp-b\">\n\
                 <div class=\"col-lg-6 col-lg-push-6 col-md-12 col-md-push-0 animate-box\">\n\
                 <figure><img src=\"{url}\" class=\"img-responsive\"></figure>\n\
                 </div>\n\
                 <div class=\"col-lg-6 col-lg-pull-6 col-md-12 col-md-pull-0 cp-r animate-box\">\n{caption}\n</div>\n\
                 </div>\n\n"
            )
        };
        out.push_str(&row);
    }

    if !grid.is_empty() {
        out.push_str(&magazine_grid(album_id, &grid));
    }
    out
}

fn magazine_grid(album_id: &str, grid: &[&Photo]) -> String {
    let mut out = String::from("<div class=\"row\">\n");
    for photo in grid {
        out.push_str(&format!(
            "<div class=\"col-md-4 animate-box\">\n\
             <figure><img src=\"{}\" class=\"img-responsive\"></figure>\n\
             </div>\n",
            asset_url(album_id, &photo.name)
        ));
    }
    out.push_str("</div>\n\n");
    out
}

// =============================================================================
// Asset Planning and Rendering
// =============================================================================

/// Differences between the album and its published assets.
#[derive(Debug, Default, PartialEq)]
pub struct AssetPlan<'p> {
    /// Remote asset names matching neither a photo nor the cover asset.
    pub delete: Vec<String>,

    /// Still images and animations without an asset yet.
    pub upload: Vec<&'p Photo>,

    pub cover_missing: bool,
}

pub fn plan_assets<'p>(photos: &'p [Photo], remote: &[DavEntry], cover_asset: &str) -> AssetPlan<'p> {
    let has_asset = |name: &str| remote.iter().any(|e| e.name == name);

    AssetPlan {
        delete: remote
            .iter()
            .filter(|e| e.name != cover_asset && !photos.iter().any(|p| p.name == e.name))
            .map(|e| e.name.clone())
            .collect(),
        upload: photos
            .iter()
            .filter(|p| !p.is_video() && !has_asset(&p.name))
            .collect(),
        cover_missing: !has_asset(cover_asset),
    }
}

/// Downsampling factor: powers of two until the long edge fits.
pub fn sample_size(width: u32, height: u32) -> u32 {
    let long_edge = width.max(height);
    let mut size = 1;
    while long_edge / size > MAX_ASSET_EDGE {
        size *= 2;
    }
    size
}

/// Decodes, crops (cover), downsamples, rotates upright and re-encodes.
pub fn render_asset(bytes: &[u8], photo: &Photo, cover_baseline: Option<i32>) -> SyncResult<Vec<u8>> {
    let mut image = image::load_from_memory(bytes)?;

    let sample = match cover_baseline {
        Some(baseline) => {
            let rect = crop_rect(
                image.width() as i32,
                image.height() as i32,
                photo.orientation,
                baseline,
            );
            image = image.crop_imm(rect.x, rect.y, rect.width, rect.height);
            COVER_SAMPLE_SIZE
        }
        None => sample_size(image.width(), image.height()),
    };

    if sample > 1 {
        image = image.resize_exact(
            (image.width() / sample).max(1),
            (image.height() / sample).max(1),
            FilterType::Triangle,
        );
    }

    let image = match photo.orientation {
        90 => image.rotate90(),
        180 => image.rotate180(),
        270 => image.rotate270(),
        _ => image,
    };

    encode_jpeg(&image)
}

fn encode_jpeg(image: &DynamicImage) -> SyncResult<Vec<u8>> {
    let mut out = Cursor::new(Vec::new());
    JpegEncoder::new_with_quality(&mut out, JPEG_QUALITY).encode_image(&image.to_rgb8())?;
    Ok(out.into_inner())
}

// =============================================================================
// Publisher
// =============================================================================

pub(crate) struct BlogPublisher<'a> {
    env: &'a SyncEnv,
}

impl<'a> BlogPublisher<'a> {
    pub fn new(env: &'a SyncEnv) -> Self {
        BlogPublisher { env }
    }

    fn blog_path(&self, parts: &[&str]) -> String {
        let mut segments = vec![self.env.resource_root(), BLOG_FOLDER];
        segments.extend_from_slice(parts);
        dav_path(&segments)
    }

    async fn ensure_folder(&self, path: &str) -> SyncResult<()> {
        if self.env.remote.create_folder(path).await?.is_some() {
            debug!(path = %path, "Created blog folder");
        }
        Ok(())
    }

    /// Regenerates `content/index.md`.
    pub async fn update_index(&self) -> SyncResult<()> {
        let config = &self.env.config;
        let index = render_index(
            &config.blog.site_title,
            config.blog_author(),
            &config.server_origin()?,
        );
        self.env
            .remote
            .upload(
                &self.blog_path(&[CONTENT_FOLDER, INDEX_FILE]),
                index.into_bytes(),
                MIME_TYPE_MARKDOWN,
            )
            .await?;
        Ok(())
    }

    pub async fn create_post(&self, album_id: &str, theme_code: &str) -> SyncResult<()> {
        let Some(album) = self.env.db.albums().get_by_id(album_id).await? else {
            warn!(album_id = %album_id, "Blog post for unknown album");
            return Ok(());
        };
        let mut photos = self.env.db.photos().list_by_album(album_id).await?;
        album.sort().sort(&mut photos);

        let Some((cover, baseline)) = choose_cover(&album, &photos) else {
            warn!(album = %album.name, "No usable cover, post not published");
            return Ok(());
        };
        let cover_asset = cover_asset_name(cover);

        self.ensure_folder(&self.blog_path(&[])).await?;
        self.ensure_folder(&self.blog_path(&[CONTENT_FOLDER])).await?;
        self.ensure_folder(&self.blog_path(&[ASSETS_FOLDER])).await?;
        self.ensure_folder(&self.blog_path(&[ASSETS_FOLDER, album_id]))
            .await?;
        self.update_index().await?;

        let theme = Theme::from_code(theme_code);
        if theme.is_none() {
            warn!(theme = %theme_code, "Unknown blog theme, publishing header only");
        }
        let post = render_post(&album, &photos, theme, &cover_asset);

        self.sync_assets(&album, &photos, cover, baseline, &cover_asset)
            .await?;

        let post_name = format!("{album_id}.md");
        self.env
            .remote
            .upload(
                &self.blog_path(&[CONTENT_FOLDER, &post_name]),
                post.into_bytes(),
                MIME_TYPE_MARKDOWN,
            )
            .await?;
        info!(album = %album.name, photos = photos.len(), "Blog post published");
        Ok(())
    }

    pub async fn delete_post(&self, album_id: &str) -> SyncResult<()> {
        let post_name = format!("{album_id}.md");
        for path in [
            self.blog_path(&[CONTENT_FOLDER, &post_name]),
            self.blog_path(&[ASSETS_FOLDER, album_id]),
        ] {
            match self.env.remote.delete(&path).await {
                Err(e) if e.is_not_found() => debug!(path = %path, "Already removed"),
                other => other?,
            }
        }
        Ok(())
    }

    async fn sync_assets(
        &self,
        album: &Album,
        photos: &[Photo],
        cover: &Photo,
        baseline: i32,
        cover_asset: &str,
    ) -> SyncResult<()> {
        let folder = self.blog_path(&[ASSETS_FOLDER, &album.id]);
        let remote_assets = match self.env.remote.list(&folder).await {
            Ok(entries) => entries,
            Err(e) => {
                debug!(error = %e, "Asset listing failed, republishing everything");
                Vec::new()
            }
        };
        let plan = plan_assets(photos, &remote_assets, cover_asset);

        if plan.cover_missing {
            self.publish_asset(album, cover, cover_asset, Some(baseline))
                .await?;
        }
        for photo in &plan.upload {
            self.env.connectivity.check()?;
            self.publish_asset(album, photo, &photo.name, None).await?;
        }
        for name in &plan.delete {
            if let Err(e) = self.env.remote.delete(&dav_path(&[&folder, name])).await {
                warn!(asset = %name, error = %e, "Stale asset not removed");
            }
        }
        Ok(())
    }

    /// Failures are logged; a missing asset is retried on the next publish.
    /// Credential and connectivity failures end the publish.
    async fn publish_asset(
        &self,
        album: &Album,
        photo: &Photo,
        asset_name: &str,
        baseline: Option<i32>,
    ) -> SyncResult<()> {
        match self.try_publish_asset(album, photo, asset_name, baseline).await {
            Ok(()) => Ok(()),
            Err(e) if matches!(e.disposition(), Disposition::Authenticate | Disposition::Cancelled) => Err(e),
            Err(e) => {
                warn!(album = %album.name, photo = %photo.name, error = %e, "Blog asset skipped");
                Ok(())
            }
        }
    }

    async fn try_publish_asset(
        &self,
        album: &Album,
        photo: &Photo,
        asset_name: &str,
        baseline: Option<i32>,
    ) -> SyncResult<()> {
        let target = self.blog_path(&[ASSETS_FOLDER, &album.id, asset_name]);
        let source = self.env.album_file_path(&album.name, &photo.name);

        if is_animated(&photo.mime_type) {
            return match self.env.remote.copy_or_move(true, &source, &target).await {
                Err(e) if e.is_already_exists() => Ok(()),
                other => other.map(|_| ()),
            };
        }

        let cached = if album.is_remote() {
            None
        } else {
            self.env.cache.read_optional(&photo.id).await?
        };
        let bytes = match cached {
            Some(bytes) => bytes,
            None => self.env.remote.download(&source, true).await?,
        };

        let photo = photo.clone();
        let rendered = tokio::task::spawn_blocking(move || render_asset(&bytes, &photo, baseline))
            .await
            .map_err(|e| SyncError::Internal(e.to_string()))??;

        self.env
            .remote
            .upload(&target, rendered, MIME_TYPE_JPEG)
            .await?;
        Ok(())
    }
}
