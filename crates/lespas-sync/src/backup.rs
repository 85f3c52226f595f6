//! # Camera Roll Backup
//!
//! Uploads device media added since the last run into the account's
//! archive folder.
//!
//! ```text
//! watermark (epoch secs) ──► media_added_after() ──► oldest first
//!   for each item:
//!     PUT {dcim}/{model}/{subfolder}/{name}     subfolder: path after DCIM/
//!       └─ 404 ──► MKCOL each missing level from {dcim}, PUT again
//!     PROPPATCH lespas-* properties        (failures ignored)
//!     watermark = date_added + 1
//! ```

use chrono::Utc;
use lespas_core::media::has_exif;
use lespas_core::{Gps, GPS_DATA_UNKNOWN};
use tracing::{debug, info, warn};

use crate::context::{PassContext, SyncEnv};
use crate::error::SyncResult;
use crate::media_store::DeviceMedia;
use crate::probe;
use crate::remote::dav_path;

/// `<oc:…>` property fragment describing a backed up file.
pub fn property_patch(item: &DeviceMedia, gps: &Gps) -> String {
    let mut patch = format!(
        "<oc:lespas-date-taken>{}</oc:lespas-date-taken>\
         <oc:lespas-orientation>{}</oc:lespas-orientation>\
         <oc:lespas-width>{}</oc:lespas-width>\
         <oc:lespas-height>{}</oc:lespas-height>",
        item.effective_date_taken(),
        item.orientation,
        item.width,
        item.height,
    );
    if gps.latitude != GPS_DATA_UNKNOWN {
        patch.push_str(&format!(
            "<oc:lespas-latitude>{}</oc:lespas-latitude>\
             <oc:lespas-longitude>{}</oc:lespas-longitude>\
             <oc:lespas-altitude>{}</oc:lespas-altitude>\
             <oc:lespas-bearing>{}</oc:lespas-bearing>",
            gps.latitude, gps.longitude, gps.altitude, gps.bearing
        ));
    }
    patch
}

/// Location of a device file: the store's own, else read from the bytes.
fn locate(item: &DeviceMedia, bytes: &[u8]) -> Gps {
    if !item.gps.is_unknown() {
        return item.gps;
    }
    if has_exif(&item.mime_type) {
        probe::probe_image(bytes, &item.mime_type).gps
    } else if item.mime_type.starts_with("video/") {
        probe::probe_video(bytes, &item.mime_type)
            .map(|v| v.gps)
            .unwrap_or(Gps::ABSENT)
    } else {
        Gps::UNKNOWN
    }
}

pub(crate) struct BackupUploader<'a> {
    env: &'a SyncEnv,
}

impl<'a> BackupUploader<'a> {
    pub fn new(env: &'a SyncEnv) -> Self {
        BackupUploader { env }
    }

    pub async fn run(&self, ctx: &mut PassContext) -> SyncResult<()> {
        let config = &self.env.config;
        if !config.backup.enabled {
            return Ok(());
        }

        let status = self.env.db.status();
        let watermark = match status.backup_watermark().await? {
            Some(watermark) => watermark,
            None => {
                let now = Utc::now().timestamp();
                status.set_backup_watermark(now).await?;
                info!(watermark = now, "Backup starts from now");
                now
            }
        };

        let items = self.env.media.media_added_after(watermark).await?;
        if items.is_empty() {
            return Ok(());
        }
        let total = items.len();
        let model = config.backup.device_model.as_str();

        for (done, item) in items.iter().enumerate() {
            self.env.connectivity.check()?;
            self.env.emitter.emit_backup_progress(&item.name, done, total);

            let bytes = self.env.media.open(item).await?;
            let gps = locate(item, &bytes);
            let path = dav_path(&[
                config.dcim_root(),
                model,
                item.archive_subfolder(),
                item.name.as_str(),
            ]);

            match self.env.remote.upload(&path, bytes.clone(), &item.mime_type).await {
                Ok(_) => {}
                Err(e) if e.is_not_found() => {
                    self.create_folder_chain(model, item.archive_subfolder()).await?;
                    self.env.remote.upload(&path, bytes, &item.mime_type).await?;
                }
                Err(e) => return Err(e),
            }

            if let Err(e) = self.env.remote.patch(&path, &property_patch(item, &gps)).await {
                warn!(file = %item.name, error = %e, "Property patch failed");
            }

            status.set_backup_watermark(item.date_added + 1).await?;
            ctx.stats.files_backed_up += 1;
            debug!(file = %item.name, path = %path, "Backed up");
        }

        self.env.emitter.emit_backup_progress("", total, total);
        info!(files = total, "Backup finished");
        Ok(())
    }

    async fn create_folder_chain(&self, model: &str, subfolder: &str) -> SyncResult<()> {
        let mut folder = String::new();
        let levels = self
            .env
            .config
            .dcim_root()
            .split('/')
            .chain(std::iter::once(model))
            .chain(subfolder.split('/'));

        for level in levels.filter(|l| !l.is_empty()) {
            folder = dav_path(&[folder.as_str(), level]);
            if !self.env.remote.exists(&folder).await? {
                self.env.remote.create_folder(&folder).await?;
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lespas_core::NO_GPS_DATA;

    fn item() -> DeviceMedia {
        DeviceMedia {
            id: "1".into(),
            name: "IMG.jpg".into(),
            relative_path: "DCIM/Camera".into(),
            mime_type: "image/jpeg".into(),
            size: 10,
            date_added: 1_700_000_000,
            date_taken: 0,
            width: 4000,
            height: 3000,
            orientation: 90,
            gps: Gps::UNKNOWN,
        }
    }

    #[test]
    fn test_patch_without_location() {
        let patch = property_patch(&item(), &Gps::UNKNOWN);
        assert!(patch.starts_with("<oc:lespas-date-taken>1700000000000</oc:lespas-date-taken>"));
        assert!(patch.contains("<oc:lespas-orientation>90</oc:lespas-orientation>"));
        assert!(!patch.contains("lespas-latitude"));
    }

    #[test]
    fn test_patch_with_location() {
        let patch = property_patch(&item(), &Gps::position(1.5, -2.25));
        assert!(patch.contains("<oc:lespas-latitude>1.5</oc:lespas-latitude>"));
        assert!(patch.contains("<oc:lespas-longitude>-2.25</oc:lespas-longitude>"));
        assert!(patch.contains(&format!("<oc:lespas-altitude>{NO_GPS_DATA}</oc:lespas-altitude>")));
    }

    #[test]
    fn test_locate_reads_exif_when_store_has_none() {
        let bytes = crate::probe::exif::tests::jpeg_with_exif(&crate::probe::exif::tests::sample_fields());
        assert!(locate(&item(), &bytes).has_position());
        assert_eq!(locate(&item(), b"junk"), Gps::ABSENT);

        let mut known = item();
        known.gps = Gps::position(3.0, 4.0);
        assert_eq!(locate(&known, &bytes), Gps::position(3.0, 4.0));
    }

    #[tokio::test]
    async fn test_backup_creates_folders_and_advances_watermark() {
        let mut config = crate::testing::config();
        config.backup.enabled = true;
        config.backup.device_model = "Pixel".into();
        let h = crate::testing::Harness::with_config(config).await;
        h.db().status().set_backup_watermark(1_000).await.unwrap();

        let mut old = item();
        old.id = "0".into();
        old.date_added = 900;
        h.media.push(old, b"old".to_vec());
        h.media.push(item(), b"junk".to_vec());

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.stats.files_backed_up, 1);
        assert!(h.remote.has("DCIM/Pixel/Camera/IMG.jpg"));
        assert!(!h.remote.has("DCIM/Pixel/DCIM"));
        let created: Vec<String> = h.remote.calls().into_iter().filter(|c| c.starts_with("mkcol")).collect();
        assert_eq!(created, vec!["mkcol DCIM", "mkcol DCIM/Pixel", "mkcol DCIM/Pixel/Camera"]);
        assert!(h.remote.calls().contains(&"patch DCIM/Pixel/Camera/IMG.jpg".to_string()));
        assert_eq!(
            h.db().status().backup_watermark().await.unwrap(),
            Some(1_700_000_001)
        );

        h.remote.clear_calls();
        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.stats.files_backed_up, 0);
        assert!(!h.remote.calls().iter().any(|c| c.starts_with("upload")));
    }

    #[tokio::test]
    async fn test_first_backup_starts_from_now() {
        let mut config = crate::testing::config();
        config.backup.enabled = true;
        let h = crate::testing::Harness::with_config(config).await;
        h.media.push(item(), b"junk".to_vec());

        let report = h.engine.run_pass().await.unwrap();
        assert_eq!(report.stats.files_backed_up, 0);
        assert!(h.db().status().backup_watermark().await.unwrap().unwrap() > item().date_added);
    }
}
