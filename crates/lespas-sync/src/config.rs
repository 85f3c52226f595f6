//! # Sync Configuration
//!
//! Configuration management for the sync engine.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     LESPAS_SERVER_URL=https://cloud.example.com                        │
//! │     LESPAS_USER=alice                                                  │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/lespas/sync.toml (Linux)                                 │
//! │     ~/Library/Application Support/site.leos.lespas/sync.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [account]
//! server_url = "https://cloud.example.com"
//! user = "alice"
//!
//! [paths]
//! resource_root = "lespas"     # album folders, relative to the DAV home
//! dcim_root = "DCIM"           # device archive, relative to the DAV home
//! cache_dir = "/var/cache/lespas"
//! database = "/var/lib/lespas/lespas.db"
//!
//! [sync]
//! wifi_only = true
//! default_sort_order = 0
//! probe_prefix_bytes = 65536
//!
//! [backup]
//! enabled = false
//! device_model = "Pixel 7"
//!
//! [blog]
//! site_title = "Les Pas"
//! author = "Alice"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tracing::{debug, info, warn};
use url::Url;

use crate::error::{SyncError, SyncResult};

// =============================================================================
// Sections
// =============================================================================

/// Server account.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AccountConfig {
    /// Base URL of the server, e.g. `https://cloud.example.com`.
    #[serde(default)]
    pub server_url: String,

    /// Login name; the DAV home is `remote.php/dav/files/{user}`.
    #[serde(default)]
    pub user: String,
}

/// Remote folders and local storage.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Album root, relative to the DAV home.
    #[serde(default = "default_resource_root")]
    pub resource_root: String,

    /// Device archive root, relative to the DAV home.
    #[serde(default = "default_dcim_root")]
    pub dcim_root: String,

    /// Media cache directory.
    #[serde(default = "default_cache_dir")]
    pub cache_dir: PathBuf,

    /// Catalog database file.
    #[serde(default = "default_database")]
    pub database: PathBuf,
}

fn default_resource_root() -> String {
    "lespas".to_string()
}

fn default_dcim_root() -> String {
    "DCIM".to_string()
}

fn default_cache_dir() -> PathBuf {
    directories::ProjectDirs::from("site", "leos", "lespas")
        .map(|dirs| dirs.cache_dir().join("media"))
        .unwrap_or_else(|| PathBuf::from("lespas-cache"))
}

fn default_database() -> PathBuf {
    directories::ProjectDirs::from("site", "leos", "lespas")
        .map(|dirs| dirs.data_dir().join("lespas.db"))
        .unwrap_or_else(|| PathBuf::from("lespas.db"))
}

impl Default for PathsConfig {
    fn default() -> Self {
        PathsConfig {
            resource_root: default_resource_root(),
            dcim_root: default_dcim_root(),
            cache_dir: default_cache_dir(),
            database: default_database(),
        }
    }
}

/// Sync behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncSettings {
    /// Refuse to sync on metered networks.
    #[serde(default = "default_true")]
    pub wifi_only: bool,

    /// Sort order code given to albums first seen on the server.
    #[serde(default)]
    pub default_sort_order: i32,

    /// Bytes read from remote-album media before falling back to a full
    /// download while probing.
    #[serde(default = "default_probe_prefix_bytes")]
    pub probe_prefix_bytes: u64,
}

fn default_true() -> bool {
    true
}

fn default_probe_prefix_bytes() -> u64 {
    64 * 1024
}

impl Default for SyncSettings {
    fn default() -> Self {
        SyncSettings {
            wifi_only: true,
            default_sort_order: 0,
            probe_prefix_bytes: default_probe_prefix_bytes(),
        }
    }
}

/// Camera roll backup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupSettings {
    #[serde(default)]
    pub enabled: bool,

    /// Folder name under the DCIM root.
    #[serde(default = "default_device_model")]
    pub device_model: String,
}

fn default_device_model() -> String {
    "device".to_string()
}

impl Default for BackupSettings {
    fn default() -> Self {
        BackupSettings {
            enabled: false,
            device_model: default_device_model(),
        }
    }
}

/// Blog publishing.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BlogSettings {
    #[serde(default = "default_site_title")]
    pub site_title: String,

    /// Author display name; falls back to the account user.
    #[serde(default)]
    pub author: String,
}

fn default_site_title() -> String {
    "Les Pas".to_string()
}

impl Default for BlogSettings {
    fn default() -> Self {
        BlogSettings {
            site_title: default_site_title(),
            author: String::new(),
        }
    }
}

// =============================================================================
// SyncConfig
// =============================================================================

/// Complete engine configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub account: AccountConfig,

    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub sync: SyncSettings,

    #[serde(default)]
    pub backup: BackupSettings,

    #[serde(default)]
    pub blog: BlogSettings,
}

impl SyncConfig {
    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (sync.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading sync config from file");
                let contents = std::fs::read_to_string(&path)
                    .map_err(|e| SyncError::ConfigLoadFailed(e.to_string()))?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides();
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<()> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Sync config saved");
        Ok(())
    }

    pub fn validate(&self) -> SyncResult<()> {
        let url = Url::parse(&self.account.server_url)?;
        if url.scheme() != "http" && url.scheme() != "https" {
            return Err(SyncError::InvalidUrl(format!(
                "Server URL must be http:// or https://, got: {}",
                self.account.server_url
            )));
        }

        if self.account.user.is_empty() {
            return Err(SyncError::InvalidConfig("account.user must be set".into()));
        }

        if self.paths.resource_root.trim_matches('/').is_empty() {
            return Err(SyncError::InvalidConfig(
                "paths.resource_root must not be empty".into(),
            ));
        }

        if self.sync.probe_prefix_bytes == 0 {
            return Err(SyncError::InvalidConfig(
                "sync.probe_prefix_bytes must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var("LESPAS_SERVER_URL") {
            debug!(url = %url, "Overriding server URL from environment");
            self.account.server_url = url;
        }

        if let Ok(user) = std::env::var("LESPAS_USER") {
            self.account.user = user;
        }

        if let Ok(dir) = std::env::var("LESPAS_CACHE_DIR") {
            self.paths.cache_dir = PathBuf::from(dir);
        }

        if let Ok(path) = std::env::var("LESPAS_DATABASE") {
            self.paths.database = PathBuf::from(path);
        }

        if let Ok(value) = std::env::var("LESPAS_WIFI_ONLY") {
            match value.parse::<bool>() {
                Ok(flag) => self.sync.wifi_only = flag,
                Err(_) => warn!(value = %value, "Ignoring non-boolean LESPAS_WIFI_ONLY"),
            }
        }

        if let Ok(value) = std::env::var("LESPAS_BACKUP_ENABLED") {
            match value.parse::<bool>() {
                Ok(flag) => self.backup.enabled = flag,
                Err(_) => warn!(value = %value, "Ignoring non-boolean LESPAS_BACKUP_ENABLED"),
            }
        }
    }

    fn default_config_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("site", "leos", "lespas")
            .map(|dirs| dirs.config_dir().join("sync.toml"))
    }

    // =========================================================================
    // Convenience Methods
    // =========================================================================

    /// Scheme, host and port of the server, e.g. `https://cloud.example.com`.
    pub fn server_origin(&self) -> SyncResult<String> {
        let url = Url::parse(&self.account.server_url)?;
        Ok(url.origin().ascii_serialization())
    }

    pub fn resource_root(&self) -> &str {
        self.paths.resource_root.trim_matches('/')
    }

    pub fn dcim_root(&self) -> &str {
        self.paths.dcim_root.trim_matches('/')
    }

    pub fn blog_author(&self) -> &str {
        if self.blog.author.is_empty() {
            &self.account.user
        } else {
            &self.blog.author
        }
    }
}
