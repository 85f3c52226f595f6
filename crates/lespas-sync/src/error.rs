//! # Sync Error Types
//!
//! Error types for sync passes and their classification.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                       Sync Error Categories                             │
//! │                                                                         │
//! │  ┌─────────────────┐  ┌─────────────────┐  ┌─────────────────────────┐ │
//! │  │  Configuration  │  │     Remote      │  │     Local               │ │
//! │  │                 │  │                 │  │                         │ │
//! │  │  InvalidConfig  │  │  Remote{status} │  │  DatabaseError          │ │
//! │  │  InvalidUrl     │  │  Transport      │  │  Io                     │ │
//! │  │  ConfigLoad/Save│  │  Tls            │  │  Media                  │ │
//! │  └─────────────────┘  │  Authentication │  │  Meta / Action          │ │
//! │                       └─────────────────┘  └─────────────────────────┘ │
//! │                                                                         │
//! │  ┌─────────────────┐                                                   │
//! │  │     Policy      │   ConnectivityPolicy: metered network while       │
//! │  │                 │   the account is restricted to Wi-Fi              │
//! │  └─────────────────┘                                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Disposition
//! ```text
//! status 400 404 405 406 410 ──► SkipAction    drop the action, continue
//! status 401 403 407         ──► Authenticate  abort, ask for credentials
//! status 409                 ──► Conflict      abort, retry next pass
//! status 423                 ──► Backoff 90s   (upload lock on server)
//! status 500..=600           ──► Backoff 300s
//! TLS failure                ──► Backoff 600s
//! connectivity policy        ──► Cancelled     abort, no backoff
//! anything else              ──► Retry         abort, retry next pass
//! ```

use std::time::Duration;

use lespas_core::{CoreError, MetaError};
use thiserror::Error;

/// Result type alias for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Backoff after a 423 Locked (interrupted upload keeps the file locked).
pub const LOCKED_BACKOFF: Duration = Duration::from_secs(90);

/// Backoff after a server error.
pub const SERVER_ERROR_BACKOFF: Duration = Duration::from_secs(300);

/// Backoff after a TLS handshake or peer verification failure.
pub const TLS_BACKOFF: Duration = Duration::from_secs(600);

/// Sync error type covering all possible pass failures.
#[derive(Debug, Error)]
pub enum SyncError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    #[error("Invalid sync configuration: {0}")]
    InvalidConfig(String),

    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    #[error("Failed to load config: {0}")]
    ConfigLoadFailed(String),

    #[error("Failed to save config: {0}")]
    ConfigSaveFailed(String),

    // =========================================================================
    // Remote Errors
    // =========================================================================
    /// The server answered with a non-success HTTP status.
    #[error("Remote returned {status}: {message}")]
    Remote { status: u16, message: String },

    /// Network failure before a status was received (DNS, reset, timeout).
    #[error("Transport error: {0}")]
    Transport(String),

    /// TLS handshake or certificate verification failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Credentials could not be obtained from the account store.
    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    // =========================================================================
    // Policy
    // =========================================================================
    /// Network became metered while sync is restricted to Wi-Fi.
    #[error("Sync not allowed on metered network")]
    ConnectivityPolicy,

    // =========================================================================
    // Local Errors
    // =========================================================================
    #[error("Database error: {0}")]
    DatabaseError(String),

    /// Media cache or temporary file failure.
    #[error("I/O error: {0}")]
    Io(String),

    /// Image or video could not be decoded.
    #[error("Media error: {0}")]
    Media(String),

    #[error(transparent)]
    Meta(#[from] MetaError),

    #[error(transparent)]
    Action(#[from] CoreError),

    #[error("Internal error: {0}")]
    Internal(String),
}

// =============================================================================
// Error Conversions
// =============================================================================

impl From<lespas_db::DbError> for SyncError {
    fn from(err: lespas_db::DbError) -> Self {
        SyncError::DatabaseError(err.to_string())
    }
}

impl From<std::io::Error> for SyncError {
    fn from(err: std::io::Error) -> Self {
        SyncError::Io(err.to_string())
    }
}

impl From<url::ParseError> for SyncError {
    fn from(err: url::ParseError) -> Self {
        SyncError::InvalidUrl(err.to_string())
    }
}

impl From<toml::de::Error> for SyncError {
    fn from(err: toml::de::Error) -> Self {
        SyncError::ConfigLoadFailed(err.to_string())
    }
}

impl From<toml::ser::Error> for SyncError {
    fn from(err: toml::ser::Error) -> Self {
        SyncError::ConfigSaveFailed(err.to_string())
    }
}

impl From<image::ImageError> for SyncError {
    fn from(err: image::ImageError) -> Self {
        SyncError::Media(err.to_string())
    }
}

// =============================================================================
// Error Categorization
// =============================================================================

/// What the pass does with an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Drop the current action and continue with the next one.
    SkipAction,

    /// Abort; the account needs re-authentication.
    Authenticate,

    /// Abort; counted as a conflict and retried next pass.
    Conflict,

    /// Abort and do not start another pass before the delay elapses.
    Backoff(Duration),

    /// Abort without backoff (connectivity policy).
    Cancelled,

    /// Abort; retried next pass with the queue untouched.
    Retry,
}

impl SyncError {
    pub fn remote(status: u16, message: impl Into<String>) -> Self {
        SyncError::Remote {
            status,
            message: message.into(),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            SyncError::Remote { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// WebDAV answers 403 to COPY/MOVE/PUT onto an existing file.
    pub fn is_already_exists(&self) -> bool {
        self.status() == Some(403)
    }

    pub fn disposition(&self) -> Disposition {
        match self {
            SyncError::Remote { status, .. } => match status {
                400 | 404 | 405 | 406 | 410 => Disposition::SkipAction,
                401 | 403 | 407 => Disposition::Authenticate,
                409 => Disposition::Conflict,
                423 => Disposition::Backoff(LOCKED_BACKOFF),
                500..=600 => Disposition::Backoff(SERVER_ERROR_BACKOFF),
                _ => Disposition::Retry,
            },
            SyncError::Tls(_) => Disposition::Backoff(TLS_BACKOFF),
            SyncError::AuthenticationFailed(_) => Disposition::Authenticate,
            SyncError::ConnectivityPolicy => Disposition::Cancelled,
            _ => Disposition::Retry,
        }
    }

    /// Returns true if this error indicates a configuration problem.
    pub fn is_config_error(&self) -> bool {
        matches!(
            self,
            SyncError::InvalidConfig(_)
                | SyncError::InvalidUrl(_)
                | SyncError::ConfigLoadFailed(_)
                | SyncError::ConfigSaveFailed(_)
        )
    }
}
