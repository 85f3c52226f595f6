//! # Progress Reporting
//!
//! Stages, outcomes and the event sink a pass reports through.
//!
//! ```text
//!   SyncEngine ──emit_*()──► dyn SyncEventEmitter
//!                               ├── NoOpEmitter      (tests, headless)
//!                               └── ChannelEmitter ──► mpsc ──► UI task
//! ```

use std::fmt;

use lespas_core::ActionKind;
use serde::Serialize;
use tokio::sync::mpsc;

// =============================================================================
// Stage and Outcome
// =============================================================================

/// Phase of a pass, persisted as the `stage` status marker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncStage {
    Started,
    LocalActions,
    RemoteChanges,
    MetaUpdate,
    Backup,
    Finished,
}

impl SyncStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncStage::Started => "started",
            SyncStage::LocalActions => "local_actions",
            SyncStage::RemoteChanges => "remote_changes",
            SyncStage::MetaUpdate => "meta_update",
            SyncStage::Backup => "backup",
            SyncStage::Finished => "finished",
        }
    }
}

impl fmt::Display for SyncStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Coarse result of a pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PassOutcome {
    Finished,
    GeneralError,
    NoConnectivity,
    AuthenticationRequired,

    /// Started before `retry_not_before`; nothing was done.
    Deferred,
}

// =============================================================================
// Events
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SyncEvent {
    Stage {
        stage: SyncStage,
    },
    Action {
        kind: ActionKind,
        folder: String,
        file: String,
    },
    AlbumProgress {
        album: String,
        progress: f32,
    },
    Backup {
        file: String,
        done: usize,
        total: usize,
    },
    Error {
        message: String,
        retryable: bool,
    },
    Finished {
        outcome: PassOutcome,
    },
}

/// Sink for pass progress.
pub trait SyncEventEmitter: Send + Sync {
    fn emit_stage(&self, stage: SyncStage);

    /// An action is about to be applied.
    fn emit_action(&self, kind: ActionKind, folder: &str, file: &str);

    /// Probing progress of a changed album, 0.0 to 1.0.
    fn emit_album_progress(&self, album: &str, progress: f32);

    fn emit_backup_progress(&self, file: &str, done: usize, total: usize);

    fn emit_error(&self, message: &str, retryable: bool);

    fn emit_finished(&self, outcome: PassOutcome);
}

/// Discards every event.
pub struct NoOpEmitter;

impl SyncEventEmitter for NoOpEmitter {
    fn emit_stage(&self, _stage: SyncStage) {}
    fn emit_action(&self, _kind: ActionKind, _folder: &str, _file: &str) {}
    fn emit_album_progress(&self, _album: &str, _progress: f32) {}
    fn emit_backup_progress(&self, _file: &str, _done: usize, _total: usize) {}
    fn emit_error(&self, _message: &str, _retryable: bool) {}
    fn emit_finished(&self, _outcome: PassOutcome) {}
}

/// Forwards events over an unbounded channel. A dropped receiver silently
/// stops delivery.
#[derive(Debug, Clone)]
pub struct ChannelEmitter {
    tx: mpsc::UnboundedSender<SyncEvent>,
}

impl ChannelEmitter {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<SyncEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (ChannelEmitter { tx }, rx)
    }

    fn send(&self, event: SyncEvent) {
        let _ = self.tx.send(event);
    }
}

impl SyncEventEmitter for ChannelEmitter {
    fn emit_stage(&self, stage: SyncStage) {
        self.send(SyncEvent::Stage { stage });
    }

    fn emit_action(&self, kind: ActionKind, folder: &str, file: &str) {
        self.send(SyncEvent::Action {
            kind,
            folder: folder.to_string(),
            file: file.to_string(),
        });
    }

    fn emit_album_progress(&self, album: &str, progress: f32) {
        self.send(SyncEvent::AlbumProgress {
            album: album.to_string(),
            progress,
        });
    }

    fn emit_backup_progress(&self, file: &str, done: usize, total: usize) {
        self.send(SyncEvent::Backup {
            file: file.to_string(),
            done,
            total,
        });
    }

    fn emit_error(&self, message: &str, retryable: bool) {
        self.send(SyncEvent::Error {
            message: message.to_string(),
            retryable,
        });
    }

    fn emit_finished(&self, outcome: PassOutcome) {
        self.send(SyncEvent::Finished { outcome });
    }
}
