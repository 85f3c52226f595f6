//! # Error Types
//!
//! Domain error types for lespas-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  lespas-core errors (this file)                                        │
//! │  ├── CoreError   - Undecodable queued actions                          │
//! │  └── MetaError   - Malformed album/content meta documents              │
//! │                                                                         │
//! │  lespas-db errors (separate crate)                                     │
//! │  └── DbError     - Catalog failures                                    │
//! │                                                                         │
//! │  lespas-sync errors (separate crate)                                   │
//! │  └── SyncError   - Transport, classification, pass aborts              │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while interpreting queued actions.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The persisted action kind code is not known to this build.
    ///
    /// ## When This Occurs
    /// - Queue written by a newer client version
    /// - Manual edits to the catalog database
    #[error("Unknown action kind: {0}")]
    UnknownActionKind(i32),

    /// A field of the action record could not be interpreted.
    ///
    /// ## When This Occurs
    /// - Piped photo meta with the wrong number of fields
    /// - Non-numeric width/height/orientation/GPS values
    #[error("Invalid {kind} action: {reason}")]
    InvalidActionPayload { kind: &'static str, reason: String },

    /// A meta document failed to parse.
    #[error(transparent)]
    Meta(#[from] MetaError),
}

impl CoreError {
    pub fn invalid_payload(kind: &'static str, reason: impl Into<String>) -> Self {
        CoreError::InvalidActionPayload {
            kind,
            reason: reason.into(),
        }
    }
}

// =============================================================================
// Meta Error
// =============================================================================

/// Album or content meta document could not be read.
///
/// Never fatal for a sync pass: the caller schedules regeneration of the
/// document instead.
#[derive(Debug, Error)]
pub enum MetaError {
    /// JSON syntax error or a required field with the wrong type.
    #[error("Malformed meta document: {0}")]
    Malformed(#[from] serde_json::Error),

    /// Document is valid JSON but not a Les Pas document.
    #[error("Meta document is missing the '{0}' object")]
    MissingObject(&'static str),
}

pub type MetaResult<T> = Result<T, MetaError>;
