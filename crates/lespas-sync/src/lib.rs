//! # lespas-sync: Album Sync Engine
//!
//! Keeps the local photo catalog and media cache of one account in step
//! with its WebDAV archive, and backs up the device camera roll.
//!
//! ## Architecture Overview
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Sync Engine Architecture                         │
//! │                                                                         │
//! │  ┌──────────────────────────────────────────────────────────────────┐  │
//! │  │                 SyncEngine::run_pass (one account)               │  │
//! │  │                                                                  │  │
//! │  │  Triggered by the host; one pass at a time per account           │  │
//! │  └────────────────────────────┬─────────────────────────────────────┘  │
//! │                               │                                         │
//! │    ┌──────────────────┬───────┴──────────┬──────────────────┐          │
//! │    ▼                  ▼                  ▼                  ▼           │
//! │  ┌──────────────┐ ┌──────────────┐ ┌──────────────┐ ┌──────────────┐  │
//! │  │ActionApplier │ │  Reconciler  │ │  MetaWriter  │ │BackupUploader│  │
//! │  │              │ │              │ │              │ │              │  │
//! │  │ Drains the   │ │ Pulls remote │ │ Writes dirty │ │ Camera roll  │  │
//! │  │ action queue │ │ album state, │ │ album and    │ │ to the DCIM  │  │
//! │  │ to the server│ │ quick sync + │ │ content docs │ │ archive      │  │
//! │  │ (+ blog)     │ │ media probes │ │              │ │              │  │
//! │  └──────────────┘ └──────────────┘ └──────────────┘ └──────────────┘  │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │  Host seams (traits)                                            │   │
//! │  │  RemoteStore · MediaStore · ConnectivityPolicy · SyncEventEmitter│   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │                                                                         │
//! │  Catalog: lespas-db (SQLite)      Cache: MediaCache (flat directory)    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! ### Pass Phases
//! - [`engine`] - `SyncEngine`, its builder and the pass report
//! - [`applier`] - Local action queue replay
//! - [`reconciler`] - Remote album reconciliation
//! - [`quick_sync`] - Content snapshot adoption
//! - [`meta_writer`] - Album and content document flush
//! - [`backup`] - Camera roll backup
//! - [`blog`] - Blog post publishing
//!
//! ### Support
//! - [`config`] - Account, paths and pass settings
//! - [`error`] - Sync error types and dispositions
//! - [`remote`] - WebDAV store contract
//! - [`media_store`] - Device media contract
//! - [`connectivity`] - Metered network policy
//! - [`cache`] - Local media cache
//! - [`probe`] - EXIF and MP4 metadata extraction
//! - [`progress`] - Stages, outcomes and events
//! - [`logging`] - Tracing subscriber setup
//!
//! ## Usage
//!
//! ```rust,ignore
//! use lespas_db::{Database, DbConfig};
//! use lespas_sync::{SyncConfig, SyncEngineBuilder};
//!
//! lespas_sync::logging::init_tracing();
//!
//! let config = SyncConfig::load(None)?;
//! let db = Database::new(DbConfig::new(&config.paths.database)).await?;
//!
//! let engine = SyncEngineBuilder::new(config)
//!     .with_database(db)
//!     .with_remote(Arc::new(my_dav_client))
//!     .build()?;
//!
//! let report = engine.run_pass().await?;
//! println!("Outcome: {:?}", report.outcome);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

// Pass phases
pub mod applier;
pub mod backup;
pub mod blog;
pub mod engine;
pub mod meta_writer;
pub mod quick_sync;
pub mod reconciler;

// Support
pub mod cache;
pub mod config;
pub mod connectivity;
pub mod context;
pub mod error;
pub mod logging;
pub mod media_store;
pub mod probe;
pub mod progress;
pub mod remote;

#[cfg(test)]
pub(crate) mod testing;

// =============================================================================
// Re-exports
// =============================================================================

pub use cache::MediaCache;
pub use config::{AccountConfig, BackupSettings, BlogSettings, PathsConfig, SyncConfig, SyncSettings};
pub use connectivity::{ConnectivityPolicy, Unmetered};
pub use context::PassStats;
pub use engine::{PassReport, SyncEngine, SyncEngineBuilder};
pub use error::{Disposition, SyncError, SyncResult};
pub use media_store::{DeviceMedia, MediaStore, NoDeviceMedia};
pub use progress::{ChannelEmitter, NoOpEmitter, PassOutcome, SyncEvent, SyncEventEmitter, SyncStage};
pub use remote::{dav_path, DavEntry, RemoteStore, UploadReceipt};
