//! Core types and storage for binsync.
//!
//! This crate provides:
//! - Versioned response caches with SQLite backend
//! - Batched local data store and the durable sync queue
//! - Worker update lifecycle, connectivity and notifications
//! - Unified error types
//! - Configuration structures

pub mod cache;
pub mod clock;
pub mod config;
pub mod connectivity;
pub mod control;
pub mod db;
pub mod engine;
pub mod error;
pub mod local;
pub mod notify;
pub mod queue;
pub mod update;

pub use cache::{CacheEntry, CacheHandle, CacheKind, CacheNames, CacheStore, StoredResponse};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AppConfig, ConfigError};
pub use connectivity::ConnectivityMonitor;
pub use control::{ControlMessage, ControlReply};
pub use db::StoreDb;
pub use engine::{OfflineEngine, RecordOutcome};
pub use error::Error;
pub use local::{LocalDataStore, NewWasteEntry, WasteEntry};
pub use notify::{Notification, Notifier};
pub use queue::{DrainReport, MemoryRemote, MutationDraft, QueuedMutation, RemoteSink, SyncQueue};
pub use update::{Activation, ReleaseInfo, UpdateCoordinator, UpdateSource};
