//! Control-channel messages between clients and the worker.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// A request sent by a client to the worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlMessage {
    /// Hand control to the waiting version now.
    SkipWaiting,
    GetCacheSize,
    ClearCache,
    /// Drain the sync queue immediately.
    SyncNow,
}

/// The worker's answer to a [`ControlMessage`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ControlReply {
    Activated { version: String, previous: Option<String>, purged: Vec<String> },
    /// `SKIP_WAITING` arrived with no version waiting.
    NothingWaiting,
    CacheSize { bytes: u64 },
    CacheCleared { caches: usize },
    SyncReport { delivered: usize, failed: usize, skipped: usize, remaining: usize },
}
