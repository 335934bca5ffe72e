//! Named, versioned response caches.
//!
//! This module provides the worker's durable response storage:
//!
//! - Four cache kinds (critical, static, data, image) per worker generation
//! - Cache names derived from the deploy version tag
//! - Freshness stamps written by the store, not taken from origin headers
//! - Digest-checked, all-or-nothing entry writes
//! - Whole-cache purge on activation (no per-entry eviction)

pub mod entry;
pub mod names;
pub mod store;

pub use entry::{CacheEntry, StoredResponse};
pub use names::{CacheKind, CacheNames};
pub use store::{CacheHandle, CacheStore};
