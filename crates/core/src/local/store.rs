//! Batched, read-through local data store.
//!
//! Reads hit an in-memory shadow first and fall back to the durable backend.
//! Writes land in the shadow immediately and are coalesced: every `set` inside
//! one batch window is folded into a single durable write per key, carrying
//! the last value. A value is therefore visible to readers before it is
//! durable; call [`LocalDataStore::flush`] when durability must be confirmed.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::{Mutex, RwLock};

use super::backend::KvBackend;
use super::records::{WasteEntry, filter_chunked};
use crate::Error;
use crate::clock::Clock;

/// Flat storage keys, one per logical collection.
pub mod keys {
    /// Ordered `WasteEntry` diary.
    pub const WASTE_ENTRIES: &str = "waste-entries";
    /// Mirror of the sync queue length, for display only.
    pub const PENDING_SYNC: &str = "pending-sync";
}

/// Tuning for write batching and chunked reads.
#[derive(Debug, Clone, Copy)]
pub struct LocalStoreOptions {
    /// How long writes are collected before one durable pass (default: one 16ms frame).
    pub batch_window: Duration,
    /// Records processed per slice when filtering collections (default: 100).
    pub chunk_size: usize,
}

impl Default for LocalStoreOptions {
    fn default() -> Self {
        Self { batch_window: Duration::from_millis(16), chunk_size: 100 }
    }
}

struct Inner<B> {
    backend: B,
    clock: Arc<dyn Clock>,
    options: LocalStoreOptions,
    memory: RwLock<HashMap<String, Value>>,
    pending: Mutex<HashMap<String, Value>>,
    flush_scheduled: AtomicBool,
    /// Serializes flush passes so an older batch never lands after a newer one.
    flush_lock: Mutex<()>,
    /// Serializes read-modify-write appends to collections.
    collection_lock: Mutex<()>,
}

/// Structured application records with batched persistence.
pub struct LocalDataStore<B: KvBackend> {
    inner: Arc<Inner<B>>,
}

impl<B: KvBackend> Clone for LocalDataStore<B> {
    fn clone(&self) -> Self {
        Self { inner: Arc::clone(&self.inner) }
    }
}

impl<B: KvBackend> LocalDataStore<B> {
    pub fn new(backend: B, clock: Arc<dyn Clock>, options: LocalStoreOptions) -> Self {
        Self {
            inner: Arc::new(Inner {
                backend,
                clock,
                options,
                memory: RwLock::new(HashMap::new()),
                pending: Mutex::new(HashMap::new()),
                flush_scheduled: AtomicBool::new(false),
                flush_lock: Mutex::new(()),
                collection_lock: Mutex::new(()),
            }),
        }
    }

    /// Read `key`, returning `fallback` when it is missing or unreadable.
    pub async fn get<T: DeserializeOwned>(&self, key: &str, fallback: T) -> T {
        match self.load(key).await {
            Ok(Some(value)) => value,
            Ok(None) => fallback,
            Err(e) => {
                tracing::warn!(key, error = %e, "local read failed, using fallback");
                fallback
            }
        }
    }

    /// Read `key`, telling an absent key apart from one that could not be read.
    async fn load<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>, Error> {
        let cached = self.inner.memory.read().await.get(key).cloned();
        let value = match cached {
            Some(value) => value,
            None => {
                let Some(raw) = self.inner.backend.read(key).await? else {
                    return Ok(None);
                };
                let value: Value = serde_json::from_str(&raw)
                    .map_err(|e| Error::Serialization(format!("{key}: stored value is not valid JSON: {e}")))?;

                // A concurrent `set` may have populated the shadow while we were
                // reading; its value is newer than what the backend returned.
                self.inner.memory.write().await.entry(key.to_string()).or_insert(value).clone()
            }
        };
        serde_json::from_value(value)
            .map(Some)
            .map_err(|e| Error::Serialization(format!("{key}: stored value has unexpected shape: {e}")))
    }

    /// Write `value` under `key`.
    ///
    /// Returns once the write is visible in memory and scheduled for the next
    /// durable pass. Only serialization failures are reported; backend write
    /// failures are logged by the flush.
    pub async fn set<T: Serialize>(&self, key: &str, value: &T) -> Result<(), Error> {
        let value = serde_json::to_value(value)?;
        self.inner.memory.write().await.insert(key.to_string(), value.clone());

        let mut pending = self.inner.pending.lock().await;
        pending.insert(key.to_string(), value);
        if !self.inner.flush_scheduled.swap(true, Ordering::AcqRel) {
            let inner = Arc::clone(&self.inner);
            tokio::spawn(async move {
                tokio::time::sleep(inner.options.batch_window).await;
                inner.flush().await;
            });
        }
        Ok(())
    }

    /// Write every pending key now. Returns how many keys reached the backend.
    pub async fn flush(&self) -> usize {
        self.inner.flush().await
    }

    /// Append a record to an ordered collection.
    ///
    /// Fails without writing when the existing collection cannot be read, so a
    /// read error never replaces stored records with just the new one.
    pub async fn append<T>(&self, key: &str, record: T) -> Result<(), Error>
    where
        T: Serialize + DeserializeOwned,
    {
        let _guard = self.inner.collection_lock.lock().await;
        let mut records: Vec<T> = self.load(key).await?.unwrap_or_default();
        records.push(record);
        self.set(key, &records).await
    }

    /// Add a diary entry to the `waste-entries` collection.
    pub async fn add_record(&self, entry: WasteEntry) -> Result<(), Error> {
        self.append(keys::WASTE_ENTRIES, entry).await
    }

    /// Diary entries created on the current (UTC) calendar day, in insertion order.
    pub async fn get_today_records(&self) -> Vec<WasteEntry> {
        let entries: Vec<WasteEntry> = self.get(keys::WASTE_ENTRIES, Vec::new()).await;
        let today = self.inner.clock.now().date_naive();
        filter_chunked(entries, self.inner.options.chunk_size, |e| e.created_at.date_naive() == today).await
    }

    pub fn clock(&self) -> &Arc<dyn Clock> {
        &self.inner.clock
    }
}

impl<B: KvBackend> Inner<B> {
    async fn flush(&self) -> usize {
        let _serial = self.flush_lock.lock().await;
        let batch = {
            let mut pending = self.pending.lock().await;
            self.flush_scheduled.store(false, Ordering::Release);
            std::mem::take(&mut *pending)
        };

        let mut written = 0;
        for (key, value) in batch {
            match self.backend.write(&key, &value.to_string()).await {
                Ok(()) => written += 1,
                Err(e) => tracing::warn!(key = %key, error = %e, "durable write failed, value kept in memory only"),
            }
        }
        if written > 0 {
            tracing::trace!(written, "flushed local writes");
        }
        written
    }
}
