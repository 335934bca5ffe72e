//! Remote delivery targets for the sync queue.

use std::collections::HashSet;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use async_trait::async_trait;
use serde_json::Value;

use super::mutation::QueuedMutation;
use crate::Error;

/// How the remote acknowledged a mutation. Both outcomes remove it from the queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Delivery {
    Accepted,
    /// The remote already applied this id.
    Duplicate,
}

/// Where queued mutations are delivered.
///
/// Implementations must treat [`QueuedMutation::id`] as an idempotency key:
/// delivering the same id twice has a single effect.
#[async_trait]
pub trait RemoteSink: Send + Sync {
    async fn deliver(&self, mutation: &QueuedMutation) -> Result<Delivery, Error>;
}

/// In-process remote that applies each id at most once.
///
/// Test double for queue, engine and worker tests.
#[derive(Debug, Default)]
pub struct MemoryRemote {
    applied: Mutex<Vec<(String, Value)>>,
    seen: Mutex<HashSet<String>>,
    failing: AtomicBool,
    failing_entities: Mutex<HashSet<String>>,
    calls: AtomicUsize,
}

impl MemoryRemote {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every delivery fail (simulates an unreachable endpoint).
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    /// Reject mutations for one entity key until cleared.
    pub fn fail_entity(&self, entity_key: &str, failing: bool) {
        let mut entities = self.failing_entities.lock().unwrap_or_else(|e| e.into_inner());
        if failing {
            entities.insert(entity_key.to_string());
        } else {
            entities.remove(entity_key);
        }
    }

    /// Applied effects, in delivery order: `(id, payload)`.
    pub fn applied(&self) -> Vec<(String, Value)> {
        self.applied.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    /// Number of `deliver` calls, including failed and duplicate ones.
    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RemoteSink for MemoryRemote {
    async fn deliver(&self, mutation: &QueuedMutation) -> Result<Delivery, Error> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.failing.load(Ordering::SeqCst) {
            return Err(Error::Network("remote unreachable".into()));
        }
        if let Some(key) = &mutation.entity_key {
            let entities = self.failing_entities.lock().unwrap_or_else(|e| e.into_inner());
            if entities.contains(key) {
                return Err(Error::RemoteRejected(format!("entity {key} rejected")));
            }
        }

        let mut seen = self.seen.lock().unwrap_or_else(|e| e.into_inner());
        if !seen.insert(mutation.id.clone()) {
            return Ok(Delivery::Duplicate);
        }
        self.applied
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push((mutation.id.clone(), mutation.payload.clone()));
        Ok(Delivery::Accepted)
    }
}
