//! Notifications pushed from the worker to its clients.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

/// Messages the worker sends to every connected client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Notification {
    /// A new worker version finished installing and is waiting for hand-off.
    UpdateAvailable { version: String, required: bool },
    /// A new version took control; clients must reload.
    ReloadClients { version: String },
    CacheSize { bytes: u64 },
    CacheCleared,
    SyncStatus { pending: usize, delivered: usize, failed: usize },
    Connectivity { online: bool },
}

const HISTORY_LIMIT: usize = 64;

/// Broadcasts notifications and keeps a short history for clients that poll.
#[derive(Debug, Clone)]
pub struct Notifier {
    sender: broadcast::Sender<Notification>,
    history: Arc<Mutex<VecDeque<Notification>>>,
}

impl Default for Notifier {
    fn default() -> Self {
        Self::new(100)
    }
}

impl Notifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        Self { sender, history: Arc::new(Mutex::new(VecDeque::with_capacity(HISTORY_LIMIT))) }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Notification> {
        self.sender.subscribe()
    }

    /// Send to every subscriber. Having none is not an error.
    pub fn emit(&self, notification: Notification) {
        tracing::debug!(?notification, "notify clients");
        {
            let mut history = self.history.lock().unwrap_or_else(|e| e.into_inner());
            if history.len() == HISTORY_LIMIT {
                history.pop_front();
            }
            history.push_back(notification.clone());
        }
        let _ = self.sender.send(notification);
    }

    /// The most recent notifications, oldest first.
    pub fn recent(&self) -> Vec<Notification> {
        self.history.lock().unwrap_or_else(|e| e.into_inner()).iter().cloned().collect()
    }
}
