//! Online/offline signal shared by the router host and the sync loop.

use tokio::sync::watch;

use crate::notify::{Notification, Notifier};

/// Current connectivity plus a change feed.
#[derive(Debug, Clone)]
pub struct ConnectivityMonitor {
    sender: watch::Sender<bool>,
    notifier: Notifier,
}

impl ConnectivityMonitor {
    pub fn new(online: bool, notifier: Notifier) -> Self {
        let (sender, _) = watch::channel(online);
        Self { sender, notifier }
    }

    pub fn is_online(&self) -> bool {
        *self.sender.borrow()
    }

    /// Record a connectivity signal. Returns whether the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        let changed = self.sender.send_if_modified(|current| {
            if *current == online {
                return false;
            }
            *current = online;
            true
        });
        if changed {
            if online {
                tracing::info!("connectivity restored");
            } else {
                tracing::info!("connectivity lost");
            }
            self.notifier.emit(Notification::Connectivity { online });
        }
        changed
    }

    pub fn subscribe(&self) -> watch::Receiver<bool> {
        self.sender.subscribe()
    }
}
