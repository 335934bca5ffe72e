//! Offline-first write path for diary records.
//!
//! A record is always persisted locally first and then travels to the remote
//! through the sync queue, so local reads never wait on the network and the
//! remote sees writes in the order they were made.

use std::sync::Arc;

use serde::Serialize;
use tokio::task::JoinHandle;

use crate::Error;
use crate::connectivity::ConnectivityMonitor;
use crate::db::StoreDb;
use crate::local::{KvBackend, LocalDataStore, NewWasteEntry, WasteEntry, keys};
use crate::notify::{Notification, Notifier};
use crate::queue::{DrainReport, ItemOutcome, MutationDraft, RemoteSink, SyncQueue};

/// What happened to a record handed to [`OfflineEngine::add_record`].
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordOutcome {
    pub entry: WasteEntry,
    /// The remote acknowledged the record before this call returned.
    pub synced: bool,
    /// Mutations still waiting for the remote.
    pub pending: usize,
}

/// Facade over local persistence, the sync queue and connectivity.
pub struct OfflineEngine<B: KvBackend = StoreDb> {
    local: LocalDataStore<B>,
    queue: SyncQueue,
    connectivity: ConnectivityMonitor,
    notifier: Notifier,
    sink: Arc<dyn RemoteSink>,
}

impl<B: KvBackend> OfflineEngine<B> {
    pub fn new(
        local: LocalDataStore<B>, queue: SyncQueue, connectivity: ConnectivityMonitor, notifier: Notifier,
        sink: Arc<dyn RemoteSink>,
    ) -> Self {
        Self { local, queue, connectivity, notifier, sink }
    }

    pub fn local(&self) -> &LocalDataStore<B> {
        &self.local
    }

    pub fn queue(&self) -> &SyncQueue {
        &self.queue
    }

    pub fn connectivity(&self) -> &ConnectivityMonitor {
        &self.connectivity
    }

    /// Persist a new diary entry and queue it for the remote.
    ///
    /// When online the queue is drained right away; a delivery failure leaves
    /// the record queued and is not an error for the caller.
    pub async fn add_record(&self, new: NewWasteEntry) -> Result<RecordOutcome, Error> {
        let entry = WasteEntry::create(new, self.local.clock().now())?;
        self.local.add_record(entry.clone()).await?;

        let draft = MutationDraft::new(serde_json::to_value(&entry)?).with_entity_key(entry.id.clone());
        let queued = self.queue.enqueue(draft).await?;

        let mut synced = false;
        if self.connectivity.is_online() {
            match self.sync().await {
                Ok(report) => {
                    synced = report
                        .outcomes
                        .iter()
                        .any(|o| matches!(o, ItemOutcome::Delivered { seq, .. } if *seq == queued.seq));
                }
                Err(e) => tracing::warn!(error = %e, id = %entry.id, "direct sync failed, record stays queued"),
            }
        } else {
            tracing::debug!(id = %entry.id, "offline, record queued");
            self.mirror_pending().await?;
        }

        let pending = self.queue.len().await?;
        Ok(RecordOutcome { entry, synced, pending })
    }

    pub async fn today_records(&self) -> Vec<WasteEntry> {
        self.local.get_today_records().await
    }

    /// Drain the queue now if online. Offline, nothing is attempted.
    pub async fn sync_now(&self) -> Result<DrainReport, Error> {
        if !self.connectivity.is_online() {
            tracing::debug!("sync requested while offline, skipped");
            return Ok(DrainReport { remaining: self.queue.len().await?, ..Default::default() });
        }
        self.sync().await
    }

    async fn sync(&self) -> Result<DrainReport, Error> {
        let report = self.queue.drain(self.sink.as_ref()).await?;
        self.mirror_pending().await?;
        if !report.outcomes.is_empty() {
            tracing::info!(
                delivered = report.delivered(),
                failed = report.failed(),
                remaining = report.remaining,
                "sync pass finished"
            );
            self.notifier.emit(Notification::SyncStatus {
                pending: report.remaining,
                delivered: report.delivered(),
                failed: report.failed(),
            });
        }
        Ok(report)
    }

    async fn mirror_pending(&self) -> Result<(), Error> {
        let pending = self.queue.len().await?;
        self.local.set(keys::PENDING_SYNC, &pending).await
    }

    /// Make every pending local write durable.
    pub async fn shutdown(&self) -> usize {
        self.local.flush().await
    }

    /// Drain whenever connectivity comes back, and once at start if online.
    pub fn spawn_sync_loop(self: &Arc<Self>) -> JoinHandle<()> {
        let engine = Arc::clone(self);
        let mut online = self.connectivity.subscribe();
        tokio::spawn(async move {
            if *online.borrow_and_update()
                && let Err(e) = engine.sync().await
            {
                tracing::warn!(error = %e, "startup sync failed");
            }
            while online.changed().await.is_ok() {
                if !*online.borrow_and_update() {
                    continue;
                }
                if let Err(e) = engine.sync().await {
                    tracing::warn!(error = %e, "sync after reconnect failed");
                }
            }
        })
    }
}
