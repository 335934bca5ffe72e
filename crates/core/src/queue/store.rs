//! Durable FIFO of outbound mutations.
//!
//! Rows live in the `sync_queue` table ordered by `seq`. A row is deleted only
//! after the remote acknowledges it; a failed delivery puts it back to pending
//! with `attempts + 1` and the error recorded. Drains are serialized by a drain
//! lock while `enqueue` may run at any time.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use tokio_rusqlite::params;
use tokio_rusqlite::rusqlite;

use super::mutation::{MutationDraft, MutationState, QueuedMutation};
use super::sink::{Delivery, RemoteSink};
use crate::Error;
use crate::clock::Clock;
use crate::db::StoreDb;

/// What a drain does after a failed delivery.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DrainPolicy {
    /// Stop at the first failure; the next trigger resumes from the same item.
    #[default]
    HaltOnFailure,
    /// Skip later items for the failed item's entity key and keep going.
    /// A failed item without an entity key still halts the drain.
    IsolateByEntity,
}

/// Result of one attempted (or skipped) item.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum ItemOutcome {
    Delivered { seq: i64, id: String, duplicate: bool },
    Failed { seq: i64, id: String, error: String },
    Skipped { seq: i64, id: String },
}

/// Summary of a drain pass.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct DrainReport {
    pub outcomes: Vec<ItemOutcome>,
    /// True when the pass stopped early on a failure.
    pub halted: bool,
    /// Items still queued when the pass ended.
    pub remaining: usize,
}

impl DrainReport {
    pub fn delivered(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ItemOutcome::Delivered { .. })).count()
    }

    pub fn failed(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ItemOutcome::Failed { .. })).count()
    }

    pub fn skipped(&self) -> usize {
        self.outcomes.iter().filter(|o| matches!(o, ItemOutcome::Skipped { .. })).count()
    }
}

/// Queue behaviour knobs.
#[derive(Debug, Clone, Copy)]
pub struct SyncQueueOptions {
    pub policy: DrainPolicy,
    /// Upper bound on a single remote delivery.
    pub delivery_timeout: Duration,
}

impl Default for SyncQueueOptions {
    fn default() -> Self {
        Self { policy: DrainPolicy::default(), delivery_timeout: Duration::from_secs(10) }
    }
}

/// seq, id, entity_key, payload, created_at, attempts, last_error, state
type MutationRow = (i64, String, Option<String>, String, String, i64, Option<String>, String);

const SELECT_COLUMNS: &str =
    "SELECT seq, id, entity_key, payload, created_at, attempts, last_error, state FROM sync_queue";

fn read_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MutationRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn into_mutation(row: MutationRow) -> Result<QueuedMutation, Error> {
    let (seq, id, entity_key, payload, created_at, attempts, last_error, state) = row;
    let created_at = DateTime::parse_from_rfc3339(&created_at)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| Error::Serialization(format!("bad created_at '{created_at}': {e}")))?;
    Ok(QueuedMutation {
        seq,
        id,
        entity_key,
        payload: serde_json::from_str(&payload)?,
        created_at,
        attempts: u32::try_from(attempts.max(0)).unwrap_or(u32::MAX),
        last_error,
        state: MutationState::parse(&state)?,
    })
}

/// Durable, ordered, idempotent-replay mutation queue.
#[derive(Clone, Debug)]
pub struct SyncQueue {
    db: StoreDb,
    clock: Arc<dyn Clock>,
    options: SyncQueueOptions,
    drain_lock: Arc<Mutex<()>>,
}

impl SyncQueue {
    /// Open the queue, returning items a crashed drain left in flight to pending.
    pub async fn open(db: StoreDb, clock: Arc<dyn Clock>, options: SyncQueueOptions) -> Result<Self, Error> {
        let reset = db
            .conn
            .call(|conn| -> Result<usize, Error> {
                let n = conn.execute("UPDATE sync_queue SET state = 'pending' WHERE state = 'in_flight'", [])?;
                Ok(n)
            })
            .await
            .map_err(Error::from)?;
        if reset > 0 {
            tracing::info!(reset, "returned interrupted deliveries to pending");
        }
        Ok(Self { db, clock, options, drain_lock: Arc::new(Mutex::new(())) })
    }

    /// Append a mutation at the tail.
    pub async fn enqueue(&self, draft: MutationDraft) -> Result<QueuedMutation, Error> {
        let payload = serde_json::to_string(&draft.payload)?;
        let created_at = self.clock.now();
        let stamp = created_at.to_rfc3339();
        let (id, entity_key) = (draft.id.clone(), draft.entity_key.clone());

        let seq = self
            .db
            .conn
            .call(move |conn| -> Result<i64, Error> {
                conn.execute(
                    "INSERT INTO sync_queue (id, entity_key, payload, created_at) VALUES (?1, ?2, ?3, ?4)",
                    params![id, entity_key, payload, stamp],
                )?;
                Ok(conn.last_insert_rowid())
            })
            .await
            .map_err(Error::from)?;

        tracing::debug!(seq, id = %draft.id, "mutation queued");
        Ok(QueuedMutation {
            seq,
            id: draft.id,
            entity_key: draft.entity_key,
            payload: draft.payload,
            created_at,
            attempts: 0,
            last_error: None,
            state: MutationState::Pending,
        })
    }

    /// Every queued item in delivery order.
    pub async fn pending(&self) -> Result<Vec<QueuedMutation>, Error> {
        let rows = self
            .db
            .conn
            .call(|conn| -> Result<Vec<MutationRow>, Error> {
                let mut stmt = conn.prepare(&format!("{SELECT_COLUMNS} ORDER BY seq"))?;
                let rows = stmt.query_map([], read_row)?.collect::<Result<Vec<_>, _>>()?;
                Ok(rows)
            })
            .await
            .map_err(Error::from)?;
        rows.into_iter().map(into_mutation).collect()
    }

    pub async fn len(&self) -> Result<usize, Error> {
        self.db
            .conn
            .call(|conn| -> Result<usize, Error> {
                let n: i64 = conn.query_row("SELECT COUNT(*) FROM sync_queue", [], |row| row.get(0))?;
                Ok(n.max(0) as usize)
            })
            .await
            .map_err(Error::from)
    }

    pub async fn is_empty(&self) -> Result<bool, Error> {
        Ok(self.len().await? == 0)
    }

    /// Deliver queued items in order until the queue is empty or the policy stops.
    ///
    /// Items enqueued while the drain runs are picked up by the same pass.
    pub async fn drain(&self, sink: &dyn RemoteSink) -> Result<DrainReport, Error> {
        let _drain = self.drain_lock.lock().await;
        let mut report = DrainReport::default();
        let mut blocked: HashSet<String> = HashSet::new();
        let mut cursor = 0i64;

        while let Some(mutation) = self.next_after(cursor).await? {
            cursor = mutation.seq;

            if let Some(key) = &mutation.entity_key
                && blocked.contains(key)
            {
                report.outcomes.push(ItemOutcome::Skipped { seq: mutation.seq, id: mutation.id });
                continue;
            }

            self.set_state(mutation.seq, MutationState::InFlight).await?;
            let result = match tokio::time::timeout(self.options.delivery_timeout, sink.deliver(&mutation)).await {
                Ok(result) => result,
                Err(_) => Err(Error::FetchTimeout(format!(
                    "delivery of {} exceeded {:?}",
                    mutation.id, self.options.delivery_timeout
                ))),
            };

            match result {
                Ok(delivery) => {
                    self.remove(mutation.seq).await?;
                    let duplicate = delivery == Delivery::Duplicate;
                    tracing::debug!(seq = mutation.seq, id = %mutation.id, duplicate, "mutation delivered");
                    report.outcomes.push(ItemOutcome::Delivered { seq: mutation.seq, id: mutation.id, duplicate });
                }
                Err(e) => {
                    let error = e.to_string();
                    self.record_failure(mutation.seq, &error).await?;
                    let (seq, id) = (mutation.seq, &mutation.id);
                    if e.is_network() {
                        tracing::info!(seq, id = %id, error = %error, "remote unreachable, item kept");
                    } else {
                        tracing::warn!(seq, id = %id, error = %error, "delivery failed, item kept");
                    }
                    report.outcomes.push(ItemOutcome::Failed {
                        seq: mutation.seq,
                        id: mutation.id,
                        error,
                    });

                    match (self.options.policy, mutation.entity_key) {
                        (DrainPolicy::IsolateByEntity, Some(key)) => {
                            blocked.insert(key);
                        }
                        _ => {
                            report.halted = true;
                            break;
                        }
                    }
                }
            }
        }

        report.remaining = self.len().await?;
        Ok(report)
    }

    async fn next_after(&self, cursor: i64) -> Result<Option<QueuedMutation>, Error> {
        let row = self
            .db
            .conn
            .call(move |conn| -> Result<Option<MutationRow>, Error> {
                let result = conn.query_row(
                    &format!("{SELECT_COLUMNS} WHERE seq > ?1 ORDER BY seq LIMIT 1"),
                    params![cursor],
                    read_row,
                );
                match result {
                    Ok(row) => Ok(Some(row)),
                    Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                    Err(e) => Err(e.into()),
                }
            })
            .await
            .map_err(Error::from)?;
        row.map(into_mutation).transpose()
    }

    async fn set_state(&self, seq: i64, state: MutationState) -> Result<(), Error> {
        let state = state.as_str();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("UPDATE sync_queue SET state = ?1 WHERE seq = ?2", params![state, seq])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn remove(&self, seq: i64) -> Result<(), Error> {
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute("DELETE FROM sync_queue WHERE seq = ?1", params![seq])?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }

    async fn record_failure(&self, seq: i64, error: &str) -> Result<(), Error> {
        let error = error.to_string();
        self.db
            .conn
            .call(move |conn| -> Result<(), Error> {
                conn.execute(
                    "UPDATE sync_queue SET state = 'pending', attempts = attempts + 1, last_error = ?1 WHERE seq = ?2",
                    params![error, seq],
                )?;
                Ok(())
            })
            .await
            .map_err(Error::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::SystemClock;
    use crate::queue::sink::MemoryRemote;
    use async_trait::async_trait;
    use serde_json::json;

    async fn queue(policy: DrainPolicy) -> SyncQueue {
        let db = StoreDb::open_in_memory().await.unwrap();
        let options = SyncQueueOptions { policy, delivery_timeout: Duration::from_millis(200) };
        SyncQueue::open(db, Arc::new(SystemClock), options).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_assigns_increasing_seq() {
        let queue = queue(DrainPolicy::HaltOnFailure).await;
        let a = queue.enqueue(MutationDraft::new(json!({"n": 1}))).await.unwrap();
        let b = queue.enqueue(MutationDraft::new(json!({"n": 2}))).await.unwrap();
        assert!(b.seq > a.seq);

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.iter().map(|m| m.id.as_str()).collect::<Vec<_>>(), vec![a.id.as_str(), b.id.as_str()]);
        assert_eq!(pending[0].state, MutationState::Pending);
        assert_eq!(queue.len().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn test_drain_delivers_in_fifo_order() {
        let queue = queue(DrainPolicy::HaltOnFailure).await;
        for n in 0..5 {
            queue.enqueue(MutationDraft::new(json!({"n": n}))).await.unwrap();
        }
        let remote = MemoryRemote::new();

        let report = queue.drain(&remote).await.unwrap();

        assert_eq!(report.delivered(), 5);
        assert_eq!(report.remaining, 0);
        let order: Vec<i64> = remote.applied().iter().map(|(_, p)| p["n"].as_i64().unwrap()).collect();
        assert_eq!(order, vec![0, 1, 2, 3, 4]);
        assert!(queue.is_empty().await.unwrap());
    }

    #[tokio::test]
    async fn test_failure_keeps_item_and_counts_attempt() {
        let queue = queue(DrainPolicy::HaltOnFailure).await;
        let queued = queue.enqueue(MutationDraft::new(json!({"n": 1}))).await.unwrap();
        let remote = MemoryRemote::new();
        remote.set_failing(true);

        for _ in 0..3 {
            let report = queue.drain(&remote).await.unwrap();
            assert!(report.halted);
            assert_eq!(report.failed(), 1);
        }

        let pending = queue.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, queued.id);
        assert_eq!(pending[0].attempts, 3);
        assert!(pending[0].last_error.as_deref().unwrap().contains("NETWORK_ERROR"));
        assert!(remote.applied().is_empty());

        remote.set_failing(false);
        let report = queue.drain(&remote).await.unwrap();
        assert_eq!(report.delivered(), 1);
        assert_eq!(remote.applied().len(), 1);
    }

    #[tokio::test]
    async fn test_halt_stops_at_first_failure() {
        let queue = queue(DrainPolicy::HaltOnFailure).await;
        queue.enqueue(MutationDraft::new(json!(1)).with_entity_key("a")).await.unwrap();
        queue.enqueue(MutationDraft::new(json!(2)).with_entity_key("b")).await.unwrap();
        queue.enqueue(MutationDraft::new(json!(3)).with_entity_key("c")).await.unwrap();
        let remote = MemoryRemote::new();
        remote.fail_entity("b", true);

        let report = queue.drain(&remote).await.unwrap();

        assert_eq!(report.delivered(), 1);
        assert_eq!(report.failed(), 1);
        assert!(report.halted);
        assert_eq!(report.remaining, 2);
        assert_eq!(remote.calls(), 2);
    }

    #[tokio::test]
    async fn test_isolate_by_entity_skips_only_related_items() {
        let queue = queue(DrainPolicy::IsolateByEntity).await;
        queue.enqueue(MutationDraft::new(json!("a1")).with_entity_key("a")).await.unwrap();
        queue.enqueue(MutationDraft::new(json!("b1")).with_entity_key("b")).await.unwrap();
        queue.enqueue(MutationDraft::new(json!("a2")).with_entity_key("a")).await.unwrap();
        queue.enqueue(MutationDraft::new(json!("c1")).with_entity_key("c")).await.unwrap();
        let remote = MemoryRemote::new();
        remote.fail_entity("a", true);

        let report = queue.drain(&remote).await.unwrap();

        assert!(!report.halted);
        assert_eq!(report.failed(), 1);
        assert_eq!(report.skipped(), 1);
        assert_eq!(report.delivered(), 2);
        let payloads: Vec<_> = remote.applied().into_iter().map(|(_, p)| p).collect();
        assert_eq!(payloads, vec![json!("b1"), json!("c1")]);

        let left: Vec<_> = queue.pending().await.unwrap().into_iter().map(|m| m.payload).collect();
        assert_eq!(left, vec![json!("a1"), json!("a2")]);
    }

    #[tokio::test]
    async fn test_same_id_twice_has_single_effect() {
        let queue = queue(DrainPolicy::HaltOnFailure).await;
        let draft = MutationDraft::new(json!({"weightKg": 0.5}));
        queue.enqueue(draft.clone()).await.unwrap();
        queue.enqueue(draft.clone()).await.unwrap();
        let remote = MemoryRemote::new();

        let report = queue.drain(&remote).await.unwrap();

        assert_eq!(report.delivered(), 2);
        assert!(matches!(&report.outcomes[1], ItemOutcome::Delivered { duplicate: true, .. }));
        assert_eq!(remote.applied(), vec![(draft.id, json!({"weightKg": 0.5}))]);
        assert!(queue.is_empty().await.unwrap());
    }

    struct StalledRemote;

    #[async_trait]
    impl RemoteSink for StalledRemote {
        async fn deliver(&self, _mutation: &QueuedMutation) -> Result<Delivery, Error> {
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(Delivery::Accepted)
        }
    }

    #[tokio::test]
    async fn test_delivery_timeout_counts_as_failure() {
        let queue = queue(DrainPolicy::HaltOnFailure).await;
        queue.enqueue(MutationDraft::new(json!(1))).await.unwrap();

        let report = queue.drain(&StalledRemote).await.unwrap();

        assert_eq!(report.failed(), 1);
        let pending = queue.pending().await.unwrap();
        assert_eq!(pending[0].attempts, 1);
        assert!(pending[0].last_error.as_deref().unwrap().contains("FETCH_TIMEOUT"));
    }

    #[tokio::test]
    async fn test_reopen_resets_in_flight_and_keeps_items() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.sqlite");

        let db = StoreDb::open(&path).await.unwrap();
        let queue = SyncQueue::open(db, Arc::new(SystemClock), SyncQueueOptions::default()).await.unwrap();
        let queued = queue.enqueue(MutationDraft::new(json!({"n": 1}))).await.unwrap();
        queue.set_state(queued.seq, MutationState::InFlight).await.unwrap();
        drop(queue);

        let db = StoreDb::open(&path).await.unwrap();
        let reopened = SyncQueue::open(db, Arc::new(SystemClock), SyncQueueOptions::default()).await.unwrap();
        let pending = reopened.pending().await.unwrap();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id, queued.id);
        assert_eq!(pending[0].state, MutationState::Pending);
    }

    /// Slow sink that records delivery order and can enqueue while a drain runs.
    #[derive(Default)]
    struct OrderedRemote {
        /// Enqueues two more items from another task while item 0 is in flight.
        inject_into: Option<SyncQueue>,
        delivered: std::sync::Mutex<Vec<i64>>,
    }

    #[async_trait]
    impl RemoteSink for OrderedRemote {
        async fn deliver(&self, mutation: &QueuedMutation) -> Result<Delivery, Error> {
            tokio::time::sleep(Duration::from_millis(5)).await;
            let n = mutation.payload["n"].as_i64().unwrap();
            if let (0, Some(queue)) = (n, &self.inject_into) {
                let queue = queue.clone();
                tokio::spawn(async move {
                    for n in 3..5 {
                        queue.enqueue(MutationDraft::new(json!({"n": n}))).await.unwrap();
                    }
                })
                .await
                .unwrap();
            }
            self.delivered.lock().unwrap().push(n);
            Ok(Delivery::Accepted)
        }
    }

    #[tokio::test]
    async fn test_items_enqueued_mid_drain_join_the_same_pass() {
        let queue = queue(DrainPolicy::HaltOnFailure).await;
        for n in 0..3 {
            queue.enqueue(MutationDraft::new(json!({"n": n}))).await.unwrap();
        }
        let remote = OrderedRemote { inject_into: Some(queue.clone()), ..Default::default() };

        let report = queue.drain(&remote).await.unwrap();

        assert_eq!(report.delivered(), 5);
        assert_eq!(report.remaining, 0);
        assert_eq!(*remote.delivered.lock().unwrap(), vec![0, 1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_concurrent_enqueue_during_drain_loses_nothing() {
        let queue = queue(DrainPolicy::HaltOnFailure).await;
        for n in 0..10 {
            queue.enqueue(MutationDraft::new(json!({"n": n}))).await.unwrap();
        }
        let remote = Arc::new(OrderedRemote::default());

        let producer = {
            let queue = queue.clone();
            tokio::spawn(async move {
                for n in 10..30 {
                    queue.enqueue(MutationDraft::new(json!({"n": n}))).await.unwrap();
                    tokio::time::sleep(Duration::from_millis(2)).await;
                }
            })
        };
        let draining = {
            let (queue, remote) = (queue.clone(), remote.clone());
            tokio::spawn(async move { queue.drain(remote.as_ref()).await.unwrap() })
        };

        producer.await.unwrap();
        draining.await.unwrap();
        queue.drain(remote.as_ref()).await.unwrap();

        assert_eq!(*remote.delivered.lock().unwrap(), (0..30).collect::<Vec<_>>());
        assert!(queue.is_empty().await.unwrap());
    }
}
