//! Durable outbound mutation queue.

pub mod mutation;
pub mod sink;
pub mod store;

pub use mutation::{MutationDraft, MutationState, QueuedMutation};
pub use sink::{Delivery, MemoryRemote, RemoteSink};
pub use store::{DrainPolicy, DrainReport, ItemOutcome, SyncQueue, SyncQueueOptions};
