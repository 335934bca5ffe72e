//! Local structured data with batched persistence.

pub mod backend;
pub mod records;
pub mod store;

pub use backend::KvBackend;
pub use records::{NewWasteEntry, WasteEntry, filter_chunked};
pub use store::{LocalDataStore, LocalStoreOptions, keys};
