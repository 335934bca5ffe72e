//! SQLite storage shared by the cache store, local data store and sync queue.

pub mod connection;
pub mod migrations;

pub use connection::StoreDb;
