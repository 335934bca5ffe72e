//! Network side of binsync.
//!
//! This crate provides the HTTP fetch pipeline, the cache strategy router,
//! and the HTTP implementations of the sync queue's remote sink and the
//! update coordinator's release source.

pub mod fetch;
pub mod release;
pub mod strategy;
pub mod sync;

pub use fetch::{FetchClient, FetchConfig, FetchRequest, FetchResponse, Fetcher, ScriptedFetcher};
pub use release::ManifestSource;
pub use strategy::{Classifier, ClassifierRules, RequestClass, ResponseSource, Router, RouterOptions, RouterResponse};
pub use sync::{HttpSink, UnconfiguredSink};
