//! Cache strategy routing.
//!
//! Requests are classified by URL shape and resolved by one of four
//! strategies against the current generation's caches:
//!
//! - cache-first (optionally with a max-age) for critical paths and static assets
//! - network-first for API calls and anything unclassified
//! - stale-while-revalidate for data files
//! - cache-first with a placeholder fallback for images

pub mod classify;
pub mod fallback;
pub mod router;

pub use classify::{Classifier, ClassifierRules, RequestClass, StrategyKind};
pub use router::{ResponseSource, Router, RouterOptions, RouterResponse};
