//! Cached response types.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use super::names::{CacheKind, kind_of};

/// A response as it is kept in a cache: status, headers and body bytes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredResponse {
    pub status: u16,
    /// Header names are lowercased.
    pub headers: BTreeMap<String, String>,
    pub body: Vec<u8>,
}

impl StoredResponse {
    pub fn new(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self { status, headers: BTreeMap::new(), body: body.into() }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(&name.to_ascii_lowercase()).map(String::as_str)
    }

    pub fn content_type(&self) -> Option<&str> {
        self.header("content-type")
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// A cached response plus its freshness metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub key: String,
    pub cache_name: String,
    pub response: StoredResponse,
    /// Stamped by the store at write time, not taken from response headers.
    pub stored_at: DateTime<Utc>,
    /// `None` means fresh until the cache is purged.
    pub max_age_secs: Option<u64>,
}

impl CacheEntry {
    pub fn kind(&self) -> Option<CacheKind> {
        kind_of(&self.cache_name)
    }

    pub fn age(&self, now: DateTime<Utc>) -> Duration {
        now - self.stored_at
    }

    /// An entry is expired once its age strictly exceeds its max-age.
    ///
    /// A max-age too large to represent never expires.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        let limit = self.max_age_secs.and_then(|secs| i64::try_from(secs).ok()).and_then(Duration::try_seconds);
        match limit {
            Some(limit) => self.age(now) > limit,
            None => false,
        }
    }
}
