//! Versioned cache naming.
//!
//! Cache names embed the deploy version (`static-v1.2.0`), so a new build
//! writes into fresh caches and the previous generation's caches are orphaned
//! until the activation purge removes them.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// The four response caches the worker maintains.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CacheKind {
    /// App shell and offline page. Fresh until evicted.
    Critical,
    /// Scripts, stylesheets and fonts.
    Static,
    /// API responses and data files.
    Data,
    /// Images. Fresh until evicted.
    Image,
}

impl CacheKind {
    pub const ALL: [CacheKind; 4] = [CacheKind::Critical, CacheKind::Static, CacheKind::Data, CacheKind::Image];

    pub fn prefix(self) -> &'static str {
        match self {
            CacheKind::Critical => "critical",
            CacheKind::Static => "static",
            CacheKind::Data => "data",
            CacheKind::Image => "images",
        }
    }
}

/// Cache names for one worker generation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheNames {
    version: String,
}

impl CacheNames {
    /// Derive the cache names for a version tag. A leading `v` is ignored, so
    /// `v1.2.0` and `1.2.0` name the same caches.
    pub fn for_version(version_tag: &str) -> Self {
        let version = version_tag.trim();
        let version = version.strip_prefix('v').unwrap_or(version);
        Self { version: version.to_string() }
    }

    pub fn version(&self) -> &str {
        &self.version
    }

    pub fn name(&self, kind: CacheKind) -> String {
        format!("{}-v{}", kind.prefix(), self.version)
    }

    /// All four names, in `CacheKind::ALL` order.
    pub fn all(&self) -> Vec<String> {
        CacheKind::ALL.iter().map(|k| self.name(*k)).collect()
    }
}

/// Recover the cache kind from a versioned name.
pub fn kind_of(cache_name: &str) -> Option<CacheKind> {
    let (prefix, _) = cache_name.split_once("-v")?;
    CacheKind::ALL.into_iter().find(|k| k.prefix() == prefix)
}
