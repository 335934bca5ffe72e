//! Worker configuration with layered loading.
//!
//! This module provides configuration management using figment for layered
//! configuration loading from multiple sources:
//!
//! 1. Environment variables (BINSYNC_*)
//! 2. TOML config file (if BINSYNC_CONFIG_FILE set)
//! 3. Built-in defaults

use std::path::PathBuf;
use std::time::Duration;

use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::local::LocalStoreOptions;
use crate::queue::{DrainPolicy, SyncQueueOptions};

mod validation;

pub use validation::ConfigError;

/// Worker configuration with layered loading.
///
/// Loading precedence (highest wins):
/// 1. Environment variables (BINSYNC_*)
/// 2. TOML config file (if BINSYNC_CONFIG_FILE set)
/// 3. Built-in defaults
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Deploy version tag. Every cache name embeds it.
    ///
    /// Set via BINSYNC_VERSION_TAG environment variable.
    #[serde(default = "default_version_tag")]
    pub version_tag: String,

    /// Path to the SQLite database holding caches, local data and the sync queue.
    ///
    /// Set via BINSYNC_DB_PATH environment variable.
    #[serde(default = "default_db_path")]
    pub db_path: PathBuf,

    /// Origin the app is served from; relative request paths resolve against it.
    #[serde(default = "default_origin")]
    pub origin: String,

    /// Endpoint queued mutations are POSTed to. Without one, mutations stay queued.
    #[serde(default)]
    pub sync_endpoint: Option<String>,

    /// Release manifest polled for new versions. Without one, polling is off.
    #[serde(default)]
    pub update_manifest_url: Option<String>,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,

    /// Maximum response body bytes accepted from the network.
    #[serde(default = "default_max_bytes")]
    pub max_bytes: usize,

    /// Timeout for cache-first fills, in milliseconds.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Network-first timeout before falling back to cache.
    #[serde(default = "default_network_timeout_ms")]
    pub network_timeout_ms: u64,

    /// Stale-while-revalidate timeout, also used to refresh expired static entries.
    #[serde(default = "default_revalidate_timeout_ms")]
    pub revalidate_timeout_ms: u64,

    #[serde(default = "default_image_timeout_ms")]
    pub image_timeout_ms: u64,

    /// Freshness window for static assets.
    #[serde(default = "default_static_max_age_secs")]
    pub static_max_age_secs: u64,

    /// Local store write-coalescing window.
    #[serde(default = "default_batch_window_ms")]
    pub batch_window_ms: u64,

    /// Records processed per slice when filtering local collections.
    #[serde(default = "default_chunk_size")]
    pub chunk_size: usize,

    /// Upper bound on one remote delivery of a queued mutation.
    #[serde(default = "default_delivery_timeout_ms")]
    pub delivery_timeout_ms: u64,

    #[serde(default)]
    pub drain_policy: DrainPolicy,

    #[serde(default = "default_update_poll_interval_secs")]
    pub update_poll_interval_secs: u64,

    /// Cap on total cached body bytes. Unset means unlimited.
    #[serde(default)]
    pub cache_quota_bytes: Option<u64>,

    /// Path of the offline fallback page inside the critical cache.
    #[serde(default = "default_offline_page")]
    pub offline_page: String,

    /// Paths pre-warmed into the critical cache on install.
    #[serde(default = "default_precache_urls")]
    pub precache_urls: Vec<String>,
}

fn default_version_tag() -> String {
    env!("CARGO_PKG_VERSION").into()
}

fn default_db_path() -> PathBuf {
    PathBuf::from("./binsync.sqlite")
}

fn default_origin() -> String {
    "http://localhost:8080".into()
}

fn default_user_agent() -> String {
    "binsync/0.1".into()
}

fn default_max_bytes() -> usize {
    5_242_880 // 5MB
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_network_timeout_ms() -> u64 {
    3_000
}

fn default_revalidate_timeout_ms() -> u64 {
    5_000
}

fn default_image_timeout_ms() -> u64 {
    8_000
}

fn default_static_max_age_secs() -> u64 {
    7 * 24 * 60 * 60
}

fn default_batch_window_ms() -> u64 {
    16
}

fn default_chunk_size() -> usize {
    100
}

fn default_delivery_timeout_ms() -> u64 {
    10_000
}

fn default_update_poll_interval_secs() -> u64 {
    1_800
}

fn default_offline_page() -> String {
    "/offline.html".into()
}

fn default_precache_urls() -> Vec<String> {
    ["/", "/index.html", "/offline.html", "/manifest.json"].map(String::from).to_vec()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            version_tag: default_version_tag(),
            db_path: default_db_path(),
            origin: default_origin(),
            sync_endpoint: None,
            update_manifest_url: None,
            user_agent: default_user_agent(),
            max_bytes: default_max_bytes(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            network_timeout_ms: default_network_timeout_ms(),
            revalidate_timeout_ms: default_revalidate_timeout_ms(),
            image_timeout_ms: default_image_timeout_ms(),
            static_max_age_secs: default_static_max_age_secs(),
            batch_window_ms: default_batch_window_ms(),
            chunk_size: default_chunk_size(),
            delivery_timeout_ms: default_delivery_timeout_ms(),
            drain_policy: DrainPolicy::default(),
            update_poll_interval_secs: default_update_poll_interval_secs(),
            cache_quota_bytes: None,
            offline_page: default_offline_page(),
            precache_urls: default_precache_urls(),
        }
    }
}

impl AppConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }

    pub fn network_timeout(&self) -> Duration {
        Duration::from_millis(self.network_timeout_ms)
    }

    pub fn revalidate_timeout(&self) -> Duration {
        Duration::from_millis(self.revalidate_timeout_ms)
    }

    pub fn image_timeout(&self) -> Duration {
        Duration::from_millis(self.image_timeout_ms)
    }

    pub fn update_poll_interval(&self) -> Duration {
        Duration::from_secs(self.update_poll_interval_secs)
    }

    pub fn local_store_options(&self) -> LocalStoreOptions {
        LocalStoreOptions { batch_window: Duration::from_millis(self.batch_window_ms), chunk_size: self.chunk_size }
    }

    pub fn sync_queue_options(&self) -> SyncQueueOptions {
        SyncQueueOptions {
            policy: self.drain_policy,
            delivery_timeout: Duration::from_millis(self.delivery_timeout_ms),
        }
    }

    /// Load configuration from all sources with layered precedence.
    ///
    /// Priority (highest wins):
    /// 1. Environment variables prefixed with `BINSYNC_`
    /// 2. TOML file from `BINSYNC_CONFIG_FILE` (if set)
    /// 3. Built-in defaults via `Default::default()`
    ///
    /// # Errors
    ///
    /// Returns `ConfigError` if:
    /// - Configuration file cannot be read
    /// - Environment variables cannot be parsed
    /// - Validation fails after loading
    pub fn load() -> Result<Self, ConfigError> {
        let mut figment = Figment::from(Serialized::defaults(Self::default()));

        if let Ok(config_path) = std::env::var("BINSYNC_CONFIG_FILE") {
            figment = figment.merge(Toml::file(&config_path));
        }

        figment = figment.merge(
            Env::prefixed("BINSYNC_")
                .ignore(&["config_file"])
                .map(|key| key.as_str().to_lowercase().into())
                .split("__"),
        );

        let config: Self = figment.extract().map_err(|e| ConfigError::LoadFailed(e.to_string()))?;

        config.validate()?;

        Ok(config)
    }

    /// The sync endpoint, for callers that cannot run without one.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Missing` if no endpoint is configured.
    pub fn require_sync_endpoint(&self) -> Result<&str, ConfigError> {
        self.sync_endpoint.as_deref().ok_or_else(|| ConfigError::Missing {
            field: "sync_endpoint".into(),
            hint: "Set BINSYNC_SYNC_ENDPOINT environment variable".into(),
        })
    }
}
