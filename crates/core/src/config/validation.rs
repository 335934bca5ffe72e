//! Configuration validation rules.
//!
//! This module provides validation logic for `AppConfig` values
//! after they have been loaded from environment, files, or defaults.

use crate::config::AppConfig;
use thiserror::Error;

/// Configuration validation errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load configuration: {0}")]
    LoadFailed(String),

    #[error("invalid configuration: {field} - {reason}")]
    Invalid { field: String, reason: String },

    #[error("missing required configuration: {field} ({hint})")]
    Missing { field: String, hint: String },
}

const MAX_STATIC_AGE_SECS: u64 = 365 * 24 * 60 * 60;

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid { field: field.into(), reason: reason.into() }
}

fn check_timeout(field: &str, ms: u64) -> Result<(), ConfigError> {
    if ms < 100 {
        return Err(invalid(field, "must be at least 100ms"));
    }
    if ms > 300_000 {
        return Err(invalid(field, "must not exceed 5 minutes (300000ms)"));
    }
    Ok(())
}

fn check_http_url(field: &str, value: Option<&str>) -> Result<(), ConfigError> {
    match value {
        Some(url) if !(url.starts_with("http://") || url.starts_with("https://")) => {
            Err(invalid(field, "must be an http(s) URL"))
        }
        _ => Ok(()),
    }
}

impl AppConfig {
    /// Validate configuration values after loading.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Invalid` if:
    /// - `version_tag` or `user_agent` is empty
    /// - `origin`, `sync_endpoint` or `update_manifest_url` is not an http(s) URL
    /// - `max_bytes` is 0 or exceeds 50MB
    /// - any network timeout is below 100ms or above 5 minutes
    /// - `batch_window_ms` exceeds 1 second, or `chunk_size` is 0
    /// - `static_max_age_secs` exceeds one year
    /// - `update_poll_interval_secs` is below 60 seconds
    /// - `offline_page` is not an absolute path
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version_tag.trim().is_empty() {
            return Err(invalid("version_tag", "must not be empty"));
        }
        if self.user_agent.is_empty() {
            return Err(invalid("user_agent", "must not be empty"));
        }

        check_http_url("origin", Some(&self.origin))?;
        check_http_url("sync_endpoint", self.sync_endpoint.as_deref())?;
        check_http_url("update_manifest_url", self.update_manifest_url.as_deref())?;

        if self.max_bytes == 0 {
            return Err(invalid("max_bytes", "must be greater than 0"));
        }
        if self.max_bytes > 50 * 1024 * 1024 {
            return Err(invalid("max_bytes", "must not exceed 50MB"));
        }

        check_timeout("fetch_timeout_ms", self.fetch_timeout_ms)?;
        check_timeout("network_timeout_ms", self.network_timeout_ms)?;
        check_timeout("revalidate_timeout_ms", self.revalidate_timeout_ms)?;
        check_timeout("image_timeout_ms", self.image_timeout_ms)?;
        check_timeout("delivery_timeout_ms", self.delivery_timeout_ms)?;

        if self.batch_window_ms > 1_000 {
            return Err(invalid("batch_window_ms", "must not exceed 1000ms"));
        }
        if self.chunk_size == 0 {
            return Err(invalid("chunk_size", "must be greater than 0"));
        }
        if self.static_max_age_secs > MAX_STATIC_AGE_SECS {
            return Err(invalid("static_max_age_secs", "must not exceed one year (31536000s)"));
        }
        if self.update_poll_interval_secs < 60 {
            return Err(invalid("update_poll_interval_secs", "must be at least 60 seconds"));
        }
        if !self.offline_page.starts_with('/') {
            return Err(invalid("offline_page", "must be an absolute path"));
        }

        if self.cache_quota_bytes == Some(0) {
            tracing::warn!("cache_quota_bytes is 0; every cache write will be rejected");
        }
        if self.sync_endpoint.is_none() {
            tracing::warn!("sync_endpoint not set; mutations will stay queued locally");
        }

        Ok(())
    }
}
