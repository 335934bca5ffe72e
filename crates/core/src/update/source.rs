//! Where new releases are discovered.

use async_trait::async_trait;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::Error;

/// Latest release as reported by the deploy pipeline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ReleaseInfo {
    pub version: String,
    /// Clients should hand off as soon as possible.
    #[serde(default)]
    pub required: bool,
}

impl ReleaseInfo {
    pub fn new(version: impl Into<String>) -> Self {
        Self { version: version.into(), required: false }
    }
}

/// Polled periodically for the latest release.
#[async_trait]
pub trait UpdateSource: Send + Sync {
    async fn latest(&self) -> Result<ReleaseInfo, Error>;
}
