//! Release manifest polling over HTTP.

use async_trait::async_trait;
use reqwest::Client;
use url::Url;

use crate::fetch::{FetchConfig, build_http, transport_error};
use binsync_core::{Error, ReleaseInfo, UpdateSource};

/// [`UpdateSource`] reading `{"version": "...", "required": bool}` from a URL.
pub struct ManifestSource {
    http: Client,
    url: Url,
}

impl ManifestSource {
    pub fn new(url: &str, config: &FetchConfig) -> Result<Self, Error> {
        let url = Url::parse(url).map_err(|e| Error::InvalidUrl(format!("update manifest: {e}")))?;
        Ok(Self { http: build_http(config)?, url })
    }
}

#[async_trait]
impl UpdateSource for ManifestSource {
    async fn latest(&self) -> Result<ReleaseInfo, Error> {
        let response = self
            .http
            .get(self.url.clone())
            .header("Cache-Control", "no-cache")
            .send()
            .await
            .map_err(transport_error)?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::HttpError(format!("status {}", status.as_u16())));
        }

        let bytes = response.bytes().await.map_err(transport_error)?;
        let release: ReleaseInfo = serde_json::from_slice(&bytes)?;
        if release.version.trim().is_empty() {
            return Err(Error::Serialization("manifest has an empty version".into()));
        }
        Ok(release)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router as HttpRouter;
    use axum::http::StatusCode;
    use axum::routing::get;

    async fn serve() -> String {
        let app = HttpRouter::new()
            .route("/release.json", get(|| async { r#"{"version":"1.4.0","required":true}"# }))
            .route("/minimal.json", get(|| async { r#"{"version":"1.4.1"}"# }))
            .route("/broken.json", get(|| async { "not json" }))
            .route("/gone.json", get(|| async { StatusCode::NOT_FOUND }));
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move { axum::serve(listener, app).await.unwrap() });
        format!("http://{addr}")
    }

    async fn latest(base: &str, path: &str) -> Result<ReleaseInfo, Error> {
        ManifestSource::new(&format!("{base}{path}"), &FetchConfig::default()).unwrap().latest().await
    }

    #[tokio::test]
    async fn test_reads_manifest() {
        let base = serve().await;
        let required = ReleaseInfo { version: "1.4.0".into(), required: true };
        assert_eq!(latest(&base, "/release.json").await.unwrap(), required);
        assert_eq!(latest(&base, "/minimal.json").await.unwrap(), ReleaseInfo::new("1.4.1"));
    }

    #[tokio::test]
    async fn test_bad_manifest_is_error() {
        let base = serve().await;
        assert!(matches!(latest(&base, "/broken.json").await, Err(Error::Serialization(_))));
        assert!(matches!(latest(&base, "/gone.json").await, Err(Error::HttpError(_))));
    }
}
