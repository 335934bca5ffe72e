//! HTTP fetch pipeline.
//!
//! ### URL Canonicalization
//! - Trim whitespace, resolve app-relative paths against the origin
//! - Lowercase host, remove fragments
//! - Preserve query string
//!
//! ### Limits
//! - Max redirects: 5
//! - Max body bytes: 5MB (configurable)
//!
//! Non-2xx responses are returned as responses, not errors; deciding what to
//! cache is the router's job.

pub mod scripted;
pub mod url;

use std::collections::BTreeMap;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Method, header};

use binsync_core::{Error, StoredResponse};

pub use self::url::{UrlError, cache_key, canonicalize};
pub use scripted::ScriptedFetcher;

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "binsync/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Transport-level ceiling; strategies apply their own shorter timeouts (default: 30s)
    pub timeout: Duration,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self {
            user_agent: "binsync/0.1".to_string(),
            max_bytes: 5 * 1024 * 1024,
            timeout: Duration::from_secs(30),
            max_redirects: 5,
        }
    }
}

/// An intercepted request.
///
/// Headers and body travel to the network unchanged, whichever strategy
/// resolves the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub method: Method,
    pub url: ::url::Url,
    pub headers: BTreeMap<String, String>,
    pub body: Option<Bytes>,
    /// Top-level document load; failures fall back to the offline page.
    pub navigation: bool,
}

impl FetchRequest {
    pub fn get(url: ::url::Url) -> Self {
        Self { method: Method::GET, url, headers: BTreeMap::new(), body: None, navigation: false }
    }

    pub fn navigate(url: ::url::Url) -> Self {
        Self { navigation: true, ..Self::get(url) }
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = method;
        self
    }

    /// Set the method from its name, case-insensitively.
    pub fn with_method_name(self, name: &str) -> Result<Self, Error> {
        let method = Method::from_bytes(name.trim().to_ascii_uppercase().as_bytes())
            .map_err(|_| Error::InvalidInput(format!("unknown HTTP method '{name}'")))?;
        Ok(self.with_method(method))
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }
}

/// Response from a fetch operation.
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// The final URL after redirects
    pub url: ::url::Url,
    pub status: u16,
    /// Lowercased header names
    pub headers: BTreeMap<String, String>,
    pub body: Bytes,
    /// Time taken to fetch in milliseconds
    pub fetch_ms: u64,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn into_stored(self) -> StoredResponse {
        StoredResponse { status: self.status, headers: self.headers, body: self.body.to_vec() }
    }
}

/// Something that can perform a network request.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error>;
}

/// Build the shared reqwest client used by every network component.
pub(crate) fn build_http(config: &FetchConfig) -> Result<Client, Error> {
    Client::builder()
        .user_agent(&config.user_agent)
        .timeout(config.timeout)
        .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
        .use_rustls_tls()
        .gzip(true)
        .brotli(true)
        .deflate(true)
        .build()
        .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))
}

/// Map a transport failure onto the engine's error codes.
pub(crate) fn transport_error(e: reqwest::Error) -> Error {
    if e.is_timeout() {
        Error::FetchTimeout(e.to_string())
    } else if e.is_connect() || e.is_request() {
        Error::Network(e.to_string())
    } else {
        Error::HttpError(format!("network error: {e}"))
    }
}

/// HTTP fetcher backed by reqwest.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let http = build_http(&config)?;
        Ok(Self { http, config })
    }
}

#[async_trait]
impl Fetcher for FetchClient {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let start = Instant::now();

        let mut builder = self.http.request(request.method.clone(), request.url.as_str());
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }
        let response = builder.send().await.map_err(transport_error)?;

        if let Some(len) = response.content_length()
            && len as usize > self.config.max_bytes
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let status = response.status().as_u16();
        let url = response.url().clone();
        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| {
                value.to_str().ok().map(|v| (name.as_str().to_ascii_lowercase(), v.to_string()))
            })
            .filter(|(name, _)| name != header::SET_COOKIE.as_str())
            .collect();

        let body = response.bytes().await.map_err(transport_error)?;
        if body.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", body.len(), self.config.max_bytes)));
        }

        let fetch_ms = start.elapsed().as_millis() as u64;
        tracing::debug!(url = %request.url, status, fetch_ms, bytes = body.len(), "fetched");

        Ok(FetchResponse { url, status, headers, body, fetch_ms })
    }
}
