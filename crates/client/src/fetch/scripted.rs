//! Deterministic in-process fetcher.
//!
//! Answers from a table of canned responses keyed by URL. Used by router and
//! worker tests, and by hosts that want to run without a network.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use super::{FetchRequest, FetchResponse, Fetcher};
use binsync_core::Error;

#[derive(Debug, Clone)]
enum Script {
    Respond { status: u16, headers: BTreeMap<String, String>, body: Bytes, delay: Option<Duration> },
    Fail,
}

/// A fetcher that replays scripted responses.
///
/// Unscripted URLs answer `404`. While offline every request fails with a
/// network error.
#[derive(Debug, Default)]
pub struct ScriptedFetcher {
    scripts: Mutex<HashMap<String, Script>>,
    offline: AtomicBool,
    calls: Mutex<Vec<FetchRequest>>,
}

impl ScriptedFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer `url` with `status`, a content type and `body`.
    pub fn respond(&self, url: &str, status: u16, content_type: &str, body: impl Into<Bytes>) {
        self.insert(url, status, content_type, body.into(), None);
    }

    /// Like [`respond`](Self::respond) but only after `delay`.
    pub fn respond_after(&self, url: &str, delay: Duration, status: u16, content_type: &str, body: impl Into<Bytes>) {
        self.insert(url, status, content_type, body.into(), Some(delay));
    }

    /// Fail every request to `url` with a network error.
    pub fn fail(&self, url: &str) {
        self.scripts.lock().unwrap_or_else(|e| e.into_inner()).insert(url.to_string(), Script::Fail);
    }

    pub fn set_offline(&self, offline: bool) {
        self.offline.store(offline, Ordering::SeqCst);
    }

    /// Requests made to `url` so far, including failed ones.
    pub fn calls_to(&self, url: &str) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).iter().filter(|r| r.url.as_str() == url).count()
    }

    /// The most recent request made to `url`, as the fetcher received it.
    pub fn last_request(&self, url: &str) -> Option<FetchRequest> {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).iter().rev().find(|r| r.url.as_str() == url).cloned()
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).len()
    }

    fn insert(&self, url: &str, status: u16, content_type: &str, body: Bytes, delay: Option<Duration>) {
        let headers = BTreeMap::from([("content-type".to_string(), content_type.to_string())]);
        self.scripts
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .insert(url.to_string(), Script::Respond { status, headers, body, delay });
    }
}

#[async_trait]
impl Fetcher for ScriptedFetcher {
    async fn fetch(&self, request: &FetchRequest) -> Result<FetchResponse, Error> {
        let url = request.url.as_str().to_string();
        self.calls.lock().unwrap_or_else(|e| e.into_inner()).push(request.clone());

        if self.offline.load(Ordering::SeqCst) {
            return Err(Error::Network(format!("offline: {url}")));
        }

        let script = self.scripts.lock().unwrap_or_else(|e| e.into_inner()).get(&url).cloned();
        match script {
            Some(Script::Respond { status, headers, body, delay }) => {
                if let Some(delay) = delay {
                    tokio::time::sleep(delay).await;
                }
                Ok(FetchResponse { url: request.url.clone(), status, headers, body, fetch_ms: 0 })
            }
            Some(Script::Fail) => Err(Error::Network(format!("connection refused: {url}"))),
            None => Ok(FetchResponse {
                url: request.url.clone(),
                status: 404,
                headers: BTreeMap::new(),
                body: Bytes::new(),
                fetch_ms: 0,
            }),
        }
    }
}
