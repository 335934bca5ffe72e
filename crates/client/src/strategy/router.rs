//! Request router: classify, then resolve through cache and network.
//!
//! Every strategy bounds its network call with a timeout and writes to the
//! cache only after a complete 2xx response is in hand, so an abandoned fetch
//! never leaves a partial entry behind. Cache writes are best-effort: a failed
//! `put` is logged and the response is still served.

use std::sync::Arc;
use std::time::Duration;

use reqwest::Method;
use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinSet;
use url::Url;

use super::classify::{Classifier, RequestClass, StrategyKind};
use super::fallback;
use crate::fetch::{FetchRequest, FetchResponse, Fetcher, cache_key, canonicalize};
use binsync_core::{AppConfig, CacheEntry, CacheHandle, CacheKind, CacheNames, CacheStore, Error, StoredResponse};

/// Timeouts and paths the router works with.
#[derive(Debug, Clone)]
pub struct RouterOptions {
    /// Relative request paths resolve against this.
    pub origin: Url,
    /// Cache-first fills and pass-through requests.
    pub fetch_timeout: Duration,
    pub network_timeout: Duration,
    /// Background revalidation and refresh of expired cache-first entries.
    pub revalidate_timeout: Duration,
    pub image_timeout: Duration,
    pub static_max_age_secs: u64,
    /// Path of the offline page inside the critical cache.
    pub offline_page: String,
}

impl RouterOptions {
    pub fn new(origin: Url) -> Self {
        Self {
            origin,
            fetch_timeout: Duration::from_secs(10),
            network_timeout: Duration::from_secs(3),
            revalidate_timeout: Duration::from_secs(5),
            image_timeout: Duration::from_secs(8),
            static_max_age_secs: 7 * 24 * 60 * 60,
            offline_page: "/offline.html".into(),
        }
    }

    pub fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let origin = Url::parse(&config.origin).map_err(|e| Error::InvalidUrl(format!("origin: {e}")))?;
        Ok(Self {
            origin,
            fetch_timeout: config.fetch_timeout(),
            network_timeout: config.network_timeout(),
            revalidate_timeout: config.revalidate_timeout(),
            image_timeout: config.image_timeout(),
            static_max_age_secs: config.static_max_age_secs,
            offline_page: config.offline_page.clone(),
        })
    }
}

/// Where a routed response came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ResponseSource {
    Network,
    Cache,
    /// Expired entry served because the refresh failed.
    StaleCache,
    Placeholder,
    OfflinePage,
    /// Generic failure response.
    Fallback,
    /// Not intercepted; answered straight from the network.
    Passthrough,
}

/// A response produced by [`Router::handle`].
#[derive(Debug, Clone)]
pub struct RouterResponse {
    pub response: StoredResponse,
    pub source: ResponseSource,
    /// `None` for requests that were not intercepted.
    pub class: Option<RequestClass>,
}

#[derive(Debug)]
struct Caches {
    critical: CacheHandle,
    static_assets: CacheHandle,
    data: CacheHandle,
    images: CacheHandle,
}

/// One generation's request router, bound to that generation's cache names.
pub struct Router {
    store: CacheStore,
    names: CacheNames,
    caches: Caches,
    fetcher: Arc<dyn Fetcher>,
    classifier: Classifier,
    options: RouterOptions,
    revalidations: Mutex<JoinSet<()>>,
}

type Resolved = Result<(StoredResponse, ResponseSource), Error>;

async fn fetch_within(fetcher: &dyn Fetcher, request: &FetchRequest, limit: Duration) -> Result<FetchResponse, Error> {
    match tokio::time::timeout(limit, fetcher.fetch(request)).await {
        Ok(result) => result,
        Err(_) => Err(Error::FetchTimeout(format!("{} after {}ms", request.url, limit.as_millis()))),
    }
}

async fn store_best_effort(
    store: &CacheStore, cache: &CacheHandle, key: &str, response: &StoredResponse, max_age_secs: Option<u64>,
) {
    if let Err(e) = store.put(cache, key, response, max_age_secs).await {
        tracing::warn!(cache = cache.name(), key, error = %e, "cache write failed, serving response uncached");
    }
}

impl Router {
    /// Open the four caches for `names` and build a router over them.
    pub async fn open(
        store: CacheStore, names: CacheNames, fetcher: Arc<dyn Fetcher>, classifier: Classifier,
        options: RouterOptions,
    ) -> Result<Self, Error> {
        let caches = Caches {
            critical: store.open(&names.name(CacheKind::Critical)).await?,
            static_assets: store.open(&names.name(CacheKind::Static)).await?,
            data: store.open(&names.name(CacheKind::Data)).await?,
            images: store.open(&names.name(CacheKind::Image)).await?,
        };
        Ok(Self { store, names, caches, fetcher, classifier, options, revalidations: Mutex::new(JoinSet::new()) })
    }

    pub fn names(&self) -> &CacheNames {
        &self.names
    }

    pub fn version(&self) -> &str {
        self.names.version()
    }

    pub fn options(&self) -> &RouterOptions {
        &self.options
    }

    fn cache(&self, kind: CacheKind) -> &CacheHandle {
        match kind {
            CacheKind::Critical => &self.caches.critical,
            CacheKind::Static => &self.caches.static_assets,
            CacheKind::Data => &self.caches.data,
            CacheKind::Image => &self.caches.images,
        }
    }

    /// Build a request for an app path or absolute URL.
    pub fn request(&self, target: &str, navigation: bool) -> Result<FetchRequest, Error> {
        let url = canonicalize(target, &self.options.origin).map_err(|e| Error::InvalidUrl(e.to_string()))?;
        Ok(if navigation { FetchRequest::navigate(url) } else { FetchRequest::get(url) })
    }

    /// Resolve a request. Never fails: errors become fallback responses.
    pub async fn handle(&self, request: &FetchRequest) -> RouterResponse {
        let intercepted = request.method == Method::GET && matches!(request.url.scheme(), "http" | "https");
        if !intercepted {
            return match fetch_within(self.fetcher.as_ref(), request, self.options.fetch_timeout).await {
                Ok(response) => RouterResponse {
                    response: response.into_stored(),
                    source: ResponseSource::Passthrough,
                    class: None,
                },
                Err(e) => self.fallback(request, None, e).await,
            };
        }

        let class = self.classifier.classify(&request.url);
        let (strategy, kind) = class.dispatch();
        let cache = self.cache(kind);
        let key = cache_key(&request.url);

        let resolved = match strategy {
            StrategyKind::CacheFirst => {
                let max_age = (class == RequestClass::StaticAsset).then_some(self.options.static_max_age_secs);
                self.cache_first(cache, &key, request, max_age, self.options.fetch_timeout).await
            }
            StrategyKind::NetworkFirst => self.network_first(cache, &key, request).await,
            StrategyKind::StaleWhileRevalidate => self.stale_while_revalidate(cache, &key, request).await,
            StrategyKind::Image => Ok(self.image(cache, &key, request).await),
        };

        match resolved {
            Ok((response, source)) => RouterResponse { response, source, class: Some(class) },
            Err(e) => self.fallback(request, Some(class), e).await,
        }
    }

    async fn lookup(&self, cache: &CacheHandle, key: &str) -> Option<CacheEntry> {
        match self.store.get(cache, key).await {
            Ok(entry) => entry,
            Err(e) => {
                tracing::warn!(cache = cache.name(), key, error = %e, "cache read failed, treating as miss");
                None
            }
        }
    }

    /// Serve from cache while fresh. Expired entries get one short refresh
    /// attempt and are served stale if it fails.
    async fn cache_first(
        &self, cache: &CacheHandle, key: &str, request: &FetchRequest, max_age_secs: Option<u64>,
        fill_timeout: Duration,
    ) -> Resolved {
        if let Some(entry) = self.lookup(cache, key).await {
            if !entry.is_expired(self.store.clock().now()) {
                tracing::debug!(cache = cache.name(), key, "cache hit");
                return Ok((entry.response, ResponseSource::Cache));
            }

            match fetch_within(self.fetcher.as_ref(), request, self.options.revalidate_timeout).await {
                Ok(fresh) if fresh.is_success() => {
                    let fresh = fresh.into_stored();
                    store_best_effort(&self.store, cache, key, &fresh, max_age_secs).await;
                    tracing::debug!(cache = cache.name(), key, "expired entry refreshed");
                    return Ok((fresh, ResponseSource::Network));
                }
                Ok(rejected) => {
                    tracing::debug!(key, status = rejected.status, "refresh not successful, serving stale");
                }
                Err(e) => tracing::debug!(key, error = %e, "refresh failed, serving stale"),
            }
            return Ok((entry.response, ResponseSource::StaleCache));
        }

        tracing::debug!(cache = cache.name(), key, "cache miss");
        let fetched = fetch_within(self.fetcher.as_ref(), request, fill_timeout).await?.into_stored();
        if fetched.is_success() {
            store_best_effort(&self.store, cache, key, &fetched, max_age_secs).await;
        }
        Ok((fetched, ResponseSource::Network))
    }

    async fn network_first(&self, cache: &CacheHandle, key: &str, request: &FetchRequest) -> Resolved {
        match fetch_within(self.fetcher.as_ref(), request, self.options.network_timeout).await {
            Ok(response) => {
                let response = response.into_stored();
                if response.is_success() {
                    store_best_effort(&self.store, cache, key, &response, None).await;
                }
                Ok((response, ResponseSource::Network))
            }
            Err(e) => match self.lookup(cache, key).await {
                Some(entry) => {
                    tracing::debug!(key, error = %e, "network failed, serving cached copy");
                    Ok((entry.response, ResponseSource::Cache))
                }
                None => Err(e),
            },
        }
    }

    async fn stale_while_revalidate(&self, cache: &CacheHandle, key: &str, request: &FetchRequest) -> Resolved {
        if let Some(entry) = self.lookup(cache, key).await {
            self.spawn_revalidation(cache.clone(), key.to_string(), request.clone()).await;
            return Ok((entry.response, ResponseSource::Cache));
        }

        let fetched =
            fetch_within(self.fetcher.as_ref(), request, self.options.revalidate_timeout).await?.into_stored();
        if fetched.is_success() {
            store_best_effort(&self.store, cache, key, &fetched, None).await;
        }
        Ok((fetched, ResponseSource::Network))
    }

    async fn image(&self, cache: &CacheHandle, key: &str, request: &FetchRequest) -> (StoredResponse, ResponseSource) {
        match self.cache_first(cache, key, request, None, self.options.image_timeout).await {
            Ok((response, source)) if response.is_success() => (response, source),
            Ok((response, _)) => {
                tracing::debug!(key, status = response.status, "image unavailable, serving placeholder");
                (fallback::placeholder_image(), ResponseSource::Placeholder)
            }
            Err(e) => {
                tracing::debug!(key, error = %e, "image unavailable, serving placeholder");
                (fallback::placeholder_image(), ResponseSource::Placeholder)
            }
        }
    }

    async fn spawn_revalidation(&self, cache: CacheHandle, key: String, request: FetchRequest) {
        let store = self.store.clone();
        let fetcher = Arc::clone(&self.fetcher);
        let limit = self.options.revalidate_timeout;

        let mut tasks = self.revalidations.lock().await;
        while let Some(done) = tasks.try_join_next() {
            if let Err(e) = done {
                tracing::warn!(error = %e, "revalidation task aborted");
            }
        }
        tasks.spawn(async move {
            match fetch_within(fetcher.as_ref(), &request, limit).await {
                Ok(response) if response.is_success() => {
                    store_best_effort(&store, &cache, &key, &response.into_stored(), None).await;
                    tracing::debug!(cache = cache.name(), key = %key, "revalidated in background");
                }
                Ok(response) => {
                    tracing::debug!(key = %key, status = response.status, "revalidation unsuccessful");
                }
                Err(e) => tracing::warn!(key = %key, error = %e, "background revalidation failed"),
            }
        });
    }

    /// Wait for every background revalidation started so far.
    pub async fn settle(&self) {
        let mut tasks = std::mem::take(&mut *self.revalidations.lock().await);
        while let Some(done) = tasks.join_next().await {
            if let Err(e) = done {
                tracing::warn!(error = %e, "revalidation task aborted");
            }
        }
    }

    async fn fallback(&self, request: &FetchRequest, class: Option<RequestClass>, error: Error) -> RouterResponse {
        tracing::warn!(
            url = %request.url,
            error = %error,
            navigation = request.navigation,
            "request failed, serving fallback"
        );

        if !request.navigation {
            return RouterResponse { response: fallback::request_timeout(), source: ResponseSource::Fallback, class };
        }

        let cached_page = match canonicalize(&self.options.offline_page, &self.options.origin) {
            Ok(url) => self.lookup(self.cache(CacheKind::Critical), &cache_key(&url)).await,
            Err(e) => {
                tracing::warn!(error = %e, "offline page path does not resolve");
                None
            }
        };
        let response = cached_page.map(|entry| entry.response).unwrap_or_else(fallback::offline_page);
        RouterResponse { response, source: ResponseSource::OfflinePage, class }
    }

    /// Fetch `paths` and store them in the critical cache without max-age.
    ///
    /// Fails on the first path that cannot be fetched with a 2xx response or
    /// stored, so an install never activates with a partial critical set.
    pub async fn precache(&self, paths: &[String]) -> Result<usize, Error> {
        let cache = self.cache(CacheKind::Critical);
        for path in paths {
            let request = self.request(path, false)?;
            let response = fetch_within(self.fetcher.as_ref(), &request, self.options.fetch_timeout).await?;
            if !response.is_success() {
                return Err(Error::HttpError(format!("precache {}: status {}", request.url, response.status)));
            }
            self.store.put(cache, &cache_key(&request.url), &response.into_stored(), None).await?;
        }
        tracing::info!(count = paths.len(), version = self.version(), "precached critical resources");
        Ok(paths.len())
    }

    /// True when every path in `paths` already has an entry in the critical cache.
    pub async fn is_precached(&self, paths: &[String]) -> Result<bool, Error> {
        let cache = self.cache(CacheKind::Critical);
        for path in paths {
            let request = self.request(path, false)?;
            if self.store.get(cache, &cache_key(&request.url)).await?.is_none() {
                return Ok(false);
            }
        }
        Ok(true)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fetch::ScriptedFetcher;
    use crate::strategy::classify::ClassifierRules;
    use binsync_core::{ManualClock, StoreDb};
    use chrono::{Duration as ChronoDuration, Utc};

    const ORIGIN: &str = "https://bins.example";

    struct Fixture {
        router: Router,
        fetcher: Arc<ScriptedFetcher>,
        clock: Arc<ManualClock>,
        store: CacheStore,
    }

    async fn fixture_with(store_quota: Option<u64>) -> Fixture {
        let db = StoreDb::open_in_memory().await.unwrap();
        let clock = Arc::new(ManualClock::new(Utc::now()));
        let store = CacheStore::new(db, clock.clone()).with_quota(store_quota);
        let fetcher = Arc::new(ScriptedFetcher::new());
        let options = RouterOptions {
            fetch_timeout: Duration::from_millis(100),
            network_timeout: Duration::from_millis(100),
            revalidate_timeout: Duration::from_millis(100),
            image_timeout: Duration::from_millis(100),
            static_max_age_secs: 2,
            ..RouterOptions::new(Url::parse(ORIGIN).unwrap())
        };
        let router = Router::open(
            store.clone(),
            CacheNames::for_version("1.0.0"),
            fetcher.clone(),
            Classifier::new(ClassifierRules::default()).unwrap(),
            options,
        )
        .await
        .unwrap();
        Fixture { router, fetcher, clock, store }
    }

    async fn fixture() -> Fixture {
        fixture_with(None).await
    }

    fn url(path: &str) -> String {
        format!("{ORIGIN}{path}")
    }

    impl Fixture {
        async fn get(&self, path: &str) -> RouterResponse {
            self.router.handle(&self.router.request(path, false).unwrap()).await
        }

        async fn navigate(&self, path: &str) -> RouterResponse {
            self.router.handle(&self.router.request(path, true).unwrap()).await
        }

        async fn cached_body(&self, kind: CacheKind, path: &str) -> Option<Vec<u8>> {
            let cache = self.router.cache(kind);
            self.store.get(cache, &url(path)).await.unwrap().map(|e| e.response.body)
        }
    }

    #[tokio::test]
    async fn test_static_max_age_online_refresh() {
        let f = fixture().await;
        f.fetcher.respond(&url("/assets/app.js"), 200, "text/javascript", "v1");

        let first = f.get("/assets/app.js").await;
        assert_eq!((first.source, first.response.body.as_slice()), (ResponseSource::Network, &b"v1"[..]));

        f.fetcher.respond(&url("/assets/app.js"), 200, "text/javascript", "v2");
        f.clock.advance(ChronoDuration::seconds(1));
        let fresh = f.get("/assets/app.js").await;
        assert_eq!((fresh.source, fresh.response.body.as_slice()), (ResponseSource::Cache, &b"v1"[..]));
        assert_eq!(f.fetcher.calls_to(&url("/assets/app.js")), 1);

        f.clock.advance(ChronoDuration::seconds(2));
        let refreshed = f.get("/assets/app.js").await;
        assert_eq!((refreshed.source, refreshed.response.body.as_slice()), (ResponseSource::Network, &b"v2"[..]));
        assert_eq!(f.cached_body(CacheKind::Static, "/assets/app.js").await.unwrap(), b"v2");
    }

    #[tokio::test]
    async fn test_static_max_age_offline_serves_stale() {
        let f = fixture().await;
        f.fetcher.respond(&url("/assets/app.css"), 200, "text/css", "body{}");
        f.get("/assets/app.css").await;

        f.clock.advance(ChronoDuration::seconds(3));
        f.fetcher.set_offline(true);
        let stale = f.get("/assets/app.css").await;

        assert_eq!(stale.source, ResponseSource::StaleCache);
        assert_eq!(stale.response.body, b"body{}");
    }

    #[tokio::test]
    async fn test_critical_never_expires() {
        let f = fixture().await;
        f.fetcher.respond(&url("/index.html"), 200, "text/html", "<html>");
        f.get("/index.html").await;

        f.clock.advance(ChronoDuration::days(30));
        let again = f.get("/index.html").await;
        assert_eq!(again.source, ResponseSource::Cache);
        assert_eq!(f.fetcher.calls_to(&url("/index.html")), 1);
    }

    #[tokio::test]
    async fn test_stale_while_revalidate() {
        let f = fixture().await;
        f.fetcher.respond(&url("/data/tips.json"), 200, "application/json", "[\"E\"]");
        let first = f.get("/data/tips.json").await;
        assert_eq!(first.source, ResponseSource::Network);

        f.fetcher.respond(&url("/data/tips.json"), 200, "application/json", "[\"E2\"]");
        let immediate = f.get("/data/tips.json").await;
        assert_eq!(immediate.source, ResponseSource::Cache);
        assert_eq!(immediate.response.body, b"[\"E\"]");

        f.router.settle().await;
        assert_eq!(f.cached_body(CacheKind::Data, "/data/tips.json").await.unwrap(), b"[\"E2\"]");
        let after = f.get("/data/tips.json").await;
        assert_eq!(after.response.body, b"[\"E2\"]");
    }

    #[tokio::test]
    async fn test_revalidation_failure_keeps_entry() {
        let f = fixture().await;
        f.fetcher.respond(&url("/data/tips.json"), 200, "application/json", "[1]");
        f.get("/data/tips.json").await;

        f.fetcher.set_offline(true);
        let served = f.get("/data/tips.json").await;
        f.router.settle().await;

        assert_eq!(served.response.body, b"[1]");
        assert_eq!(f.cached_body(CacheKind::Data, "/data/tips.json").await.unwrap(), b"[1]");
    }

    #[tokio::test]
    async fn test_network_first_caches_and_falls_back() {
        let f = fixture().await;
        f.fetcher.respond(&url("/api/stats"), 200, "application/json", "{\"kg\":1}");
        assert_eq!(f.get("/api/stats").await.source, ResponseSource::Network);

        f.fetcher.set_offline(true);
        let cached = f.get("/api/stats").await;
        assert_eq!(cached.source, ResponseSource::Cache);
        assert_eq!(cached.response.body, b"{\"kg\":1}");
    }

    #[tokio::test]
    async fn test_network_first_timeout_uses_cache() {
        let f = fixture().await;
        f.fetcher.respond(&url("/api/stats"), 200, "application/json", "old");
        f.get("/api/stats").await;

        f.fetcher.respond_after(&url("/api/stats"), Duration::from_secs(5), 200, "application/json", "new");
        let served = f.get("/api/stats").await;
        assert_eq!(served.source, ResponseSource::Cache);
        assert_eq!(served.response.body, b"old");
    }

    #[tokio::test]
    async fn test_non_success_returned_but_not_cached() {
        let f = fixture().await;
        f.fetcher.respond(&url("/api/stats"), 200, "application/json", "good");
        f.get("/api/stats").await;

        f.fetcher.respond(&url("/api/stats"), 500, "application/json", "boom");
        let failed = f.get("/api/stats").await;
        assert_eq!(failed.response.status, 500);
        assert_eq!(f.cached_body(CacheKind::Data, "/api/stats").await.unwrap(), b"good");

        let missing = f.get("/assets/missing.js").await;
        assert_eq!(missing.response.status, 404);
        assert!(f.cached_body(CacheKind::Static, "/assets/missing.js").await.is_none());
    }

    #[tokio::test]
    async fn test_image_placeholder() {
        let f = fixture().await;
        f.fetcher.set_offline(true);
        let offline = f.get("/img/bottle.png").await;
        assert_eq!(offline.source, ResponseSource::Placeholder);
        assert_eq!(offline.response.status, 200);
        assert_eq!(offline.response.content_type(), Some("image/svg+xml"));

        f.fetcher.set_offline(false);
        let not_found = f.get("/img/none.png").await;
        assert_eq!(not_found.source, ResponseSource::Placeholder);
    }

    #[tokio::test]
    async fn test_navigation_fallback() {
        let f = fixture().await;
        f.fetcher.set_offline(true);
        let inline = f.navigate("/about").await;
        assert_eq!(inline.source, ResponseSource::OfflinePage);
        assert_eq!(inline.response.status, 503);

        f.fetcher.set_offline(false);
        f.fetcher.respond(&url("/offline.html"), 200, "text/html", "<p>offline</p>");
        f.router.precache(&["/offline.html".to_string()]).await.unwrap();

        f.fetcher.set_offline(true);
        let cached = f.navigate("/about").await;
        assert_eq!(cached.source, ResponseSource::OfflinePage);
        assert_eq!(cached.response.status, 200);
        assert_eq!(cached.response.body, b"<p>offline</p>");
    }

    #[tokio::test]
    async fn test_non_navigation_failure_is_408() {
        let f = fixture().await;
        f.fetcher.set_offline(true);
        let failed = f.get("/about").await;
        assert_eq!(failed.source, ResponseSource::Fallback);
        assert_eq!(failed.response.status, 408);
    }

    #[tokio::test]
    async fn test_non_get_passes_through_uncached() {
        let f = fixture().await;
        f.fetcher.respond(&url("/api/entries"), 201, "application/json", "{}");
        let request = f
            .router
            .request("/api/entries", false)
            .unwrap()
            .with_method(Method::POST)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"category":"glass"}"#);

        let response = f.router.handle(&request).await;

        assert_eq!(response.source, ResponseSource::Passthrough);
        assert_eq!(response.class, None);
        assert!(f.cached_body(CacheKind::Data, "/api/entries").await.is_none());

        let sent = f.fetcher.last_request(&url("/api/entries")).unwrap();
        assert_eq!(sent.method, Method::POST);
        assert_eq!(sent.headers.get("content-type").map(String::as_str), Some("application/json"));
        assert_eq!(sent.body.as_deref(), Some(&br#"{"category":"glass"}"#[..]));
    }

    #[tokio::test]
    async fn test_intercepted_get_keeps_request_headers() {
        let f = fixture().await;
        f.fetcher.respond(&url("/api/stats"), 200, "application/json", "{}");
        let request = f.router.request("/api/stats", false).unwrap().with_header("Authorization", "Bearer abc");

        let response = f.router.handle(&request).await;

        assert_eq!(response.source, ResponseSource::Network);
        let sent = f.fetcher.last_request(&url("/api/stats")).unwrap();
        assert_eq!(sent.headers.get("authorization").map(String::as_str), Some("Bearer abc"));
    }

    #[tokio::test]
    async fn test_quota_failure_still_serves_response() {
        let f = fixture_with(Some(4)).await;
        f.fetcher.respond(&url("/api/big"), 200, "application/json", "0123456789");

        let response = f.get("/api/big").await;

        assert_eq!(response.source, ResponseSource::Network);
        assert_eq!(response.response.body, b"0123456789");
        assert!(f.cached_body(CacheKind::Data, "/api/big").await.is_none());
    }

    #[tokio::test]
    async fn test_precache_fails_on_missing_resource() {
        let f = fixture().await;
        f.fetcher.respond(&url("/"), 200, "text/html", "<html>");
        let result = f.router.precache(&["/".to_string(), "/manifest.json".to_string()]).await;
        assert!(matches!(result, Err(Error::HttpError(_))));
    }

    #[tokio::test]
    async fn test_is_precached_tracks_critical_entries() {
        let f = fixture().await;
        let paths = vec!["/".to_string(), "/offline.html".to_string()];
        assert!(!f.router.is_precached(&paths).await.unwrap());

        f.fetcher.respond(&url("/"), 200, "text/html", "<html>");
        f.fetcher.respond(&url("/offline.html"), 200, "text/html", "offline");
        assert_eq!(f.router.precache(&paths).await.unwrap(), 2);
        assert!(f.router.is_precached(&paths).await.unwrap());
    }
}
