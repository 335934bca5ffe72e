//! Worker host: wires storage, the router generations, the offline engine and
//! the update lifecycle together, and answers control-channel messages.
//!
//! Exactly one router generation serves requests at a time. A new version is
//! installed into its own caches next to the live ones and only replaces the
//! live router on activation, after which every cache outside the new
//! generation is purged.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, RwLock, mpsc};
use tokio::task::JoinHandle;

use binsync_client::{
    Classifier, ClassifierRules, FetchClient, FetchConfig, FetchRequest, Fetcher, HttpSink, ManifestSource, Router,
    RouterOptions, RouterResponse, UnconfiguredSink,
};
use binsync_core::update::{CoordinatorStatus, InstallOutcome};
use binsync_core::{
    Activation, AppConfig, CacheNames, CacheStore, Clock, ConnectivityMonitor, ControlMessage, ControlReply, Error,
    LocalDataStore, NewWasteEntry, Notification, Notifier, OfflineEngine, RecordOutcome, ReleaseInfo,
    RemoteSink, StoreDb, SyncQueue, SystemClock, UpdateCoordinator, WasteEntry,
};

/// External collaborators the worker is built from.
pub struct Services {
    pub db: StoreDb,
    pub clock: Arc<dyn Clock>,
    pub fetcher: Arc<dyn Fetcher>,
    pub sink: Arc<dyn RemoteSink>,
}

impl Services {
    /// Production wiring: SQLite at `db_path`, reqwest for fetches and sync.
    ///
    /// Without a `sync_endpoint` every delivery fails, so mutations stay queued
    /// until the worker is restarted with one.
    pub async fn from_config(config: &AppConfig) -> Result<Self, Error> {
        let fetch_config =
            FetchConfig { user_agent: config.user_agent.clone(), max_bytes: config.max_bytes, ..Default::default() };
        let db = StoreDb::open(&config.db_path).await?;
        let fetcher: Arc<dyn Fetcher> = Arc::new(FetchClient::new(fetch_config.clone())?);
        let sink: Arc<dyn RemoteSink> = match config.require_sync_endpoint() {
            Ok(endpoint) => Arc::new(HttpSink::new(endpoint, &fetch_config)?),
            Err(e) => {
                tracing::warn!(error = %e, "mutations will stay queued");
                Arc::new(UnconfiguredSink)
            }
        };
        Ok(Self { db, clock: Arc::new(SystemClock), fetcher, sink })
    }
}

/// Snapshot returned by the `worker_status` tool.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerStatus {
    pub serving_version: String,
    pub online: bool,
    pub pending_sync: usize,
    pub cache_bytes: u64,
    pub caches: Vec<String>,
    pub lifecycle: CoordinatorStatus,
    pub recent_notifications: Vec<Notification>,
}

/// The composed worker.
pub struct Worker {
    config: AppConfig,
    store: CacheStore,
    fetcher: Arc<dyn Fetcher>,
    classifier: Classifier,
    router_options: RouterOptions,
    router: RwLock<Arc<Router>>,
    /// Router of the version waiting for hand-off. The lock also serializes
    /// installs against activations.
    staged: Mutex<Option<Arc<Router>>>,
    engine: Arc<OfflineEngine>,
    coordinator: Arc<UpdateCoordinator>,
    notifier: Notifier,
}

impl Worker {
    /// Build every component and install the configured version.
    ///
    /// The first install activates immediately. When the network is down at
    /// startup the install still succeeds if a previous run already filled this
    /// version's critical cache.
    pub async fn start(config: AppConfig, services: Services, online: bool) -> Result<Arc<Self>, Error> {
        let Services { db, clock, fetcher, sink } = services;
        let notifier = Notifier::default();

        let store = CacheStore::new(db.clone(), clock.clone()).with_quota(config.cache_quota_bytes);
        let local = LocalDataStore::new(db.clone(), clock.clone(), config.local_store_options());
        let queue = SyncQueue::open(db, clock, config.sync_queue_options()).await?;
        let connectivity = ConnectivityMonitor::new(online, notifier.clone());
        let engine = Arc::new(OfflineEngine::new(local, queue, connectivity, notifier.clone(), sink));
        let coordinator = Arc::new(UpdateCoordinator::new(notifier.clone()));

        let classifier = Classifier::new(ClassifierRules::default())?;
        let router_options = RouterOptions::from_config(&config)?;

        let tag = config.version_tag.clone();
        coordinator.begin_install(&tag, false)?;
        let router = match Self::prepare(&store, &fetcher, &classifier, &router_options, &config, &tag).await {
            Ok(router) => router,
            Err(e) => {
                coordinator.install_failed(&e.to_string())?;
                return Err(e);
            }
        };
        coordinator.install_succeeded()?;

        let purged = store.purge_caches_not_in(&router.names().all()).await?;
        tracing::info!(version = %tag, purged = purged.len(), "worker active");

        Ok(Arc::new(Self {
            config,
            store,
            fetcher,
            classifier,
            router_options,
            router: RwLock::new(router),
            staged: Mutex::new(None),
            engine,
            coordinator,
            notifier,
        }))
    }

    /// Open a router for `tag` and fill its critical cache.
    async fn prepare(
        store: &CacheStore, fetcher: &Arc<dyn Fetcher>, classifier: &Classifier, options: &RouterOptions,
        config: &AppConfig, tag: &str,
    ) -> Result<Arc<Router>, Error> {
        let router = Router::open(
            store.clone(),
            CacheNames::for_version(tag),
            Arc::clone(fetcher),
            classifier.clone(),
            options.clone(),
        )
        .await?;

        if let Err(e) = router.precache(&config.precache_urls).await {
            if router.is_precached(&config.precache_urls).await? {
                tracing::warn!(version = tag, error = %e, "precache failed, reusing critical cache from last run");
            } else {
                return Err(e);
            }
        }
        Ok(Arc::new(router))
    }

    /// Version whose caches currently answer requests.
    pub async fn serving_version(&self) -> String {
        self.router.read().await.version().to_string()
    }

    /// Route one request through the live generation.
    #[cfg(test)]
    pub async fn fetch(&self, target: &str, navigation: bool) -> Result<RouterResponse, Error> {
        let request = self.request(target, navigation).await?;
        Ok(self.route(&request).await)
    }

    /// Build a GET for `target` resolved against the app origin.
    pub async fn request(&self, target: &str, navigation: bool) -> Result<FetchRequest, Error> {
        self.router.read().await.request(target, navigation)
    }

    /// Resolve `request` through the live router generation.
    pub async fn route(&self, request: &FetchRequest) -> RouterResponse {
        let router = Arc::clone(&*self.router.read().await);
        router.handle(request).await
    }

    /// Install `release` next to the live generation.
    ///
    /// A failed install retires the version and drops its caches. A successful
    /// one waits for `SKIP_WAITING` unless nothing is active yet.
    pub async fn install(&self, release: &ReleaseInfo) -> Result<InstallOutcome, Error> {
        let mut staged = self.staged.lock().await;
        self.coordinator.begin_install(&release.version, release.required)?;

        let prepared = Self::prepare(
            &self.store,
            &self.fetcher,
            &self.classifier,
            &self.router_options,
            &self.config,
            &release.version,
        )
        .await;
        let router = match prepared {
            Ok(router) => router,
            Err(e) => {
                self.coordinator.install_failed(&e.to_string())?;
                self.purge_dead_generations(staged.as_deref()).await?;
                return Err(e);
            }
        };

        let outcome = self.coordinator.install_succeeded()?;
        match &outcome {
            InstallOutcome::Waiting { .. } => {
                *staged = Some(router);
                self.purge_dead_generations(staged.as_deref()).await?;
            }
            InstallOutcome::Activated(_) => {
                *staged = None;
                self.swap_router(router).await?;
            }
        }
        Ok(outcome)
    }

    /// Hand control to the waiting version. Returns `None` if nothing waits.
    ///
    /// The waiting router is ready and live before the coordinator records the
    /// activation, so clients told to reload always reach the new generation.
    /// If it cannot be prepared the active version stays in charge.
    pub async fn skip_waiting(&self) -> Result<Option<(Activation, Vec<String>)>, Error> {
        let mut staged = self.staged.lock().await;
        let Some(version) = self.coordinator.waiting_version() else {
            return Ok(None);
        };

        let router = match staged.as_ref() {
            Some(router) if router.version() == version => Arc::clone(router),
            _ => Self::prepare(
                &self.store,
                &self.fetcher,
                &self.classifier,
                &self.router_options,
                &self.config,
                &version,
            )
            .await?,
        };

        let previous = std::mem::replace(&mut *self.router.write().await, Arc::clone(&router));
        let activation = match self.coordinator.activate_waiting() {
            Ok(Some(activation)) => activation,
            outcome => {
                *self.router.write().await = previous;
                return outcome.map(|_| None);
            }
        };
        *staged = None;
        previous.settle().await;

        let purged = match self.store.purge_caches_not_in(&router.names().all()).await {
            Ok(purged) => purged,
            Err(e) => {
                tracing::warn!(version = %activation.version, error = %e, "old caches kept until the next purge");
                Vec::new()
            }
        };
        Ok(Some((activation, purged)))
    }

    /// Make `router` the live generation and purge every other generation's caches.
    async fn swap_router(&self, router: Arc<Router>) -> Result<Vec<String>, Error> {
        let keep = router.names().all();
        let previous = std::mem::replace(&mut *self.router.write().await, router);
        previous.settle().await;
        self.store.purge_caches_not_in(&keep).await
    }

    async fn purge_dead_generations(&self, staged: Option<&Router>) -> Result<Vec<String>, Error> {
        let mut keep = self.router.read().await.names().all();
        if let Some(router) = staged {
            keep.extend(router.names().all());
        }
        self.store.purge_caches_not_in(&keep).await
    }

    /// Answer a control-channel message.
    pub async fn handle_message(&self, message: ControlMessage) -> Result<ControlReply, Error> {
        tracing::debug!(?message, "control message");
        match message {
            ControlMessage::SkipWaiting => Ok(match self.skip_waiting().await? {
                Some((activation, purged)) => {
                    ControlReply::Activated { version: activation.version, previous: activation.previous, purged }
                }
                None => ControlReply::NothingWaiting,
            }),
            ControlMessage::GetCacheSize => {
                let bytes = self.store.total_size().await?;
                self.notifier.emit(Notification::CacheSize { bytes });
                Ok(ControlReply::CacheSize { bytes })
            }
            ControlMessage::ClearCache => {
                let caches = self.store.clear_all().await?;
                tracing::info!(caches, "all caches cleared");
                self.notifier.emit(Notification::CacheCleared);
                Ok(ControlReply::CacheCleared { caches })
            }
            ControlMessage::SyncNow => {
                let report = self.engine.sync_now().await?;
                Ok(ControlReply::SyncReport {
                    delivered: report.delivered(),
                    failed: report.failed(),
                    skipped: report.skipped(),
                    remaining: report.remaining,
                })
            }
        }
    }

    pub async fn add_record(&self, new: NewWasteEntry) -> Result<RecordOutcome, Error> {
        self.engine.add_record(new).await
    }

    pub async fn today_records(&self) -> Vec<WasteEntry> {
        self.engine.today_records().await
    }

    /// Report a connectivity change. Returns whether the state changed.
    pub fn set_online(&self, online: bool) -> bool {
        self.engine.connectivity().set_online(online)
    }

    pub async fn status(&self) -> Result<WorkerStatus, Error> {
        Ok(WorkerStatus {
            serving_version: self.serving_version().await,
            online: self.engine.connectivity().is_online(),
            pending_sync: self.engine.queue().len().await?,
            cache_bytes: self.store.total_size().await?,
            caches: self.store.cache_names().await?,
            lifecycle: self.coordinator.status(),
            recent_notifications: self.notifier.recent(),
        })
    }

    /// Start the sync loop and, when a manifest URL is configured, the update
    /// poller together with the task that installs what it finds.
    pub fn spawn_background(self: &Arc<Self>) -> Result<Vec<JoinHandle<()>>, Error> {
        let mut tasks = vec![self.engine.spawn_sync_loop()];

        if let Some(url) = &self.config.update_manifest_url {
            let fetch_config = FetchConfig { user_agent: self.config.user_agent.clone(), ..Default::default() };
            let source = Arc::new(ManifestSource::new(url, &fetch_config)?);
            let (poller, releases) =
                self.coordinator.spawn_poller(source, self.config.update_poll_interval());
            tasks.push(poller);
            tasks.push(self.spawn_installer(releases));
        } else {
            tracing::info!("no update manifest configured, update polling disabled");
        }
        Ok(tasks)
    }

    fn spawn_installer(self: &Arc<Self>, mut releases: mpsc::Receiver<ReleaseInfo>) -> JoinHandle<()> {
        let worker = Arc::clone(self);
        tokio::spawn(async move {
            while let Some(release) = releases.recv().await {
                match worker.install(&release).await {
                    Ok(InstallOutcome::Waiting { version }) => {
                        tracing::info!(version = %version, "release installed, waiting for hand-off");
                    }
                    Ok(InstallOutcome::Activated(activation)) => {
                        tracing::info!(version = %activation.version, "release activated");
                    }
                    Err(e) => tracing::warn!(version = %release.version, error = %e, "release install failed"),
                }
            }
        })
    }

    /// Flush pending local writes before exit.
    pub async fn shutdown(&self) {
        let flushed = self.engine.shutdown().await;
        tracing::info!(flushed, "worker stopped");
    }
}
