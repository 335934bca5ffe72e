//! Hand-off between worker generations.
//!
//! The coordinator only tracks lifecycle state and tells clients what changed.
//! The host performs the side effects of an [`Activation`]: swapping the
//! router to the new version's caches and purging the old ones.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use schemars::JsonSchema;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::{MissedTickBehavior, interval};

use super::source::{ReleaseInfo, UpdateSource};
use super::version::{WorkerState, WorkerVersion};
use crate::Error;
use crate::notify::{Notification, Notifier};

/// A version that just took control.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, JsonSchema)]
pub struct Activation {
    pub version: String,
    pub previous: Option<String>,
}

/// Where a finished install ended up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InstallOutcome {
    /// Nothing was active, so the version took control immediately.
    Activated(Activation),
    /// Another version is active; this one waits for an explicit hand-off.
    Waiting { version: String },
}

/// Point-in-time view of every tracked version.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, JsonSchema)]
pub struct CoordinatorStatus {
    pub active: Option<WorkerVersion>,
    pub waiting: Option<WorkerVersion>,
    pub installing: Option<WorkerVersion>,
    /// Tags that reached `REDUNDANT`, oldest first.
    pub retired: Vec<String>,
}

#[derive(Debug, Default)]
struct Slots {
    active: Option<WorkerVersion>,
    waiting: Option<(WorkerVersion, bool)>,
    installing: Option<(WorkerVersion, bool)>,
    retired: Vec<String>,
}

impl Slots {
    fn retire(&mut self, mut version: WorkerVersion) -> Result<(), Error> {
        version.transition(WorkerState::Redundant)?;
        self.retired.push(version.version_tag);
        Ok(())
    }

    fn knows(&self, tag: &str) -> bool {
        self.active.as_ref().is_some_and(|v| v.version_tag == tag)
            || self.waiting.as_ref().is_some_and(|(v, _)| v.version_tag == tag)
            || self.installing.as_ref().is_some_and(|(v, _)| v.version_tag == tag)
    }
}

/// Lifecycle state machine for worker versions. At most one version is active.
#[derive(Debug)]
pub struct UpdateCoordinator {
    slots: Mutex<Slots>,
    notifier: Notifier,
}

impl UpdateCoordinator {
    pub fn new(notifier: Notifier) -> Self {
        Self { slots: Mutex::new(Slots::default()), notifier }
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, Slots> {
        self.slots.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// True when `tag` is active, waiting or installing.
    pub fn knows(&self, tag: &str) -> bool {
        self.slots().knows(tag)
    }

    pub fn active_version(&self) -> Option<String> {
        self.slots().active.as_ref().map(|v| v.version_tag.clone())
    }

    pub fn waiting_version(&self) -> Option<String> {
        self.slots().waiting.as_ref().map(|(v, _)| v.version_tag.clone())
    }

    /// Start installing `tag`. A version already installing is superseded.
    pub fn begin_install(&self, tag: &str, required: bool) -> Result<(), Error> {
        if tag.trim().is_empty() {
            return Err(Error::InvalidInput("version tag cannot be empty".into()));
        }
        let mut slots = self.slots();
        if slots.knows(tag) {
            return Err(Error::InvalidTransition(format!("{tag} is already installing, waiting or active")));
        }
        if let Some((superseded, _)) = slots.installing.take() {
            tracing::info!(version = %superseded.version_tag, by = tag, "install superseded");
            slots.retire(superseded)?;
        }
        tracing::info!(version = tag, required, "installing worker version");
        slots.installing = Some((WorkerVersion::installing(tag), required));
        Ok(())
    }

    /// The installing version finished pre-warming its caches.
    pub fn install_succeeded(&self) -> Result<InstallOutcome, Error> {
        let mut slots = self.slots();
        let Some((mut version, required)) = slots.installing.take() else {
            return Err(Error::InvalidTransition("no version is installing".into()));
        };

        if slots.active.is_none() {
            version.transition(WorkerState::Active)?;
            let activation = Activation { version: version.version_tag.clone(), previous: None };
            tracing::info!(version = %version.version_tag, "first install activated immediately");
            slots.active = Some(version);
            return Ok(InstallOutcome::Activated(activation));
        }

        version.transition(WorkerState::Waiting)?;
        if let Some((replaced, _)) = slots.waiting.take() {
            tracing::info!(version = %replaced.version_tag, "waiting version replaced by newer install");
            slots.retire(replaced)?;
        }
        let tag = version.version_tag.clone();
        slots.waiting = Some((version, required));
        drop(slots);

        tracing::info!(version = %tag, required, "update waiting for hand-off");
        self.notifier.emit(Notification::UpdateAvailable { version: tag.clone(), required });
        Ok(InstallOutcome::Waiting { version: tag })
    }

    /// The installing version could not pre-warm its caches.
    pub fn install_failed(&self, reason: &str) -> Result<(), Error> {
        let mut slots = self.slots();
        let Some((version, _)) = slots.installing.take() else {
            return Err(Error::InvalidTransition("no version is installing".into()));
        };
        tracing::warn!(version = %version.version_tag, reason, "install failed");
        slots.retire(version)
    }

    /// Explicit hand-off: the waiting version replaces the active one.
    ///
    /// Returns `None` when nothing is waiting.
    pub fn activate_waiting(&self) -> Result<Option<Activation>, Error> {
        let mut slots = self.slots();
        let Some((mut next, _)) = slots.waiting.take() else {
            return Ok(None);
        };
        next.transition(WorkerState::Active)?;

        let previous = match slots.active.take() {
            Some(old) => {
                let tag = old.version_tag.clone();
                slots.retire(old)?;
                Some(tag)
            }
            None => None,
        };
        let activation = Activation { version: next.version_tag.clone(), previous };
        slots.active = Some(next);
        drop(slots);

        tracing::info!(version = %activation.version, previous = ?activation.previous, "hand-off complete");
        self.notifier.emit(Notification::ReloadClients { version: activation.version.clone() });
        Ok(Some(activation))
    }

    pub fn status(&self) -> CoordinatorStatus {
        let slots = self.slots();
        CoordinatorStatus {
            active: slots.active.clone(),
            waiting: slots.waiting.as_ref().map(|(v, _)| v.clone()),
            installing: slots.installing.as_ref().map(|(v, _)| v.clone()),
            retired: slots.retired.clone(),
        }
    }

    /// Ask `source` for the latest release every `every`, forwarding versions
    /// this coordinator does not know yet. The first check runs immediately.
    ///
    /// The task ends when the returned receiver is dropped.
    pub fn spawn_poller(
        self: &Arc<Self>, source: Arc<dyn UpdateSource>, every: Duration,
    ) -> (JoinHandle<()>, mpsc::Receiver<ReleaseInfo>) {
        let (tx, rx) = mpsc::channel(4);
        let coordinator = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = interval(every);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                match source.latest().await {
                    Ok(release) if coordinator.knows(&release.version) => {
                        tracing::trace!(version = %release.version, "no new release");
                    }
                    Ok(release) => {
                        tracing::info!(version = %release.version, required = release.required, "new release found");
                        if tx.send(release).await.is_err() {
                            break;
                        }
                    }
                    Err(e) => tracing::warn!(error = %e, "update check failed"),
                }
            }
        });
        (handle, rx)
    }
}
