//! Periodic polling of the controller state.
//!
//! The coordinator is the only writer of the current [`Snapshot`]. Every successful refresh
//! replaces it wholesale and broadcasts the new snapshot to all subscribers, whether or not it
//! differs from the previous one. A failed refresh leaves the previous snapshot in place and
//! notifies nobody.

use crate::config::CoordinatorConfig;
use crate::controller::{self, Controller, Snapshot};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tokio_util::task::AbortOnDropHandle;
use tracing::{debug, info, warn};

/// How a coordinator failure should be treated by whoever set the coordinator up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FailureKind {
    /// The controller could not be reached during setup. Retrying will not help until the
    /// configuration is changed.
    Authentication,
    /// A periodic refresh failed. The next tick will try again.
    Update,
    Unclassified,
}

#[derive(thiserror::Error, Debug)]
pub enum Error {
    #[error("could not reach the controller")]
    Authentication(#[source] controller::Error),
    #[error("controller did not answer the setup probe in {0:?}")]
    SetupTimeout(Duration),
    #[error("controller setup probe failed")]
    Setup(#[source] controller::Error),
    #[error("controller setup task failed")]
    SetupTask(#[source] tokio::task::JoinError),
    #[error("could not update the controller state")]
    Update(#[source] controller::Error),
    #[error("controller state update did not complete in {0:?}")]
    UpdateTimeout(Duration),
    #[error("controller state update task failed")]
    UpdateTask(#[source] tokio::task::JoinError),
}

impl Error {
    pub fn kind(&self) -> FailureKind {
        match self {
            Error::Authentication(_) => FailureKind::Authentication,
            Error::Update(_) | Error::UpdateTimeout(_) | Error::UpdateTask(_) => {
                FailureKind::Update
            }
            Error::SetupTimeout(_) | Error::Setup(_) | Error::SetupTask(_) => {
                FailureKind::Unclassified
            }
        }
    }
}

enum Fetch {
    Controller(controller::Error),
    Timeout(Duration),
    Task(tokio::task::JoinError),
}

pub struct Coordinator {
    controller: Arc<dyn Controller>,
    config: CoordinatorConfig,
    snapshot: Mutex<Option<Arc<Snapshot>>>,
    updates: broadcast::Sender<Arc<Snapshot>>,
    available: watch::Sender<bool>,
    // Held for the duration of a refresh so that refreshes never overlap.
    refresh_lock: tokio::sync::Mutex<()>,
}

impl Coordinator {
    pub fn new(controller: Arc<dyn Controller>, config: CoordinatorConfig) -> Self {
        let (updates, _) = broadcast::channel(16);
        let (available, _) = watch::channel(false);
        Self {
            controller,
            config,
            snapshot: Mutex::new(None),
            updates,
            available,
            refresh_lock: tokio::sync::Mutex::new(()),
        }
    }

    pub fn controller(&self) -> &Arc<dyn Controller> {
        &self.controller
    }

    /// The most recent successfully polled snapshot.
    pub fn data(&self) -> Option<Arc<Snapshot>> {
        self.snapshot.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }

    pub fn last_update_success(&self) -> bool {
        *self.available.borrow()
    }

    /// Receive every snapshot published from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<Arc<Snapshot>> {
        self.updates.subscribe()
    }

    /// Observe the outcome of the most recent refresh.
    pub fn availability(&self) -> watch::Receiver<bool> {
        self.available.subscribe()
    }

    /// Run `update_status` on the blocking pool, bounded by the request timeout.
    ///
    /// The blocking call cannot be interrupted. On timeout it is left to run to completion in the
    /// background and its result is dropped.
    async fn fetch(&self) -> Result<Snapshot, Fetch> {
        let controller = Arc::clone(&self.controller);
        let timeout = self.config.request_timeout;
        let task = tokio::task::spawn_blocking(move || controller.update_status());
        match tokio::time::timeout(timeout, task).await {
            Err(_elapsed) => Err(Fetch::Timeout(timeout)),
            Ok(Err(join)) => Err(Fetch::Task(join)),
            Ok(Ok(result)) => result.map_err(Fetch::Controller),
        }
    }

    /// Probe the controller once.
    pub async fn setup(&self) -> Result<(), Error> {
        match self.fetch().await {
            Ok(_) => {
                info!(controller = self.controller.name(), "connected to the controller");
                Ok(())
            }
            Err(Fetch::Controller(e)) if e.is_connection() => Err(Error::Authentication(e)),
            Err(Fetch::Controller(e)) => Err(Error::Setup(e)),
            Err(Fetch::Timeout(t)) => Err(Error::SetupTimeout(t)),
            Err(Fetch::Task(e)) => Err(Error::SetupTask(e)),
        }
    }

    /// Poll the controller and publish the new snapshot.
    pub async fn refresh(&self) -> Result<Arc<Snapshot>, Error> {
        let _guard = self.refresh_lock.lock().await;
        let snapshot = match self.fetch().await {
            Ok(snapshot) => Arc::new(snapshot),
            Err(fetch) => {
                let was_available = self.available.send_replace(false);
                if was_available {
                    info!("controller became unavailable");
                }
                return Err(match fetch {
                    Fetch::Controller(e) => Error::Update(e),
                    Fetch::Timeout(t) => Error::UpdateTimeout(t),
                    Fetch::Task(e) => Error::UpdateTask(e),
                });
            }
        };
        *self.snapshot.lock().unwrap_or_else(|e| e.into_inner()) = Some(Arc::clone(&snapshot));
        let was_available = self.available.send_replace(true);
        if !was_available {
            info!("controller is available");
        }
        let receivers = self.updates.send(Arc::clone(&snapshot)).unwrap_or(0);
        debug!(
            rooms = snapshot.rooms.len(),
            sunblinds = snapshot.sunblinds.len(),
            devices = snapshot.devices.len(),
            receivers,
            "published controller snapshot"
        );
        Ok(snapshot)
    }

    /// Set up the coordinator and produce the first snapshot. Start-up should not proceed if this
    /// fails.
    pub async fn first_refresh(&self) -> Result<Arc<Snapshot>, Error> {
        self.setup().await?;
        self.refresh().await
    }

    /// Refresh periodically until the returned handle is dropped.
    ///
    /// The first refresh happens one update interval from now.
    pub fn spawn(self: &Arc<Self>) -> AbortOnDropHandle<()> {
        let this = Arc::clone(self);
        AbortOnDropHandle::new(tokio::spawn(async move {
            let period = this.config.update_interval;
            let start = tokio::time::Instant::now() + period;
            let mut interval = tokio::time::interval_at(start, period);
            interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                interval.tick().await;
                if let Err(e) = this.refresh().await {
                    warn!(err = %e, kind = ?e.kind(), "controller refresh failed");
                }
            }
        }))
    }
}
