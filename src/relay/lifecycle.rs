//! Worker installation, activation and client claiming.
//!
//! The registry plays the role of the origin-wide worker container: it
//! installs new worker versions, skips the waiting phase, and claims every
//! client at activation by swapping the controller slot. The superseded
//! version is stopped at that boundary and its mirror is gone with it.

use std::sync::Arc;

use serde::Serialize;
use tokio::sync::{Mutex, watch};
use tracing::info;

use crate::relay::fetch::Fetch;
use crate::relay::worker::{RelayHandle, STREAM_PATH_PREFIX, WorkerControl, spawn_worker};
use crate::types::WorkerVersion;

/// Lifecycle state of one worker version.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerState {
    Installing,
    Installed,
    Activating,
    Activated,
    Redundant,
}

struct Installed {
    handle: RelayHandle,
    control: WorkerControl,
}

/// Installs relay workers and publishes the active one as the controller.
pub struct RelayRegistry {
    network: Arc<dyn Fetch>,
    prefix: Arc<str>,
    current: Mutex<Option<Installed>>,
    last_version: Mutex<WorkerVersion>,
    controller: watch::Sender<Option<RelayHandle>>,
}

impl RelayRegistry {
    /// Create a registry guarding the default stream prefix.
    pub fn new(network: Arc<dyn Fetch>) -> Self {
        Self::with_prefix(network, STREAM_PATH_PREFIX)
    }

    pub fn with_prefix(network: Arc<dyn Fetch>, prefix: &str) -> Self {
        let (controller, _) = watch::channel(None);
        Self {
            network,
            prefix: Arc::from(prefix),
            current: Mutex::new(None),
            last_version: Mutex::new(WorkerVersion::new(0)),
            controller,
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Install and activate a new worker version, claiming all clients.
    pub async fn register(&self) -> RelayHandle {
        let version = {
            let mut last = self.last_version.lock().await;
            *last = last.next();
            *last
        };

        let (handle, control) = spawn_worker(version, self.prefix.clone(), self.network.clone());
        control.set_state(WorkerState::Installed);
        // skip waiting
        control.set_state(WorkerState::Activating);

        let previous = {
            let mut current = self.current.lock().await;
            current.replace(Installed {
                handle: handle.clone(),
                control,
            })
        };

        if let Some(mut previous) = previous {
            info!(
                previous = %previous.handle.version(),
                next = %version,
                "Superseding relay worker"
            );
            previous.control.stop();
            previous.control.join().await;
        }

        if let Some(current) = self.current.lock().await.as_ref() {
            current.control.set_state(WorkerState::Activated);
        }
        // claim clients
        self.controller.send_replace(Some(handle.clone()));
        info!(version = %version, prefix = %self.prefix, "Relay worker activated");

        handle
    }

    /// Stop the active worker and leave clients uncontrolled.
    pub async fn unregister(&self) -> bool {
        let installed = self.current.lock().await.take();
        self.controller.send_replace(None);
        match installed {
            Some(mut installed) => {
                info!(version = %installed.handle.version(), "Relay worker unregistered");
                installed.control.stop();
                installed.control.join().await;
                true
            }
            None => false,
        }
    }

    /// The worker currently controlling clients, if any.
    pub fn controller(&self) -> Option<RelayHandle> {
        self.controller.borrow().clone()
    }

    /// Watch controller changes (the `controllerchange` signal).
    pub fn subscribe(&self) -> watch::Receiver<Option<RelayHandle>> {
        self.controller.subscribe()
    }
}
