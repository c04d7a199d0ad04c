//! The relay worker: an actor owning the token mirror.
//!
//! The mirror is private to the worker task. It only changes when a
//! [`RelayMessage`] arrives on the inbox, and it starts empty on every spawn.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::relay::error::{FetchError, RelayError};
use crate::relay::fetch::Fetch;
use crate::relay::lifecycle::WorkerState;
use crate::relay::message::{RelayMessage, TokenReply};
use crate::relay::request::OutboundRequest;
use crate::types::{SessionToken, WorkerVersion};

/// Path prefix of the live-stream resource.
pub const STREAM_PATH_PREFIX: &str = "/api/admin/stream/";

/// What the worker did with a fetch event.
#[derive(Debug)]
pub enum FetchOutcome {
    /// Not ours; the caller dispatches the request itself.
    Passthrough(OutboundRequest),
    /// The worker dispatched the request (authorized or not).
    Responded(Result<reqwest::Response, FetchError>),
}

pub(crate) enum RelayEvent {
    Message {
        message: RelayMessage,
        reply_port: Option<oneshot::Sender<TokenReply>>,
    },
    Fetch {
        request: OutboundRequest,
        respond_with: oneshot::Sender<FetchOutcome>,
    },
}

impl RelayEvent {
    fn into_request(self) -> Option<OutboundRequest> {
        match self {
            Self::Fetch { request, .. } => Some(request),
            Self::Message { .. } => None,
        }
    }
}

/// Cloneable handle to a running worker version.
#[derive(Clone)]
pub struct RelayHandle {
    version: WorkerVersion,
    events: mpsc::UnboundedSender<RelayEvent>,
    state: watch::Receiver<WorkerState>,
}

impl std::fmt::Debug for RelayHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RelayHandle")
            .field("version", &self.version)
            .field("state", &*self.state.borrow())
            .finish()
    }
}

impl RelayHandle {
    pub fn version(&self) -> WorkerVersion {
        self.version
    }

    pub fn state(&self) -> WorkerState {
        *self.state.borrow()
    }

    pub fn is_running(&self) -> bool {
        !self.events.is_closed()
    }

    /// Fire-and-forget delivery of a message.
    pub fn post_message(&self, message: RelayMessage) -> Result<(), RelayError> {
        self.events
            .send(RelayEvent::Message {
                message,
                reply_port: None,
            })
            .map_err(|_| RelayError::WorkerUnavailable)
    }

    /// Send `GET_AUTH_TOKEN` with a reply port and wait for the answer.
    pub async fn request_token(&self) -> Result<Option<SessionToken>, RelayError> {
        let (tx, rx) = oneshot::channel();
        self.events
            .send(RelayEvent::Message {
                message: RelayMessage::GetAuthToken,
                reply_port: Some(tx),
            })
            .map_err(|_| RelayError::WorkerUnavailable)?;
        let reply = rx.await.map_err(|_| RelayError::WorkerUnavailable)?;
        Ok(reply.token)
    }

    /// Hand a request to the worker. A stopped worker hands it straight back.
    pub async fn dispatch_fetch(&self, request: OutboundRequest) -> FetchOutcome {
        let (tx, rx) = oneshot::channel();
        let event = RelayEvent::Fetch {
            request,
            respond_with: tx,
        };
        if let Err(mpsc::error::SendError(event)) = self.events.send(event) {
            return match event.into_request() {
                Some(request) => FetchOutcome::Passthrough(request),
                None => FetchOutcome::Responded(Err(FetchError::Network(
                    "relay worker is not running".to_string(),
                ))),
            };
        }
        rx.await.unwrap_or_else(|_| {
            FetchOutcome::Responded(Err(FetchError::Network(
                "relay worker dropped the request".to_string(),
            )))
        })
    }
}

/// Registry-side controls for a spawned worker.
pub(crate) struct WorkerControl {
    pub(crate) state: watch::Sender<WorkerState>,
    shutdown: Option<oneshot::Sender<()>>,
    task: JoinHandle<()>,
}

impl WorkerControl {
    pub(crate) fn set_state(&self, state: WorkerState) {
        self.state.send_replace(state);
    }

    /// Stop the worker task. Queued fetches are handed back as passthroughs.
    pub(crate) fn stop(&mut self) {
        self.set_state(WorkerState::Redundant);
        if let Some(shutdown) = self.shutdown.take() {
            let _ = shutdown.send(());
        }
    }

    pub(crate) async fn join(self) {
        if let Err(err) = self.task.await {
            warn!(error = %err, "Relay worker task ended abnormally");
        }
    }
}

struct RelayWorker {
    version: WorkerVersion,
    mirror: Option<SessionToken>,
    prefix: Arc<str>,
    network: Arc<dyn Fetch>,
}

/// Spawn a worker version. It starts in `Installing` with an empty mirror.
pub(crate) fn spawn_worker(
    version: WorkerVersion,
    prefix: Arc<str>,
    network: Arc<dyn Fetch>,
) -> (RelayHandle, WorkerControl) {
    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let (shutdown_tx, shutdown_rx) = oneshot::channel();
    let (state_tx, state_rx) = watch::channel(WorkerState::Installing);

    let worker = RelayWorker {
        version,
        mirror: None,
        prefix,
        network,
    };
    let task = tokio::spawn(worker.run(events_rx, shutdown_rx));

    let handle = RelayHandle {
        version,
        events: events_tx,
        state: state_rx,
    };
    let control = WorkerControl {
        state: state_tx,
        shutdown: Some(shutdown_tx),
        task,
    };
    (handle, control)
}

impl RelayWorker {
    async fn run(
        mut self,
        mut events: mpsc::UnboundedReceiver<RelayEvent>,
        mut shutdown: oneshot::Receiver<()>,
    ) {
        debug!(version = %self.version, "Relay worker listening");
        loop {
            tokio::select! {
                Ok(()) = &mut shutdown => {
                    info!(version = %self.version, "Relay worker stopping");
                    break;
                }
                event = events.recv() => match event {
                    Some(event) => self.handle_event(event),
                    None => break,
                }
            }
        }

        events.close();
        while let Ok(event) = events.try_recv() {
            if let RelayEvent::Fetch {
                request,
                respond_with,
            } = event
            {
                let _ = respond_with.send(FetchOutcome::Passthrough(request));
            }
        }
    }

    fn handle_event(&mut self, event: RelayEvent) {
        match event {
            RelayEvent::Message {
                message,
                reply_port,
            } => self.handle_message(message, reply_port),
            RelayEvent::Fetch {
                request,
                respond_with,
            } => self.handle_fetch(request, respond_with),
        }
    }

    fn handle_message(
        &mut self,
        message: RelayMessage,
        reply_port: Option<oneshot::Sender<TokenReply>>,
    ) {
        match message {
            RelayMessage::SetAuthToken { token } => {
                debug!(
                    version = %self.version,
                    present = token.is_some(),
                    "Token mirror updated"
                );
                self.mirror = token;
            }
            RelayMessage::GetAuthToken => {
                if let Some(port) = reply_port {
                    let _ = port.send(TokenReply {
                        token: self.mirror.clone(),
                    });
                }
            }
        }
    }

    fn handle_fetch(&self, request: OutboundRequest, respond_with: oneshot::Sender<FetchOutcome>) {
        if !request.path_starts_with(&self.prefix) {
            let _ = respond_with.send(FetchOutcome::Passthrough(request));
            return;
        }

        let token = self.mirror.clone();
        let network = self.network.clone();
        let version = self.version;
        tokio::spawn(async move {
            let result = relay_protected(network, request, token, version).await;
            let _ = respond_with.send(FetchOutcome::Responded(result));
        });
    }
}

async fn relay_protected(
    network: Arc<dyn Fetch>,
    request: OutboundRequest,
    token: Option<SessionToken>,
    version: WorkerVersion,
) -> Result<reqwest::Response, FetchError> {
    if request.has_authorization() {
        return network.fetch(request).await;
    }

    let Some(token) = token else {
        debug!(
            version = %version,
            path = %request.url().path(),
            "No mirrored token; forwarding protected request as is"
        );
        return network.fetch(request).await;
    };

    match request.authorized(&token) {
        Ok(authorized) => network.fetch(authorized).await,
        Err(err) => {
            warn!(
                version = %version,
                path = %request.url().path(),
                error = %err,
                "Could not build authorized request; dispatching original"
            );
            network.fetch(request).await
        }
    }
}
