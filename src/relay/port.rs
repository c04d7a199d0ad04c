//! How a page context reaches a relay.
//!
//! In-process the port is a [`RelayHandle`] found through the registry's
//! controller slot. Out of process it is the relay server's
//! `/relay/messages` endpoint, reached with [`RemoteRelay`].

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tokio::sync::watch;
use tracing::{debug, info};

use crate::relay::error::RelayError;
use crate::relay::message::{RelayMessage, TokenReply};
use crate::relay::worker::RelayHandle;
use crate::types::SessionToken;

/// A message channel to one relay instance.
#[async_trait]
pub trait RelayPort: Send + Sync {
    /// Deliver a message; no acknowledgement.
    async fn post_message(&self, message: RelayMessage) -> Result<(), RelayError>;

    /// `GET_AUTH_TOKEN` over a reply port.
    async fn query_token(&self) -> Result<Option<SessionToken>, RelayError>;
}

/// Finds the relay currently controlling this page, if any.
#[async_trait]
pub trait RelayController: Send + Sync {
    /// The active relay right now. `None` when nothing is installed or reachable.
    async fn controller(&self) -> Option<Arc<dyn RelayPort>>;

    /// Wait until a relay controls this page. `None` if that can no longer
    /// happen or the implementation gives up waiting.
    async fn connected(&self) -> Option<Arc<dyn RelayPort>>;
}

#[async_trait]
impl RelayPort for RelayHandle {
    async fn post_message(&self, message: RelayMessage) -> Result<(), RelayError> {
        RelayHandle::post_message(self, message)
    }

    async fn query_token(&self) -> Result<Option<SessionToken>, RelayError> {
        self.request_token().await
    }
}

/// Controller lookup for a page living in the same process as the registry.
#[derive(Clone)]
pub struct LocalController {
    controller: watch::Receiver<Option<RelayHandle>>,
}

impl LocalController {
    pub fn new(controller: watch::Receiver<Option<RelayHandle>>) -> Self {
        Self { controller }
    }
}

#[async_trait]
impl RelayController for LocalController {
    async fn controller(&self) -> Option<Arc<dyn RelayPort>> {
        let handle = self.controller.borrow().clone()?;
        Some(Arc::new(handle))
    }

    async fn connected(&self) -> Option<Arc<dyn RelayPort>> {
        let mut controller = self.controller.clone();
        let handle = controller
            .wait_for(|current| current.is_some())
            .await
            .ok()?
            .clone()?;
        Some(Arc::new(handle))
    }
}

/// How long [`RemoteRelay::connected`] keeps polling by default.
pub const DEFAULT_CONNECT_WAIT: Duration = Duration::from_secs(30);

const FIRST_POLL_DELAY: Duration = Duration::from_millis(100);
const MAX_POLL_DELAY: Duration = Duration::from_secs(2);

/// HTTP client for a relay server running in another process.
#[derive(Clone)]
pub struct RemoteRelay {
    client: Client,
    base_url: Url,
    connect_wait: Duration,
}

impl RemoteRelay {
    pub fn new(base_url: Url) -> Result<Self, RelayError> {
        let client = Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base_url,
            connect_wait: DEFAULT_CONNECT_WAIT,
        })
    }

    /// Bound on how long `connected` waits for a worker to come up.
    pub fn with_connect_wait(mut self, wait: Duration) -> Self {
        self.connect_wait = wait;
        self
    }

    fn endpoint(&self, path: &str) -> Result<Url, RelayError> {
        self.base_url
            .join(path)
            .map_err(|e| RelayError::InvalidUrl(e.to_string()))
    }

    async fn send(&self, message: &RelayMessage) -> Result<reqwest::Response, RelayError> {
        let response = self
            .client
            .post(self.endpoint("/relay/messages")?)
            .json(message)
            .send()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;

        match response.status() {
            StatusCode::SERVICE_UNAVAILABLE => Err(RelayError::WorkerUnavailable),
            status if status.is_success() => Ok(response),
            status => Err(RelayError::Transport(format!(
                "HTTP {} from relay",
                status
            ))),
        }
    }
}

#[async_trait]
impl RelayPort for RemoteRelay {
    async fn post_message(&self, message: RelayMessage) -> Result<(), RelayError> {
        self.send(&message).await.map(|_| ())
    }

    async fn query_token(&self) -> Result<Option<SessionToken>, RelayError> {
        let reply: TokenReply = self
            .send(&RelayMessage::GetAuthToken)
            .await?
            .json()
            .await
            .map_err(|e| RelayError::Transport(e.to_string()))?;
        Ok(reply.token)
    }
}

#[async_trait]
impl RelayController for RemoteRelay {
    async fn controller(&self) -> Option<Arc<dyn RelayPort>> {
        let url = self.endpoint("/relay/health").ok()?;
        match self.client.get(url).send().await {
            Ok(response) if response.status().is_success() => Some(Arc::new(self.clone())),
            Ok(response) => {
                debug!(status = %response.status(), "Relay has no active worker");
                None
            }
            Err(err) => {
                debug!(error = %err, "Relay not reachable");
                None
            }
        }
    }

    /// Poll `/relay/health` with exponential backoff until a worker is
    /// active. Gives up after the configured connect wait.
    async fn connected(&self) -> Option<Arc<dyn RelayPort>> {
        let deadline = tokio::time::Instant::now() + self.connect_wait;
        let mut delay = FIRST_POLL_DELAY;
        loop {
            if let Some(port) = self.controller().await {
                return Some(port);
            }
            let now = tokio::time::Instant::now();
            if now >= deadline {
                info!(relay = %self.base_url, "Gave up waiting for a relay worker");
                return None;
            }
            tokio::time::sleep(delay.min(deadline - now)).await;
            delay = (delay * 2).min(MAX_POLL_DELAY);
        }
    }
}

/// A page with no relay support at all.
pub struct NoController;

#[async_trait]
impl RelayController for NoController {
    async fn controller(&self) -> Option<Arc<dyn RelayPort>> {
        None
    }

    async fn connected(&self) -> Option<Arc<dyn RelayPort>> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::api::{RelayAppState, create_relay_router};
    use crate::relay::fetch::testing::RecordingFetch;
    use crate::relay::intercept::InterceptingFetcher;
    use crate::relay::lifecycle::RelayRegistry;
    use crate::session::{AuthSession, MemoryStorage, Role, SessionUser, SyncOutcome};

    /// Serve a relay for `registry` on an ephemeral port.
    async fn start_relay(registry: Arc<RelayRegistry>) -> Url {
        let network = Arc::new(RecordingFetch::new());
        let state = Arc::new(RelayAppState {
            registry: registry.clone(),
            network: InterceptingFetcher::new(registry.subscribe(), network),
            api_host: Url::parse("http://backend.test:5000").unwrap(),
            max_body_bytes: 1024,
        });
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, create_relay_router(state)).await.unwrap();
        });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    #[tokio::test]
    async fn local_controller_tracks_registry() {
        let registry = RelayRegistry::new(Arc::new(RecordingFetch::new()));
        let controller = LocalController::new(registry.subscribe());
        assert!(controller.controller().await.is_none());

        registry.register().await;
        let port = controller.controller().await.unwrap();
        port.post_message(RelayMessage::set_token(Some(SessionToken::new("x"))))
            .await
            .unwrap();
        assert_eq!(
            port.query_token().await.unwrap(),
            Some(SessionToken::new("x"))
        );
    }

    #[tokio::test]
    async fn connected_waits_for_registration() {
        let registry = Arc::new(RelayRegistry::new(Arc::new(RecordingFetch::new())));
        let controller = LocalController::new(registry.subscribe());

        let waiter = tokio::spawn(async move { controller.connected().await.is_some() });
        tokio::task::yield_now().await;
        registry.register().await;

        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn unreachable_remote_has_no_controller() {
        let remote = RemoteRelay::new(Url::parse("http://127.0.0.1:9").unwrap()).unwrap();
        assert!(remote.controller().await.is_none());
    }

    #[tokio::test]
    async fn unreachable_remote_stops_waiting_after_bound() {
        let remote = RemoteRelay::new(Url::parse("http://127.0.0.1:9").unwrap())
            .unwrap()
            .with_connect_wait(Duration::from_millis(300));
        assert!(remote.connected().await.is_none());
    }

    #[tokio::test]
    async fn remote_login_and_logout_reach_the_mirror() {
        let registry = Arc::new(RelayRegistry::new(Arc::new(RecordingFetch::new())));
        registry.register().await;
        let remote = RemoteRelay::new(start_relay(registry.clone()).await).unwrap();

        let session = AuthSession::load(Arc::new(MemoryStorage::new()), Arc::new(remote.clone()))
            .await
            .unwrap();
        let outcome = session
            .login(SessionUser::new(SessionToken::new("abc123"), Role::Admin))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Confirmed);
        assert_eq!(
            registry.controller().unwrap().request_token().await.unwrap(),
            Some(SessionToken::new("abc123"))
        );
        assert_eq!(
            remote.query_token().await.unwrap(),
            Some(SessionToken::new("abc123"))
        );

        assert_eq!(session.logout().await.unwrap(), SyncOutcome::Confirmed);
        assert_eq!(remote.query_token().await.unwrap(), None);
    }

    #[tokio::test]
    async fn remote_without_worker_is_unavailable() {
        let registry = Arc::new(RelayRegistry::new(Arc::new(RecordingFetch::new())));
        let remote = RemoteRelay::new(start_relay(registry).await).unwrap();

        assert!(remote.controller().await.is_none());
        assert!(matches!(
            remote.query_token().await,
            Err(RelayError::WorkerUnavailable)
        ));
    }

    #[tokio::test]
    async fn remote_connected_waits_for_worker() {
        let registry = Arc::new(RelayRegistry::new(Arc::new(RecordingFetch::new())));
        let remote = RemoteRelay::new(start_relay(registry.clone()).await)
            .unwrap()
            .with_connect_wait(Duration::from_secs(10));

        let waiter = tokio::spawn(async move {
            let port = remote.connected().await?;
            port.query_token().await.ok()
        });
        tokio::time::sleep(Duration::from_millis(300)).await;
        assert!(!waiter.is_finished());

        let handle = registry.register().await;
        handle
            .post_message(RelayMessage::set_token(Some(SessionToken::new("late"))))
            .unwrap();
        assert_eq!(waiter.await.unwrap(), Some(Some(SessionToken::new("late"))));
    }
}
