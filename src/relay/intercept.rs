//! The network as seen from a controlled page.

use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::watch;

use crate::relay::error::FetchError;
use crate::relay::fetch::Fetch;
use crate::relay::request::OutboundRequest;
use crate::relay::worker::{FetchOutcome, RelayHandle};

/// Routes every request through the controlling worker first.
///
/// Requests the worker does not claim, or every request when no worker is
/// active, go straight to the underlying network.
#[derive(Clone)]
pub struct InterceptingFetcher {
    controller: watch::Receiver<Option<RelayHandle>>,
    network: Arc<dyn Fetch>,
}

impl InterceptingFetcher {
    pub fn new(controller: watch::Receiver<Option<RelayHandle>>, network: Arc<dyn Fetch>) -> Self {
        Self {
            controller,
            network,
        }
    }
}

#[async_trait]
impl Fetch for InterceptingFetcher {
    async fn fetch(&self, request: OutboundRequest) -> Result<reqwest::Response, FetchError> {
        let controller = self.controller.borrow().clone();
        let request = match controller {
            Some(handle) => match handle.dispatch_fetch(request).await {
                FetchOutcome::Responded(result) => return result,
                FetchOutcome::Passthrough(request) => request,
            },
            None => request,
        };
        self.network.fetch(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::fetch::testing::RecordingFetch;
    use crate::relay::lifecycle::RelayRegistry;
    use crate::relay::message::RelayMessage;
    use crate::types::SessionToken;
    use http::Method;

    #[tokio::test]
    async fn uncontrolled_page_goes_straight_to_network() {
        let network = Arc::new(RecordingFetch::new());
        let registry = RelayRegistry::new(network.clone());
        let fetcher = InterceptingFetcher::new(registry.subscribe(), network.clone());

        let request = OutboundRequest::parse(
            Method::GET,
            "http://localhost:5000/api/admin/stream/room42",
        )
        .unwrap();
        fetcher.fetch(request).await.unwrap();
        assert_eq!(network.last().authorization(), None);
    }

    #[tokio::test]
    async fn passthrough_reaches_network_unmodified() {
        let network = Arc::new(RecordingFetch::new());
        let registry = RelayRegistry::new(network.clone());
        let handle = registry.register().await;
        handle
            .post_message(RelayMessage::set_token(Some(SessionToken::new("abc"))))
            .unwrap();
        let fetcher = InterceptingFetcher::new(registry.subscribe(), network.clone());

        let request = OutboundRequest::parse(Method::PUT, "http://localhost:5000/api/admin/rooms/1")
            .unwrap()
            .with_body("{\"name\":\"Lab\"}");
        fetcher.fetch(request).await.unwrap();

        let seen = network.last();
        assert_eq!(seen.method, Method::PUT);
        assert_eq!(seen.authorization(), None);
        assert_eq!(seen.body.as_deref(), Some(&b"{\"name\":\"Lab\"}"[..]));
    }
}
