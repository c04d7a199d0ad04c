//! Loading the stream the way a resource element would.

use std::sync::Arc;

use http::StatusCode;
use reqwest::Url;
use tracing::{debug, info, warn};

use crate::relay::{Fetch, OutboundRequest, RequestMode, TransportOptions};
use crate::session::{AuthSession, SyncOutcome};
use crate::stream::StreamError;
use crate::stream::builder::{StreamUrlParams, stream_url};
use crate::stream::view::StreamView;
use crate::types::RoomId;

/// Requests a room's stream through the page's network and drives a [`StreamView`].
///
/// The request carries no header of its own. If it comes back 401 the token
/// mirror may be stale, so the loader pushes the stored token again and
/// retries once.
pub struct StreamLoader {
    api_host: Url,
    network: Arc<dyn Fetch>,
    session: Arc<AuthSession>,
    query_token: bool,
}

impl StreamLoader {
    pub fn new(api_host: Url, network: Arc<dyn Fetch>, session: Arc<AuthSession>) -> Self {
        Self {
            api_host,
            network,
            session,
            query_token: true,
        }
    }

    /// Whether to also put the token in the `token` query parameter.
    pub fn with_query_token(mut self, enabled: bool) -> Self {
        self.query_token = enabled;
        self
    }

    pub async fn open(
        &self,
        view: &mut StreamView,
        room_input: &str,
    ) -> Result<reqwest::Response, StreamError> {
        let Some(room) = view.show(room_input) else {
            return Err(StreamError::MissingRoom);
        };

        let mut response = match self.attempt(&room).await {
            Ok(response) => response,
            Err(err) => {
                view.failed();
                return Err(err);
            }
        };

        if response.status() == StatusCode::UNAUTHORIZED {
            let outcome = self.session.resync().await;
            info!(room = %room, ?outcome, "Stream rejected; resynchronised relay token");
            if outcome == SyncOutcome::Confirmed {
                response = match self.attempt(&room).await {
                    Ok(response) => response,
                    Err(err) => {
                        view.failed();
                        return Err(err);
                    }
                };
            }
        }

        if response.status().is_success() {
            debug!(room = %room, "Stream opened");
            view.loaded();
            Ok(response)
        } else {
            warn!(room = %room, status = %response.status(), "Stream request failed");
            view.failed();
            Err(StreamError::Rejected(response.status().as_u16()))
        }
    }

    async fn attempt(&self, room: &RoomId) -> Result<reqwest::Response, StreamError> {
        let token = if self.query_token {
            self.session.stored_token()?
        } else {
            None
        };
        let url = StreamUrlParams::now(token).apply(stream_url(&self.api_host, room)?);
        let request = OutboundRequest::get(url).with_transport(TransportOptions {
            mode: RequestMode::NoCors,
            ..Default::default()
        });
        Ok(self.network.fetch(request).await?)
    }
}
