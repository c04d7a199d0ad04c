//! The network beneath the relay.

use std::time::Duration;

use async_trait::async_trait;
use http::HeaderValue;
use http::header::{CACHE_CONTROL, COOKIE, REFERER};
use reqwest::Client;
use reqwest::redirect::Policy;
use tracing::debug;

use crate::relay::error::FetchError;
use crate::relay::request::{CacheMode, CredentialsMode, OutboundRequest, RedirectMode};

/// Something that can put an [`OutboundRequest`] on the wire.
#[async_trait]
pub trait Fetch: Send + Sync {
    async fn fetch(&self, request: OutboundRequest) -> Result<reqwest::Response, FetchError>;
}

/// `reqwest`-backed network honouring the request's transport attributes.
///
/// Subresource integrity is carried on the request but not enforced; stream
/// bodies are never complete enough to hash.
#[derive(Clone)]
pub struct ReqwestFetcher {
    following: Client,
    not_following: Client,
}

impl ReqwestFetcher {
    pub fn new() -> Result<Self, FetchError> {
        // No overall timeout: an MJPEG response never finishes.
        let client = |redirect: Policy| {
            Client::builder()
                .connect_timeout(Duration::from_secs(10))
                .user_agent(concat!("attendance-relay/", env!("CARGO_PKG_VERSION")))
                .redirect(redirect)
                .build()
        };
        Ok(Self {
            following: client(Policy::default())?,
            not_following: client(Policy::none())?,
        })
    }
}

#[async_trait]
impl Fetch for ReqwestFetcher {
    async fn fetch(&self, request: OutboundRequest) -> Result<reqwest::Response, FetchError> {
        let (mut request, transport) = request.into_parts();

        let headers = request.headers_mut();
        if let Some(referrer) = &transport.referrer
            && !headers.contains_key(REFERER)
            && let Ok(value) = HeaderValue::from_str(referrer)
        {
            headers.insert(REFERER, value);
        }
        if !headers.contains_key(CACHE_CONTROL) {
            match transport.cache {
                CacheMode::NoStore => {
                    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));
                }
                CacheMode::Reload | CacheMode::NoCache => {
                    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-cache"));
                }
                _ => {}
            }
        }
        if transport.credentials == CredentialsMode::Omit {
            headers.remove(COOKIE);
        }

        debug!(
            method = %request.method(),
            path = %request.url().path(),
            "Dispatching outbound request"
        );

        let client = match transport.redirect {
            RedirectMode::Follow => &self.following,
            RedirectMode::Error | RedirectMode::Manual => &self.not_following,
        };
        let response = client.execute(request).await?;

        if transport.redirect == RedirectMode::Error && response.status().is_redirection() {
            return Err(FetchError::RedirectRejected(response.status().as_u16()));
        }

        Ok(response)
    }
}

#[cfg(test)]
pub(crate) mod testing {
    //! A fake network recording every request it is handed.

    use std::sync::Mutex;

    use http::{HeaderMap, Method, StatusCode};

    use super::*;
    use crate::relay::request::TransportOptions;

    /// What the fake network saw.
    #[derive(Debug, Clone)]
    pub struct RecordedRequest {
        pub method: Method,
        pub url: String,
        pub headers: HeaderMap,
        pub body: Option<Vec<u8>>,
        pub streaming_body: bool,
        pub transport: TransportOptions,
    }

    impl RecordedRequest {
        pub fn authorization(&self) -> Option<&str> {
            self.headers
                .get(http::header::AUTHORIZATION)
                .and_then(|v| v.to_str().ok())
        }
    }

    /// Answers 200, or 401 when `require_bearer` is set and the expected
    /// bearer header is missing.
    #[derive(Default)]
    pub struct RecordingFetch {
        seen: Mutex<Vec<RecordedRequest>>,
        require_bearer: Option<String>,
    }

    impl RecordingFetch {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn requiring(token: &str) -> Self {
            Self {
                seen: Mutex::new(Vec::new()),
                require_bearer: Some(format!("Bearer {}", token)),
            }
        }

        pub fn seen(&self) -> Vec<RecordedRequest> {
            self.seen.lock().unwrap().clone()
        }

        pub fn last(&self) -> RecordedRequest {
            self.seen().last().cloned().expect("no request recorded")
        }
    }

    #[async_trait]
    impl Fetch for RecordingFetch {
        async fn fetch(&self, request: OutboundRequest) -> Result<reqwest::Response, FetchError> {
            let recorded = RecordedRequest {
                method: request.method().clone(),
                url: request.url().to_string(),
                headers: request.headers().clone(),
                body: request.body_bytes().map(|b| b.to_vec()),
                streaming_body: request.body_bytes().is_none()
                    && request.try_clone().is_none(),
                transport: request.transport().clone(),
            };
            let authorized = match &self.require_bearer {
                Some(expected) => recorded.authorization() == Some(expected.as_str()),
                None => true,
            };
            self.seen.lock().unwrap().push(recorded);

            let status = if authorized {
                StatusCode::OK
            } else {
                StatusCode::UNAUTHORIZED
            };
            let response = http::Response::builder()
                .status(status)
                .header(http::header::CONTENT_TYPE, "multipart/x-mixed-replace")
                .body("frame")
                .unwrap();
            Ok(reqwest::Response::from(response))
        }
    }
}
