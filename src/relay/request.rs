//! Outbound requests as seen by the relay.
//!
//! An [`OutboundRequest`] is a `reqwest::Request` plus the transport
//! attributes a browser request carries (mode, credentials, cache, redirect,
//! referrer, integrity). The relay never mutates a request in place: a
//! protected request is rewritten by building an authorized duplicate, so the
//! original stays intact for the fallback path.

use http::header::{AUTHORIZATION, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use reqwest::{Body, Url};

use crate::relay::error::RelayError;
use crate::types::SessionToken;

/// Request mode, mirroring the `Sec-Fetch-Mode` vocabulary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RequestMode {
    #[default]
    Cors,
    NoCors,
    SameOrigin,
    Navigate,
}

impl RequestMode {
    /// Parse a `Sec-Fetch-Mode` header value.
    pub fn from_sec_fetch_mode(value: &str) -> Option<Self> {
        match value {
            "cors" => Some(Self::Cors),
            "no-cors" => Some(Self::NoCors),
            "same-origin" => Some(Self::SameOrigin),
            "navigate" => Some(Self::Navigate),
            _ => None,
        }
    }
}

/// Whether cookies and similar ambient credentials travel with the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CredentialsMode {
    Omit,
    #[default]
    SameOrigin,
    Include,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CacheMode {
    #[default]
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RedirectMode {
    #[default]
    Follow,
    Error,
    Manual,
}

/// Transport attributes copied verbatim onto an authorized duplicate.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct TransportOptions {
    pub mode: RequestMode,
    pub credentials: CredentialsMode,
    pub cache: CacheMode,
    pub redirect: RedirectMode,
    pub referrer: Option<String>,
    pub integrity: Option<String>,
}

/// Methods a request cannot be reconstructed with.
const FORBIDDEN_METHODS: [&str; 3] = ["CONNECT", "TRACE", "TRACK"];

/// A network request on its way out, before the relay decides what to do with it.
#[derive(Debug)]
pub struct OutboundRequest {
    inner: reqwest::Request,
    transport: TransportOptions,
}

impl OutboundRequest {
    pub fn new(method: Method, url: Url) -> Self {
        Self {
            inner: reqwest::Request::new(method, url),
            transport: TransportOptions::default(),
        }
    }

    /// Build a request from a raw URL string.
    pub fn parse(method: Method, url: &str) -> Result<Self, RelayError> {
        let url = Url::parse(url).map_err(|e| RelayError::InvalidUrl(e.to_string()))?;
        Ok(Self::new(method, url))
    }

    /// Shorthand for a `GET` of `url`, the way a resource element loads its `src`.
    pub fn get(url: Url) -> Self {
        Self::new(Method::GET, url)
    }

    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.inner.headers_mut().insert(name, value);
        self
    }

    pub fn with_headers(mut self, headers: HeaderMap) -> Self {
        *self.inner.headers_mut() = headers;
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        *self.inner.body_mut() = Some(body.into());
        self
    }

    pub fn with_transport(mut self, transport: TransportOptions) -> Self {
        self.transport = transport;
        self
    }

    pub fn method(&self) -> &Method {
        self.inner.method()
    }

    pub fn url(&self) -> &Url {
        self.inner.url()
    }

    pub fn headers(&self) -> &HeaderMap {
        self.inner.headers()
    }

    pub fn transport(&self) -> &TransportOptions {
        &self.transport
    }

    /// Bytes of a buffered body. `None` when there is no body or it is a stream.
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.inner.body().and_then(|b| b.as_bytes())
    }

    pub fn has_authorization(&self) -> bool {
        self.inner.headers().contains_key(AUTHORIZATION)
    }

    /// Whether the URL path falls under `prefix`.
    pub fn path_starts_with(&self, prefix: &str) -> bool {
        self.inner.url().path().starts_with(prefix)
    }

    /// Duplicate the request, body included. Streaming bodies cannot be duplicated.
    pub fn try_clone(&self) -> Option<Self> {
        Some(Self {
            inner: self.inner.try_clone()?,
            transport: self.transport.clone(),
        })
    }

    /// Build a duplicate carrying `Authorization: Bearer <token>`.
    ///
    /// The original is left untouched so it can still be dispatched if this fails.
    pub fn authorized(&self, token: &SessionToken) -> Result<Self, RelayError> {
        let method = self.inner.method().as_str();
        if FORBIDDEN_METHODS
            .iter()
            .any(|m| m.eq_ignore_ascii_case(method))
        {
            return Err(RelayError::ForbiddenMethod(method.to_string()));
        }

        let value = HeaderValue::from_str(&token.bearer())
            .map_err(|e| RelayError::InvalidHeader(e.to_string()))?;

        let mut duplicate = self.try_clone().ok_or(RelayError::BodyNotReplayable)?;
        duplicate.inner.headers_mut().insert(AUTHORIZATION, value);
        Ok(duplicate)
    }

    pub fn into_parts(self) -> (reqwest::Request, TransportOptions) {
        (self.inner, self.transport)
    }
}
