//! Error types for the relay worker.

use std::fmt;

/// Errors raised while rewriting or dispatching a protected request, or while
/// talking to a relay over its message channel.
#[derive(Debug, Clone)]
pub enum RelayError {
    /// The request method cannot be reissued (CONNECT, TRACE, TRACK).
    ForbiddenMethod(String),
    /// The request body is a one-shot stream and cannot be duplicated.
    BodyNotReplayable,
    /// The mirrored token is not a valid header value.
    InvalidHeader(String),
    /// A URL could not be parsed or joined.
    InvalidUrl(String),
    /// The worker is gone (redundant or shut down).
    WorkerUnavailable,
    /// The remote relay answered with something unexpected.
    Transport(String),
}

impl fmt::Display for RelayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ForbiddenMethod(method) => write!(f, "Method cannot be reissued: {}", method),
            Self::BodyNotReplayable => write!(f, "Request body cannot be duplicated"),
            Self::InvalidHeader(msg) => write!(f, "Invalid header value: {}", msg),
            Self::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            Self::WorkerUnavailable => write!(f, "Relay worker is not running"),
            Self::Transport(msg) => write!(f, "Relay transport error: {}", msg),
        }
    }
}

impl std::error::Error for RelayError {}

/// Errors from the network layer beneath the relay.
#[derive(Debug, Clone)]
pub enum FetchError {
    /// Connection, TLS or protocol failure.
    Network(String),
    /// A redirect was returned while the request's policy forbids following one.
    RedirectRejected(u16),
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Network(msg) => write!(f, "Network error: {}", msg),
            Self::RedirectRejected(status) => {
                write!(f, "Redirect ({}) rejected by request policy", status)
            }
        }
    }
}

impl std::error::Error for FetchError {}

impl From<reqwest::Error> for FetchError {
    fn from(err: reqwest::Error) -> Self {
        // The URL may carry a token in its query.
        Self::Network(err.without_url().to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn relay_error_display() {
        assert_eq!(
            RelayError::ForbiddenMethod("TRACE".to_string()).to_string(),
            "Method cannot be reissued: TRACE"
        );
        assert_eq!(
            RelayError::BodyNotReplayable.to_string(),
            "Request body cannot be duplicated"
        );
        assert_eq!(
            RelayError::WorkerUnavailable.to_string(),
            "Relay worker is not running"
        );
    }

    #[test]
    fn fetch_error_display() {
        assert_eq!(
            FetchError::RedirectRejected(302).to_string(),
            "Redirect (302) rejected by request policy"
        );
    }
}
