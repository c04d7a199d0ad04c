use url::Url;
use std::{env, path::PathBuf};

use crate::relay::STREAM_PATH_PREFIX;

/// Backend origin used when `ATTENDANCE_API_BASE` is not set.
pub const DEFAULT_API_BASE: &str = "http://localhost:5000";
/// Where the relay listens by default.
pub const DEFAULT_RELAY_BIND: &str = "127.0.0.1:5173";
/// Largest request body the relay buffers for forwarding.
pub const DEFAULT_MAX_BODY_BYTES: usize = 16 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct RelayConfig {
    /// Backend origin every request is forwarded to.
    pub api_host: Url,
    pub bind: String,
    /// Path prefix whose requests get the bearer header.
    pub protected_prefix: String,
    pub max_body_bytes: usize,
}

impl RelayConfig {
    pub fn new(api_host: Url, bind: impl Into<String>) -> Self {
        Self {
            api_host,
            bind: bind.into(),
            protected_prefix: STREAM_PATH_PREFIX.to_string(),
            max_body_bytes: DEFAULT_MAX_BODY_BYTES,
        }
    }
}

/// Parse a backend origin. Only http(s) origins without query or fragment are accepted.
pub fn parse_api_host(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw.trim())?;
    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(anyhow::anyhow!(
            "API base `{}` must use http or https",
            raw
        ));
    }
    if url.query().is_some() || url.fragment().is_some() {
        return Err(anyhow::anyhow!(
            "API base `{}` must not carry a query or fragment",
            raw
        ));
    }
    Ok(url)
}

/// Locate the session storage file.
///
/// An explicit path wins (CLI flag or `ATTENDANCE_SESSION_PATH`), then
/// `$XDG_DATA_HOME/attendance-relay/session.json`, then `./session.json`.
pub fn resolve_session_path(explicit: Option<PathBuf>) -> PathBuf {
    if let Some(p) = explicit {
        return p;
    }

    if let Ok(xdg) = env::var("XDG_DATA_HOME")
        && !xdg.is_empty()
    {
        return PathBuf::from(xdg)
            .join("attendance-relay")
            .join("session.json");
    }

    PathBuf::from("session.json")
}
