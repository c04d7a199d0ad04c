//! Stream URL construction.

use url::Url;

use crate::relay::STREAM_PATH_PREFIX;
use crate::stream::StreamError;
use crate::types::{RoomId, SessionToken};

/// `<api_host>/api/admin/stream/<urlencoded room id>`.
///
/// The result is meant for a resource element's `src`, which is why the relay
/// has to add the bearer header later.
pub fn stream_url(api_host: &Url, room_id: &RoomId) -> Result<Url, StreamError> {
    let raw = format!(
        "{}{}{}",
        api_host.as_str().trim_end_matches('/'),
        STREAM_PATH_PREFIX,
        urlencoding::encode(room_id.as_str())
    );
    Url::parse(&raw).map_err(|e| StreamError::InvalidUrl(e.to_string()))
}

/// Query parameters appended by callers: a cache-busting timestamp and,
/// optionally, the token itself.
#[derive(Debug, Clone)]
pub struct StreamUrlParams {
    pub timestamp_ms: i64,
    pub token: Option<SessionToken>,
}

impl StreamUrlParams {
    pub fn now(token: Option<SessionToken>) -> Self {
        Self {
            timestamp_ms: chrono::Utc::now().timestamp_millis(),
            token,
        }
    }

    pub fn apply(&self, mut url: Url) -> Url {
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("t", &self.timestamp_ms.to_string());
            if let Some(token) = &self.token {
                query.append_pair("token", token.as_str());
            }
        }
        url
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn host() -> Url {
        Url::parse("http://localhost:5000").unwrap()
    }

    #[test]
    fn builds_stream_path() {
        let url = stream_url(&host(), &RoomId::new("room42")).unwrap();
        assert_eq!(url.as_str(), "http://localhost:5000/api/admin/stream/room42");
    }

    #[test]
    fn encodes_room_id() {
        let url = stream_url(&host(), &RoomId::new("lab 2/b?x")).unwrap();
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/admin/stream/lab%202%2Fb%3Fx"
        );
        assert!(url.query().is_none());
    }

    #[test]
    fn trailing_slash_on_host_is_tolerated() {
        let host = Url::parse("https://api.example.com/").unwrap();
        let url = stream_url(&host, &RoomId::new("r1")).unwrap();
        assert_eq!(url.as_str(), "https://api.example.com/api/admin/stream/r1");
    }

    #[test]
    fn params_append_timestamp_and_token() {
        let base = stream_url(&host(), &RoomId::new("room42")).unwrap();
        let url = StreamUrlParams {
            timestamp_ms: 1000,
            token: Some(SessionToken::new("abc123")),
        }
        .apply(base.clone());
        assert_eq!(
            url.as_str(),
            "http://localhost:5000/api/admin/stream/room42?t=1000&token=abc123"
        );

        let url = StreamUrlParams {
            timestamp_ms: 1000,
            token: None,
        }
        .apply(base);
        assert_eq!(url.query(), Some("t=1000"));
    }
}
