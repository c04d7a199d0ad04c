//! Client for the attendance backend REST API.
//!
//! Every call carries the stored token as a bearer header. A 401 from any
//! endpoint means the session is gone: storage is cleared and the session
//! routes to login.

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use reqwest::{Client, StatusCode, Url};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use tracing::debug;

use crate::session::{AuthSession, StorageError};
use crate::stream::Room;

#[derive(Debug, Clone)]
pub enum ApiError {
    /// The backend rejected the session; it has been cleared locally.
    SessionExpired,
    /// Non-success status with the backend's message, if it sent one.
    Http { status: u16, message: String },
    Transport(String),
    Decode(String),
    InvalidUrl(String),
    Storage(StorageError),
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SessionExpired => write!(f, "Session expired, please sign in again"),
            Self::Http { status, message } => write!(f, "HTTP {}: {}", status, message),
            Self::Transport(msg) => write!(f, "Request failed: {}", msg),
            Self::Decode(msg) => write!(f, "Unexpected response: {}", msg),
            Self::InvalidUrl(msg) => write!(f, "Invalid URL: {}", msg),
            Self::Storage(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}

#[derive(Deserialize)]
struct ErrorBody {
    message: Option<String>,
}

#[derive(Deserialize)]
struct RoomsBody {
    #[serde(default)]
    rooms: Vec<Room>,
}

pub struct ApiClient {
    client: Client,
    base: Url,
    session: Arc<AuthSession>,
}

impl ApiClient {
    /// `api_host` is the backend origin; calls go to `<api_host>/api/...`.
    pub fn new(api_host: &Url, session: Arc<AuthSession>) -> Result<Self, ApiError> {
        let base = Url::parse(&format!(
            "{}/api/",
            api_host.as_str().trim_end_matches('/')
        ))
        .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        let client = Client::builder()
            .timeout(Duration::from_secs(30))
            .build()
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        Ok(Self {
            client,
            base,
            session,
        })
    }

    /// Rooms visible to the signed-in admin.
    pub async fn list_rooms(&self) -> Result<Vec<Room>, ApiError> {
        let body: RoomsBody = self.get_json("admin/rooms").await?;
        Ok(body.rooms)
    }

    async fn get_json<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        let url = self
            .base
            .join(path)
            .map_err(|e| ApiError::InvalidUrl(e.to_string()))?;
        let mut request = self.client.get(url);
        if let Some(token) = self.session.stored_token()? {
            request = request.bearer_auth(token.as_str());
        }

        let response = request
            .send()
            .await
            .map_err(|e| ApiError::Transport(e.to_string()))?;
        let response = self.check(response).await?;
        response
            .json()
            .await
            .map_err(|e| ApiError::Decode(e.to_string()))
    }

    async fn check(&self, response: reqwest::Response) -> Result<reqwest::Response, ApiError> {
        let status = response.status();
        if status == StatusCode::UNAUTHORIZED {
            self.session.invalidate().await?;
            return Err(ApiError::SessionExpired);
        }
        if status.is_success() {
            return Ok(response);
        }

        let message = response
            .json::<ErrorBody>()
            .await
            .ok()
            .and_then(|b| b.message)
            .unwrap_or_else(|| status.canonical_reason().unwrap_or("error").to_string());
        debug!(status = %status, message = %message, "Backend call failed");
        Err(ApiError::Http {
            status: status.as_u16(),
            message,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::NoController;
    use crate::session::{DurableStorage, MemoryStorage, Role, Route, SessionUser, TOKEN_KEY};
    use crate::types::SessionToken;
    use axum::http::HeaderMap;
    use axum::{Json, Router, routing::get};

    async fn rooms(headers: HeaderMap) -> Result<Json<serde_json::Value>, StatusCode> {
        match headers.get("authorization").and_then(|v| v.to_str().ok()) {
            Some("Bearer good") => Ok(Json(serde_json::json!({
                "rooms": [{"_id": "r1", "name": "Lab", "cameras": [{"cameraId": "C1"}]}]
            }))),
            _ => Err(StatusCode::UNAUTHORIZED),
        }
    }

    async fn start_backend() -> Url {
        let app = Router::new()
            .route("/api/admin/rooms", get(rooms))
            .route(
                "/api/admin/broken",
                get(|| async {
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        Json(serde_json::json!({"message": "camera offline"})),
                    )
                }),
            );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        Url::parse(&format!("http://{}", addr)).unwrap()
    }

    async fn session_with(token: &str) -> (Arc<AuthSession>, Arc<MemoryStorage>) {
        let storage = Arc::new(MemoryStorage::new());
        let session = AuthSession::load(storage.clone(), Arc::new(NoController))
            .await
            .unwrap();
        session
            .login(SessionUser::new(SessionToken::new(token), Role::Admin))
            .await
            .unwrap();
        (Arc::new(session), storage)
    }

    #[tokio::test]
    async fn list_rooms_sends_bearer() {
        let host = start_backend().await;
        let (session, _) = session_with("good").await;
        let client = ApiClient::new(&host, session).unwrap();

        let rooms = client.list_rooms().await.unwrap();
        assert_eq!(rooms.len(), 1);
        assert_eq!(rooms[0].first_camera(), Some("C1"));
    }

    #[tokio::test]
    async fn unauthorized_clears_session() {
        let host = start_backend().await;
        let (session, storage) = session_with("expired").await;
        let client = ApiClient::new(&host, session.clone()).unwrap();

        let err = client.list_rooms().await.unwrap_err();
        assert!(matches!(err, ApiError::SessionExpired));
        assert_eq!(storage.get_item(TOKEN_KEY).unwrap(), None);
        assert_eq!(session.current_route(), Route::Login);
    }

    #[tokio::test]
    async fn backend_message_is_surfaced() {
        let host = start_backend().await;
        let (session, _) = session_with("good").await;
        let client = ApiClient::new(&host, session).unwrap();

        let err = client
            .get_json::<serde_json::Value>("admin/broken")
            .await
            .unwrap_err();
        match err {
            ApiError::Http { status, message } => {
                assert_eq!(status, 500);
                assert_eq!(message, "camera offline");
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
