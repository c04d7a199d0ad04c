// Core modules
mod config;
mod types;
pub mod api;
pub mod backend;
pub mod relay;
pub mod server;
pub mod session;
pub mod stream;

// Re-export key types and functions
pub use backend::{ApiClient, ApiError};
pub use config::{
    DEFAULT_API_BASE, DEFAULT_MAX_BODY_BYTES, DEFAULT_RELAY_BIND, RelayConfig, parse_api_host,
    resolve_session_path,
};
pub use relay::{
    InterceptingFetcher, LocalController, RelayController, RelayHandle, RelayMessage,
    RelayRegistry, RemoteRelay, ReqwestFetcher, STREAM_PATH_PREFIX,
};
pub use server::{create_relay, start_relay_http};
pub use session::{AuthSession, FileStorage, Role, SessionUser, SyncOutcome};
pub use stream::{StreamLoader, StreamView, stream_url};
pub use types::{ClientId, RoomId, SessionToken, WorkerVersion};

use std::sync::Arc;

/// Convenience function to open a page-context session in the same process
/// as a relay registry.
///
/// Restores the user from `storage` and pushes the stored token to the
/// registry's active worker, if one is installed.
pub async fn open_local_session(
    registry: &RelayRegistry,
    storage: Arc<dyn session::DurableStorage>,
) -> Result<Arc<AuthSession>, session::StorageError> {
    let controller = Arc::new(LocalController::new(registry.subscribe()));
    let session = AuthSession::load(storage, controller).await?;
    Ok(Arc::new(session))
}
