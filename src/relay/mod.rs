//! Authenticated-stream access-token relay.
//!
//! Resource loads such as an `<img src>` pointing at a live stream cannot
//! carry an `Authorization` header. The relay sits between clients and the
//! network and adds one, using a mirror of the session token that page
//! contexts push to it.
//!
//! - **Worker**: an actor owning the token mirror. It starts empty and only
//!   changes on `SET_AUTH_TOKEN`. `GET_AUTH_TOKEN` answers over a reply port.
//! - **Interception**: requests under [`STREAM_PATH_PREFIX`] get a bearer
//!   header unless they already carry one. Everything else is handed back
//!   untouched. If building the authorized duplicate fails the original is
//!   dispatched instead, and a warning is logged.
//! - **Lifecycle**: [`RelayRegistry`] installs versions, skips waiting and
//!   claims clients at activation, stopping the superseded version.
//!
//! ## Usage
//!
//! ```ignore
//! let registry = RelayRegistry::new(Arc::new(ReqwestFetcher::new()?));
//! let relay = registry.register().await;
//! relay.post_message(RelayMessage::set_token(Some(token)))?;
//!
//! let network = InterceptingFetcher::new(registry.subscribe(), raw_network);
//! let response = network.fetch(OutboundRequest::get(stream_url)).await?;
//! ```

mod error;
mod fetch;
mod intercept;
mod lifecycle;
mod message;
mod port;
mod request;
mod worker;


pub use error::{FetchError, RelayError};
pub use fetch::{Fetch, ReqwestFetcher};
pub use intercept::InterceptingFetcher;
pub use lifecycle::{RelayRegistry, WorkerState};
pub use message::{RelayMessage, TokenReply};
pub use port::{
    DEFAULT_CONNECT_WAIT, LocalController, NoController, RelayController, RelayPort, RemoteRelay,
};
pub use request::{
    CacheMode, CredentialsMode, OutboundRequest, RedirectMode, RequestMode, TransportOptions,
};
pub use worker::{FetchOutcome, RelayHandle, STREAM_PATH_PREFIX};

#[cfg(test)]
pub(crate) use fetch::testing;
