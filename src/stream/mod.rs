//! The admin live-stream page: URL builder, panel state, loader and room search.

mod builder;
mod loader;
mod rooms;
mod view;

use std::fmt;

use crate::relay::FetchError;
use crate::session::StorageError;

pub use loader::StreamLoader;
pub use rooms::{Camera, Room, filter_rooms};
pub use builder::{StreamUrlParams, stream_url};
pub use view::{ENTER_ROOM_MESSAGE, LOAD_FAILED_MESSAGE, StreamStatus, StreamView};

#[derive(Debug, Clone)]
pub enum StreamError {
    /// No room id was given.
    MissingRoom,
    InvalidUrl(String),
    /// The stream endpoint answered with a non-success status.
    Rejected(u16),
    Fetch(FetchError),
    Storage(StorageError),
}

impl fmt::Display for StreamError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingRoom => write!(f, "{}", ENTER_ROOM_MESSAGE),
            Self::InvalidUrl(msg) => write!(f, "Invalid stream URL: {}", msg),
            Self::Rejected(status) => write!(f, "Stream request failed with HTTP {}", status),
            Self::Fetch(err) => write!(f, "Stream request failed: {}", err),
            Self::Storage(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for StreamError {}

impl From<FetchError> for StreamError {
    fn from(err: FetchError) -> Self {
        Self::Fetch(err)
    }
}

impl From<StorageError> for StreamError {
    fn from(err: StorageError) -> Self {
        Self::Storage(err)
    }
}
