//! Page-context session handling.
//!
//! Owns the signed-in user, persists it in durable storage, and keeps the
//! relay's token mirror in step with it. Login, logout and page load each push
//! the current token; a backend 401 clears storage and routes to login.

mod auth_session;
mod storage;
mod user;

pub use auth_session::{AuthSession, SyncOutcome};
pub use storage::{DurableStorage, FileStorage, MemoryStorage, ROLE_KEY, StorageError, TOKEN_KEY};
pub use user::{Role, Route, SessionUser};
