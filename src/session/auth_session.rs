//! Page-context session: durable storage in, relay mirror out.

use std::sync::Arc;

use tokio::sync::{RwLock, watch};
use tracing::{debug, info, warn};

use crate::relay::{RelayController, RelayMessage, RelayPort};
use crate::session::storage::{DurableStorage, ROLE_KEY, StorageError, TOKEN_KEY};
use crate::session::user::{Role, Route, SessionUser};
use crate::types::{ClientId, SessionToken};

/// Result of pushing the token to the relay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOutcome {
    /// The relay echoed back the pushed value.
    Confirmed,
    /// Pushed, but delivery could not be confirmed.
    Unconfirmed,
    /// No relay controls this page; nothing was sent.
    Skipped,
}

/// The session as one page context sees it.
///
/// Durable storage is the source of truth. Every change is written there
/// first and then mirrored to the relay when one is reachable.
pub struct AuthSession {
    client_id: ClientId,
    storage: Arc<dyn DurableStorage>,
    relay: Arc<dyn RelayController>,
    user: RwLock<Option<SessionUser>>,
    navigation: watch::Sender<Route>,
}

impl AuthSession {
    /// Page load: restore the user from storage and push the stored token to
    /// the relay if one is already in control.
    pub async fn load(
        storage: Arc<dyn DurableStorage>,
        relay: Arc<dyn RelayController>,
    ) -> Result<Self, StorageError> {
        let user = Self::restore(storage.as_ref())?;
        let route = match &user {
            Some(user) => Route::Dashboard(user.role()),
            None => Route::Landing,
        };
        let (navigation, _) = watch::channel(route);
        let session = Self {
            client_id: ClientId::generate(),
            storage,
            relay,
            user: RwLock::new(user),
            navigation,
        };

        let outcome = session.resync().await;
        debug!(client = %session.client_id, ?outcome, "Session loaded");
        Ok(session)
    }

    /// Re-derive the user from storage. A token without a role restores as Admin.
    pub fn restore(storage: &dyn DurableStorage) -> Result<Option<SessionUser>, StorageError> {
        let Some(token) = storage.get_item(TOKEN_KEY)?.and_then(SessionToken::parse) else {
            return Ok(None);
        };
        let role = storage
            .get_item(ROLE_KEY)?
            .and_then(|r| r.parse::<Role>().ok())
            .unwrap_or(Role::Admin);
        Ok(Some(SessionUser::new(token, role)))
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub async fn user(&self) -> Option<SessionUser> {
        self.user.read().await.clone()
    }

    pub fn storage(&self) -> &Arc<dyn DurableStorage> {
        &self.storage
    }

    /// Token currently in durable storage.
    pub fn stored_token(&self) -> Result<Option<SessionToken>, StorageError> {
        Ok(self
            .storage
            .get_item(TOKEN_KEY)?
            .and_then(SessionToken::parse))
    }

    pub fn navigation(&self) -> watch::Receiver<Route> {
        self.navigation.subscribe()
    }

    pub fn current_route(&self) -> Route {
        *self.navigation.borrow()
    }

    /// Replace the whole session (or clear it with `None`), persist it, then
    /// mirror the token to the relay.
    pub async fn set_user(&self, user: Option<SessionUser>) -> Result<SyncOutcome, StorageError> {
        let token = user.as_ref().map(|u| u.token().clone());
        let role = user.as_ref().map(|u| u.role());

        match &token {
            Some(token) => self.storage.set_item(TOKEN_KEY, token.as_str())?,
            None => self.storage.remove_item(TOKEN_KEY)?,
        }
        match role {
            Some(role) => self.storage.set_item(ROLE_KEY, role.as_str())?,
            None => self.storage.remove_item(ROLE_KEY)?,
        }
        *self.user.write().await = user;

        Ok(self.push_token(token).await)
    }

    /// Sign in and land on the role's dashboard.
    pub async fn login(&self, user: SessionUser) -> Result<SyncOutcome, StorageError> {
        let role = user.role();
        let outcome = self.set_user(Some(user)).await?;
        info!(client = %self.client_id, role = %role, ?outcome, "Signed in");
        self.navigation.send_replace(Route::Dashboard(role));
        Ok(outcome)
    }

    pub async fn logout(&self) -> Result<SyncOutcome, StorageError> {
        let outcome = self.set_user(None).await?;
        info!(client = %self.client_id, ?outcome, "Signed out");
        self.navigation.send_replace(Route::Login);
        Ok(outcome)
    }

    /// The backend rejected the session: clear storage and go to login.
    ///
    /// The relay mirror is left as is; the next login, logout or page load
    /// overwrites it.
    pub async fn invalidate(&self) -> Result<(), StorageError> {
        self.storage.remove_item(TOKEN_KEY)?;
        self.storage.remove_item(ROLE_KEY)?;
        *self.user.write().await = None;
        warn!(client = %self.client_id, "Session rejected by backend; redirecting to login");
        self.navigation.send_replace(Route::Login);
        Ok(())
    }

    /// Push the stored token to the relay currently in control, if any.
    pub async fn resync(&self) -> SyncOutcome {
        match self.stored_token() {
            Ok(token) => self.push_token(token).await,
            Err(err) => {
                warn!(error = %err, "Could not read session storage for relay sync");
                SyncOutcome::Skipped
            }
        }
    }

    /// Wait for a relay to take control, then push the stored token.
    pub async fn resync_when_connected(&self) -> SyncOutcome {
        let Some(port) = self.relay.connected().await else {
            return SyncOutcome::Skipped;
        };
        match self.stored_token() {
            Ok(token) => deliver(port.as_ref(), token).await,
            Err(err) => {
                warn!(error = %err, "Could not read session storage for relay sync");
                SyncOutcome::Skipped
            }
        }
    }

    async fn push_token(&self, token: Option<SessionToken>) -> SyncOutcome {
        match self.relay.controller().await {
            Some(port) => deliver(port.as_ref(), token).await,
            None => {
                debug!("No relay in control; token push skipped");
                SyncOutcome::Skipped
            }
        }
    }
}

/// `SET_AUTH_TOKEN`, then confirm with `GET_AUTH_TOKEN` over the same ordered channel.
async fn deliver(port: &dyn RelayPort, token: Option<SessionToken>) -> SyncOutcome {
    if let Err(err) = port.post_message(RelayMessage::set_token(token.clone())).await {
        warn!(error = %err, "Token push to relay failed");
        return SyncOutcome::Unconfirmed;
    }
    match port.query_token().await {
        Ok(mirrored) if mirrored == token => SyncOutcome::Confirmed,
        Ok(_) => {
            warn!("Relay mirror differs from the pushed token");
            SyncOutcome::Unconfirmed
        }
        Err(err) => {
            warn!(error = %err, "Could not confirm token delivery");
            SyncOutcome::Unconfirmed
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relay::NoController;
    use crate::session::storage::MemoryStorage;

    async fn detached_session(storage: Arc<MemoryStorage>) -> AuthSession {
        AuthSession::load(storage, Arc::new(NoController)).await.unwrap()
    }

    #[tokio::test]
    async fn empty_storage_restores_no_user() {
        let session = detached_session(Arc::new(MemoryStorage::new())).await;
        assert!(session.user().await.is_none());
        assert_eq!(session.current_route(), Route::Landing);
    }

    #[tokio::test]
    async fn stored_token_without_role_restores_as_admin() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(TOKEN_KEY, "abc").unwrap();

        let session = detached_session(storage).await;
        let user = session.user().await.unwrap();
        assert_eq!(user.role(), Role::Admin);
        assert_eq!(user.token().as_str(), "abc");
        assert_eq!(session.current_route(), Route::Dashboard(Role::Admin));
    }

    #[tokio::test]
    async fn set_user_persists_and_skips_without_relay() {
        let storage = Arc::new(MemoryStorage::new());
        let session = detached_session(storage.clone()).await;

        let outcome = session
            .login(SessionUser::new(SessionToken::new("abc123"), Role::Teacher))
            .await
            .unwrap();
        assert_eq!(outcome, SyncOutcome::Skipped);
        assert_eq!(storage.get_item(TOKEN_KEY).unwrap().as_deref(), Some("abc123"));
        assert_eq!(storage.get_item(ROLE_KEY).unwrap().as_deref(), Some("Teacher"));
        assert_eq!(session.current_route(), Route::Dashboard(Role::Teacher));

        session.logout().await.unwrap();
        assert_eq!(storage.get_item(TOKEN_KEY).unwrap(), None);
        assert_eq!(storage.get_item(ROLE_KEY).unwrap(), None);
        assert!(session.user().await.is_none());
        assert_eq!(session.current_route(), Route::Login);
    }

    #[tokio::test]
    async fn invalidate_clears_storage_and_routes_to_login() {
        let storage = Arc::new(MemoryStorage::new());
        storage.set_item(TOKEN_KEY, "stale").unwrap();
        storage.set_item(ROLE_KEY, "Student").unwrap();
        let session = detached_session(storage.clone()).await;
        let mut navigation = session.navigation();

        session.invalidate().await.unwrap();
        navigation.changed().await.unwrap();
        assert_eq!(*navigation.borrow(), Route::Login);
        assert_eq!(storage.get_item(TOKEN_KEY).unwrap(), None);
        assert!(session.user().await.is_none());
    }

    #[tokio::test]
    async fn resync_when_connected_without_relay_support() {
        let session = detached_session(Arc::new(MemoryStorage::new())).await;
        assert_eq!(session.resync_when_connected().await, SyncOutcome::Skipped);
    }
}
