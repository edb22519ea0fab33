//! Session lifecycle on top of [`LocalStore`]: login, logout, and
//! queries over the persisted token/profile pair.
//!
//! Invariant maintained here: storage holds a token if and only if it
//! holds a user profile. Readers repair any drift (corrupt or lone
//! values) by treating the session as signed out and removing the
//! leftovers.

use std::sync::Arc;

use tracing::warn;
use vizor_protocol::Session;
use vizor_protocol::UserProfile;

use crate::client::ApiClient;
use crate::client::AuthError;
use crate::storage::keys;
use crate::storage::LocalStore;
use crate::storage::StorageError;

#[derive(Debug, Clone)]
pub struct SessionStore {
    store: Arc<LocalStore>,
    client: Arc<ApiClient>,
}

impl SessionStore {
    pub fn new(store: Arc<LocalStore>, client: Arc<ApiClient>) -> Self {
        Self { store, client }
    }

    /// Authenticate against the service and persist the session.
    ///
    /// Nothing is written unless the server accepted the credentials, so
    /// a failed login leaves any prior signed-out state untouched.
    pub async fn login(&self, login: &str, password: &str) -> Result<Session, AuthError> {
        let token = self.client.login(login, password).await?;
        let user = placeholder_profile(login);
        let user_json = serde_json::to_string(&user).map_err(StorageError::from)?;
        self.store.set(keys::AUTH_TOKEN, &token)?;
        self.store.set(keys::USER, &user_json)?;
        Ok(Session { token, user })
    }

    /// End the session. The server-side token invalidation is
    /// best-effort; local state is cleared regardless of its outcome.
    pub async fn logout(&self) -> Result<(), AuthError> {
        match self.store.get(keys::AUTH_TOKEN) {
            Ok(Some(token)) => {
                if let Err(err) = self.client.logout(&token).await {
                    warn!("server-side logout failed, clearing local session anyway: {err}");
                }
            }
            Ok(None) => {}
            Err(err) => {
                warn!("could not read stored token during logout: {err}");
            }
        }
        Ok(self.clear_local()?)
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self.token(), Ok(Some(_)))
    }

    /// Stored bearer token, if any. Empty tokens read as absent.
    pub fn token(&self) -> Result<Option<String>, StorageError> {
        Ok(self
            .store
            .get(keys::AUTH_TOKEN)?
            .filter(|token| !token.is_empty()))
    }

    /// Stored profile, if any. A corrupt record reads as signed out and
    /// is removed along with the token.
    pub fn current_user(&self) -> Result<Option<UserProfile>, StorageError> {
        let Some(raw) = self.store.get(keys::USER)? else {
            return Ok(None);
        };
        match serde_json::from_str(&raw) {
            Ok(user) => Ok(Some(user)),
            Err(err) => {
                warn!("stored user profile is corrupt, clearing session: {err}");
                self.clear_local()?;
                Ok(None)
            }
        }
    }

    /// The full session, or `None` when signed out. A token without a
    /// profile (or the reverse) is repaired to signed out.
    pub fn current(&self) -> Result<Option<Session>, StorageError> {
        let token = self.token()?;
        let user = self.current_user()?;
        match (token, user) {
            (Some(token), Some(user)) => Ok(Some(Session { token, user })),
            (None, None) => Ok(None),
            _ => {
                warn!("incoherent session state in storage, clearing");
                self.clear_local()?;
                Ok(None)
            }
        }
    }

    fn clear_local(&self) -> Result<(), StorageError> {
        self.store.remove(keys::AUTH_TOKEN)?;
        self.store.remove(keys::USER)?;
        Ok(())
    }
}

/// The login endpoint returns only a token, so the profile is
/// synthesized locally with the login as the email.
fn placeholder_profile(login: &str) -> UserProfile {
    UserProfile {
        id: "1".to_string(),
        name: "Vizor User".to_string(),
        email: login.to_string(),
        plan: "Starter Plan".to_string(),
    }
}
