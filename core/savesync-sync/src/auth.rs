//! Credential ownership and change notification.
//!
//! The acquisition flow (device codes, browser redirects) lives outside this
//! crate. Whatever performs it hands the result to [`CredentialProvider::sign_in`];
//! the sync engine and the auto-sync scheduler only ever read.

use crate::error::{SyncError, SyncResult};
use savesync_storage::{keys, MetaStore};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// A bearer token. `Debug` never prints the secret.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessToken(String);

impl AccessToken {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    /// Returns the raw secret for use in an `Authorization` header.
    pub fn expose(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("AccessToken(***)")
    }
}

/// The signed-in account.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: u64,
    pub login: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub avatar_url: Option<String>,
}

/// Authentication state as seen by the sync layer.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credential {
    identity: Option<Identity>,
    token: Option<AccessToken>,
}

impl Credential {
    /// The signed-out state.
    pub fn anonymous() -> Self {
        Self::default()
    }

    pub fn authenticated(identity: Identity, token: AccessToken) -> Self {
        Self {
            identity: Some(identity),
            token: Some(token),
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.identity.is_some() && self.token.is_some()
    }

    pub fn identity(&self) -> Option<&Identity> {
        self.identity.as_ref()
    }

    pub fn token(&self) -> Option<&AccessToken> {
        self.token.as_ref()
    }
}

/// Holds the current [`Credential`] and broadcasts every change.
pub struct CredentialProvider {
    state: watch::Sender<Credential>,
    store: Option<Arc<dyn MetaStore>>,
}

impl CredentialProvider {
    /// Creates a provider that keeps the credential in memory only.
    pub fn new() -> Self {
        let (state, _) = watch::channel(Credential::anonymous());
        Self { state, store: None }
    }

    /// Creates a provider backed by `store`, restoring a previously saved credential.
    ///
    /// A stored credential that cannot be read is discarded and the provider
    /// starts signed out.
    pub fn restore(store: Arc<dyn MetaStore>) -> Self {
        let initial = match store.get(keys::CREDENTIAL) {
            Ok(Some(raw)) => match serde_json::from_str::<Credential>(&raw) {
                Ok(credential) if credential.is_authenticated() => credential,
                Ok(_) => Credential::anonymous(),
                Err(e) => {
                    warn!("Discarding unreadable stored credential: {e}");
                    if let Err(e) = store.remove(keys::CREDENTIAL) {
                        warn!("Failed to clear stored credential: {e}");
                    }
                    Credential::anonymous()
                }
            },
            Ok(None) => Credential::anonymous(),
            Err(e) => {
                warn!("Failed to read stored credential: {e}");
                Credential::anonymous()
            }
        };

        if let Some(identity) = initial.identity() {
            info!("Restored credential for {}", identity.login);
        }

        let (state, _) = watch::channel(initial);
        Self {
            state,
            store: Some(store),
        }
    }

    /// Returns a copy of the current credential.
    pub fn current(&self) -> Credential {
        self.state.borrow().clone()
    }

    pub fn is_authenticated(&self) -> bool {
        self.state.borrow().is_authenticated()
    }

    pub fn token(&self) -> Option<AccessToken> {
        self.state.borrow().token().cloned()
    }

    /// Returns a receiver that observes every future credential change.
    pub fn subscribe(&self) -> watch::Receiver<Credential> {
        self.state.subscribe()
    }

    /// Replaces the credential with an authenticated one and persists it.
    pub fn sign_in(&self, identity: Identity, token: AccessToken) -> SyncResult<()> {
        let credential = Credential::authenticated(identity, token);
        if let Some(store) = &self.store {
            let raw = serde_json::to_string(&credential)?;
            store.set(keys::CREDENTIAL, &raw).map_err(SyncError::from)?;
        }
        if let Some(identity) = credential.identity() {
            info!("Signed in as {}", identity.login);
        }
        self.state.send_replace(credential);
        Ok(())
    }

    /// Clears the credential. In-flight work keeps the token it already read.
    ///
    /// The in-memory credential is cleared even when removing the stored copy fails.
    pub fn sign_out(&self) -> SyncResult<()> {
        self.state.send_replace(Credential::anonymous());
        info!("Signed out");
        if let Some(store) = &self.store {
            store.remove(keys::CREDENTIAL).map_err(SyncError::from)?;
        }
        Ok(())
    }
}

impl Default for CredentialProvider {
    fn default() -> Self {
        Self::new()
    }
}
