use crate::github::UserIdentity;
use crate::store::{KeyValueStore, StoreError};
use std::sync::Arc;
use tokio::sync::watch;

pub const TOKEN_KEY: &str = "gh_token";

/// What the rest of the app knows about the signed-in user.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Credential {
    pub token: Option<String>,
    /// Only set once `token` has been validated against the identity endpoint
    pub user: Option<UserIdentity>,
}

impl Credential {
    pub fn is_authenticated(&self) -> bool {
        self.token.is_some()
    }
}

/// Credential store. Every mutation writes the durable copy first, so the
/// persisted token always equals the in-memory one (or is absent).
pub struct Session {
    store: Arc<dyn KeyValueStore>,
    state: watch::Sender<Credential>,
}

impl Session {
    /// Restore the persisted token. The user stays unknown until validated.
    pub fn load(store: Arc<dyn KeyValueStore>) -> Result<Self, StoreError> {
        let token = store.get(TOKEN_KEY)?;
        let (state, _) = watch::channel(Credential { token, user: None });
        Ok(Self { store, state })
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn token(&self) -> Option<String> {
        self.state.borrow().token.clone()
    }

    pub fn user(&self) -> Option<UserIdentity> {
        self.state.borrow().user.clone()
    }

    pub fn credential(&self) -> Credential {
        self.state.borrow().clone()
    }

    /// Receive every credential change
    pub fn subscribe(&self) -> watch::Receiver<Credential> {
        self.state.subscribe()
    }

    /// Store an unvalidated token. Any previously known user is dropped.
    pub fn set(&self, token: &str) -> Result<(), StoreError> {
        self.store.set(TOKEN_KEY, token)?;
        self.state.send_replace(Credential {
            token: Some(token.to_string()),
            user: None,
        });
        Ok(())
    }

    /// Store a token together with the identity it was validated against.
    pub fn authenticate(&self, token: &str, user: UserIdentity) -> Result<(), StoreError> {
        self.store.set(TOKEN_KEY, token)?;
        self.state.send_replace(Credential {
            token: Some(token.to_string()),
            user: Some(user),
        });
        Ok(())
    }

    pub fn clear(&self) -> Result<(), StoreError> {
        self.store.remove(TOKEN_KEY)?;
        self.state.send_if_modified(|current| {
            if current.token.is_none() && current.user.is_none() {
                false
            } else {
                *current = Credential::default();
                true
            }
        });
        Ok(())
    }
}
