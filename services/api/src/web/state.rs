//! services/api/src/web/state.rs
//!
//! Defines the application's shared state and the per-login auth sessions.

use crate::adapters::PocketBaseAdapter;
use crate::config::{Config, StoreBackend};
use crate::error::ApiError;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};
use training_core::{
    domain::User,
    ports::{AuthService, RecordStore},
    AuthState, ClubDirectory, MemoryRecordStore, SessionComposer,
};
use uuid::Uuid;

//=========================================================================================
// AppState (Shared Across All Connections)
//=========================================================================================

#[derive(Clone)]
enum Backend {
    Memory(Arc<MemoryRecordStore>),
    Remote(PocketBaseAdapter),
}

/// The shared application state, created once at startup and passed to all handlers.
///
/// Nothing in here belongs to a single coach. Every login opens its own entry in
/// `sessions`, and the store requests of a request are made under that entry only.
#[derive(Clone)]
pub struct AppState {
    backend: Backend,
    pub auth_service: Arc<dyn AuthService>,
    pub sessions: SessionRegistry,
    pub config: Arc<Config>,
}

impl AppState {
    /// A state backed by a fresh in-process store.
    pub fn in_memory(config: Arc<Config>) -> Self {
        let store = Arc::new(MemoryRecordStore::new());
        Self {
            backend: Backend::Memory(store.clone()),
            auth_service: store,
            sessions: SessionRegistry::default(),
            config,
        }
    }

    /// Builds the state for the store backend named in the configuration.
    pub fn from_config(config: Arc<Config>) -> Result<Self, ApiError> {
        match &config.store {
            StoreBackend::Memory => {
                info!("Using the in-memory record store");
                Ok(Self::in_memory(config))
            }
            StoreBackend::Remote(url) => {
                info!("Using the record store at {}", url);
                let adapter = PocketBaseAdapter::new(url, AuthState::new(), config.store_timeout)?;
                Ok(Self {
                    auth_service: Arc::new(adapter.clone()),
                    backend: Backend::Remote(adapter),
                    sessions: SessionRegistry::default(),
                    config,
                })
            }
        }
    }

    /// The record store, acting under `auth`.
    pub fn store_for(&self, auth: &AuthState) -> Arc<dyn RecordStore> {
        match &self.backend {
            Backend::Memory(store) => store.clone(),
            Backend::Remote(adapter) => Arc::new(adapter.with_auth(auth.clone())),
        }
    }

    /// The record store with no one signed in.
    pub fn store(&self) -> Arc<dyn RecordStore> {
        self.store_for(&AuthState::new())
    }

    /// A directory for the public endpoints, such as registration.
    pub fn anonymous_directory(&self) -> ClubDirectory {
        ClubDirectory::new(self.store(), AuthState::new())
    }

    /// The workflows of one request, bound to its auth session.
    ///
    /// Returns `None` if nobody is signed in on `auth`.
    pub fn signed_in(&self, session_id: String, auth: AuthState) -> Option<SignedIn> {
        let user = auth.current_user()?;
        let store = self.store_for(&auth);
        Some(SignedIn {
            session_id,
            user,
            composer: SessionComposer::new(store.clone(), auth.clone()),
            directory: ClubDirectory::new(store.clone(), auth),
            store,
        })
    }
}

//=========================================================================================
// SignedIn (Per Request)
//=========================================================================================

/// Inserted into the request extensions by `require_auth`.
#[derive(Clone)]
pub struct SignedIn {
    pub session_id: String,
    pub user: User,
    pub store: Arc<dyn RecordStore>,
    pub composer: SessionComposer,
    pub directory: ClubDirectory,
}

//=========================================================================================
// SessionRegistry (One AuthState per Login)
//=========================================================================================

/// Maps session cookie ids to the auth session opened by that login.
#[derive(Clone, Default)]
pub struct SessionRegistry {
    sessions: Arc<RwLock<HashMap<String, AuthState>>>,
}

impl SessionRegistry {
    /// Registers a signed-in auth state under a fresh random id.
    ///
    /// Expired sessions are swept out on the way.
    pub async fn open(&self, auth: AuthState) -> String {
        let session_id = Uuid::new_v4().to_string();
        let mut sessions = self.sessions.write().await;
        sessions.retain(|_, existing| {
            if existing.is_valid() {
                return true;
            }
            existing.clear();
            false
        });
        sessions.insert(session_id.clone(), auth);
        debug!("Opened auth session ({} active)", sessions.len());
        session_id
    }

    pub async fn get(&self, session_id: &str) -> Option<AuthState> {
        self.sessions.read().await.get(session_id).cloned()
    }

    /// Forgets the session and signs its auth state out.
    pub async fn close(&self, session_id: &str) -> bool {
        match self.sessions.write().await.remove(session_id) {
            Some(auth) => {
                auth.clear();
                true
            }
            None => false,
        }
    }

    pub async fn len(&self) -> usize {
        self.sessions.read().await.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};
    use training_core::domain::AuthSession;

    fn signed_in_as(email: &str, expires_in: Duration) -> AuthState {
        let auth = AuthState::new();
        auth.set(AuthSession {
            token: format!("token-{}", email),
            user: User {
                id: email.to_string(),
                email: email.to_string(),
                first_name: None,
                last_name: None,
                clubs: None,
            },
            expires_at: Utc::now() + expires_in,
        });
        auth
    }

    #[tokio::test]
    async fn each_login_gets_its_own_entry() {
        let registry = SessionRegistry::default();
        let first = registry.open(signed_in_as("a@club.no", Duration::hours(1))).await;
        let second = registry.open(signed_in_as("b@club.no", Duration::hours(1))).await;
        assert_ne!(first, second);

        let a = registry.get(&first).await.unwrap();
        assert_eq!(a.current_user().unwrap().email, "a@club.no");
        assert!(registry.get("unknown").await.is_none());

        assert!(registry.close(&first).await);
        assert!(a.current().is_none());
        assert!(!registry.close(&first).await);
        assert!(registry.get(&second).await.unwrap().is_valid());
    }

    #[tokio::test]
    async fn expired_sessions_are_swept_on_open() {
        let registry = SessionRegistry::default();
        let stale = signed_in_as("old@club.no", Duration::seconds(-5));
        registry.open(stale.clone()).await;
        registry.open(signed_in_as("new@club.no", Duration::hours(1))).await;

        assert_eq!(registry.len().await, 1);
        assert!(stale.current().is_none());
    }
}
