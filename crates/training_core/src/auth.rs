//! crates/training_core/src/auth.rs
//!
//! The authentication session state. One `AuthState` exists per signed-in
//! session and is cloned into every component acting for it that needs the
//! current user or token; interested parties subscribe to be told about
//! login/logout transitions.

use chrono::Utc;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::info;

use crate::domain::{AuthSession, User};
use crate::ports::{AuthService, PortResult};

#[derive(Clone)]
pub struct AuthState {
    tx: Arc<watch::Sender<Option<AuthSession>>>,
}

impl Default for AuthState {
    fn default() -> Self {
        Self::new()
    }
}

impl AuthState {
    /// Creates a signed-out state.
    pub fn new() -> Self {
        let (tx, _rx) = watch::channel(None);
        Self { tx: Arc::new(tx) }
    }

    pub fn current(&self) -> Option<AuthSession> {
        self.tx.borrow().clone()
    }

    pub fn current_user(&self) -> Option<User> {
        self.tx.borrow().as_ref().map(|s| s.user.clone())
    }

    pub fn token(&self) -> Option<String> {
        self.tx.borrow().as_ref().map(|s| s.token.clone())
    }

    /// True while a session exists and has not yet expired.
    pub fn is_valid(&self) -> bool {
        self.tx
            .borrow()
            .as_ref()
            .is_some_and(|s| s.expires_at > Utc::now())
    }

    pub fn set(&self, session: AuthSession) {
        self.tx.send_replace(Some(session));
    }

    pub fn clear(&self) {
        self.tx.send_replace(None);
    }

    /// A receiver that is notified on every login and logout.
    pub fn subscribe(&self) -> watch::Receiver<Option<AuthSession>> {
        self.tx.subscribe()
    }

    /// Authenticates against the store and makes the result the current session.
    pub async fn login(
        &self,
        service: &dyn AuthService,
        identity: &str,
        secret: &str,
    ) -> PortResult<User> {
        let session = service.authenticate(identity, secret).await?;
        let user = session.user.clone();
        info!("Signed in as user {}", user.id);
        self.set(session);
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    fn session(expires_in: Duration) -> AuthSession {
        AuthSession {
            token: "token".to_string(),
            user: User {
                id: "u1".to_string(),
                email: "coach@example.com".to_string(),
                first_name: None,
                last_name: None,
                clubs: None,
            },
            expires_at: Utc::now() + expires_in,
        }
    }

    #[test]
    fn validity_follows_expiry() {
        let state = AuthState::new();
        assert!(!state.is_valid());

        state.set(session(Duration::hours(1)));
        assert!(state.is_valid());
        assert_eq!(state.current_user().unwrap().id, "u1");

        state.set(session(Duration::hours(-1)));
        assert!(!state.is_valid());
        assert!(state.current().is_some());
    }

    #[tokio::test]
    async fn subscribers_see_login_and_logout() {
        let state = AuthState::new();
        let mut changes = state.subscribe();

        state.set(session(Duration::hours(1)));
        changes.changed().await.unwrap();
        assert!(changes.borrow_and_update().is_some());

        state.clone().clear();
        changes.changed().await.unwrap();
        assert!(changes.borrow_and_update().is_none());
        assert_eq!(state.token(), None);
    }
}
