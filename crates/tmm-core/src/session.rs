//! Process-wide session shared by the remote client, stores and coordinator.

use std::fmt;
use std::sync::Arc;

use tokio::sync::RwLock;

use crate::error::{Error, Result};
use crate::models::User;

/// Identity of the signed-in user.
#[derive(Clone, PartialEq, Eq)]
pub struct Session {
    pub user_id: i64,
    pub username: String,
    pub display_name: String,
    pub token: String,
}

impl fmt::Debug for Session {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("Session")
            .field("user_id", &self.user_id)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

impl From<&User> for Session {
    fn from(user: &User) -> Self {
        Self {
            user_id: user.id,
            username: user.username.clone(),
            display_name: user.display_name.clone(),
            token: user.token.clone(),
        }
    }
}

/// Shared handle to the current session. Cloning shares the same slot.
#[derive(Clone, Default)]
pub struct SessionContext {
    inner: Arc<RwLock<Option<Session>>>,
}

impl SessionContext {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start (or replace) the session.
    pub async fn set(&self, session: Session) {
        tracing::debug!("Session started for user {}", session.user_id);
        *self.inner.write().await = Some(session);
    }

    /// End the session.
    pub async fn clear(&self) {
        *self.inner.write().await = None;
    }

    pub async fn current(&self) -> Option<Session> {
        self.inner.read().await.clone()
    }

    pub async fn is_authenticated(&self) -> bool {
        self.inner.read().await.is_some()
    }

    /// Bearer token of the current session, if any.
    pub async fn token(&self) -> Option<String> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|session| session.token.clone())
    }

    /// Partition owner of the current session.
    pub async fn owner_id(&self) -> Result<i64> {
        self.inner
            .read()
            .await
            .as_ref()
            .map(|session| session.user_id)
            .ok_or(Error::NotAuthenticated)
    }
}

impl fmt::Debug for SessionContext {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter.debug_struct("SessionContext").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            user_id: 7,
            username: "admin".to_string(),
            display_name: "Admin User".to_string(),
            token: "secret-token".to_string(),
        }
    }

    #[tokio::test]
    async fn clones_share_the_same_session() {
        let context = SessionContext::new();
        let other = context.clone();
        assert!(matches!(
            other.owner_id().await,
            Err(Error::NotAuthenticated)
        ));

        context.set(session()).await;
        assert_eq!(other.owner_id().await.unwrap(), 7);
        assert_eq!(other.token().await.as_deref(), Some("secret-token"));

        other.clear().await;
        assert!(!context.is_authenticated().await);
    }

    #[test]
    fn session_debug_redacts_token() {
        let rendered = format!("{:?}", session());
        assert!(!rendered.contains("secret-token"));
        assert!(rendered.contains("[REDACTED]"));
    }
}
