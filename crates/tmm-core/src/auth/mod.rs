//! Sign-in lifecycle: login, registration, restore, verification and logout.

use std::sync::Arc;

use serde::Serialize;

use crate::api::{ApiError, AuthPayload, RemoteApi};
use crate::models::User;
use crate::services::LocalStore;
use crate::session::{Session, SessionContext};
use crate::sync::SyncCoordinator;
use crate::Result;

/// Structured answer to a login or registration attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl AuthOutcome {
    fn signed_in(message: &str, user: User) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            user: Some(user),
        }
    }

    fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            user: None,
        }
    }
}

/// Owns the session lifecycle: set on login/restore, cleared on logout.
pub struct AuthService<A> {
    api: Arc<A>,
    store: LocalStore,
    session: SessionContext,
    coordinator: Arc<SyncCoordinator<A>>,
}

impl<A: RemoteApi> AuthService<A> {
    pub const fn new(
        api: Arc<A>,
        store: LocalStore,
        session: SessionContext,
        coordinator: Arc<SyncCoordinator<A>>,
    ) -> Self {
        Self {
            api,
            store,
            session,
            coordinator,
        }
    }

    pub async fn login(&self, username: &str, password: &str) -> Result<AuthOutcome> {
        let username = username.trim();
        if username.is_empty() || password.is_empty() {
            return Ok(AuthOutcome::failed("Username and password are required"));
        }

        match self.api.login(username, password).await {
            Ok(payload) => {
                let user = self.establish(payload).await?;
                tracing::info!("Signed in as {}", user.username);
                Ok(AuthOutcome::signed_in("Login successful", user))
            }
            Err(error) => {
                tracing::warn!("Login failed for {username}: {error}");
                Ok(AuthOutcome::failed(failure_message(&error, "Login failed")))
            }
        }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> Result<AuthOutcome> {
        let username = username.trim();
        let display_name = display_name.trim();
        if username.is_empty() || password.is_empty() {
            return Ok(AuthOutcome::failed("Username and password are required"));
        }
        let display_name = if display_name.is_empty() {
            username
        } else {
            display_name
        };

        match self.api.register(username, password, display_name).await {
            Ok(payload) => {
                let user = self.establish(payload).await?;
                tracing::info!("Registered {}", user.username);
                Ok(AuthOutcome::signed_in("Registration successful", user))
            }
            Err(error) => {
                tracing::warn!("Registration failed for {username}: {error}");
                Ok(AuthOutcome::failed(failure_message(
                    &error,
                    "Registration failed",
                )))
            }
        }
    }

    /// Resume the session of the user cached on this device, without network.
    pub async fn restore(&self) -> Result<Option<User>> {
        let Some(user) = self.store.get_user().await? else {
            return Ok(None);
        };
        self.session.set(Session::from(&user)).await;
        tracing::debug!("Restored session for {}", user.username);
        Ok(Some(user))
    }

    /// Check the cached token with the server.
    ///
    /// A rejected token ends the session. Transport failures keep it: the
    /// device may simply be offline.
    pub async fn verify(&self) -> Result<bool> {
        if !self.session.is_authenticated().await {
            return Ok(false);
        }
        match self.api.verify_token().await {
            Ok(user) => {
                tracing::debug!("Token verified for {}", user.username);
                Ok(true)
            }
            Err(ApiError::Http { status: 401, .. }) => {
                tracing::warn!("Stored token was rejected; signing out");
                self.logout().await?;
                Ok(false)
            }
            Err(error) => {
                tracing::debug!("Could not verify token: {error}");
                Ok(true)
            }
        }
    }

    /// End the session and wipe everything stored for it.
    pub async fn logout(&self) -> Result<()> {
        self.session.clear().await;
        self.coordinator.clear_sync_data();
        self.store.clear_all().await?;
        tracing::info!("Signed out");
        Ok(())
    }

    pub async fn current_user(&self) -> Result<Option<User>> {
        self.store.get_user().await
    }

    pub async fn is_authenticated(&self) -> bool {
        self.session.is_authenticated().await
    }

    async fn establish(&self, payload: AuthPayload) -> Result<User> {
        let last_sync = self
            .store
            .get_user()
            .await?
            .filter(|cached| cached.id == payload.user.id)
            .and_then(|cached| cached.last_sync);
        let display_name = if payload.user.name.trim().is_empty() {
            payload.user.username.clone()
        } else {
            payload.user.name
        };

        let user = User {
            id: payload.user.id,
            username: payload.user.username,
            display_name,
            token: payload.token,
            last_sync,
        };
        self.store.save_user(&user).await?;
        self.session.set(Session::from(&user)).await;
        Ok(user)
    }
}

fn failure_message(error: &ApiError, fallback: &str) -> String {
    match error {
        ApiError::Http { message, .. } | ApiError::Rejected(message) if !message.is_empty() => {
            message.clone()
        }
        ApiError::Network(_) | ApiError::Timeout => {
            format!("{fallback}: server unreachable. Please try again.")
        }
        _ => format!("{fallback}. Please try again."),
    }
}
