//! Structured sync results and error classification.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use thiserror::Error;

use crate::api::ApiError;

/// Machine-readable result code of a sync request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SyncCode {
    SyncSuccess,
    QuickSyncSuccess,
    SyncInProgress,
    Offline,
    AuthExpired,
    RateLimited,
    ServerError,
    NetworkError,
    ClientError,
    ValidationFailed,
    StorageError,
    SyncError,
}

impl SyncCode {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::SyncSuccess => "SYNC_SUCCESS",
            Self::QuickSyncSuccess => "QUICK_SYNC_SUCCESS",
            Self::SyncInProgress => "SYNC_IN_PROGRESS",
            Self::Offline => "OFFLINE",
            Self::AuthExpired => "AUTH_EXPIRED",
            Self::RateLimited => "RATE_LIMITED",
            Self::ServerError => "SERVER_ERROR",
            Self::NetworkError => "NETWORK_ERROR",
            Self::ClientError => "CLIENT_ERROR",
            Self::ValidationFailed => "VALIDATION_FAILED",
            Self::StorageError => "STORAGE_ERROR",
            Self::SyncError => "SYNC_ERROR",
        }
    }

    /// Failures worth retrying with backoff and the retry queue.
    pub const fn is_retryable(self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::ServerError | Self::NetworkError | Self::ValidationFailed
        )
    }

    /// User-facing explanation of a failure code.
    pub const fn message(self) -> &'static str {
        match self {
            Self::SyncSuccess => "Sync completed successfully",
            Self::QuickSyncSuccess => "Quick sync completed",
            Self::SyncInProgress => "Sync already in progress",
            Self::Offline => "No network connection available",
            Self::AuthExpired => "Authentication expired - please log in again",
            Self::RateLimited => "Too many requests - sync will retry automatically",
            Self::ServerError => "Server error - will retry automatically",
            Self::NetworkError => "Network error - will retry when connection is restored",
            Self::ClientError => "Client error - please check your data",
            Self::ValidationFailed => "Sync incomplete - some items still need syncing",
            Self::StorageError => "Local storage error",
            Self::SyncError => "Sync failed",
        }
    }
}

impl fmt::Display for SyncCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a sync request reports to its caller. Never an error value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOutcome {
    pub success: bool,
    pub message: String,
    pub code: SyncCode,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    /// The key is queued for an automatic retry
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub retrying: bool,
}

impl SyncOutcome {
    pub fn succeeded(code: SyncCode, last_sync: Option<DateTime<Utc>>) -> Self {
        Self {
            success: true,
            message: code.message().to_string(),
            code,
            last_sync,
            retrying: false,
        }
    }

    pub fn failed(code: SyncCode) -> Self {
        Self {
            success: false,
            message: code.message().to_string(),
            code,
            last_sync: None,
            retrying: false,
        }
    }

    pub(crate) fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }
}

/// Why a sync cycle stopped.
#[derive(Debug, Error)]
pub enum CycleError {
    #[error(transparent)]
    Remote(ApiError),

    #[error("local store failure: {0}")]
    Storage(crate::Error),

    #[error("sync validation failed: {categories} categories and {transactions} transactions remain unsynced")]
    Incomplete { categories: usize, transactions: usize },
}

impl From<ApiError> for CycleError {
    fn from(error: ApiError) -> Self {
        Self::Remote(error)
    }
}

impl From<crate::Error> for CycleError {
    fn from(error: crate::Error) -> Self {
        match error {
            crate::Error::Api(api) => Self::Remote(api),
            other => Self::Storage(other),
        }
    }
}

impl CycleError {
    /// Map a failure onto the public code taxonomy.
    pub fn code(&self) -> SyncCode {
        match self {
            Self::Remote(error) => classify_api_error(error),
            Self::Storage(_) => SyncCode::StorageError,
            Self::Incomplete { .. } => SyncCode::ValidationFailed,
        }
    }
}

pub fn classify_api_error(error: &ApiError) -> SyncCode {
    match error {
        ApiError::Http { status: 401, .. } => SyncCode::AuthExpired,
        ApiError::Http { status: 429, .. } => SyncCode::RateLimited,
        ApiError::Http { status, .. } if *status >= 500 => SyncCode::ServerError,
        ApiError::Http { status, .. } if *status >= 400 => SyncCode::ClientError,
        ApiError::Network(_) | ApiError::Timeout => SyncCode::NetworkError,
        ApiError::Http { .. }
        | ApiError::Decode(_)
        | ApiError::Rejected(_)
        | ApiError::InvalidRequest(_)
        | ApiError::InvalidConfiguration(_) => SyncCode::SyncError,
    }
}
