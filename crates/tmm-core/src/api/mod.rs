//! Remote API contract and its HTTP implementation.
//!
//! The client is a stateless request/response wrapper: it does not retry,
//! merge or cache. HTTP outcomes surface as [`ApiError`] for callers to classify.

mod dto;
#[cfg(test)]
pub(crate) mod fake;
mod http;

use std::future::Future;

use thiserror::Error;

use crate::models::{CategoryFields, ServerRecord, TransactionFields};

pub use dto::{ApiUser, AuthPayload};
pub use http::HttpApiClient;

/// Errors surfaced by the remote client
#[derive(Debug, Error)]
pub enum ApiError {
    /// Non-2xx response
    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    /// Connection-level failure (DNS, refused, reset, TLS)
    #[error("Network request failed: {0}")]
    Network(String),

    #[error("Request timed out")]
    Timeout,

    /// Response body did not match the expected shape
    #[error("Invalid response payload: {0}")]
    Decode(String),

    /// 2xx response whose envelope reported `success: false`
    #[error("Request rejected: {0}")]
    Rejected(String),

    /// Request could not be built from the given data
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Invalid API configuration: {0}")]
    InvalidConfiguration(String),
}

impl ApiError {
    /// HTTP status, when the server answered.
    pub const fn status(&self) -> Option<u16> {
        match self {
            Self::Http { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub const fn is_not_found(&self) -> bool {
        matches!(self.status(), Some(404))
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            Self::Timeout
        } else if error.is_decode() {
            Self::Decode(error.to_string())
        } else if let Some(status) = error.status() {
            Self::Http {
                status: status.as_u16(),
                message: error.to_string(),
            }
        } else {
            Self::Network(error.to_string())
        }
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(error: serde_json::Error) -> Self {
        Self::Decode(error.to_string())
    }
}

pub type ApiResult<T> = Result<T, ApiError>;

/// Backend operations consumed by auth and the sync coordinator.
///
/// Futures are `Send` so callers can drive them from spawned tasks.
pub trait RemoteApi: Send + Sync {
    /// Lightweight reachability probe.
    fn health_check(&self) -> impl Future<Output = ApiResult<()>> + Send;

    fn login(
        &self,
        username: &str,
        password: &str,
    ) -> impl Future<Output = ApiResult<AuthPayload>> + Send;

    fn register(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> impl Future<Output = ApiResult<AuthPayload>> + Send;

    /// Check the cached bearer token and return the user it belongs to.
    fn verify_token(&self) -> impl Future<Output = ApiResult<ApiUser>> + Send;

    fn get_categories(
        &self,
        year: i32,
    ) -> impl Future<Output = ApiResult<Vec<ServerRecord<CategoryFields>>>> + Send;

    fn create_category(
        &self,
        fields: &CategoryFields,
        year: i32,
    ) -> impl Future<Output = ApiResult<ServerRecord<CategoryFields>>> + Send;

    fn update_category(
        &self,
        id: i64,
        fields: &CategoryFields,
        year: i32,
    ) -> impl Future<Output = ApiResult<ServerRecord<CategoryFields>>> + Send;

    fn delete_category(&self, id: i64, year: i32) -> impl Future<Output = ApiResult<()>> + Send;

    fn get_transactions(
        &self,
        year: i32,
    ) -> impl Future<Output = ApiResult<Vec<ServerRecord<TransactionFields>>>> + Send;

    fn create_transaction(
        &self,
        fields: &TransactionFields,
    ) -> impl Future<Output = ApiResult<ServerRecord<TransactionFields>>> + Send;

    fn update_transaction(
        &self,
        id: i64,
        fields: &TransactionFields,
    ) -> impl Future<Output = ApiResult<ServerRecord<TransactionFields>>> + Send;

    fn delete_transaction(&self, id: i64, year: i32)
        -> impl Future<Output = ApiResult<()>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_is_detected_from_status() {
        let error = ApiError::Http {
            status: 404,
            message: "Category not found".to_string(),
        };
        assert!(error.is_not_found());
        assert_eq!(error.status(), Some(404));
        assert!(!ApiError::Timeout.is_not_found());
    }
}
