//! `reqwest` implementation of [`RemoteApi`].

use std::time::Duration;

use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;

use super::dto::{
    AuthResponse, CategoryBody, CategoryDto, Envelope, ErrorBody, LoginBody, RegisterBody,
    TransactionBody, TransactionDto,
};
use super::{ApiError, ApiResult, ApiUser, AuthPayload, RemoteApi};
use crate::config::normalize_api_url;
use crate::models::{CategoryFields, ServerRecord, TransactionFields};
use crate::session::SessionContext;

/// HTTP client for the TrackMyMoney backend.
///
/// The bearer token is read from the shared [`SessionContext`] on every call,
/// so a login or logout elsewhere takes effect immediately.
#[derive(Clone)]
pub struct HttpApiClient {
    base_url: String,
    client: Client,
    session: SessionContext,
}

impl HttpApiClient {
    pub fn new(
        base_url: impl AsRef<str>,
        request_timeout: Duration,
        session: SessionContext,
    ) -> ApiResult<Self> {
        let base_url =
            normalize_api_url(base_url.as_ref()).map_err(ApiError::InvalidConfiguration)?;
        let client = Client::builder().timeout(request_timeout).build()?;
        Ok(Self {
            base_url,
            client,
            session,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    async fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let request = self
            .client
            .request(method, format!("{}{path}", self.base_url))
            .header("Accept", "application/json");
        match self.session.token().await {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    fn public_request(&self, method: Method, path: &str) -> RequestBuilder {
        self.client
            .request(method, format!("{}{path}", self.base_url))
            .header("Accept", "application/json")
    }

    async fn send(request: RequestBuilder) -> ApiResult<Response> {
        let response = request.send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Http {
                status: status.as_u16(),
                message: parse_api_error(status, &body),
            });
        }
        Ok(response)
    }

    /// Send a request whose response payload does not matter; an empty body counts as success.
    async fn send_unit(request: RequestBuilder) -> ApiResult<()> {
        let response = Self::send(request).await?;
        let body = response.text().await?;
        if body.trim().is_empty() {
            return Ok(());
        }
        serde_json::from_str::<Envelope<serde_json::Value>>(&body)?.into_unit()
    }

    async fn send_envelope<T: DeserializeOwned>(request: RequestBuilder) -> ApiResult<Envelope<T>> {
        let response = Self::send(request).await?;
        let body = response.text().await?;
        Ok(serde_json::from_str(&body)?)
    }
}

impl RemoteApi for HttpApiClient {
    async fn health_check(&self) -> ApiResult<()> {
        Self::send(self.public_request(Method::GET, "/health"))
            .await
            .map(|_| ())
    }

    async fn login(&self, username: &str, password: &str) -> ApiResult<AuthPayload> {
        let request = self
            .public_request(Method::POST, "/auth/login")
            .json(&LoginBody { username, password });
        let response = Self::send(request).await?;
        let body = response.text().await?;
        serde_json::from_str::<AuthResponse>(&body)?.into_payload()
    }

    async fn register(
        &self,
        username: &str,
        password: &str,
        display_name: &str,
    ) -> ApiResult<AuthPayload> {
        let request = self
            .public_request(Method::POST, "/auth/register")
            .json(&RegisterBody {
                username,
                password,
                name: display_name,
            });
        let response = Self::send(request).await?;
        let body = response.text().await?;
        serde_json::from_str::<AuthResponse>(&body)?.into_payload()
    }

    async fn verify_token(&self) -> ApiResult<ApiUser> {
        let response = Self::send(self.request(Method::GET, "/auth/verify").await).await?;
        let body = response.text().await?;
        serde_json::from_str::<AuthResponse>(&body)?.into_user()
    }

    async fn get_categories(&self, year: i32) -> ApiResult<Vec<ServerRecord<CategoryFields>>> {
        let request = self
            .request(Method::GET, "/categories")
            .await
            .query(&[("year", year)]);
        let categories: Vec<CategoryDto> = Self::send_envelope(request).await?.into_data()?;
        Ok(categories.into_iter().map(Into::into).collect())
    }

    async fn create_category(
        &self,
        fields: &CategoryFields,
        year: i32,
    ) -> ApiResult<ServerRecord<CategoryFields>> {
        let request = self
            .request(Method::POST, "/categories")
            .await
            .query(&[("year", year)])
            .json(&CategoryBody::from(fields));
        let category: CategoryDto = Self::send_envelope(request).await?.into_data()?;
        Ok(category.into())
    }

    async fn update_category(
        &self,
        id: i64,
        fields: &CategoryFields,
        year: i32,
    ) -> ApiResult<ServerRecord<CategoryFields>> {
        let request = self
            .request(Method::PUT, &format!("/categories/{id}"))
            .await
            .query(&[("year", year)])
            .json(&CategoryBody::from(fields));
        let category: CategoryDto = Self::send_envelope(request).await?.into_data()?;
        Ok(category.into())
    }

    async fn delete_category(&self, id: i64, year: i32) -> ApiResult<()> {
        let request = self
            .request(Method::DELETE, &format!("/categories/{id}"))
            .await
            .query(&[("year", year)]);
        Self::send_unit(request).await
    }

    async fn get_transactions(
        &self,
        year: i32,
    ) -> ApiResult<Vec<ServerRecord<TransactionFields>>> {
        let request = self
            .request(Method::GET, "/transactions")
            .await
            .query(&[("year", year)]);
        let transactions: Vec<TransactionDto> = Self::send_envelope(request).await?.into_data()?;
        Ok(transactions.into_iter().map(Into::into).collect())
    }

    async fn create_transaction(
        &self,
        fields: &TransactionFields,
    ) -> ApiResult<ServerRecord<TransactionFields>> {
        let body = TransactionBody::try_from(fields)?;
        let request = self
            .request(Method::POST, "/transactions")
            .await
            .json(&body);
        let transaction: TransactionDto = Self::send_envelope(request).await?.into_data()?;
        Ok(transaction.into())
    }

    async fn update_transaction(
        &self,
        id: i64,
        fields: &TransactionFields,
    ) -> ApiResult<ServerRecord<TransactionFields>> {
        let body = TransactionBody::try_from(fields)?;
        let request = self
            .request(Method::PUT, &format!("/transactions/{id}"))
            .await
            .json(&body);
        let transaction: TransactionDto = Self::send_envelope(request).await?.into_data()?;
        Ok(transaction.into())
    }

    async fn delete_transaction(&self, id: i64, year: i32) -> ApiResult<()> {
        let request = self
            .request(Method::DELETE, &format!("/transactions/{id}"))
            .await
            .query(&[("year", year)]);
        Self::send_unit(request).await
    }
}

/// Best-effort error message: `message`/`error` from a JSON body, then the raw
/// body, then the status text.
fn parse_api_error(status: StatusCode, body: &str) -> String {
    if let Ok(payload) = serde_json::from_str::<ErrorBody>(body) {
        if let Some(message) = payload.message.or(payload.error) {
            return message.trim().to_string();
        }
    }

    let trimmed = body.trim();
    if !trimmed.is_empty() && !trimmed.starts_with('<') {
        return crate::util::compact_text(trimmed);
    }
    status
        .canonical_reason()
        .map_or_else(|| format!("HTTP {}", status.as_u16()), str::to_string)
}
