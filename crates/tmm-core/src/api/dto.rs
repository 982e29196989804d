//! Wire types for the backend API (camelCase JSON).

use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

use super::{ApiError, ApiResult};
use crate::models::{CategoryFields, CategoryRef, EntryKind, ServerRecord, TransactionFields};
use crate::util::from_millis;

/// Standard response envelope `{success, data, message}`.
#[derive(Debug, Deserialize)]
pub(super) struct Envelope<T> {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default = "Option::default")]
    data: Option<T>,
    #[serde(default)]
    message: Option<String>,
}

impl<T> Envelope<T> {
    fn check(&self) -> ApiResult<()> {
        if self.success == Some(false) {
            return Err(ApiError::Rejected(
                self.message
                    .clone()
                    .unwrap_or_else(|| "server reported failure".to_string()),
            ));
        }
        Ok(())
    }

    /// Payload of a successful response.
    pub(super) fn into_data(self) -> ApiResult<T> {
        self.check()?;
        self.data
            .ok_or_else(|| ApiError::Decode("response did not include data".to_string()))
    }

    /// Accept a successful response whose payload is irrelevant.
    pub(super) fn into_unit(self) -> ApiResult<()> {
        self.check()
    }
}

#[derive(Debug, Deserialize)]
pub(super) struct ErrorBody {
    pub message: Option<String>,
    pub error: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct CategoryDto {
    id: i64,
    name: String,
    #[serde(rename = "type")]
    kind: EntryKind,
    #[serde(default)]
    is_default: bool,
    #[serde(default, deserialize_with = "lenient_optional_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    updated_at: DateTime<Utc>,
}

impl From<CategoryDto> for ServerRecord<CategoryFields> {
    fn from(dto: CategoryDto) -> Self {
        Self {
            id: dto.id,
            fields: CategoryFields {
                name: dto.name,
                kind: dto.kind,
                is_default: dto.is_default,
            },
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TransactionDto {
    id: i64,
    amount: f64,
    #[serde(deserialize_with = "lenient_date")]
    date: NaiveDate,
    #[serde(rename = "type")]
    kind: EntryKind,
    category_id: i64,
    #[serde(default)]
    description: Option<String>,
    #[serde(default, deserialize_with = "lenient_optional_timestamp")]
    created_at: Option<DateTime<Utc>>,
    #[serde(deserialize_with = "lenient_timestamp")]
    updated_at: DateTime<Utc>,
}

impl From<TransactionDto> for ServerRecord<TransactionFields> {
    fn from(dto: TransactionDto) -> Self {
        Self {
            id: dto.id,
            fields: TransactionFields {
                amount: dto.amount,
                date: dto.date,
                kind: dto.kind,
                category: CategoryRef::Server(dto.category_id),
                description: dto.description.unwrap_or_default(),
            },
            created_at: dto.created_at,
            updated_at: dto.updated_at,
        }
    }
}

/// Category fields sent on create/update; the sync envelope never leaves the device.
#[derive(Debug, Serialize)]
pub(super) struct CategoryBody<'a> {
    name: &'a str,
    #[serde(rename = "type")]
    kind: EntryKind,
}

impl<'a> From<&'a CategoryFields> for CategoryBody<'a> {
    fn from(fields: &'a CategoryFields) -> Self {
        Self {
            name: &fields.name,
            kind: fields.kind,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub(super) struct TransactionBody<'a> {
    amount: f64,
    date: NaiveDate,
    #[serde(rename = "type")]
    kind: EntryKind,
    category_id: i64,
    description: &'a str,
}

impl<'a> TryFrom<&'a TransactionFields> for TransactionBody<'a> {
    type Error = ApiError;

    fn try_from(fields: &'a TransactionFields) -> ApiResult<Self> {
        let category_id = fields.category.server_id().ok_or_else(|| {
            ApiError::InvalidRequest(
                "transaction references a category the server has not accepted yet".to_string(),
            )
        })?;
        Ok(Self {
            amount: fields.amount,
            date: fields.date,
            kind: fields.kind,
            category_id,
            description: &fields.description,
        })
    }
}

#[derive(Debug, Serialize)]
pub(super) struct LoginBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
}

#[derive(Debug, Serialize)]
pub(super) struct RegisterBody<'a> {
    pub username: &'a str,
    pub password: &'a str,
    pub name: &'a str,
}

/// User as the backend describes it.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ApiUser {
    pub id: i64,
    pub username: String,
    #[serde(alias = "displayName", default)]
    pub name: String,
}

/// Result of a successful login or registration.
#[derive(Clone, PartialEq, Eq)]
pub struct AuthPayload {
    pub user: ApiUser,
    pub token: String,
}

impl std::fmt::Debug for AuthPayload {
    fn fmt(&self, formatter: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        formatter
            .debug_struct("AuthPayload")
            .field("user", &self.user)
            .field("token", &"[REDACTED]")
            .finish()
    }
}

/// Auth responses carry `user`/`token` either at the top level or inside `data`.
#[derive(Debug, Deserialize)]
pub(super) struct AuthResponse {
    #[serde(default)]
    success: Option<bool>,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    user: Option<ApiUser>,
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    data: Option<AuthResponseData>,
}

#[derive(Debug, Deserialize)]
struct AuthResponseData {
    #[serde(default)]
    user: Option<ApiUser>,
    #[serde(default)]
    token: Option<String>,
}

impl AuthResponse {
    fn rejected(&self) -> Option<ApiError> {
        (self.success == Some(false)).then(|| {
            ApiError::Rejected(
                self.message
                    .clone()
                    .unwrap_or_else(|| "authentication failed".to_string()),
            )
        })
    }

    pub(super) fn into_payload(self) -> ApiResult<AuthPayload> {
        if let Some(error) = self.rejected() {
            return Err(error);
        }
        let nested = self.data;
        let token = self
            .token
            .or_else(|| nested.as_ref().and_then(|data| data.token.clone()));
        let user = self.user.or_else(|| nested.and_then(|data| data.user));

        match (user, token) {
            (Some(user), Some(token)) if !token.trim().is_empty() => {
                Ok(AuthPayload { user, token })
            }
            _ => Err(ApiError::Decode(
                "auth response did not include both user and token".to_string(),
            )),
        }
    }

    pub(super) fn into_user(self) -> ApiResult<ApiUser> {
        if let Some(error) = self.rejected() {
            return Err(error);
        }
        self.user
            .or_else(|| self.data.and_then(|data| data.user))
            .ok_or_else(|| ApiError::Decode("verify response did not include a user".to_string()))
    }
}

/// Accept RFC 3339 as well as the `YYYY-MM-DD HH:MM:SS` form SQL backends emit,
/// truncated to the millisecond precision the local store keeps.
fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    let raw = raw.trim();
    let parsed = DateTime::parse_from_rfc3339(raw)
        .map(|value| value.with_timezone(&Utc))
        .ok()
        .or_else(|| {
            NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S%.f")
                .ok()
                .map(|value| value.and_utc())
        })?;
    Some(from_millis(parsed.timestamp_millis()))
}

fn lenient_timestamp<'de, D>(deserializer: D) -> Result<DateTime<Utc>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    parse_timestamp(&raw)
        .ok_or_else(|| serde::de::Error::custom(format!("invalid timestamp '{raw}'")))
}

fn lenient_optional_timestamp<'de, D>(deserializer: D) -> Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    Ok(raw.as_deref().and_then(parse_timestamp))
}

/// Dates arrive as `YYYY-MM-DD`, sometimes with a time part attached.
fn lenient_date<'de, D>(deserializer: D) -> Result<NaiveDate, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = String::deserialize(deserializer)?;
    let day = raw.trim().get(..10).unwrap_or(raw.trim());
    NaiveDate::parse_from_str(day, "%Y-%m-%d")
        .map_err(|error| serde::de::Error::custom(format!("invalid date '{raw}': {error}")))
}
