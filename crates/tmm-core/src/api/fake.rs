//! In-memory `RemoteApi` with scriptable failures, for tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use super::{ApiError, ApiResult, ApiUser, AuthPayload, RemoteApi};
use crate::models::{CategoryFields, ServerRecord, TransactionFields};
use crate::util::now_millis;

/// Failure injected into a fake call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Failure {
    Status(u16),
    Network,
}

impl Failure {
    fn into_error(self) -> ApiError {
        match self {
            Self::Status(status) => ApiError::Http {
                status,
                message: format!("simulated HTTP {status}"),
            },
            Self::Network => ApiError::Network("simulated network failure".to_string()),
        }
    }
}

#[derive(Default)]
struct State {
    categories: BTreeMap<i64, ServerRecord<CategoryFields>>,
    transactions: BTreeMap<i64, ServerRecord<TransactionFields>>,
    next_id: i64,
    unhealthy: bool,
    latency: Duration,
    /// Failures keyed by operation name (`get_categories`, `create_category`, ...)
    failures: HashMap<&'static str, Failure>,
    /// Category creations that fail, keyed by category name
    failing_names: HashMap<String, Failure>,
    calls: Vec<String>,
}

#[derive(Default)]
pub struct FakeApi {
    state: Mutex<State>,
}

impl FakeApi {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(State {
                next_id: 100,
                ..State::default()
            }),
        }
    }

    fn state(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state().unhealthy = !healthy;
    }

    pub fn set_latency(&self, latency: Duration) {
        self.state().latency = latency;
    }

    pub fn fail(&self, operation: &'static str, failure: Failure) {
        self.state().failures.insert(operation, failure);
    }

    pub fn recover(&self, operation: &'static str) {
        self.state().failures.remove(operation);
    }

    pub fn fail_category_named(&self, name: &str, failure: Failure) {
        self.state().failing_names.insert(name.to_string(), failure);
    }

    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn call_count(&self, operation: &str) -> usize {
        self.state()
            .calls
            .iter()
            .filter(|call| call.as_str() == operation || call.starts_with(&format!("{operation} ")))
            .count()
    }

    pub fn seed_category(&self, fields: CategoryFields) -> ServerRecord<CategoryFields> {
        let mut state = self.state();
        state.next_id += 1;
        let record = ServerRecord {
            id: state.next_id,
            fields,
            created_at: None,
            updated_at: now_millis(),
        };
        state.categories.insert(record.id, record.clone());
        record
    }

    pub fn put_category(&self, record: ServerRecord<CategoryFields>) {
        self.state().categories.insert(record.id, record);
    }

    pub fn server_categories(&self) -> Vec<ServerRecord<CategoryFields>> {
        self.state().categories.values().cloned().collect()
    }

    pub fn server_transactions(&self) -> Vec<ServerRecord<TransactionFields>> {
        self.state().transactions.values().cloned().collect()
    }

    /// Log the call and report the configured latency and failure.
    fn begin(&self, operation: &'static str, detail: String) -> (Duration, Option<Failure>) {
        let mut state = self.state();
        let call = if detail.is_empty() {
            operation.to_string()
        } else {
            format!("{operation} {detail}")
        };
        state.calls.push(call);
        (state.latency, state.failures.get(operation).copied())
    }

    async fn enter(&self, operation: &'static str, detail: String) -> ApiResult<()> {
        let (latency, failure) = self.begin(operation, detail);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        failure.map_or(Ok(()), |failure| Err(failure.into_error()))
    }
}

fn not_found(what: &str, id: i64) -> ApiError {
    ApiError::Http {
        status: 404,
        message: format!("{what} {id} not found"),
    }
}

impl RemoteApi for FakeApi {
    async fn health_check(&self) -> ApiResult<()> {
        self.enter("health_check", String::new()).await?;
        if self.state().unhealthy {
            return Err(ApiError::Network("health check failed".to_string()));
        }
        Ok(())
    }

    async fn login(&self, username: &str, password: &str) -> ApiResult<AuthPayload> {
        self.enter("login", username.to_string()).await?;
        if password != "secret" {
            return Err(ApiError::Http {
                status: 401,
                message: "Invalid credentials".to_string(),
            });
        }
        Ok(AuthPayload {
            user: ApiUser {
                id: 1,
                username: username.to_string(),
                name: "Demo User".to_string(),
            },
            token: format!("token-{username}"),
        })
    }

    async fn register(
        &self,
        username: &str,
        _password: &str,
        display_name: &str,
    ) -> ApiResult<AuthPayload> {
        self.enter("register", username.to_string()).await?;
        Ok(AuthPayload {
            user: ApiUser {
                id: 2,
                username: username.to_string(),
                name: display_name.to_string(),
            },
            token: format!("token-{username}"),
        })
    }

    async fn verify_token(&self) -> ApiResult<ApiUser> {
        self.enter("verify_token", String::new()).await?;
        Ok(ApiUser {
            id: 1,
            username: "demo".to_string(),
            name: "Demo User".to_string(),
        })
    }

    async fn get_categories(&self, year: i32) -> ApiResult<Vec<ServerRecord<CategoryFields>>> {
        self.enter("get_categories", year.to_string()).await?;
        Ok(self.server_categories())
    }

    async fn create_category(
        &self,
        fields: &CategoryFields,
        year: i32,
    ) -> ApiResult<ServerRecord<CategoryFields>> {
        self.enter("create_category", format!("{} {year}", fields.name))
            .await?;
        let mut state = self.state();
        if let Some(failure) = state.failing_names.get(&fields.name) {
            return Err(failure.into_error());
        }
        state.next_id += 1;
        let record = ServerRecord {
            id: state.next_id,
            fields: fields.clone(),
            created_at: Some(now_millis()),
            updated_at: now_millis(),
        };
        state.categories.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_category(
        &self,
        id: i64,
        fields: &CategoryFields,
        _year: i32,
    ) -> ApiResult<ServerRecord<CategoryFields>> {
        self.enter("update_category", id.to_string()).await?;
        let mut state = self.state();
        let record = state
            .categories
            .get_mut(&id)
            .ok_or_else(|| not_found("category", id))?;
        record.fields.name.clone_from(&fields.name);
        record.fields.kind = fields.kind;
        record.updated_at = now_millis();
        Ok(record.clone())
    }

    async fn delete_category(&self, id: i64, _year: i32) -> ApiResult<()> {
        self.enter("delete_category", id.to_string()).await?;
        self.state()
            .categories
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("category", id))
    }

    async fn get_transactions(
        &self,
        year: i32,
    ) -> ApiResult<Vec<ServerRecord<TransactionFields>>> {
        self.enter("get_transactions", year.to_string()).await?;
        Ok(self.server_transactions())
    }

    async fn create_transaction(
        &self,
        fields: &TransactionFields,
    ) -> ApiResult<ServerRecord<TransactionFields>> {
        self.enter("create_transaction", fields.description.clone())
            .await?;
        if fields.category.server_id().is_none() {
            return Err(ApiError::InvalidRequest("unresolved category".to_string()));
        }
        let mut state = self.state();
        state.next_id += 1;
        let record = ServerRecord {
            id: state.next_id,
            fields: fields.clone(),
            created_at: Some(now_millis()),
            updated_at: now_millis(),
        };
        state.transactions.insert(record.id, record.clone());
        Ok(record)
    }

    async fn update_transaction(
        &self,
        id: i64,
        fields: &TransactionFields,
    ) -> ApiResult<ServerRecord<TransactionFields>> {
        self.enter("update_transaction", id.to_string()).await?;
        let mut state = self.state();
        let record = state
            .transactions
            .get_mut(&id)
            .ok_or_else(|| not_found("transaction", id))?;
        record.fields = fields.clone();
        record.updated_at = now_millis();
        Ok(record.clone())
    }

    async fn delete_transaction(&self, id: i64, _year: i32) -> ApiResult<()> {
        self.enter("delete_transaction", id.to_string()).await?;
        self.state()
            .transactions
            .remove(&id)
            .map(|_| ())
            .ok_or_else(|| not_found("transaction", id))
    }
}
