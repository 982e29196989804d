use std::env;
use std::io::{self, BufRead, IsTerminal, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tmm_core::api::HttpApiClient;
use tmm_core::auth::AuthService;
use tmm_core::config::{ClientConfig, API_URL_ENV};
use tmm_core::models::{Category, CategoryRef, Transaction};
use tmm_core::stores::{CategoryStore, TransactionStore};
use tmm_core::sync::SyncOutcome;
use tmm_core::util::current_year;
use tmm_core::{LocalStore, RecordKey, SessionContext, SyncCoordinator};

use crate::error::CliError;

const APP_DIR: &str = "trackmymoney";

/// Everything a command needs, wired once per invocation.
pub struct AppContext {
    pub config: ClientConfig,
    pub store: LocalStore,
    pub session: SessionContext,
    pub coordinator: Arc<SyncCoordinator<HttpApiClient>>,
    pub auth: AuthService<HttpApiClient>,
    pub year: i32,
}

impl AppContext {
    pub async fn open(
        db_path: &Path,
        config_path: &Path,
        year: Option<i32>,
    ) -> Result<Self, CliError> {
        let config = ClientConfig::resolve(Some(config_path), env::var(API_URL_ENV).ok())
            .map_err(CliError::Config)?;
        let store = LocalStore::open_path(db_path).await?;
        let session = SessionContext::new();
        let api = Arc::new(
            HttpApiClient::new(
                &config.api_base_url,
                config.sync.request_timeout(),
                session.clone(),
            )
            .map_err(tmm_core::Error::from)?,
        );
        let coordinator = Arc::new(SyncCoordinator::new(
            api.clone(),
            store.clone(),
            session.clone(),
            config.sync.clone(),
        ));
        let auth = AuthService::new(api, store.clone(), session.clone(), coordinator.clone());
        tracing::debug!(
            "Opened {} against {}",
            db_path.display(),
            config.api_base_url
        );

        Ok(Self {
            config,
            store,
            session,
            coordinator,
            auth,
            year: year.unwrap_or_else(current_year),
        })
    }

    /// Resume the cached session; every data command needs one.
    pub async fn require_session(&self) -> Result<i64, CliError> {
        self.auth
            .restore()
            .await?
            .map(|user| user.id)
            .ok_or(CliError::NotSignedIn)
    }

    pub fn categories(&self) -> CategoryStore<HttpApiClient> {
        CategoryStore::new(
            self.store.clone(),
            self.session.clone(),
            self.coordinator.clone(),
            self.year,
        )
    }

    pub fn transactions(&self) -> TransactionStore<HttpApiClient> {
        TransactionStore::new(
            self.store.clone(),
            self.session.clone(),
            self.coordinator.clone(),
            self.year,
        )
    }
}

#[derive(Debug, Serialize)]
pub struct CategoryItem {
    pub id: String,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub is_default: bool,
    pub pending: bool,
}

#[derive(Debug, Serialize)]
pub struct TransactionItem {
    pub id: String,
    pub date: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub amount: f64,
    pub category: String,
    pub description: String,
    pub pending: bool,
}

pub fn record_id<F>(record: &tmm_core::Record<F>) -> String {
    record
        .meta
        .id
        .map(|id| id.to_string())
        .or_else(|| record.meta.local_id.as_ref().map(ToString::to_string))
        .unwrap_or_else(|| "-".to_string())
}

pub fn category_ref_label(category: &CategoryRef) -> String {
    category.key().to_string()
}

pub fn category_to_item(category: &Category) -> CategoryItem {
    CategoryItem {
        id: record_id(category),
        name: category.fields.name.clone(),
        kind: category.fields.kind.to_string(),
        is_default: category.fields.is_default,
        pending: category.meta.needs_sync,
    }
}

pub fn transaction_to_item(transaction: &Transaction) -> TransactionItem {
    TransactionItem {
        id: record_id(transaction),
        date: transaction.fields.date.to_string(),
        kind: transaction.fields.kind.to_string(),
        amount: transaction.fields.amount,
        category: category_ref_label(&transaction.fields.category),
        description: transaction.fields.description.clone(),
        pending: transaction.meta.needs_sync,
    }
}

pub fn format_category_lines(categories: &[&Category]) -> Vec<String> {
    categories
        .iter()
        .map(|category| {
            let marker = pending_marker(category.meta.needs_sync);
            let default = if category.fields.is_default {
                "  (default)"
            } else {
                ""
            };
            format!(
                "{:<24}{marker} {:<8} {}{default}",
                record_id(category),
                category.fields.kind,
                category.fields.name
            )
        })
        .collect()
}

pub fn format_transaction_lines(transactions: &[&Transaction]) -> Vec<String> {
    transactions
        .iter()
        .map(|transaction| {
            let marker = pending_marker(transaction.meta.needs_sync);
            let description = text_preview(&transaction.fields.description, 40);
            format!(
                "{:<24}{marker} {}  {:>12}  {:<24} {description}",
                record_id(transaction),
                transaction.fields.date,
                format_amount(transaction.fields.amount, transaction.fields.kind),
                category_ref_label(&transaction.fields.category)
            )
        })
        .collect()
}

const fn pending_marker(pending: bool) -> char {
    if pending {
        '*'
    } else {
        ' '
    }
}

pub fn format_amount(amount: f64, kind: tmm_core::EntryKind) -> String {
    match kind {
        tmm_core::EntryKind::Income => format!("+{amount:.2}"),
        tmm_core::EntryKind::Expense => format!("-{amount:.2}"),
    }
}

pub fn text_preview(text: &str, max_chars: usize) -> String {
    let collapsed = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if collapsed.chars().count() <= max_chars {
        collapsed
    } else {
        let take_len = max_chars.saturating_sub(3);
        let mut truncated = collapsed.chars().take(take_len).collect::<String>();
        truncated.push_str("...");
        truncated
    }
}

pub fn format_timestamp(timestamp: Option<DateTime<Utc>>) -> String {
    timestamp.map_or_else(
        || "never".to_string(),
        |at| at.format("%Y-%m-%d %H:%M:%S UTC").to_string(),
    )
}

pub fn format_relative_time(timestamp_ms: i64, now_ms: i64) -> String {
    let diff = now_ms.saturating_sub(timestamp_ms);
    let minute = 60_000;
    let hour = 60 * minute;
    let day = 24 * hour;
    let week = 7 * day;

    if diff < minute {
        "just now".to_string()
    } else if diff < hour {
        format!("{}m ago", diff / minute)
    } else if diff < day {
        format!("{}h ago", diff / hour)
    } else if diff < week {
        format!("{}d ago", diff / day)
    } else {
        format!("{}w ago", diff / week)
    }
}

pub fn describe_outcome(outcome: &SyncOutcome) -> String {
    let mut line = format!("[{}] {}", outcome.code, outcome.message);
    if let Some(last_sync) = outcome.last_sync {
        line.push_str(&format!(" (at {})", format_timestamp(Some(last_sync))));
    }
    if outcome.retrying {
        line.push_str("; queued for retry");
    }
    line
}

/// Turn a failed outcome into a non-zero exit.
pub fn outcome_to_result(outcome: &SyncOutcome) -> Result<(), CliError> {
    if outcome.success {
        Ok(())
    } else {
        Err(CliError::SyncFailed {
            code: outcome.code.to_string(),
            message: outcome.message.clone(),
        })
    }
}

pub fn parse_record_key(raw: &str) -> Result<RecordKey, CliError> {
    raw.parse::<RecordKey>().map_err(CliError::InvalidArgument)
}

pub fn resolve_password(password: Option<String>) -> Result<String, CliError> {
    if let Some(password) = password {
        return Ok(password);
    }

    let stdin = io::stdin();
    if stdin.is_terminal() {
        print!("Password: ");
        io::stdout().flush()?;
    }
    let mut line = String::new();
    stdin.lock().read_line(&mut line)?;
    let password = line.trim_end_matches(['\r', '\n']).to_string();
    if password.is_empty() {
        return Err(CliError::InvalidArgument(
            "password must not be empty".to_string(),
        ));
    }
    Ok(password)
}

pub fn resolve_db_path(cli_db_path: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_db_path.or_else(|| env::var_os("TMM_DB_PATH").map(PathBuf::from)) {
        return Ok(path);
    }
    dirs::data_dir()
        .map(|dir| dir.join(APP_DIR).join("tmm.db"))
        .ok_or_else(|| CliError::Config("Failed to resolve data directory".to_string()))
}

pub fn resolve_config_path(cli_config: Option<PathBuf>) -> Result<PathBuf, CliError> {
    if let Some(path) = cli_config.or_else(|| env::var_os("TMM_CONFIG").map(PathBuf::from)) {
        return Ok(path);
    }
    dirs::config_dir()
        .map(|dir| dir.join(APP_DIR).join("config.json"))
        .ok_or_else(|| CliError::Config("Failed to resolve config directory".to_string()))
}

pub fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
