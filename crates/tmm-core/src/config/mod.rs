//! Client configuration.
//!
//! Resolution order: JSON file (when present) → `TMM_API_URL` override →
//! built-in defaults. The binary decides where the file lives.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::util::{is_http_url, normalize_text_option};

/// Environment variable overriding the API base URL.
pub const API_URL_ENV: &str = "TMM_API_URL";

pub const DEFAULT_API_BASE_URL: &str = "http://localhost:3001/api";

/// Tunables for the sync coordinator and its background tasks.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct SyncSettings {
    /// Backoff base; attempt `n` waits `base × 2^n`
    pub base_retry_delay_ms: u64,
    pub max_retries: u32,
    /// Upper bound for the reachability probe
    pub probe_timeout_ms: u64,
    /// Transport timeout applied to every API call
    pub request_timeout_secs: u64,
    pub retry_sweep_secs: u64,
    pub expiry_sweep_secs: u64,
    /// Retry entries older than this are purged regardless of attempts
    pub max_retry_age_secs: u64,
    pub retry_queue_capacity: usize,
    /// Interval between full syncs in `tmm sync watch`
    pub watch_interval_secs: u64,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            base_retry_delay_ms: 1_000,
            max_retries: 3,
            probe_timeout_ms: 5_000,
            request_timeout_secs: 30,
            retry_sweep_secs: 30,
            expiry_sweep_secs: 5 * 60,
            max_retry_age_secs: 24 * 60 * 60,
            retry_queue_capacity: 64,
            watch_interval_secs: 5 * 60,
        }
    }
}

impl SyncSettings {
    pub const fn base_retry_delay(&self) -> Duration {
        Duration::from_millis(self.base_retry_delay_ms)
    }

    pub const fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub const fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub const fn retry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.retry_sweep_secs)
    }

    pub const fn expiry_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.expiry_sweep_secs)
    }

    pub const fn max_retry_age(&self) -> Duration {
        Duration::from_secs(self.max_retry_age_secs)
    }

    pub const fn watch_interval(&self) -> Duration {
        Duration::from_secs(self.watch_interval_secs)
    }

    fn validate(&self) -> Result<(), String> {
        if self.base_retry_delay_ms == 0 {
            return Err("sync.base_retry_delay_ms must be greater than zero".to_string());
        }
        if self.probe_timeout_ms == 0 || self.request_timeout_secs == 0 {
            return Err("sync timeouts must be greater than zero".to_string());
        }
        if self.retry_sweep_secs == 0 || self.expiry_sweep_secs == 0 {
            return Err("sync sweep intervals must be greater than zero".to_string());
        }
        if self.retry_queue_capacity == 0 {
            return Err("sync.retry_queue_capacity must be greater than zero".to_string());
        }
        Ok(())
    }
}

/// Settings shared by every front-end.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ClientConfig {
    #[serde(default = "default_api_base_url")]
    pub api_base_url: String,
    #[serde(default)]
    pub sync: SyncSettings,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_base_url: default_api_base_url(),
            sync: SyncSettings::default(),
        }
    }
}

impl ClientConfig {
    /// Resolve configuration from an optional JSON file and an optional URL override.
    ///
    /// A missing file is not an error; an unreadable or malformed one is.
    pub fn resolve(path: Option<&Path>, api_url_override: Option<String>) -> Result<Self, String> {
        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(path)?,
            _ => Self::default(),
        };

        if let Some(url) = normalize_text_option(api_url_override) {
            tracing::debug!("Using API URL from {API_URL_ENV}");
            config.api_base_url = url;
        }

        config.api_base_url = normalize_api_url(&config.api_base_url)?;
        config.sync.validate()?;
        Ok(config)
    }

    /// Parse a configuration file.
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let raw = std::fs::read_to_string(path)
            .map_err(|error| format!("failed to read config {}: {error}", path.display()))?;
        Self::parse(&raw)
            .map_err(|error| format!("invalid config {}: {error}", path.display()))
    }

    /// Parse a configuration payload.
    pub fn parse(raw: &str) -> Result<Self, String> {
        serde_json::from_str(raw).map_err(|error| error.to_string())
    }
}

fn default_api_base_url() -> String {
    DEFAULT_API_BASE_URL.to_string()
}

/// Trim, require an http(s) scheme and drop trailing slashes.
pub fn normalize_api_url(raw: &str) -> Result<String, String> {
    let value = normalize_text_option(Some(raw.to_string()))
        .ok_or_else(|| "API base URL must not be empty".to_string())?;
    if !is_http_url(&value) {
        return Err(format!(
            "API base URL '{value}' must include http:// or https://"
        ));
    }
    Ok(value.trim_end_matches('/').to_string())
}
