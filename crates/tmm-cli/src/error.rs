use std::io;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error(transparent)]
    Core(#[from] tmm_core::Error),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    #[error("Configuration error: {0}")]
    Config(String),
    #[error("Not signed in. Run `tmm auth login <username>` first.")]
    NotSignedIn,
    #[error("Authentication failed: {0}")]
    AuthFailed(String),
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
    #[error("Category not found: {0}")]
    CategoryNotFound(String),
    #[error("Sync failed ({code}): {message}")]
    SyncFailed { code: String, message: String },
}
