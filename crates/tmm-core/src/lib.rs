//! tmm-core - Core library for TrackMyMoney
//!
//! Offline-first personal finance data: a libSQL local store that is always
//! written first, a remote API client, and a sync coordinator that reconciles
//! the two per (owner, year) partition. Front-ends (the `tmm` CLI) build on
//! the domain stores and the auth service.

pub mod api;
pub mod auth;
pub mod config;
pub mod db;
pub mod error;
pub mod models;
pub mod services;
pub mod session;
pub mod state;
pub mod stores;
pub mod sync;
pub mod util;

pub use error::{Error, Result};
pub use models::{Category, CategoryFields, EntryKind, Record, RecordKey, Transaction, TransactionFields};
pub use services::LocalStore;
pub use session::{Session, SessionContext};
pub use sync::{SyncCoordinator, SyncOutcome};
