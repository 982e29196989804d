//! Offline-first synchronization engine.
//!
//! The [`SyncCoordinator`] reconciles the local store with the remote API per
//! (owner, year) partition: download and merge, upload dirty records, then
//! check that nothing is left dirty. Failures come back as [`SyncOutcome`]
//! values and retryable ones are parked in a [`RetryQueue`].

mod coordinator;
mod entity;
mod events;
mod merge;
mod outcome;
mod retry;
mod scheduler;

use std::fmt;

use serde::Serialize;

pub use coordinator::{SyncCoordinator, SyncStatus};
pub use entity::SyncEntity;
pub use events::{SyncEvent, SyncEventStatus, SyncEvents};
pub use merge::{decide, MergeDecision};
pub use outcome::{classify_api_error, CycleError, SyncCode, SyncOutcome};
pub use retry::{backoff_delay, DueRetries, PendingRetry, RetryEntry, RetryQueue};
pub use scheduler::SyncScheduler;

/// One sync partition: an owner's data for one year.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncKey {
    pub owner_id: i64,
    pub year: i32,
}

impl SyncKey {
    pub const fn new(owner_id: i64, year: i32) -> Self {
        Self { owner_id, year }
    }
}

impl fmt::Display for SyncKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}_{}", self.owner_id, self.year)
    }
}
