//! Sync status events.
//!
//! Events fan out over a `tokio::sync::broadcast` channel: every subscriber
//! gets its own cursor, so a slow or dropped subscriber never blocks the others.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::outcome::SyncCode;
use super::SyncKey;

const EVENT_CHANNEL_CAPACITY: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncEventStatus {
    Syncing,
    Completed,
    Error,
    Offline,
    Online,
    QuickSync,
    QuickSyncCompleted,
}

/// One status update published by the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncEvent {
    pub status: SyncEventStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub owner_id: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub year: Option<i32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_sync: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code: Option<SyncCode>,
}

impl SyncEvent {
    pub const fn new(status: SyncEventStatus) -> Self {
        Self {
            status,
            progress: None,
            owner_id: None,
            year: None,
            last_sync: None,
            error: None,
            code: None,
        }
    }

    pub(crate) const fn for_key(status: SyncEventStatus, key: SyncKey) -> Self {
        let mut event = Self::new(status);
        event.owner_id = Some(key.owner_id);
        event.year = Some(key.year);
        event
    }

    pub(crate) const fn progress(key: SyncKey, progress: u8) -> Self {
        let mut event = Self::for_key(SyncEventStatus::Syncing, key);
        event.progress = Some(progress);
        event
    }
}

/// Publishing side of the event stream.
#[derive(Debug, Clone)]
pub struct SyncEvents {
    sender: broadcast::Sender<SyncEvent>,
}

impl Default for SyncEvents {
    fn default() -> Self {
        let (sender, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
        Self { sender }
    }
}

impl SyncEvents {
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.sender.subscribe()
    }

    /// Publish to current subscribers; having none is fine.
    pub fn emit(&self, event: SyncEvent) {
        tracing::trace!(status = ?event.status, progress = ?event.progress, "sync event");
        if self.sender.send(event).is_err() {
            tracing::trace!("No sync event subscribers");
        }
    }
}
