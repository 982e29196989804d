//! Bounded retry queue for failed sync keys.

use std::collections::{HashSet, VecDeque};
use std::time::{Duration, Instant};

use serde::Serialize;

use super::SyncKey;
use crate::config::SyncSettings;

/// A sync key waiting for another attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryEntry {
    pub key: SyncKey,
    pub attempts: u32,
    pub last_attempt: Instant,
}

/// Serializable view of a queued retry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingRetry {
    pub key: String,
    pub attempts: u32,
    pub max_retries: u32,
}

/// Keys picked by [`RetryQueue::take_due`].
#[derive(Debug, Default, PartialEq, Eq)]
pub struct DueRetries {
    /// Keys to sync now; their attempt counters were already bumped
    pub due: Vec<SyncKey>,
    /// Keys that exhausted `max_retries` and left the queue
    pub exhausted: Vec<SyncKey>,
}

/// Retry bookkeeping. Each key appears at most once.
///
/// A key becomes due once `base_delay × 2^attempts` has elapsed since its
/// last attempt. Time is passed in explicitly so the policy is testable.
#[derive(Debug)]
pub struct RetryQueue {
    entries: VecDeque<RetryEntry>,
    capacity: usize,
    base_delay: Duration,
    max_retries: u32,
    max_age: Duration,
}

impl RetryQueue {
    pub fn new(settings: &SyncSettings) -> Self {
        Self {
            entries: VecDeque::new(),
            capacity: settings.retry_queue_capacity.max(1),
            base_delay: settings.base_retry_delay(),
            max_retries: settings.max_retries,
            max_age: settings.max_retry_age(),
        }
    }

    pub const fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Backoff before attempt number `attempts` (zero-based).
    pub fn delay_for(&self, attempts: u32) -> Duration {
        backoff_delay(self.base_delay, attempts)
    }

    /// Queue `key` unless it is already queued. Returns whether it was added.
    ///
    /// An existing entry keeps its attempt count and timestamp.
    pub fn enqueue(&mut self, key: SyncKey, now: Instant) -> bool {
        if self.contains(key) {
            return false;
        }
        if self.entries.len() >= self.capacity {
            if let Some(evicted) = self.entries.pop_front() {
                tracing::warn!("Retry queue full; dropping oldest entry {}", evicted.key);
            }
        }
        self.entries.push_back(RetryEntry {
            key,
            attempts: 0,
            last_attempt: now,
        });
        true
    }

    pub fn remove(&mut self, key: SyncKey) -> bool {
        let before = self.entries.len();
        self.entries.retain(|entry| entry.key != key);
        before != self.entries.len()
    }

    pub fn contains(&self, key: SyncKey) -> bool {
        self.entries.iter().any(|entry| entry.key == key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn entries(&self) -> impl Iterator<Item = &RetryEntry> {
        self.entries.iter()
    }

    /// Select keys whose backoff has elapsed.
    ///
    /// Exhausted entries are removed; due entries stay queued with their
    /// attempt counter incremented and `last_attempt = now`. Keys in `busy`
    /// already have a cycle running and are left untouched.
    pub fn take_due(&mut self, now: Instant, busy: &HashSet<SyncKey>) -> DueRetries {
        let mut result = DueRetries::default();
        let max_retries = self.max_retries;
        let base = self.base_delay;

        self.entries.retain_mut(|entry| {
            if busy.contains(&entry.key) {
                return true;
            }
            let waited = now.saturating_duration_since(entry.last_attempt);
            if waited < backoff_delay(base, entry.attempts) {
                return true;
            }
            if entry.attempts >= max_retries {
                result.exhausted.push(entry.key);
                return false;
            }
            entry.attempts += 1;
            entry.last_attempt = now;
            result.due.push(entry.key);
            true
        });

        result
    }

    /// Give back an attempt that never reached the server.
    pub fn refund(&mut self, key: SyncKey) -> bool {
        match self.entries.iter_mut().find(|entry| entry.key == key) {
            Some(entry) => {
                entry.attempts = entry.attempts.saturating_sub(1);
                true
            }
            None => false,
        }
    }

    /// Drop entries whose last attempt is at least `max_age` old.
    pub fn purge_expired(&mut self, now: Instant) -> usize {
        let before = self.entries.len();
        let max_age = self.max_age;
        self.entries
            .retain(|entry| now.saturating_duration_since(entry.last_attempt) < max_age);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn pending(&self) -> Vec<PendingRetry> {
        self.entries
            .iter()
            .map(|entry| PendingRetry {
                key: entry.key.to_string(),
                attempts: entry.attempts,
                max_retries: self.max_retries,
            })
            .collect()
    }
}

/// `base × 2^attempts`, saturating at `Duration::MAX`.
pub fn backoff_delay(base: Duration, attempts: u32) -> Duration {
    2_u32
        .checked_pow(attempts)
        .and_then(|factor| base.checked_mul(factor))
        .unwrap_or(Duration::MAX)
}
