//! Sync coordinator: full, quick and background cycles over one partition.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Instant;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::broadcast;

use super::entity::SyncEntity;
use super::events::{SyncEvent, SyncEventStatus, SyncEvents};
use super::merge::{decide, MergeDecision};
use super::outcome::{CycleError, SyncCode, SyncOutcome};
use super::retry::{backoff_delay, DueRetries, PendingRetry, RetryQueue};
use super::SyncKey;
use crate::api::RemoteApi;
use crate::config::SyncSettings;
use crate::models::{
    CategoryFields, Record, RecordKey, ServerRecord, TransactionFields, WriteOrigin,
};
use crate::services::LocalStore;
use crate::session::SessionContext;
use crate::state::SyncState;
use crate::util::{current_year, now_millis};

/// Point-in-time view of the coordinator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub is_online: bool,
    pub is_syncing: bool,
    pub last_sync_time: Option<DateTime<Utc>>,
    pub sync_in_progress: Vec<String>,
    pub retry_queue_size: usize,
    pub pending_retries: Vec<PendingRetry>,
    pub partitions: BTreeMap<String, SyncState>,
}

#[derive(Debug, Default)]
struct MergeCounts {
    inserted: usize,
    overwritten: usize,
    conflicts: usize,
}

#[derive(Debug, Default)]
struct UploadCounts {
    created: usize,
    updated: usize,
    deleted: usize,
    deferred: usize,
    failed: usize,
}

impl fmt::Display for MergeCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} new, {} updated, {} conflicts",
            self.inserted, self.overwritten, self.conflicts
        )
    }
}

impl fmt::Display for UploadCounts {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} created, {} updated, {} deleted, {} deferred, {} failed",
            self.created, self.updated, self.deleted, self.deferred, self.failed
        )
    }
}

enum UploadStep {
    Created,
    Updated,
    Deleted,
    Deferred,
}

/// Releases a claimed sync key when the cycle ends, however it ends.
struct InFlight<'a> {
    keys: &'a Mutex<HashSet<SyncKey>>,
    key: SyncKey,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        lock(self.keys).remove(&self.key);
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Reconciles the local store with the remote API.
///
/// At most one cycle runs per [`SyncKey`]; a second request for a busy key is
/// answered with `SYNC_IN_PROGRESS` before any I/O. The coordinator is the
/// only component that talks to the remote for record data.
pub struct SyncCoordinator<A> {
    api: Arc<A>,
    store: LocalStore,
    session: SessionContext,
    settings: SyncSettings,
    events: SyncEvents,
    online: AtomicBool,
    in_flight: Mutex<HashSet<SyncKey>>,
    states: Mutex<HashMap<SyncKey, SyncState>>,
    retry_queue: Mutex<RetryQueue>,
    last_sync: Mutex<Option<DateTime<Utc>>>,
}

impl<A: RemoteApi> SyncCoordinator<A> {
    pub fn new(
        api: Arc<A>,
        store: LocalStore,
        session: SessionContext,
        settings: SyncSettings,
    ) -> Self {
        let retry_queue = RetryQueue::new(&settings);
        Self {
            api,
            store,
            session,
            settings,
            events: SyncEvents::default(),
            online: AtomicBool::new(true),
            in_flight: Mutex::new(HashSet::new()),
            states: Mutex::new(HashMap::new()),
            retry_queue: Mutex::new(retry_queue),
            last_sync: Mutex::new(None),
        }
    }

    pub const fn settings(&self) -> &SyncSettings {
        &self.settings
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.events.subscribe()
    }

    /// The passive "claims to be online" flag.
    pub fn is_online(&self) -> bool {
        self.online.load(Ordering::SeqCst)
    }

    /// Set the passive online flag, returning the previous value.
    pub fn set_online(&self, online: bool) -> bool {
        self.online.swap(online, Ordering::SeqCst)
    }

    /// Online flag AND a health check that answers within the probe timeout.
    pub async fn is_reachable(&self) -> bool {
        if !self.is_online() {
            return false;
        }
        match tokio::time::timeout(self.settings.probe_timeout(), self.api.health_check()).await {
            Ok(Ok(())) => true,
            Ok(Err(error)) => {
                tracing::debug!("Reachability probe failed: {error}");
                false
            }
            Err(_) => {
                tracing::debug!(
                    "Reachability probe timed out after {:?}",
                    self.settings.probe_timeout()
                );
                false
            }
        }
    }

    pub fn state_of(&self, owner_id: i64, year: i32) -> SyncState {
        lock(&self.states)
            .get(&SyncKey::new(owner_id, year))
            .copied()
            .unwrap_or_default()
    }

    pub fn last_sync(&self) -> Option<DateTime<Utc>> {
        *lock(&self.last_sync)
    }

    pub fn has_pending_retries(&self) -> bool {
        !lock(&self.retry_queue).is_empty()
    }

    /// Download, upload and validate one partition.
    pub async fn full_sync(&self, owner_id: i64, year: i32) -> SyncOutcome {
        let key = SyncKey::new(owner_id, year);
        let Some(_claim) = self.claim(key) else {
            tracing::debug!("Sync for {key} already in progress");
            return SyncOutcome::failed(SyncCode::SyncInProgress);
        };

        if !self.is_reachable().await {
            tracing::info!("Skipping sync for {key}: offline");
            return SyncOutcome::failed(SyncCode::Offline);
        }

        tracing::info!("Starting full sync for {key}");
        self.set_state(key, SyncState::Syncing);
        self.events.emit(SyncEvent::progress(key, 0));

        match self.run_full_cycle(key).await {
            Ok(()) => self.complete(key).await,
            Err(error) => self.fail(key, &error, true),
        }
    }

    /// `full_sync`, repeated after `base × 2^attempt` on retryable failures
    /// until it succeeds or `max_retries` retries were spent.
    pub async fn full_sync_with_backoff(&self, owner_id: i64, year: i32) -> SyncOutcome {
        let max_retries = self.settings.max_retries;
        let mut attempt = 0;
        loop {
            let outcome = self.full_sync(owner_id, year).await;
            if outcome.success || !outcome.code.is_retryable() || attempt >= max_retries {
                return outcome;
            }

            let delay = backoff_delay(self.settings.base_retry_delay(), attempt);
            tracing::info!(
                "Retrying sync for {} in {delay:?} (attempt {}/{max_retries})",
                SyncKey::new(owner_id, year),
                attempt + 1
            );
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }

    /// Upload-only cycle for pushing local edits quickly.
    pub async fn quick_sync(&self, owner_id: i64, year: i32) -> SyncOutcome {
        let key = SyncKey::new(owner_id, year);
        let Some(_claim) = self.claim(key) else {
            return SyncOutcome::failed(SyncCode::SyncInProgress);
        };

        if !self.is_reachable().await {
            return SyncOutcome::failed(SyncCode::Offline);
        }

        self.events
            .emit(SyncEvent::for_key(SyncEventStatus::QuickSync, key));
        match self.upload_all(key).await {
            Ok(()) => {
                self.events
                    .emit(SyncEvent::for_key(SyncEventStatus::QuickSyncCompleted, key));
                SyncOutcome::succeeded(SyncCode::QuickSyncSuccess, self.last_sync())
            }
            Err(error) => self.fail(key, &error, false),
        }
    }

    /// Drain due retries, then run a full sync. Returns `None` when unreachable.
    pub async fn background_sync(&self, owner_id: i64, year: i32) -> Option<SyncOutcome> {
        if !self.is_reachable().await {
            return None;
        }
        self.process_retry_queue().await;
        Some(self.full_sync(owner_id, year).await)
    }

    /// Retry every queued key whose backoff has elapsed. Returns how many were attempted.
    pub async fn process_retry_queue(&self) -> usize {
        if !self.has_pending_retries() || !self.is_reachable().await {
            return 0;
        }

        let busy = lock(&self.in_flight).clone();
        let DueRetries { due, exhausted } =
            lock(&self.retry_queue).take_due(Instant::now(), &busy);
        for key in exhausted {
            tracing::warn!(
                "Dropping {key} from retry queue after {} retries",
                self.settings.max_retries
            );
        }

        let attempted = due.len();
        for key in due {
            let outcome = self.full_sync(key.owner_id, key.year).await;
            if outcome.success {
                tracing::info!("Retry for {key} succeeded");
            } else if outcome.code == SyncCode::SyncInProgress {
                lock(&self.retry_queue).refund(key);
                tracing::debug!("Retry for {key} deferred: a cycle is already running");
            } else {
                tracing::debug!("Retry for {key} failed: {}", outcome.code);
            }
        }
        attempted
    }

    /// Drop retry entries older than the configured maximum age.
    pub fn purge_expired(&self) -> usize {
        let purged = lock(&self.retry_queue).purge_expired(Instant::now());
        if purged > 0 {
            tracing::info!("Purged {purged} expired retry entries");
        }
        purged
    }

    /// Forget in-memory sync bookkeeping. Used on logout.
    pub fn clear_sync_data(&self) {
        lock(&self.in_flight).clear();
        lock(&self.retry_queue).clear();
        lock(&self.states).clear();
        *lock(&self.last_sync) = None;
    }

    pub fn status(&self) -> SyncStatus {
        let sync_in_progress: Vec<String> = {
            let mut keys: Vec<SyncKey> = lock(&self.in_flight).iter().copied().collect();
            keys.sort_unstable();
            keys.iter().map(ToString::to_string).collect()
        };
        let (retry_queue_size, pending_retries) = {
            let queue = lock(&self.retry_queue);
            (queue.len(), queue.pending())
        };
        let partitions = lock(&self.states)
            .iter()
            .map(|(key, state)| (key.to_string(), *state))
            .collect();

        SyncStatus {
            is_online: self.is_online(),
            is_syncing: !sync_in_progress.is_empty(),
            last_sync_time: self.last_sync(),
            sync_in_progress,
            retry_queue_size,
            pending_retries,
            partitions,
        }
    }

    /// React to a connectivity transition. Coming back online triggers a
    /// background sync of the signed-in user's current year.
    pub async fn handle_connectivity_change(&self, online: bool) -> Option<SyncOutcome> {
        let was_online = self.set_online(online);
        if !online {
            tracing::info!("Went offline");
            self.events.emit(SyncEvent::new(SyncEventStatus::Offline));
            return None;
        }

        self.events.emit(SyncEvent::new(SyncEventStatus::Online));
        if was_online {
            return None;
        }

        tracing::info!("Came online; starting background sync");
        let owner_id = self.session.owner_id().await.ok()?;
        self.background_sync(owner_id, current_year()).await
    }

    // ---- cycle internals --------------------------------------------------

    fn claim(&self, key: SyncKey) -> Option<InFlight<'_>> {
        lock(&self.in_flight).insert(key).then_some(InFlight {
            keys: &self.in_flight,
            key,
        })
    }

    fn set_state(&self, key: SyncKey, state: SyncState) {
        lock(&self.states).insert(key, state);
    }

    async fn run_full_cycle(&self, key: SyncKey) -> Result<(), CycleError> {
        let categories = self.download::<CategoryFields>(key).await?;
        let transactions = self.download::<TransactionFields>(key).await?;
        tracing::debug!("Downloaded {key}: categories {categories}; transactions {transactions}");
        self.events.emit(SyncEvent::progress(key, 40));

        self.upload_all(key).await?;
        self.events.emit(SyncEvent::progress(key, 80));

        self.validate(key).await?;
        self.events.emit(SyncEvent::progress(key, 100));
        Ok(())
    }

    async fn upload_all(&self, key: SyncKey) -> Result<(), CycleError> {
        // Categories first: transactions may reference categories created in this pass
        let categories = self.upload::<CategoryFields>(key).await?;
        let transactions = self.upload::<TransactionFields>(key).await?;
        tracing::debug!("Uploaded {key}: categories {categories}; transactions {transactions}");
        Ok(())
    }

    async fn complete(&self, key: SyncKey) -> SyncOutcome {
        let now = now_millis();
        *lock(&self.last_sync) = Some(now);
        lock(&self.retry_queue).remove(key);
        self.set_state(key, SyncState::Completed);

        if let Err(error) = self.store.set_last_sync(key.owner_id, now).await {
            tracing::warn!("Failed to persist last sync time: {error}");
        }

        let mut event = SyncEvent::for_key(SyncEventStatus::Completed, key);
        event.last_sync = Some(now);
        self.events.emit(event);

        tracing::info!("Sync completed for {key}");
        SyncOutcome::succeeded(SyncCode::SyncSuccess, Some(now))
    }

    fn fail(&self, key: SyncKey, error: &CycleError, schedule_retry: bool) -> SyncOutcome {
        let code = error.code();
        tracing::error!("Sync failed for {key} ({code}): {error}");

        let retrying = schedule_retry && code.is_retryable();
        if retrying && lock(&self.retry_queue).enqueue(key, Instant::now()) {
            tracing::info!("Queued {key} for retry");
        }
        if schedule_retry {
            self.set_state(key, SyncState::Error);
        }

        let mut event = SyncEvent::for_key(SyncEventStatus::Error, key);
        event.error = Some(code.message().to_string());
        event.code = Some(code);
        self.events.emit(event);

        let mut outcome =
            SyncOutcome::failed(code).with_message(format!("{}: {error}", code.message()));
        outcome.retrying = retrying;
        outcome
    }

    async fn download<F: SyncEntity>(&self, key: SyncKey) -> Result<MergeCounts, CycleError> {
        let server_records = F::fetch(self.api.as_ref(), key.year).await?;
        let mut counts = MergeCounts::default();
        for server in server_records {
            match self.merge_one(key, server).await? {
                MergeDecision::Insert => counts.inserted += 1,
                MergeDecision::Overwrite => counts.overwritten += 1,
                MergeDecision::Conflict => counts.conflicts += 1,
                MergeDecision::Keep => {}
            }
        }
        Ok(counts)
    }

    async fn merge_one<F: SyncEntity>(
        &self,
        key: SyncKey,
        server: ServerRecord<F>,
    ) -> Result<MergeDecision, CycleError> {
        let local = self
            .store
            .find_record::<F>(&RecordKey::Server(server.id))
            .await?;
        let decision = decide(local.as_ref(), &server);

        match (decision, local) {
            (MergeDecision::Insert, _) => {
                self.store
                    .save_record(
                        Record::from_server(server),
                        key.owner_id,
                        key.year,
                        WriteOrigin::Server,
                    )
                    .await?;
            }
            (MergeDecision::Overwrite, Some(local)) => {
                let mut replacement = Record::from_server(server);
                replacement.meta.created_at = local.meta.created_at;
                self.store
                    .save_record(
                        replacement,
                        local.meta.owner_id,
                        local.meta.year,
                        WriteOrigin::Server,
                    )
                    .await?;
            }
            (MergeDecision::Conflict, Some(local)) => {
                tracing::warn!(
                    "Conflict on {} {} '{}': server changed at {}, keeping local edit from {}",
                    F::KIND.as_str(),
                    server.id,
                    local.fields.label(),
                    server.updated_at,
                    local.meta.updated_at
                );
            }
            _ => {}
        }
        Ok(decision)
    }

    async fn upload<F: SyncEntity>(&self, key: SyncKey) -> Result<UploadCounts, CycleError> {
        let dirty = self
            .store
            .get_unsynced::<F>(key.owner_id, key.year)
            .await?;
        let mut counts = UploadCounts::default();

        for record in &dirty {
            match self.upload_one(record).await {
                Ok(UploadStep::Created) => counts.created += 1,
                Ok(UploadStep::Updated) => counts.updated += 1,
                Ok(UploadStep::Deleted) => counts.deleted += 1,
                Ok(UploadStep::Deferred) => counts.deferred += 1,
                Err(CycleError::Remote(error)) => {
                    counts.failed += 1;
                    tracing::warn!(
                        "Failed to sync {} '{}': {error}",
                        F::KIND.as_str(),
                        record.fields.label()
                    );
                }
                Err(error) => return Err(error),
            }
        }
        Ok(counts)
    }

    async fn upload_one<F: SyncEntity>(&self, record: &Record<F>) -> Result<UploadStep, CycleError> {
        let year = record.meta.year;
        let Some(key) = record.key() else {
            tracing::warn!("Skipping {} without any identifier", F::KIND.as_str());
            return Ok(UploadStep::Deferred);
        };

        if record.meta.deleted {
            if let Some(id) = record.meta.id {
                match F::delete(self.api.as_ref(), id, year).await {
                    Ok(()) => {}
                    Err(error) if error.is_not_found() => {
                        tracing::debug!("{} {id} already gone on server", F::KIND.as_str());
                    }
                    Err(error) => return Err(error.into()),
                }
            }
            self.store.purge_record::<F>(&key).await?;
            return Ok(UploadStep::Deleted);
        }

        if !record.fields.ready_for_upload() {
            tracing::debug!(
                "Deferring {} '{}' until its references are synced",
                F::KIND.as_str(),
                record.fields.label()
            );
            return Ok(UploadStep::Deferred);
        }

        match (record.meta.id, &record.meta.local_id) {
            (None, Some(local_id)) => {
                let server = F::create(self.api.as_ref(), &record.fields, year).await?;
                self.store.mark_synced(local_id, &server).await?;
                tracing::debug!("Created {} {} from {local_id}", F::KIND.as_str(), server.id);
                Ok(UploadStep::Created)
            }
            (Some(id), _) => {
                let server = F::update(self.api.as_ref(), id, &record.fields, year).await?;
                self.store.mark_updated_synced(&key, &server).await?;
                Ok(UploadStep::Updated)
            }
            (None, None) => Ok(UploadStep::Deferred),
        }
    }

    async fn validate(&self, key: SyncKey) -> Result<(), CycleError> {
        let categories = self
            .store
            .get_unsynced::<CategoryFields>(key.owner_id, key.year)
            .await?
            .len();
        let transactions = self
            .store
            .get_unsynced::<TransactionFields>(key.owner_id, key.year)
            .await?
            .len();

        if categories > 0 || transactions > 0 {
            tracing::warn!(
                "Sync incomplete for {key}: {categories} categories and {transactions} transactions still need syncing"
            );
            return Err(CycleError::Incomplete {
                categories,
                transactions,
            });
        }
        Ok(())
    }
}
