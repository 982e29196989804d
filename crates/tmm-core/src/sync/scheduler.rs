//! Periodic retry and expiry sweeps.

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use super::coordinator::SyncCoordinator;
use crate::api::RemoteApi;

/// Background task driving a coordinator's retry queue.
///
/// The retry sweep re-runs due keys; the expiry sweep drops stale entries.
/// Dropping the scheduler stops the task.
#[derive(Debug)]
pub struct SyncScheduler {
    handle: JoinHandle<()>,
}

impl SyncScheduler {
    /// Start sweeping at the intervals configured in the coordinator's settings.
    pub fn spawn<A: RemoteApi + 'static>(coordinator: Arc<SyncCoordinator<A>>) -> Self {
        let retry_every = coordinator.settings().retry_sweep_interval();
        let expire_every = coordinator.settings().expiry_sweep_interval();
        Self::spawn_with(coordinator, retry_every, expire_every)
    }

    pub fn spawn_with<A: RemoteApi + 'static>(
        coordinator: Arc<SyncCoordinator<A>>,
        retry_every: Duration,
        expire_every: Duration,
    ) -> Self {
        let handle = tokio::spawn(async move {
            let mut retry_sweep = tokio::time::interval(retry_every);
            let mut expiry_sweep = tokio::time::interval(expire_every);
            retry_sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            expiry_sweep.set_missed_tick_behavior(MissedTickBehavior::Delay);
            // Both intervals fire immediately; skip that first tick
            retry_sweep.tick().await;
            expiry_sweep.tick().await;

            tracing::debug!(
                "Sync scheduler started: retry every {retry_every:?}, expiry every {expire_every:?}"
            );
            loop {
                tokio::select! {
                    _ = retry_sweep.tick() => {
                        if coordinator.has_pending_retries() {
                            let attempted = coordinator.process_retry_queue().await;
                            if attempted > 0 {
                                tracing::debug!("Retry sweep attempted {attempted} key(s)");
                            }
                        }
                    }
                    _ = expiry_sweep.tick() => {
                        coordinator.purge_expired();
                    }
                }
            }
        });
        Self { handle }
    }

    pub fn is_running(&self) -> bool {
        !self.handle.is_finished()
    }

    pub fn shutdown(&self) {
        self.handle.abort();
    }
}

impl Drop for SyncScheduler {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
