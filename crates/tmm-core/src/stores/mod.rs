//! User-facing stores over one partition.
//!
//! Every mutation lands in the [`LocalStore`] first, updates the in-memory
//! list, and appends an audit entry. When the coordinator believes it is
//! online, a quick sync then pushes the change; the stores never call the
//! remote API themselves.

mod categories;
mod transactions;

pub use categories::CategoryStore;
pub use transactions::{CategoryTotal, MonthlySummary, Totals, TransactionStore};

use crate::api::RemoteApi;
use crate::models::{ChangeAction, Record, RecordFields};
use crate::services::LocalStore;
use crate::sync::SyncCoordinator;
use crate::Result;

/// Append a mutation to the audit queue.
async fn record_change<F: RecordFields>(
    store: &LocalStore,
    action: ChangeAction,
    record: &Record<F>,
) -> Result<()> {
    let payload = serde_json::to_value(record)?;
    store.append_queue(F::KIND, action, &payload).await?;
    Ok(())
}

/// Best-effort upload after a mutation. Returns whether it went through.
async fn push_changes<A: RemoteApi>(
    coordinator: &SyncCoordinator<A>,
    owner_id: i64,
    year: i32,
) -> bool {
    if !coordinator.is_online() {
        return false;
    }
    let outcome = coordinator.quick_sync(owner_id, year).await;
    if !outcome.success {
        tracing::debug!(
            "Change for {owner_id}_{year} stays queued locally: {}",
            outcome.code
        );
    }
    outcome.success
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::sync::Arc;

    use crate::api::fake::FakeApi;
    use crate::config::SyncSettings;
    use crate::services::LocalStore;
    use crate::session::{Session, SessionContext};
    use crate::sync::SyncCoordinator;

    pub const OWNER: i64 = 1;
    pub const YEAR: i32 = 2024;

    pub struct Fixture {
        pub api: Arc<FakeApi>,
        pub store: LocalStore,
        pub session: SessionContext,
        pub coordinator: Arc<SyncCoordinator<FakeApi>>,
    }

    /// Signed-in fixture; `online` sets the coordinator's online flag.
    pub async fn fixture(online: bool) -> Fixture {
        let api = Arc::new(FakeApi::new());
        let store = LocalStore::open_in_memory().await.unwrap();
        let session = SessionContext::new();
        session
            .set(Session {
                user_id: OWNER,
                username: "demo".to_string(),
                display_name: "Demo".to_string(),
                token: "token-demo".to_string(),
            })
            .await;
        let coordinator = Arc::new(SyncCoordinator::new(
            api.clone(),
            store.clone(),
            session.clone(),
            SyncSettings::default(),
        ));
        coordinator.set_online(online);
        Fixture {
            api,
            store,
            session,
            coordinator,
        }
    }
}
