//! Local store: the on-device source of truth.
//!
//! Every read and write of categories, transactions, the cached user and the
//! audit queue goes through [`LocalStore`]. It owns the record lifecycle:
//! local-ID allocation, dirty flags, tombstones and the adoption of server ids.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::Mutex;

use crate::db::{
    Database, LibSqlQueueRepository, LibSqlRecordRepository, LibSqlUserRepository,
    QueueRepository, RecordRepository, UserRepository,
};
use crate::models::{
    CategoryFields, CategoryRef, ChangeAction, EntityKind, LocalId, QueueEntry, Record,
    RecordFields, RecordKey, ServerRecord, TransactionFields, User, WriteOrigin,
};
use crate::util::now_millis;
use crate::Result;

/// Row counts reported by [`LocalStore::stats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreStats {
    pub categories_count: usize,
    pub transactions_count: usize,
    pub unsynced_items: usize,
    pub queued_changes: usize,
}

/// Thread-safe handle to the local database.
#[derive(Clone)]
pub struct LocalStore {
    db: Arc<Mutex<Database>>,
    db_path: Option<PathBuf>,
}

impl LocalStore {
    /// Open (or create) the store at the given filesystem path.
    ///
    /// A file that is not a database is moved aside and a fresh one is created.
    pub async fn open_path(db_path: impl Into<PathBuf>) -> Result<Self> {
        let db_path = db_path.into();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let db = match Database::open(&db_path).await {
            Ok(db) => db,
            Err(error) if Self::is_corrupted_db_error(&error) => {
                tracing::warn!(
                    "Local database at {} is unreadable: {}. Starting from an empty store.",
                    db_path.display(),
                    error
                );
                Self::quarantine_corrupted_db_file(&db_path)?;
                Database::open(&db_path).await?
            }
            Err(error) => return Err(error),
        };

        tracing::debug!("Opened local store at {}", db_path.display());
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: Some(db_path),
        })
    }

    /// Open an in-memory store (primarily for tests).
    pub async fn open_in_memory() -> Result<Self> {
        let db = Database::open_in_memory().await?;
        Ok(Self {
            db: Arc::new(Mutex::new(db)),
            db_path: None,
        })
    }

    /// Filesystem location, `None` for in-memory stores.
    pub fn path(&self) -> Option<&Path> {
        self.db_path.as_deref()
    }

    fn is_corrupted_db_error(error: &crate::Error) -> bool {
        error
            .to_string()
            .to_ascii_lowercase()
            .contains("file is not a database")
    }

    fn quarantine_corrupted_db_file(db_path: &Path) -> Result<()> {
        if !db_path.exists() {
            return Ok(());
        }
        let file_name = db_path
            .file_name()
            .map_or_else(|| "tmm.db".into(), |name| name.to_string_lossy());
        let backup_path = db_path.with_file_name(format!(
            "{file_name}.corrupt-{}",
            Utc::now().timestamp_millis()
        ));
        std::fs::rename(db_path, &backup_path)?;
        tracing::warn!(
            "Moved corrupted local database from {} to {}",
            db_path.display(),
            backup_path.display()
        );
        Ok(())
    }

    // ---- records ----------------------------------------------------------

    /// Non-deleted records of a partition.
    pub async fn get_records<F: RecordFields>(
        &self,
        owner_id: i64,
        year: i32,
    ) -> Result<Vec<Record<F>>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<F>::new(db.connection())
            .list_partition(owner_id, year)
            .await
    }

    /// Look a record up by key, tombstones included.
    pub async fn find_record<F: RecordFields>(&self, key: &RecordKey) -> Result<Option<Record<F>>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<F>::new(db.connection())
            .find(key)
            .await
    }

    /// Upsert a record into a partition.
    ///
    /// Local writes get a local id when the record has no identity yet, become
    /// dirty and are stamped with the current time. Server writes are clean and
    /// keep the server's `updated_at` as both `updated_at` and `server_updated_at`.
    /// Entities whose fields imply a year (transactions) are filed under that year.
    pub async fn save_record<F: RecordFields>(
        &self,
        mut record: Record<F>,
        owner_id: i64,
        year: i32,
        origin: WriteOrigin,
    ) -> Result<Record<F>> {
        record.meta.owner_id = owner_id;
        record.meta.year = record.fields.implied_year().unwrap_or(year);

        match origin {
            WriteOrigin::Local => {
                if record.meta.id.is_none() && record.meta.local_id.is_none() {
                    record.meta.local_id = Some(LocalId::generate());
                }
                record.meta.needs_sync = true;
                record.meta.updated_at = now_millis();
            }
            WriteOrigin::Server => {
                record.meta.local_id = None;
                record.meta.needs_sync = false;
                record.meta.server_updated_at = Some(record.meta.updated_at);
            }
        }

        let db = self.db.lock().await;
        LibSqlRecordRepository::<F>::new(db.connection())
            .put(&record)
            .await?;
        Ok(record)
    }

    /// Apply a partial update to a live record of exactly this partition.
    ///
    /// Returns `None` when no such record exists. The record becomes dirty; for
    /// transactions a changed date may move it to another year.
    pub async fn update_record<F: RecordFields>(
        &self,
        key: &RecordKey,
        patch: F::Patch,
        owner_id: i64,
        year: i32,
    ) -> Result<Option<Record<F>>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::<F>::new(db.connection());

        let Some(mut record) = repo.find(key).await? else {
            return Ok(None);
        };
        if !in_partition(&record, owner_id, year) || record.meta.deleted {
            return Ok(None);
        }

        record.fields.apply_patch(patch);
        if let Some(implied) = record.fields.implied_year() {
            record.meta.year = implied;
        }
        record.meta.needs_sync = true;
        record.meta.updated_at = now_millis();

        repo.put(&record).await?;
        Ok(Some(record))
    }

    /// Delete a live record of this partition.
    ///
    /// Local-only records are purged at once; anything the server has seen is
    /// tombstoned and left for the sync coordinator. Returns `false` when no
    /// live record matched.
    pub async fn delete_record<F: RecordFields>(
        &self,
        key: &RecordKey,
        owner_id: i64,
        year: i32,
    ) -> Result<bool> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::<F>::new(db.connection());

        let Some(mut record) = repo.find(key).await? else {
            return Ok(false);
        };
        if !in_partition(&record, owner_id, year) || record.meta.deleted {
            return Ok(false);
        }

        if record.is_local_only() {
            tracing::debug!("Purging local-only {} {key}", F::KIND.as_str());
            return repo.remove(key).await;
        }

        record.meta.deleted = true;
        record.meta.needs_sync = true;
        record.meta.updated_at = now_millis();
        repo.put(&record).await?;
        Ok(true)
    }

    /// Dirty records of a partition, tombstones included.
    pub async fn get_unsynced<F: RecordFields>(
        &self,
        owner_id: i64,
        year: i32,
    ) -> Result<Vec<Record<F>>> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<F>::new(db.connection())
            .list_dirty(owner_id, year)
            .await
    }

    /// Adopt the server's identity and fields for a record created offline.
    ///
    /// Any other row already holding the server id is dropped, and for
    /// categories every transaction still pointing at `local_id` is relinked
    /// to the server id. Calling this again with the same arguments is a no-op.
    pub async fn mark_synced<F: RecordFields>(
        &self,
        local_id: &LocalId,
        server: &ServerRecord<F>,
    ) -> Result<Option<Record<F>>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::<F>::new(db.connection());

        let existing = match repo.find(&RecordKey::Local(local_id.clone())).await? {
            Some(record) => Some(record),
            None => repo.find(&RecordKey::Server(server.id)).await?,
        };
        let Some(mut record) = existing else {
            tracing::debug!(
                "mark_synced: no {} with local id {local_id}",
                F::KIND.as_str()
            );
            return Ok(None);
        };

        let was_local = record.meta.local_id.as_ref() == Some(local_id);
        record.absorb_server(server);

        db.begin().await?;
        let written = if was_local {
            repo.replace_local(local_id, &record).await.map(|_| ())
        } else {
            repo.put(&record).await
        };
        let relinked = match written {
            Ok(()) if F::KIND == EntityKind::Category => {
                relink_category_rows(db.connection(), record.meta.owner_id, local_id, server.id)
                    .await
            }
            Ok(()) => Ok(0),
            Err(error) => Err(error),
        };
        match relinked {
            Ok(count) => {
                db.commit().await?;
                if count > 0 {
                    tracing::debug!("Relinked {count} transaction(s) from {local_id} to {}", server.id);
                }
                Ok(Some(record))
            }
            Err(error) => {
                db.rollback().await;
                Err(error)
            }
        }
    }

    /// Record a confirmed server update of an already-synced record.
    pub async fn mark_updated_synced<F: RecordFields>(
        &self,
        key: &RecordKey,
        server: &ServerRecord<F>,
    ) -> Result<Option<Record<F>>> {
        let db = self.db.lock().await;
        let repo = LibSqlRecordRepository::<F>::new(db.connection());

        let Some(mut record) = repo.find(key).await? else {
            return Ok(None);
        };
        record.absorb_server(server);
        repo.put(&record).await?;
        Ok(Some(record))
    }

    /// Permanently remove a record, typically a tombstone the server confirmed.
    pub async fn purge_record<F: RecordFields>(&self, key: &RecordKey) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlRecordRepository::<F>::new(db.connection())
            .remove(key)
            .await
    }

    /// Count live transactions of `owner_id` that reference `category`.
    pub async fn count_category_references(
        &self,
        owner_id: i64,
        category: &CategoryRef,
    ) -> Result<usize> {
        let db = self.db.lock().await;
        let transactions = LibSqlRecordRepository::<TransactionFields>::new(db.connection())
            .list_owner(owner_id)
            .await?;
        Ok(transactions
            .iter()
            .filter(|transaction| {
                !transaction.meta.deleted && &transaction.fields.category == category
            })
            .count())
    }

    // ---- user -------------------------------------------------------------

    /// The cached user, if someone is signed in on this device.
    pub async fn get_user(&self) -> Result<Option<User>> {
        let db = self.db.lock().await;
        LibSqlUserRepository::new(db.connection()).load().await
    }

    /// Replace the cached user.
    pub async fn save_user(&self, user: &User) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlUserRepository::new(db.connection()).save(user).await
    }

    /// Stamp the cached user's last successful sync.
    pub async fn set_last_sync(&self, user_id: i64, at: DateTime<Utc>) -> Result<()> {
        let db = self.db.lock().await;
        let repo = LibSqlUserRepository::new(db.connection());
        let Some(mut user) = repo.load().await? else {
            return Ok(());
        };
        if user.id != user_id {
            return Ok(());
        }
        user.last_sync = Some(at);
        repo.save(&user).await
    }

    /// Forget the cached user.
    pub async fn clear_user(&self) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlUserRepository::new(db.connection()).clear().await
    }

    // ---- audit queue ------------------------------------------------------

    /// Append an intended mutation to the audit queue.
    pub async fn append_queue(
        &self,
        entity: EntityKind,
        action: ChangeAction,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection())
            .append(entity, action, payload)
            .await
    }

    /// Audit queue, oldest first.
    pub async fn list_queue(&self) -> Result<Vec<QueueEntry>> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).list().await
    }

    /// Remove one audit queue entry.
    pub async fn remove_queue_entry(&self, id: i64) -> Result<bool> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).remove(id).await
    }

    /// Empty the audit queue.
    pub async fn clear_queue(&self) -> Result<()> {
        let db = self.db.lock().await;
        LibSqlQueueRepository::new(db.connection()).clear().await
    }

    // ---- maintenance ------------------------------------------------------

    /// Row counts across the store.
    pub async fn stats(&self) -> Result<StoreStats> {
        let db = self.db.lock().await;
        let conn = db.connection();
        let (categories_count, dirty_categories) =
            LibSqlRecordRepository::<CategoryFields>::new(conn).counts().await?;
        let (transactions_count, dirty_transactions) =
            LibSqlRecordRepository::<TransactionFields>::new(conn)
                .counts()
                .await?;
        let queued_changes = LibSqlQueueRepository::new(conn).count().await?;

        Ok(StoreStats {
            categories_count,
            transactions_count,
            unsynced_items: dirty_categories + dirty_transactions,
            queued_changes,
        })
    }

    /// Wipe every collection. Used on logout.
    pub async fn clear_all(&self) -> Result<()> {
        let db = self.db.lock().await;
        let conn = db.connection();

        db.begin().await?;
        let cleared = async {
            LibSqlRecordRepository::<TransactionFields>::new(conn)
                .clear()
                .await?;
            LibSqlRecordRepository::<CategoryFields>::new(conn)
                .clear()
                .await?;
            LibSqlQueueRepository::new(conn).clear().await?;
            LibSqlUserRepository::new(conn).clear().await
        }
        .await;

        if let Err(error) = cleared {
            db.rollback().await;
            return Err(error);
        }
        db.commit().await?;
        tracing::info!("Cleared local store");
        Ok(())
    }
}

fn in_partition<F>(record: &Record<F>, owner_id: i64, year: i32) -> bool {
    record.meta.owner_id == owner_id && record.meta.year == year
}

async fn relink_category_rows(
    conn: &libsql::Connection,
    owner_id: i64,
    local_id: &LocalId,
    server_id: i64,
) -> Result<usize> {
    let repo = LibSqlRecordRepository::<TransactionFields>::new(conn);
    let mut relinked = 0;
    for mut transaction in repo.list_owner(owner_id).await? {
        if matches!(&transaction.fields.category, CategoryRef::Local(id) if id == local_id) {
            transaction.fields.category = CategoryRef::Server(server_id);
            repo.put(&transaction).await?;
            relinked += 1;
        }
    }
    Ok(relinked)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryPatch, EntryKind, TransactionPatch};
    use chrono::{Duration, NaiveDate};
    use pretty_assertions::assert_eq;

    const OWNER: i64 = 1;
    const YEAR: i32 = 2024;

    fn groceries() -> Record<CategoryFields> {
        Record::new(CategoryFields::new("Groceries", EntryKind::Expense))
    }

    fn lunch(category: CategoryRef) -> Record<TransactionFields> {
        Record::new(TransactionFields {
            amount: 12.5,
            date: NaiveDate::from_ymd_opt(YEAR, 5, 4).unwrap(),
            kind: EntryKind::Expense,
            category,
            description: "Lunch".to_string(),
        })
    }

    fn server_category(id: i64, name: &str) -> ServerRecord<CategoryFields> {
        ServerRecord {
            id,
            fields: CategoryFields::new(name, EntryKind::Expense),
            created_at: None,
            updated_at: now_millis(),
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn offline_create_then_mark_synced() {
        let store = LocalStore::open_in_memory().await.unwrap();

        let saved = store
            .save_record(groceries(), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();
        let local_id = saved.meta.local_id.clone().unwrap();
        assert!(saved.meta.id.is_none());
        assert!(saved.meta.needs_sync);

        let unsynced = store.get_unsynced::<CategoryFields>(OWNER, YEAR).await.unwrap();
        assert_eq!(unsynced.len(), 1);

        let server = server_category(42, "Groceries");
        store.mark_synced(&local_id, &server).await.unwrap();

        let records = store.get_records::<CategoryFields>(OWNER, YEAR).await.unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].meta.id, Some(42));
        assert!(records[0].meta.local_id.is_none());
        assert!(!records[0].meta.needs_sync);
        assert_eq!(records[0].meta.server_updated_at, Some(server.updated_at));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_is_idempotent() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let saved = store
            .save_record(groceries(), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();
        let local_id = saved.meta.local_id.clone().unwrap();
        let server = server_category(7, "Food");

        let first = store.mark_synced(&local_id, &server).await.unwrap();
        let second = store.mark_synced(&local_id, &server).await.unwrap();
        assert_eq!(first, second);

        let records = store.get_records::<CategoryFields>(OWNER, YEAR).await.unwrap();
        assert_eq!(records, vec![first.unwrap()]);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn category_references_skip_tombstones() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let category = store
            .save_record(groceries(), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();
        let reference = CategoryRef::Local(category.meta.local_id.clone().unwrap());
        store
            .save_record(lunch(reference.clone()), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();
        store
            .save_record(lunch(CategoryRef::Server(3)), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();

        assert_eq!(store.count_category_references(OWNER, &reference).await.unwrap(), 1);
        assert_eq!(
            store.count_category_references(OWNER + 1, &reference).await.unwrap(),
            0
        );

        let mut synced = lunch(CategoryRef::Server(3));
        synced.meta.id = Some(77);
        store
            .save_record(synced, OWNER, YEAR, WriteOrigin::Server)
            .await
            .unwrap();
        assert_eq!(
            store
                .count_category_references(OWNER, &CategoryRef::Server(3))
                .await
                .unwrap(),
            2
        );
        assert!(store
            .delete_record::<TransactionFields>(&RecordKey::Server(77), OWNER, YEAR)
            .await
            .unwrap());
        assert_eq!(
            store
                .count_category_references(OWNER, &CategoryRef::Server(3))
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn mark_synced_relinks_transactions() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let category = store
            .save_record(groceries(), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();
        let local_id = category.meta.local_id.clone().unwrap();
        store
            .save_record(
                lunch(CategoryRef::Local(local_id.clone())),
                OWNER,
                YEAR,
                WriteOrigin::Local,
            )
            .await
            .unwrap();

        store
            .mark_synced(&local_id, &server_category(9, "Groceries"))
            .await
            .unwrap();

        let transactions = store
            .get_records::<TransactionFields>(OWNER, YEAR)
            .await
            .unwrap();
        assert_eq!(transactions[0].fields.category, CategoryRef::Server(9));
        assert!(transactions[0].meta.needs_sync);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleting_local_only_record_purges_it() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let saved = store
            .save_record(groceries(), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();
        let key = saved.key().unwrap();

        assert!(store
            .delete_record::<CategoryFields>(&key, OWNER, YEAR)
            .await
            .unwrap());
        assert!(store.find_record::<CategoryFields>(&key).await.unwrap().is_none());
        assert!(store
            .get_unsynced::<CategoryFields>(OWNER, YEAR)
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn deleting_synced_record_leaves_dirty_tombstone() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let synced = Record::from_server(server_category(5, "Rent"));
        store
            .save_record(synced, OWNER, YEAR, WriteOrigin::Server)
            .await
            .unwrap();

        let key = RecordKey::Server(5);
        assert!(store
            .delete_record::<CategoryFields>(&key, OWNER, YEAR)
            .await
            .unwrap());

        assert!(store
            .get_records::<CategoryFields>(OWNER, YEAR)
            .await
            .unwrap()
            .is_empty());
        let unsynced = store.get_unsynced::<CategoryFields>(OWNER, YEAR).await.unwrap();
        assert_eq!(unsynced.len(), 1);
        assert!(unsynced[0].meta.deleted);

        assert!(!store
            .delete_record::<CategoryFields>(&key, OWNER, YEAR)
            .await
            .unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_requires_exact_partition() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let saved = store
            .save_record(groceries(), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();
        let key = saved.key().unwrap();
        let patch = || CategoryPatch {
            name: Some("Food".to_string()),
            kind: None,
        };

        assert!(store
            .update_record::<CategoryFields>(&key, patch(), OWNER, YEAR - 1)
            .await
            .unwrap()
            .is_none());
        assert!(store
            .update_record::<CategoryFields>(&key, patch(), OWNER + 1, YEAR)
            .await
            .unwrap()
            .is_none());

        let updated = store
            .update_record::<CategoryFields>(&key, patch(), OWNER, YEAR)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(updated.fields.name, "Food");
        assert!(updated.meta.needs_sync);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn update_of_synced_record_marks_it_dirty() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let mut server = server_category(11, "Salary");
        server.updated_at -= Duration::seconds(10);
        store
            .save_record(Record::from_server(server), OWNER, YEAR, WriteOrigin::Server)
            .await
            .unwrap();

        let updated = store
            .update_record::<CategoryFields>(
                &RecordKey::Server(11),
                CategoryPatch {
                    name: Some("Wages".to_string()),
                    kind: None,
                },
                OWNER,
                YEAR,
            )
            .await
            .unwrap()
            .unwrap();
        assert!(updated.meta.needs_sync);
        assert!(updated.meta.updated_at > updated.meta.server_updated_at.unwrap());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn changing_transaction_date_moves_partition() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let saved = store
            .save_record(lunch(CategoryRef::Server(1)), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();

        store
            .update_record::<TransactionFields>(
                &saved.key().unwrap(),
                TransactionPatch {
                    date: NaiveDate::from_ymd_opt(YEAR + 1, 1, 2),
                    ..TransactionPatch::default()
                },
                OWNER,
                YEAR,
            )
            .await
            .unwrap()
            .unwrap();

        assert!(store
            .get_records::<TransactionFields>(OWNER, YEAR)
            .await
            .unwrap()
            .is_empty());
        assert_eq!(
            store
                .get_records::<TransactionFields>(OWNER, YEAR + 1)
                .await
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn server_write_keeps_server_timestamp() {
        let store = LocalStore::open_in_memory().await.unwrap();
        let mut server = server_category(3, "Gifts");
        server.updated_at -= Duration::days(2);
        let expected = server.updated_at;

        let saved = store
            .save_record(Record::from_server(server), OWNER, YEAR, WriteOrigin::Server)
            .await
            .unwrap();
        assert_eq!(saved.meta.updated_at, expected);
        assert_eq!(saved.meta.server_updated_at, Some(expected));
        assert!(!saved.meta.needs_sync);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn stats_and_clear_all() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .save_record(groceries(), OWNER, YEAR, WriteOrigin::Local)
            .await
            .unwrap();
        store
            .save_record(
                Record::from_server(server_category(2, "Rent")),
                OWNER,
                YEAR,
                WriteOrigin::Server,
            )
            .await
            .unwrap();
        store
            .append_queue(
                EntityKind::Category,
                ChangeAction::Create,
                &serde_json::json!({"name": "Groceries"}),
            )
            .await
            .unwrap();
        store
            .save_user(&User {
                id: OWNER,
                username: "demo".to_string(),
                display_name: "Demo".to_string(),
                token: "t".to_string(),
                last_sync: None,
            })
            .await
            .unwrap();

        assert_eq!(
            store.stats().await.unwrap(),
            StoreStats {
                categories_count: 2,
                transactions_count: 0,
                unsynced_items: 1,
                queued_changes: 1,
            }
        );

        store.clear_all().await.unwrap();
        assert_eq!(store.stats().await.unwrap(), StoreStats::default());
        assert!(store.get_user().await.unwrap().is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn queue_entries_can_be_removed_one_by_one() {
        let store = LocalStore::open_in_memory().await.unwrap();
        for name in ["Rent", "Food"] {
            store
                .append_queue(
                    EntityKind::Category,
                    ChangeAction::Create,
                    &serde_json::json!({ "name": name }),
                )
                .await
                .unwrap();
        }
        let entries = store.list_queue().await.unwrap();
        assert_eq!(entries.len(), 2);

        assert!(store.remove_queue_entry(entries[0].id).await.unwrap());
        assert!(!store.remove_queue_entry(entries[0].id).await.unwrap());

        let remaining = store.list_queue().await.unwrap();
        assert_eq!(remaining.len(), 1);
        assert_eq!(remaining[0].payload["name"], "Food");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn set_last_sync_updates_matching_user() {
        let store = LocalStore::open_in_memory().await.unwrap();
        store
            .save_user(&User {
                id: OWNER,
                username: "demo".to_string(),
                display_name: "Demo".to_string(),
                token: "t".to_string(),
                last_sync: None,
            })
            .await
            .unwrap();

        let at = now_millis();
        store.set_last_sync(OWNER + 1, at).await.unwrap();
        assert_eq!(store.get_user().await.unwrap().unwrap().last_sync, None);
        store.set_last_sync(OWNER, at).await.unwrap();
        assert_eq!(store.get_user().await.unwrap().unwrap().last_sync, Some(at));
    }

    #[test]
    fn detects_corrupted_database_errors() {
        assert!(LocalStore::is_corrupted_db_error(&crate::Error::Database(
            "SQLite failure: file is not a database".to_string()
        )));
        assert!(!LocalStore::is_corrupted_db_error(&crate::Error::InvalidInput(
            "category name cannot be empty".to_string()
        )));
    }

    #[test]
    fn quarantine_moves_database_file_aside() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("tmm.db");
        std::fs::write(&db_path, b"not a database").unwrap();

        LocalStore::quarantine_corrupted_db_file(&db_path).unwrap();

        assert!(!db_path.exists());
        let moved: Vec<String> = std::fs::read_dir(tmp.path())
            .unwrap()
            .filter_map(std::result::Result::ok)
            .map(|entry| entry.file_name().to_string_lossy().to_string())
            .collect();
        assert_eq!(moved.len(), 1);
        assert!(moved[0].starts_with("tmm.db.corrupt-"));
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn open_path_creates_parent_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let db_path = tmp.path().join("nested").join("tmm.db");

        let store = LocalStore::open_path(&db_path).await.unwrap();
        assert_eq!(store.path(), Some(db_path.as_path()));
        assert!(db_path.exists());
    }
}
