//! Record repository implementation
//!
//! Categories and transactions share one row layout: the sync envelope as
//! columns and the entity's domain fields as a JSON `payload`. The repository
//! is generic over [`RecordFields`] and only does row-level work; lifecycle
//! rules (dirty flags, tombstones, local IDs) live in `LocalStore`.

use std::marker::PhantomData;

use libsql::{params, Connection, Row, Value};

use crate::error::{Error, Result};
use crate::models::{LocalId, Record, RecordFields, RecordKey, SyncMeta};
use crate::util::from_millis;

const COLUMNS: &str = "server_id, local_id, owner_id, year, needs_sync, deleted, \
                       created_at, updated_at, server_updated_at, payload";

/// Trait for partitioned record storage operations (async)
#[allow(async_fn_in_trait)]
pub trait RecordRepository<F: RecordFields> {
    /// Find a record by key, tombstones included
    async fn find(&self, key: &RecordKey) -> Result<Option<Record<F>>>;

    /// Non-deleted records of a partition
    async fn list_partition(&self, owner_id: i64, year: i32) -> Result<Vec<Record<F>>>;

    /// Dirty records of a partition, tombstones included
    async fn list_dirty(&self, owner_id: i64, year: i32) -> Result<Vec<Record<F>>>;

    /// Every record of an owner across all years, tombstones included
    async fn list_owner(&self, owner_id: i64) -> Result<Vec<Record<F>>>;

    /// Insert or overwrite a record, matched by server id first and local id second
    async fn put(&self, record: &Record<F>) -> Result<()>;

    /// Rewrite the row still keyed by `local_id` with `record` (which now carries a server id),
    /// dropping any other row that already claims the same server id.
    async fn replace_local(&self, local_id: &LocalId, record: &Record<F>) -> Result<bool>;

    /// Permanently delete a record
    async fn remove(&self, key: &RecordKey) -> Result<bool>;

    /// Total and dirty row counts
    async fn counts(&self) -> Result<(usize, usize)>;

    /// Delete every row
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `RecordRepository`
pub struct LibSqlRecordRepository<'a, F> {
    conn: &'a Connection,
    _fields: PhantomData<F>,
}

impl<'a, F: RecordFields> LibSqlRecordRepository<'a, F> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self {
            conn,
            _fields: PhantomData,
        }
    }

    async fn query_records(&self, sql: &str, params: Vec<Value>) -> Result<Vec<Record<F>>> {
        let mut rows = self.conn.query(sql, params).await?;
        let mut records = Vec::new();
        while let Some(row) = rows.next().await? {
            records.push(Self::parse_record(&row)?);
        }
        Ok(records)
    }

    /// Parse a record from a database row selected with `COLUMNS`
    fn parse_record(row: &Row) -> Result<Record<F>> {
        let payload: String = row.get(9)?;
        Ok(Record {
            meta: SyncMeta {
                id: nullable_integer(row, 0)?,
                local_id: nullable_text(row, 1)?.map(LocalId::from),
                owner_id: row.get(2)?,
                year: row.get(3)?,
                needs_sync: row.get::<i64>(4)? != 0,
                deleted: row.get::<i64>(5)? != 0,
                created_at: from_millis(row.get(6)?),
                updated_at: from_millis(row.get(7)?),
                server_updated_at: nullable_integer(row, 8)?.map(from_millis),
            },
            fields: serde_json::from_str(&payload)?,
        })
    }

    fn row_values(record: &Record<F>) -> Result<Vec<Value>> {
        let meta = &record.meta;
        Ok(vec![
            opt_integer(meta.id),
            opt_text(meta.local_id.as_ref().map(LocalId::as_str)),
            Value::Integer(meta.owner_id),
            Value::Integer(i64::from(meta.year)),
            Value::Integer(i64::from(meta.needs_sync)),
            Value::Integer(i64::from(meta.deleted)),
            Value::Integer(meta.created_at.timestamp_millis()),
            Value::Integer(meta.updated_at.timestamp_millis()),
            opt_integer(meta.server_updated_at.map(|at| at.timestamp_millis())),
            Value::Text(serde_json::to_string(&record.fields)?),
        ])
    }

    async fn update_where(&self, clause: &str, key: Value, record: &Record<F>) -> Result<u64> {
        let mut values = Self::row_values(record)?;
        values.push(key);
        let sql = format!(
            "UPDATE {} SET server_id = ?, local_id = ?, owner_id = ?, year = ?, needs_sync = ?,
             deleted = ?, created_at = ?, updated_at = ?, server_updated_at = ?, payload = ?
             WHERE {clause}",
            F::TABLE
        );
        Ok(self.conn.execute(&sql, values).await?)
    }
}

impl<F: RecordFields> RecordRepository<F> for LibSqlRecordRepository<'_, F> {
    async fn find(&self, key: &RecordKey) -> Result<Option<Record<F>>> {
        let (clause, value) = key_clause(key);
        let sql = format!("SELECT {COLUMNS} FROM {} WHERE {clause}", F::TABLE);
        Ok(self.query_records(&sql, vec![value]).await?.into_iter().next())
    }

    async fn list_partition(&self, owner_id: i64, year: i32) -> Result<Vec<Record<F>>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE owner_id = ? AND year = ? AND deleted = 0
             ORDER BY row_id",
            F::TABLE
        );
        self.query_records(
            &sql,
            vec![Value::Integer(owner_id), Value::Integer(i64::from(year))],
        )
        .await
    }

    async fn list_dirty(&self, owner_id: i64, year: i32) -> Result<Vec<Record<F>>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE owner_id = ? AND year = ? AND needs_sync = 1
             ORDER BY row_id",
            F::TABLE
        );
        self.query_records(
            &sql,
            vec![Value::Integer(owner_id), Value::Integer(i64::from(year))],
        )
        .await
    }

    async fn list_owner(&self, owner_id: i64) -> Result<Vec<Record<F>>> {
        let sql = format!(
            "SELECT {COLUMNS} FROM {} WHERE owner_id = ? ORDER BY row_id",
            F::TABLE
        );
        self.query_records(&sql, vec![Value::Integer(owner_id)])
            .await
    }

    async fn put(&self, record: &Record<F>) -> Result<()> {
        if let Some(id) = record.meta.id {
            if self
                .update_where("server_id = ?", Value::Integer(id), record)
                .await?
                > 0
            {
                return Ok(());
            }
        }

        if let Some(local_id) = &record.meta.local_id {
            if self
                .update_where(
                    "local_id = ?",
                    Value::Text(local_id.as_str().to_string()),
                    record,
                )
                .await?
                > 0
            {
                return Ok(());
            }
        }

        if record.meta.id.is_none() && record.meta.local_id.is_none() {
            return Err(Error::InvalidInput(
                "record has neither a server id nor a local id".into(),
            ));
        }

        let sql = format!(
            "INSERT INTO {} ({COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
            F::TABLE
        );
        self.conn.execute(&sql, Self::row_values(record)?).await?;
        Ok(())
    }

    async fn replace_local(&self, local_id: &LocalId, record: &Record<F>) -> Result<bool> {
        let local = Value::Text(local_id.as_str().to_string());
        if let Some(id) = record.meta.id {
            let sql = format!(
                "DELETE FROM {} WHERE server_id = ? AND (local_id IS NULL OR local_id != ?)",
                F::TABLE
            );
            let removed = self
                .conn
                .execute(&sql, vec![Value::Integer(id), local.clone()])
                .await?;
            if removed > 0 {
                tracing::debug!("Dropped stale {} row holding server id {id}", F::TABLE);
            }
        }
        Ok(self.update_where("local_id = ?", local, record).await? > 0)
    }

    async fn remove(&self, key: &RecordKey) -> Result<bool> {
        let (clause, value) = key_clause(key);
        let sql = format!("DELETE FROM {} WHERE {clause}", F::TABLE);
        Ok(self.conn.execute(&sql, vec![value]).await? > 0)
    }

    async fn counts(&self) -> Result<(usize, usize)> {
        let sql = format!(
            "SELECT COUNT(*), COALESCE(SUM(needs_sync), 0) FROM {}",
            F::TABLE
        );
        let mut rows = self.conn.query(&sql, ()).await?;
        let Some(row) = rows.next().await? else {
            return Ok((0, 0));
        };
        let total = usize::try_from(row.get::<i64>(0)?).unwrap_or_default();
        let dirty = usize::try_from(row.get::<i64>(1)?).unwrap_or_default();
        Ok((total, dirty))
    }

    async fn clear(&self) -> Result<()> {
        self.conn
            .execute(&format!("DELETE FROM {}", F::TABLE), params![])
            .await?;
        Ok(())
    }
}

fn key_clause(key: &RecordKey) -> (&'static str, Value) {
    match key {
        RecordKey::Server(id) => ("server_id = ?", Value::Integer(*id)),
        RecordKey::Local(local_id) => ("local_id = ?", Value::Text(local_id.as_str().to_string())),
    }
}

fn opt_integer(value: Option<i64>) -> Value {
    value.map_or(Value::Null, Value::Integer)
}

fn opt_text(value: Option<&str>) -> Value {
    value.map_or(Value::Null, |text| Value::Text(text.to_string()))
}

pub(super) fn nullable_integer(row: &Row, idx: i32) -> Result<Option<i64>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Integer(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected integer or NULL in column {idx}, found {other:?}"
        ))),
    }
}

pub(super) fn nullable_text(row: &Row, idx: i32) -> Result<Option<String>> {
    match row.get_value(idx)? {
        Value::Null => Ok(None),
        Value::Text(value) => Ok(Some(value)),
        other => Err(Error::Database(format!(
            "expected text or NULL in column {idx}, found {other:?}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use crate::models::{CategoryFields, EntryKind};

    async fn setup() -> Database {
        Database::open_in_memory().await.unwrap()
    }

    fn local_category(name: &str, owner_id: i64, year: i32) -> Record<CategoryFields> {
        let mut record = Record::new(CategoryFields::new(name, EntryKind::Expense));
        record.meta.local_id = Some(LocalId::generate());
        record.meta.owner_id = owner_id;
        record.meta.year = year;
        record
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_and_find_by_local_id() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<CategoryFields>::new(db.connection());

        let record = local_category("Groceries", 1, 2024);
        repo.put(&record).await.unwrap();

        let fetched = repo.find(&record.key().unwrap()).await.unwrap().unwrap();
        assert_eq!(fetched, record);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_overwrites_existing_row() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<CategoryFields>::new(db.connection());

        let mut record = local_category("Groceries", 1, 2024);
        repo.put(&record).await.unwrap();
        record.fields.name = "Food".to_string();
        repo.put(&record).await.unwrap();

        let all = repo.list_partition(1, 2024).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].fields.name, "Food");
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn put_rejects_unidentified_record() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<CategoryFields>::new(db.connection());

        let record = Record::new(CategoryFields::new("Nameless", EntryKind::Income));
        assert!(repo.put(&record).await.is_err());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn list_partition_skips_tombstones_and_other_partitions() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<CategoryFields>::new(db.connection());

        let kept = local_category("Kept", 1, 2024);
        let mut gone = local_category("Gone", 1, 2024);
        gone.meta.deleted = true;
        repo.put(&kept).await.unwrap();
        repo.put(&gone).await.unwrap();
        repo.put(&local_category("Other year", 1, 2023)).await.unwrap();
        repo.put(&local_category("Other owner", 2, 2024)).await.unwrap();

        let listed = repo.list_partition(1, 2024).await.unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].fields.name, "Kept");

        let dirty = repo.list_dirty(1, 2024).await.unwrap();
        assert_eq!(dirty.len(), 2);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn replace_local_drops_stale_server_row() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<CategoryFields>::new(db.connection());

        let mut stale = Record::new(CategoryFields::new("Stale", EntryKind::Expense));
        stale.meta.id = Some(42);
        stale.meta.owner_id = 1;
        stale.meta.year = 2024;
        repo.put(&stale).await.unwrap();

        let local = local_category("Fresh", 1, 2024);
        repo.put(&local).await.unwrap();

        let local_id = local.meta.local_id.clone().unwrap();
        let mut adopted = local.clone();
        adopted.meta.id = Some(42);
        adopted.meta.local_id = None;
        assert!(repo.replace_local(&local_id, &adopted).await.unwrap());

        let rows = repo.list_owner(1).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].fields.name, "Fresh");
        assert_eq!(rows[0].meta.id, Some(42));
        assert!(rows[0].meta.local_id.is_none());
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn counts_and_clear() {
        let db = setup().await;
        let repo = LibSqlRecordRepository::<CategoryFields>::new(db.connection());

        repo.put(&local_category("A", 1, 2024)).await.unwrap();
        let mut clean = Record::new(CategoryFields::new("B", EntryKind::Income));
        clean.meta.id = Some(5);
        clean.meta.needs_sync = false;
        clean.meta.owner_id = 1;
        clean.meta.year = 2024;
        repo.put(&clean).await.unwrap();

        assert_eq!(repo.counts().await.unwrap(), (2, 1));
        repo.clear().await.unwrap();
        assert_eq!(repo.counts().await.unwrap(), (0, 0));
    }
}
