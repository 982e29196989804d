//! Audit queue repository implementation
//!
//! The queue is a local log of intended mutations. Nothing replays it; the
//! dirty flags on the records themselves drive upload.

use libsql::{Connection, Value};

use crate::error::{Error, Result};
use crate::models::{ChangeAction, EntityKind, QueueEntry};
use crate::util::{from_millis, now_millis};

/// Trait for audit queue operations (async)
#[allow(async_fn_in_trait)]
pub trait QueueRepository {
    /// Append an entry and return its row id
    async fn append(
        &self,
        entity: EntityKind,
        action: ChangeAction,
        payload: &serde_json::Value,
    ) -> Result<i64>;

    /// All entries, oldest first
    async fn list(&self) -> Result<Vec<QueueEntry>>;

    /// Remove one entry
    async fn remove(&self, id: i64) -> Result<bool>;

    /// Number of queued entries
    async fn count(&self) -> Result<usize>;

    /// Remove every entry
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `QueueRepository`
pub struct LibSqlQueueRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlQueueRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }

    fn parse_entry(row: &libsql::Row) -> Result<QueueEntry> {
        let entity: String = row.get(1)?;
        let action: String = row.get(2)?;
        let payload: String = row.get(3)?;
        Ok(QueueEntry {
            id: row.get(0)?,
            entity: entity.parse().map_err(Error::Database)?,
            action: action.parse().map_err(Error::Database)?,
            payload: serde_json::from_str(&payload)?,
            timestamp: from_millis(row.get(4)?),
            retry_count: u32::try_from(row.get::<i64>(5)?).unwrap_or_default(),
        })
    }
}

impl QueueRepository for LibSqlQueueRepository<'_> {
    async fn append(
        &self,
        entity: EntityKind,
        action: ChangeAction,
        payload: &serde_json::Value,
    ) -> Result<i64> {
        self.conn
            .execute(
                "INSERT INTO sync_queue (entity, action, payload, timestamp, retry_count)
                 VALUES (?, ?, ?, ?, 0)",
                vec![
                    Value::Text(entity.as_str().to_string()),
                    Value::Text(action.as_str().to_string()),
                    Value::Text(serde_json::to_string(payload)?),
                    Value::Integer(now_millis().timestamp_millis()),
                ],
            )
            .await?;
        Ok(self.conn.last_insert_rowid())
    }

    async fn list(&self) -> Result<Vec<QueueEntry>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, entity, action, payload, timestamp, retry_count
                 FROM sync_queue ORDER BY timestamp, id",
                (),
            )
            .await?;

        let mut entries = Vec::new();
        while let Some(row) = rows.next().await? {
            entries.push(Self::parse_entry(&row)?);
        }
        Ok(entries)
    }

    async fn remove(&self, id: i64) -> Result<bool> {
        let affected = self
            .conn
            .execute("DELETE FROM sync_queue WHERE id = ?", [id])
            .await?;
        Ok(affected > 0)
    }

    async fn count(&self) -> Result<usize> {
        let mut rows = self
            .conn
            .query("SELECT COUNT(*) FROM sync_queue", ())
            .await?;
        let Some(row) = rows.next().await? else {
            return Ok(0);
        };
        Ok(usize::try_from(row.get::<i64>(0)?).unwrap_or_default())
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM sync_queue", ()).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::Database;
    use serde_json::json;

    #[tokio::test(flavor = "multi_thread")]
    async fn append_list_remove() {
        let db = Database::open_in_memory().await.unwrap();
        let repo = LibSqlQueueRepository::new(db.connection());

        let first = repo
            .append(
                EntityKind::Category,
                ChangeAction::Create,
                &json!({"name": "Food"}),
            )
            .await
            .unwrap();
        repo.append(
            EntityKind::Transaction,
            ChangeAction::Delete,
            &json!({"id": 3}),
        )
        .await
        .unwrap();

        let entries = repo.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, first);
        assert_eq!(entries[0].entity, EntityKind::Category);
        assert_eq!(entries[0].payload["name"], "Food");
        assert_eq!(entries[1].action, ChangeAction::Delete);
        assert_eq!(entries[1].retry_count, 0);

        assert!(repo.remove(first).await.unwrap());
        assert!(!repo.remove(first).await.unwrap());
        assert_eq!(repo.count().await.unwrap(), 1);

        repo.clear().await.unwrap();
        assert_eq!(repo.count().await.unwrap(), 0);
    }
}
