//! Database migrations

use crate::error::Result;
use libsql::Connection;

/// Current schema version
const CURRENT_VERSION: i32 = 1;

/// Run all pending migrations
pub async fn run(conn: &Connection) -> Result<()> {
    let version = get_version(conn).await?;

    if version < 1 {
        migrate_v1(conn).await?;
    }

    Ok(())
}

/// Get the current schema version
async fn get_version(conn: &Connection) -> Result<i32> {
    let mut rows = conn
        .query(
            "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type='table' AND name='schema_version')",
            (),
        )
        .await?;

    let exists: bool = if let Some(row) = rows.next().await? {
        row.get::<i32>(0)? != 0
    } else {
        false
    };

    if !exists {
        return Ok(0);
    }

    let mut rows = conn
        .query("SELECT COALESCE(MAX(version), 0) FROM schema_version", ())
        .await?;

    let version: i32 = if let Some(row) = rows.next().await? {
        row.get(0)?
    } else {
        0
    };

    Ok(version)
}

/// Envelope columns shared by both record tables.
///
/// `server_id` and `local_id` are both nullable; SQLite allows many NULLs in a
/// UNIQUE column, so each non-null identifier still maps to exactly one row.
fn record_table_statements(table: &str) -> [String; 3] {
    [
        format!(
            "CREATE TABLE IF NOT EXISTS {table} (
                row_id INTEGER PRIMARY KEY AUTOINCREMENT,
                server_id INTEGER UNIQUE,
                local_id TEXT UNIQUE,
                owner_id INTEGER NOT NULL,
                year INTEGER NOT NULL,
                needs_sync INTEGER NOT NULL DEFAULT 1,
                deleted INTEGER NOT NULL DEFAULT 0,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL,
                server_updated_at INTEGER,
                payload TEXT NOT NULL
            )"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_partition_deleted
             ON {table}(owner_id, year, deleted)"
        ),
        format!(
            "CREATE INDEX IF NOT EXISTS idx_{table}_partition_dirty
             ON {table}(owner_id, year, needs_sync)"
        ),
    ]
}

/// Migration to version 1: Initial schema
async fn migrate_v1(conn: &Connection) -> Result<()> {
    conn.execute("BEGIN TRANSACTION", ()).await?;

    let mut statements = vec![
        // Schema version tracking
        "CREATE TABLE IF NOT EXISTS schema_version (
            version INTEGER PRIMARY KEY
        )"
        .to_string(),
        // Cached identity (singleton in practice)
        "CREATE TABLE IF NOT EXISTS users (
            id INTEGER PRIMARY KEY,
            username TEXT NOT NULL,
            display_name TEXT NOT NULL,
            token TEXT NOT NULL,
            last_sync INTEGER
        )"
        .to_string(),
        // Audit trail of intended mutations
        "CREATE TABLE IF NOT EXISTS sync_queue (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            entity TEXT NOT NULL,
            action TEXT NOT NULL,
            payload TEXT NOT NULL,
            timestamp INTEGER NOT NULL,
            retry_count INTEGER NOT NULL DEFAULT 0
        )"
        .to_string(),
        "CREATE INDEX IF NOT EXISTS idx_sync_queue_timestamp ON sync_queue(timestamp)".to_string(),
    ];
    statements.extend(record_table_statements("categories"));
    statements.extend(record_table_statements("transactions"));
    statements.push("INSERT INTO schema_version (version) VALUES (1)".to_string());

    for stmt in &statements {
        if let Err(e) = conn.execute(stmt, ()).await {
            conn.execute("ROLLBACK", ()).await.ok();
            return Err(e.into());
        }
    }

    if let Err(e) = conn.execute("COMMIT", ()).await {
        conn.execute("ROLLBACK", ()).await.ok();
        return Err(e.into());
    }

    tracing::info!("Migrated database to version {CURRENT_VERSION}");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use libsql::Builder;

    async fn setup() -> Connection {
        let db = Builder::new_local(":memory:").build().await.unwrap();
        db.connect().unwrap()
    }

    async fn table_exists(conn: &Connection, name: &str) -> bool {
        let mut rows = conn
            .query(
                "SELECT EXISTS(SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?)",
                [name],
            )
            .await
            .unwrap();
        rows.next()
            .await
            .unwrap()
            .is_some_and(|row| row.get::<i32>(0).unwrap() != 0)
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migrations_idempotent() {
        let conn = setup().await;
        run(&conn).await.unwrap();
        run(&conn).await.unwrap(); // Should not fail

        let version = get_version(&conn).await.unwrap();
        assert_eq!(version, CURRENT_VERSION);
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_migration_v1_creates_all_collections() {
        let conn = setup().await;
        run(&conn).await.unwrap();

        for table in ["users", "categories", "transactions", "sync_queue"] {
            assert!(table_exists(&conn, table).await, "missing table {table}");
        }
    }
}
