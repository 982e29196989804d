//! Database connection management

use crate::error::Result;
use libsql::{Builder, Connection, Database as LibSqlDatabase};
use std::path::Path;

use super::migrations;

/// Database wrapper for a local libSQL file
pub struct Database {
    _db: LibSqlDatabase,
    conn: Connection,
}

impl Database {
    /// Open a local database at the given path, creating it if it doesn't exist
    ///
    /// Runs migrations automatically.
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path_str = path.as_ref().to_string_lossy().to_string();
        let db = Builder::new_local(&path_str).build().await?;
        Self::from_database(db).await
    }

    /// Open an in-memory database (useful for testing)
    pub async fn open_in_memory() -> Result<Self> {
        let db = Builder::new_local(":memory:").build().await?;
        Self::from_database(db).await
    }

    async fn from_database(db: LibSqlDatabase) -> Result<Self> {
        let conn = db.connect()?;
        let database = Self { _db: db, conn };
        database.configure().await?;
        database.migrate().await?;
        Ok(database)
    }

    /// Configure `SQLite` for an embedded single-writer workload
    async fn configure(&self) -> Result<()> {
        // In-memory databases reject WAL; ignore the error there
        self.conn
            .execute("PRAGMA journal_mode = WAL;", ())
            .await
            .ok();
        self.conn
            .execute("PRAGMA synchronous = NORMAL;", ())
            .await
            .ok();
        self.conn.execute("PRAGMA foreign_keys = ON;", ()).await?;
        Ok(())
    }

    /// Run database migrations
    async fn migrate(&self) -> Result<()> {
        migrations::run(&self.conn).await
    }

    /// Get a reference to the underlying connection
    pub const fn connection(&self) -> &Connection {
        &self.conn
    }

    /// Start an explicit transaction
    pub async fn begin(&self) -> Result<()> {
        self.conn.execute("BEGIN TRANSACTION", ()).await?;
        Ok(())
    }

    /// Commit the open transaction, rolling back if the commit itself fails
    pub async fn commit(&self) -> Result<()> {
        if let Err(e) = self.conn.execute("COMMIT", ()).await {
            self.rollback().await;
            return Err(e.into());
        }
        Ok(())
    }

    /// Roll back the open transaction; errors are ignored since there is nothing left to undo
    pub async fn rollback(&self) {
        self.conn.execute("ROLLBACK", ()).await.ok();
    }
}
