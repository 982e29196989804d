//! Cached-user repository implementation

use libsql::{params, Connection, Value};

use super::repository::nullable_integer;
use crate::error::Result;
use crate::models::User;
use crate::util::from_millis;

/// Trait for the single cached user row (async)
#[allow(async_fn_in_trait)]
pub trait UserRepository {
    /// Load the cached user, if any
    async fn load(&self) -> Result<Option<User>>;

    /// Replace the cached user
    async fn save(&self, user: &User) -> Result<()>;

    /// Forget the cached user
    async fn clear(&self) -> Result<()>;
}

/// libSQL implementation of `UserRepository`
pub struct LibSqlUserRepository<'a> {
    conn: &'a Connection,
}

impl<'a> LibSqlUserRepository<'a> {
    /// Create a new repository with the given connection
    pub const fn new(conn: &'a Connection) -> Self {
        Self { conn }
    }
}

impl UserRepository for LibSqlUserRepository<'_> {
    async fn load(&self) -> Result<Option<User>> {
        let mut rows = self
            .conn
            .query(
                "SELECT id, username, display_name, token, last_sync FROM users LIMIT 1",
                (),
            )
            .await?;

        let Some(row) = rows.next().await? else {
            return Ok(None);
        };

        Ok(Some(User {
            id: row.get(0)?,
            username: row.get(1)?,
            display_name: row.get(2)?,
            token: row.get(3)?,
            last_sync: nullable_integer(&row, 4)?.map(from_millis),
        }))
    }

    async fn save(&self, user: &User) -> Result<()> {
        // One user per device: a different login replaces the previous identity
        self.conn.execute("DELETE FROM users", ()).await?;
        self.conn
            .execute(
                "INSERT INTO users (id, username, display_name, token, last_sync)
                 VALUES (?, ?, ?, ?, ?)",
                vec![
                    Value::Integer(user.id),
                    Value::Text(user.username.clone()),
                    Value::Text(user.display_name.clone()),
                    Value::Text(user.token.clone()),
                    user.last_sync
                        .map_or(Value::Null, |at| Value::Integer(at.timestamp_millis())),
                ],
            )
            .await?;
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        self.conn.execute("DELETE FROM users", params![]).await?;
        Ok(())
    }
}
