//! Cached identity

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// The single signed-in user cached on this device
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: i64,
    pub username: String,
    pub display_name: String,
    pub token: String,
    pub last_sync: Option<DateTime<Utc>>,
}

impl fmt::Debug for User {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        formatter
            .debug_struct("User")
            .field("id", &self.id)
            .field("username", &self.username)
            .field("display_name", &self.display_name)
            .field("token", &"[REDACTED]")
            .field("last_sync", &self.last_sync)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_debug_redacts_token() {
        let user = User {
            id: 1,
            username: "admin".to_string(),
            display_name: "Admin User".to_string(),
            token: "secret".to_string(),
            last_sync: None,
        };
        let debug = format!("{user:?}");
        assert!(!debug.contains("secret"));
        assert!(debug.contains("[REDACTED]"));
    }
}
