//! Sync state shared by the coordinator and front-ends.

use std::fmt;

use serde::Serialize;

/// Lifecycle of one (owner, year) sync key.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SyncState {
    #[default]
    Idle,
    Syncing,
    Completed,
    Error,
}

impl SyncState {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::Syncing => "syncing",
            Self::Completed => "completed",
            Self::Error => "error",
        }
    }

    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Error)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn display_matches_serialized_form() {
        for state in [
            SyncState::Idle,
            SyncState::Syncing,
            SyncState::Completed,
            SyncState::Error,
        ] {
            let json = serde_json::to_string(&state).unwrap_or_default();
            assert_eq!(json, format!("\"{state}\""));
        }
        assert!(SyncState::Error.is_terminal());
        assert!(!SyncState::Syncing.is_terminal());
    }
}
