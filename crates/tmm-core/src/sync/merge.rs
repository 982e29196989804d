//! Download-direction merge policy.

use crate::models::{Record, RecordFields, ServerRecord};

/// What to do with one server record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MergeDecision {
    /// Not present locally: store it as clean server data
    Insert,
    /// Server is strictly newer and the local copy has no pending edits
    Overwrite,
    /// Both sides changed since the last confirmed sync; the local edit is kept
    Conflict,
    /// Local is at least as current
    Keep,
}

/// Compare a server record with the local copy sharing its id.
///
/// Timestamps are compared, never fields: a dirty local record is never
/// overwritten, and the upload phase later pushes it over the server copy.
pub fn decide<F: RecordFields>(local: Option<&Record<F>>, server: &ServerRecord<F>) -> MergeDecision {
    let Some(local) = local else {
        return MergeDecision::Insert;
    };

    if !local.meta.needs_sync && server.updated_at > local.meta.updated_at {
        return MergeDecision::Overwrite;
    }

    let baseline = local.meta.server_updated_at.unwrap_or_default();
    if local.meta.needs_sync && server.updated_at > baseline {
        return MergeDecision::Conflict;
    }

    MergeDecision::Keep
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CategoryFields, EntryKind};
    use crate::util::now_millis;
    use chrono::Duration;

    fn server(updated_minutes_ago: i64) -> ServerRecord<CategoryFields> {
        ServerRecord {
            id: 1,
            fields: CategoryFields::new("Server", EntryKind::Expense),
            created_at: None,
            updated_at: now_millis() - Duration::minutes(updated_minutes_ago),
        }
    }

    fn local(updated_minutes_ago: i64, dirty: bool, confirmed_minutes_ago: Option<i64>) -> Record<CategoryFields> {
        let now = now_millis();
        let mut record = Record::new(CategoryFields::new("Local", EntryKind::Expense));
        record.meta.id = Some(1);
        record.meta.needs_sync = dirty;
        record.meta.updated_at = now - Duration::minutes(updated_minutes_ago);
        record.meta.server_updated_at = confirmed_minutes_ago.map(|m| now - Duration::minutes(m));
        record
    }

    #[test]
    fn unknown_record_is_inserted() {
        assert_eq!(decide(None, &server(0)), MergeDecision::Insert);
    }

    #[test]
    fn newer_server_overwrites_clean_local() {
        let local = local(10, false, Some(10));
        assert_eq!(decide(Some(&local), &server(5)), MergeDecision::Overwrite);
    }

    #[test]
    fn older_or_equal_server_is_ignored() {
        let local = local(5, false, Some(5));
        assert_eq!(decide(Some(&local), &server(5)), MergeDecision::Keep);
        assert_eq!(decide(Some(&local), &server(10)), MergeDecision::Keep);
    }

    #[test]
    fn server_change_after_baseline_conflicts_with_dirty_local() {
        let local = local(1, true, Some(20));
        assert_eq!(decide(Some(&local), &server(5)), MergeDecision::Conflict);
    }

    #[test]
    fn dirty_local_without_baseline_conflicts() {
        let local = local(1, true, None);
        assert_eq!(decide(Some(&local), &server(30)), MergeDecision::Conflict);
    }

    #[test]
    fn unchanged_server_keeps_dirty_local() {
        let local = local(1, true, Some(20));
        assert_eq!(decide(Some(&local), &server(20)), MergeDecision::Keep);
    }
}
