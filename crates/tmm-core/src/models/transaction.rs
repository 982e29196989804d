//! Transaction model

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use super::category::EntryKind;
use super::record::{EntityKind, LocalId, Record, RecordFields, RecordKey};
use crate::util::year_of;

/// Reference from a transaction to its category.
///
/// A transaction created offline may point at a category that only exists
/// locally; the reference is rewritten to the server id once the category
/// has been uploaded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryRef {
    Server(i64),
    Local(LocalId),
}

impl CategoryRef {
    pub const fn server_id(&self) -> Option<i64> {
        match self {
            Self::Server(id) => Some(*id),
            Self::Local(_) => None,
        }
    }

    /// Address of the referenced category in the local store.
    pub fn key(&self) -> RecordKey {
        match self {
            Self::Server(id) => RecordKey::Server(*id),
            Self::Local(local_id) => RecordKey::Local(local_id.clone()),
        }
    }
}

impl From<RecordKey> for CategoryRef {
    fn from(key: RecordKey) -> Self {
        match key {
            RecordKey::Server(id) => Self::Server(id),
            RecordKey::Local(local_id) => Self::Local(local_id),
        }
    }
}

/// Domain fields of a transaction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionFields {
    pub amount: f64,
    pub date: NaiveDate,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    pub category: CategoryRef,
    #[serde(default)]
    pub description: String,
}

/// Partial transaction update
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TransactionPatch {
    pub amount: Option<f64>,
    pub date: Option<NaiveDate>,
    pub kind: Option<EntryKind>,
    pub category: Option<CategoryRef>,
    pub description: Option<String>,
}

impl RecordFields for TransactionFields {
    type Patch = TransactionPatch;

    const TABLE: &'static str = "transactions";
    const KIND: EntityKind = EntityKind::Transaction;

    fn apply_patch(&mut self, patch: TransactionPatch) {
        if let Some(amount) = patch.amount {
            self.amount = amount;
        }
        if let Some(date) = patch.date {
            self.date = date;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
        if let Some(category) = patch.category {
            self.category = category;
        }
        if let Some(description) = patch.description {
            self.description = description;
        }
    }

    fn merge_server(&mut self, server: &Self) {
        self.amount = server.amount;
        self.date = server.date;
        self.kind = server.kind;
        self.category.clone_from(&server.category);
        self.description.clone_from(&server.description);
    }

    fn implied_year(&self) -> Option<i32> {
        Some(year_of(self.date))
    }

    fn label(&self) -> String {
        format!("{} {:.2} on {}", self.kind, self.amount, self.date)
    }
}

/// A transaction with its sync envelope
pub type Transaction = Record<TransactionFields>;

#[cfg(test)]
mod tests {
    use super::*;

    fn fields() -> TransactionFields {
        TransactionFields {
            amount: 12.5,
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            kind: EntryKind::Expense,
            category: CategoryRef::Server(9),
            description: "Lunch".to_string(),
        }
    }

    #[test]
    fn implied_year_follows_date() {
        let mut fields = fields();
        assert_eq!(fields.implied_year(), Some(2024));
        fields.apply_patch(TransactionPatch {
            date: NaiveDate::from_ymd_opt(2025, 1, 2),
            ..TransactionPatch::default()
        });
        assert_eq!(fields.implied_year(), Some(2025));
    }

    #[test]
    fn new_record_is_partitioned_by_date() {
        let record = Record::new(fields());
        assert_eq!(record.meta.year, 2024);
        assert!(record.meta.needs_sync);
    }

    #[test]
    fn category_ref_exposes_server_id() {
        assert_eq!(CategoryRef::Server(3).server_id(), Some(3));
        assert_eq!(CategoryRef::Local(LocalId::generate()).server_id(), None);
    }
}
