//! Category model

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::record::{EntityKind, Record, RecordFields};

/// Whether money flows in or out.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    Income,
    Expense,
}

impl EntryKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Income => "income",
            Self::Expense => "expense",
        }
    }
}

impl fmt::Display for EntryKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EntryKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(Self::Income),
            "expense" => Ok(Self::Expense),
            other => Err(format!("unknown entry type '{other}'")),
        }
    }
}

/// Domain fields of a category
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CategoryFields {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    /// Server-provisioned categories cannot be deleted by the user
    #[serde(default)]
    pub is_default: bool,
}

impl CategoryFields {
    #[must_use]
    pub fn new(name: impl Into<String>, kind: EntryKind) -> Self {
        Self {
            name: name.into(),
            kind,
            is_default: false,
        }
    }
}

/// Partial category update
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CategoryPatch {
    pub name: Option<String>,
    pub kind: Option<EntryKind>,
}

impl RecordFields for CategoryFields {
    type Patch = CategoryPatch;

    const TABLE: &'static str = "categories";
    const KIND: EntityKind = EntityKind::Category;

    fn apply_patch(&mut self, patch: CategoryPatch) {
        if let Some(name) = patch.name {
            self.name = name;
        }
        if let Some(kind) = patch.kind {
            self.kind = kind;
        }
    }

    fn merge_server(&mut self, server: &Self) {
        self.name.clone_from(&server.name);
        self.kind = server.kind;
        self.is_default = server.is_default;
    }

    fn label(&self) -> String {
        format!("{} ({})", self.name, self.kind)
    }
}

/// A category with its sync envelope
pub type Category = Record<CategoryFields>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entry_kind_parses_case_insensitively() {
        assert_eq!("Income".parse::<EntryKind>().unwrap(), EntryKind::Income);
        assert_eq!(" expense ".parse::<EntryKind>().unwrap(), EntryKind::Expense);
        assert!("transfer".parse::<EntryKind>().is_err());
    }

    #[test]
    fn patch_only_touches_given_fields() {
        let mut fields = CategoryFields::new("Rent", EntryKind::Expense);
        fields.apply_patch(CategoryPatch {
            name: Some("Rents".to_string()),
            kind: None,
        });
        assert_eq!(fields.name, "Rents");
        assert_eq!(fields.kind, EntryKind::Expense);
    }

    #[test]
    fn serializes_type_field_for_wire_compatibility() {
        let json = serde_json::to_value(CategoryFields::new("Salary", EntryKind::Income)).unwrap();
        assert_eq!(json["type"], "income");
        assert_eq!(json["isDefault"], false);
    }
}
