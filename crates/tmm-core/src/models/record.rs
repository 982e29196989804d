//! Sync envelope shared by every partitioned record.
//!
//! A record is identified either by the server-assigned `id` or, until the
//! server has accepted it, by a device-unique [`LocalId`]. The envelope carries
//! the dirty flag, the tombstone flag, and the timestamps used for merging.

use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::util::now_millis;

const LOCAL_ID_PREFIX: &str = "local_";
const LOCAL_ID_SUFFIX_LEN: usize = 9;

/// Client-assigned identifier for a record the server has not accepted yet.
///
/// Format: `local_<unix-ms>_<9 random chars>`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LocalId(String);

impl LocalId {
    /// Generate a fresh local identifier.
    #[must_use]
    pub fn generate() -> Self {
        let random = Uuid::now_v7().simple().to_string();
        let suffix = &random[random.len() - LOCAL_ID_SUFFIX_LEN..];
        Self(format!(
            "{LOCAL_ID_PREFIX}{}_{suffix}",
            Utc::now().timestamp_millis()
        ))
    }

    /// Get the string representation of this ID
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LocalId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for LocalId {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Address of a record from the caller's point of view.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordKey {
    /// Server-assigned identifier
    Server(i64),
    /// Device-local identifier of a never-synced record
    Local(LocalId),
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Server(id) => write!(f, "{id}"),
            Self::Local(local_id) => write!(f, "{local_id}"),
        }
    }
}

impl FromStr for RecordKey {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let s = s.trim();
        if s.starts_with(LOCAL_ID_PREFIX) {
            return Ok(Self::Local(LocalId(s.to_string())));
        }
        s.parse::<i64>()
            .map(Self::Server)
            .map_err(|_| format!("'{s}' is neither a server id nor a local id"))
    }
}

/// Which record family a row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Category,
    Transaction,
}

impl EntityKind {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Category => "category",
            Self::Transaction => "transaction",
        }
    }
}

impl FromStr for EntityKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "category" => Ok(Self::Category),
            "transaction" => Ok(Self::Transaction),
            other => Err(format!("unknown entity kind '{other}'")),
        }
    }
}

/// Who produced a write to the local store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteOrigin {
    /// A user edit on this device; the record becomes dirty.
    Local,
    /// Authoritative server data; the record is clean and keeps the server's timestamps.
    Server,
}

/// Sync bookkeeping carried by every category and transaction.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncMeta {
    /// Server-assigned identifier, absent until the server accepted the record
    pub id: Option<i64>,
    /// Device-local identifier, present only while `id` is absent
    pub local_id: Option<LocalId>,
    /// Partition owner
    pub owner_id: i64,
    /// Partition year
    pub year: i32,
    /// Local changes not yet confirmed by the server
    pub needs_sync: bool,
    /// Tombstone flag
    pub deleted: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Last timestamp the server confirmed for this record
    pub server_updated_at: Option<DateTime<Utc>>,
}

/// Domain payload of a synced entity.
pub trait RecordFields:
    Clone + fmt::Debug + PartialEq + Serialize + DeserializeOwned + Send + Sync + 'static
{
    /// Partial update accepted by `update_record`.
    type Patch: Send;

    /// Backing table name.
    const TABLE: &'static str;

    /// Entity family, used for the audit queue and logging.
    const KIND: EntityKind;

    /// Apply a partial update in place.
    fn apply_patch(&mut self, patch: Self::Patch);

    /// Overwrite the fields the server is authoritative for.
    fn merge_server(&mut self, server: &Self);

    /// Partition year implied by the fields, when the entity derives it (e.g. from a date).
    fn implied_year(&self) -> Option<i32> {
        None
    }

    /// Short human label for log lines.
    fn label(&self) -> String;
}

/// A category or transaction together with its sync envelope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<F> {
    #[serde(flatten)]
    pub meta: SyncMeta,
    #[serde(flatten)]
    pub fields: F,
}

impl<F: RecordFields> Record<F> {
    /// Create an unsaved, dirty record. Partition and identifiers are assigned on save.
    #[must_use]
    pub fn new(fields: F) -> Self {
        let now = now_millis();
        Self {
            meta: SyncMeta {
                id: None,
                local_id: None,
                owner_id: 0,
                year: fields.implied_year().unwrap_or_default(),
                needs_sync: true,
                deleted: false,
                created_at: now,
                updated_at: now,
                server_updated_at: None,
            },
            fields,
        }
    }

    /// Build a clean record from authoritative server data.
    #[must_use]
    pub fn from_server(server: ServerRecord<F>) -> Self {
        Self {
            meta: SyncMeta {
                id: Some(server.id),
                local_id: None,
                owner_id: 0,
                year: server.fields.implied_year().unwrap_or_default(),
                needs_sync: false,
                deleted: false,
                created_at: server.created_at.unwrap_or(server.updated_at),
                updated_at: server.updated_at,
                server_updated_at: Some(server.updated_at),
            },
            fields: server.fields,
        }
    }

    /// Record exists only on this device.
    pub const fn is_local_only(&self) -> bool {
        self.meta.local_id.is_some() && self.meta.id.is_none()
    }

    /// Preferred address: the server id once known, otherwise the local id.
    pub fn key(&self) -> Option<RecordKey> {
        self.meta
            .id
            .map(RecordKey::Server)
            .or_else(|| self.meta.local_id.clone().map(RecordKey::Local))
    }

    /// Whether `key` addresses this record.
    pub fn matches(&self, key: &RecordKey) -> bool {
        match key {
            RecordKey::Server(id) => self.meta.id == Some(*id),
            RecordKey::Local(local_id) => self.meta.local_id.as_ref() == Some(local_id),
        }
    }

    /// Apply an accepted server representation: typed field merge, clean flag, timestamps.
    pub fn absorb_server(&mut self, server: &ServerRecord<F>) {
        self.fields.merge_server(&server.fields);
        self.meta.id = Some(server.id);
        self.meta.local_id = None;
        self.meta.needs_sync = false;
        self.meta.updated_at = server.updated_at;
        self.meta.server_updated_at = Some(server.updated_at);
        if let Some(year) = self.fields.implied_year() {
            self.meta.year = year;
        }
    }
}

/// A record as the server describes it.
#[derive(Debug, Clone, PartialEq)]
pub struct ServerRecord<F> {
    pub id: i64,
    pub fields: F,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}
