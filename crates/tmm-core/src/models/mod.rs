//! Data models for TrackMyMoney

mod category;
mod record;
mod sync_queue;
mod transaction;
mod user;

pub use category::{Category, CategoryFields, CategoryPatch, EntryKind};
pub use record::{
    EntityKind, LocalId, Record, RecordFields, RecordKey, ServerRecord, SyncMeta, WriteOrigin,
};
pub use sync_queue::{ChangeAction, QueueEntry};
pub use transaction::{CategoryRef, Transaction, TransactionFields, TransactionPatch};
pub use user::User;
