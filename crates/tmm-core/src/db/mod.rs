//! Database layer for TrackMyMoney

mod connection;
mod migrations;
mod queue_repository;
mod repository;
mod user_repository;

pub use connection::Database;
pub use queue_repository::{LibSqlQueueRepository, QueueRepository};
pub use repository::{LibSqlRecordRepository, RecordRepository};
pub use user_repository::{LibSqlUserRepository, UserRepository};
