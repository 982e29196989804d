//! Services built on top of the database layer.

mod local_store;

pub use local_store::{LocalStore, StoreStats};
