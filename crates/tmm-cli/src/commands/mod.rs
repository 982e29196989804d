pub mod auth;
pub mod category;
pub mod common;
pub mod queue;
pub mod stats;
pub mod sync;
pub mod tx;
