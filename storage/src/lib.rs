//! Storage crate: customer, message log and broadcast batch persistence on SQLite.
//!
//! ## Modules
//!
//! - [`error`] – Storage error types
//! - [`models`] – Customer, MessageRecord, BroadcastBatch
//! - [`customer_repo`] – CustomerRepository (sequential numbers, topic linkage, moderation)
//! - [`message_repo`] – MessageRepository (forwarded message log)
//! - [`broadcast_repo`] – BroadcastRepository (fan-out batches)
//! - [`sqlite_pool`] – SqlitePoolManager

mod broadcast_repo;
mod customer_repo;
mod database;
mod error;
mod message_repo;
mod models;
mod sqlite_pool;

pub use broadcast_repo::BroadcastRepository;
pub use customer_repo::{CustomerRepository, SEQUENCE_RETRY_BACKOFF_MS};
pub use database::Database;
pub use error::StorageError;
pub use message_repo::MessageRepository;
pub use models::{
    BroadcastBatch, ContactUpdate, Customer, CustomerProfile, MessageDirection, MessageRecord,
};
pub use sqlite_pool::SqlitePoolManager;
