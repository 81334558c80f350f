//! Row models for the storage crate.

mod broadcast_batch;
mod customer;
mod message_record;

pub use broadcast_batch::BroadcastBatch;
pub use customer::{ContactUpdate, Customer, CustomerProfile};
pub use message_record::{MessageDirection, MessageRecord};
