//! Broadcast batch: one fan-out of a broadcast-topic message to all eligible customers.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct BroadcastBatch {
    pub id: String,
    pub update_id: i64,
    pub message_id: i64,
    pub method: String,
    pub total: i64,
    pub delivered: i64,
    pub failed: i64,
    pub cancelled: bool,
    pub created_at: DateTime<Utc>,
}

impl BroadcastBatch {
    pub fn new(update_id: i64, message_id: i64, method: impl Into<String>, total: i64) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            update_id,
            message_id,
            method: method.into(),
            total,
            delivered: 0,
            failed: 0,
            cancelled: false,
            created_at: Utc::now(),
        }
    }

    /// Recipients whose job has not finished yet.
    pub fn pending(&self) -> i64 {
        (self.total - self.delivered - self.failed).max(0)
    }

    pub fn is_finished(&self) -> bool {
        self.pending() == 0
    }
}
