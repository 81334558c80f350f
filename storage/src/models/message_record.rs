//! Message log record: one row per message relayed between a customer and their topic.
//!
//! Maps to the `messages` table and is used by MessageRepository.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Relay direction as seen from the support desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageDirection {
    /// Customer → topic.
    Incoming,
    /// Topic → customer.
    Outgoing,
}

impl MessageDirection {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageDirection::Incoming => "incoming",
            MessageDirection::Outgoing => "outgoing",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct MessageRecord {
    pub id: String,
    pub customer_id: i64,
    pub direction: String,
    pub message_type: String,
    pub content: String,
    /// Message id in the chat the message came from.
    pub source_message_id: Option<i64>,
    /// Message id of the relayed copy.
    pub delivered_message_id: Option<i64>,
    pub created_at: DateTime<Utc>,
}

impl MessageRecord {
    /// Creates a new record with a generated UUID and current timestamp.
    pub fn new(
        customer_id: i64,
        direction: MessageDirection,
        message_type: impl Into<String>,
        content: impl Into<String>,
        source_message_id: Option<i64>,
        delivered_message_id: Option<i64>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            customer_id,
            direction: direction.as_str().to_string(),
            message_type: message_type.into(),
            content: content.into(),
            source_message_id,
            delivered_message_id,
            created_at: Utc::now(),
        }
    }
}
