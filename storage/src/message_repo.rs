//! Message repository: log of messages relayed between customers and their topics.
//!
//! External: SQLite via sqlx; callers use save / has_incoming / recent_for_customer.

use crate::error::StorageError;
use crate::models::{MessageDirection, MessageRecord};
use crate::sqlite_pool::SqlitePoolManager;
use tracing::{debug, info};

#[derive(Clone)]
pub struct MessageRepository {
    pool_manager: SqlitePoolManager,
}

impl MessageRepository {
    pub fn new(pool_manager: SqlitePoolManager) -> Self {
        Self { pool_manager }
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        info!("Creating messages table if not exist");
        let pool = self.pool_manager.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS messages (
                id TEXT PRIMARY KEY,
                customer_id INTEGER NOT NULL,
                direction TEXT NOT NULL,
                message_type TEXT NOT NULL,
                content TEXT NOT NULL,
                source_message_id INTEGER,
                delivered_message_id INTEGER,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_messages_customer_id ON messages(customer_id);
            CREATE INDEX IF NOT EXISTS idx_messages_direction ON messages(customer_id, direction);
            CREATE INDEX IF NOT EXISTS idx_messages_created_at ON messages(created_at);
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn save(&self, message: &MessageRecord) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO messages (id, customer_id, direction, message_type, content, source_message_id, delivered_message_id, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&message.id)
        .bind(message.customer_id)
        .bind(&message.direction)
        .bind(&message.message_type)
        .bind(&message.content)
        .bind(message.source_message_id)
        .bind(message.delivered_message_id)
        .bind(message.created_at)
        .execute(self.pool_manager.pool())
        .await?;

        debug!(
            id = %message.id,
            customer_id = message.customer_id,
            direction = %message.direction,
            message_type = %message.message_type,
            "Saved message"
        );
        Ok(())
    }

    pub async fn get_message_by_id(&self, id: &str) -> Result<Option<MessageRecord>, StorageError> {
        let message = sqlx::query_as::<_, MessageRecord>("SELECT * FROM messages WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool_manager.pool())
            .await?;
        Ok(message)
    }

    /// Whether the customer has ever written to the desk.
    pub async fn has_incoming(&self, customer_id: i64) -> Result<bool, StorageError> {
        let (count,): (i64,) = sqlx::query_as(
            "SELECT COUNT(*) FROM messages WHERE customer_id = ? AND direction = ?",
        )
        .bind(customer_id)
        .bind(MessageDirection::Incoming.as_str())
        .fetch_one(self.pool_manager.pool())
        .await?;
        Ok(count > 0)
    }

    /// Latest messages of a customer, newest first.
    pub async fn recent_for_customer(
        &self,
        customer_id: i64,
        limit: i64,
    ) -> Result<Vec<MessageRecord>, StorageError> {
        let messages = sqlx::query_as::<_, MessageRecord>(
            "SELECT * FROM messages WHERE customer_id = ? ORDER BY created_at DESC LIMIT ?",
        )
        .bind(customer_id)
        .bind(limit)
        .fetch_all(self.pool_manager.pool())
        .await?;
        Ok(messages)
    }

    pub async fn count_for_customer(&self, customer_id: i64) -> Result<i64, StorageError> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM messages WHERE customer_id = ?")
                .bind(customer_id)
                .fetch_one(self.pool_manager.pool())
                .await?;
        Ok(count)
    }
}
