//! Customer repository: the single mutable shared record of the desk.
//!
//! Sequential numbers are assigned inside a serialized transaction with retry on busy/unique
//! conflicts. Field updates re-read the row inside their transaction; topic and card ids are plain
//! optimistic writes since they are re-derivable.

use std::time::Duration;

use chrono::Utc;
use desk_core::Platform;
use sqlx::SqlitePool;
use tracing::{info, warn};

use crate::error::StorageError;
use crate::models::{ContactUpdate, Customer, CustomerProfile};
use crate::sqlite_pool::SqlitePoolManager;

/// Delay before each retry of a conflicting sequential-number assignment (one retry per entry).
pub const SEQUENCE_RETRY_BACKOFF_MS: [u64; 3] = [100, 200, 400];

#[derive(Clone)]
pub struct CustomerRepository {
    pool_manager: SqlitePoolManager,
}

impl CustomerRepository {
    pub fn new(pool_manager: SqlitePoolManager) -> Self {
        Self { pool_manager }
    }

    fn pool(&self) -> &SqlitePool {
        self.pool_manager.pool()
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        info!("Creating customers table if not exist");
        let pool = self.pool();

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS customers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                platform TEXT NOT NULL,
                chat_id INTEGER NOT NULL,
                sequential_number INTEGER,
                username TEXT,
                first_name TEXT,
                last_name TEXT,
                full_name TEXT,
                phone_number TEXT,
                email TEXT,
                registration_completed_at TEXT,
                topic_id INTEGER,
                contact_info_message_id INTEGER,
                custom_topic_name TEXT,
                topic_name_edited INTEGER NOT NULL DEFAULT 0,
                is_banned INTEGER NOT NULL DEFAULT 0,
                banned_at TEXT,
                created_at TEXT NOT NULL,
                updated_at TEXT NOT NULL,
                UNIQUE (platform, chat_id)
            )
            "#,
        )
        .execute(pool)
        .await?;

        sqlx::query(
            r#"
            CREATE UNIQUE INDEX IF NOT EXISTS idx_customers_sequential_number ON customers(sequential_number);
            CREATE INDEX IF NOT EXISTS idx_customers_topic_id ON customers(topic_id);
            CREATE INDEX IF NOT EXISTS idx_customers_broadcast ON customers(platform, is_banned);
            "#,
        )
        .execute(pool)
        .await?;

        Ok(())
    }

    pub async fn find_by_id(&self, id: i64) -> Result<Option<Customer>, StorageError> {
        let customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(self.pool())
            .await?;
        Ok(customer)
    }

    /// Like [`find_by_id`](Self::find_by_id) but a missing row is an error.
    pub async fn get(&self, id: i64) -> Result<Customer, StorageError> {
        self.find_by_id(id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("customer {}", id)))
    }

    pub async fn find_by_chat(
        &self,
        platform: Platform,
        chat_id: i64,
    ) -> Result<Option<Customer>, StorageError> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE platform = ? AND chat_id = ?",
        )
        .bind(platform.as_str())
        .bind(chat_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(customer)
    }

    /// Customer owning a topic; the newest row wins if a stale one still points at it.
    pub async fn find_by_topic_id(&self, topic_id: i64) -> Result<Option<Customer>, StorageError> {
        let customer = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE topic_id = ? ORDER BY id DESC LIMIT 1",
        )
        .bind(topic_id)
        .fetch_optional(self.pool())
        .await?;
        Ok(customer)
    }

    /// Returns the customer for a chat, creating it on first contact.
    ///
    /// Safe under concurrent first contact: the insert is a no-op when the row exists, and the
    /// sequential number is assigned at most once.
    pub async fn get_or_create(
        &self,
        platform: Platform,
        chat_id: i64,
        profile: &CustomerProfile,
    ) -> Result<Customer, StorageError> {
        let now = Utc::now();
        let inserted = sqlx::query(
            r#"
            INSERT INTO customers (platform, chat_id, username, first_name, last_name, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(platform, chat_id) DO NOTHING
            "#,
        )
        .bind(platform.as_str())
        .bind(chat_id)
        .bind(&profile.username)
        .bind(&profile.first_name)
        .bind(&profile.last_name)
        .bind(now)
        .bind(now)
        .execute(self.pool())
        .await?
        .rows_affected();

        let customer = self
            .find_by_chat(platform, chat_id)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("customer {}:{}", platform, chat_id)))?;

        if inserted > 0 {
            info!(customer_id = customer.id, chat_id, platform = %platform, "Created customer");
        }

        if customer.sequential_number.is_none() {
            self.assign_sequential_number(customer.id).await?;
            return self.get(customer.id).await;
        }
        Ok(customer)
    }

    /// Assigns the next sequential number if the customer has none; returns the number in effect.
    ///
    /// `Ok(None)` means the customer disappeared in the meantime.
    pub async fn assign_sequential_number(&self, id: i64) -> Result<Option<i64>, StorageError> {
        let mut attempt = 0;
        loop {
            match self.try_assign_sequential_number(id).await {
                Ok(number) => return Ok(number),
                Err(e) if e.is_retryable() && attempt < SEQUENCE_RETRY_BACKOFF_MS.len() => {
                    let delay = SEQUENCE_RETRY_BACKOFF_MS[attempt];
                    warn!(
                        customer_id = id,
                        attempt = attempt + 1,
                        delay_ms = delay,
                        error = %e,
                        "Sequential number assignment conflicted, retrying"
                    );
                    tokio::time::sleep(Duration::from_millis(delay)).await;
                    attempt += 1;
                }
                Err(e) => {
                    warn!(customer_id = id, attempt = attempt + 1, error = %e, "Sequential number assignment failed");
                    return Err(e);
                }
            }
        }
    }

    async fn try_assign_sequential_number(&self, id: i64) -> Result<Option<i64>, StorageError> {
        let mut tx = self.pool().begin().await?;

        // A write statement first, so the transaction holds the write lock before reading MAX.
        sqlx::query(
            r#"
            UPDATE customers
            SET sequential_number = (SELECT COALESCE(MAX(sequential_number), 0) + 1 FROM customers),
                updated_at = ?
            WHERE id = ? AND sequential_number IS NULL
            "#,
        )
        .bind(Utc::now())
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let row: Option<(Option<i64>,)> =
            sqlx::query_as("SELECT sequential_number FROM customers WHERE id = ?")
                .bind(id)
                .fetch_optional(&mut *tx)
                .await?;

        tx.commit().await?;

        match row {
            Some((number,)) => Ok(number),
            None => {
                warn!(customer_id = id, "Customer vanished before sequential number assignment");
                Ok(None)
            }
        }
    }

    /// Writes contact fields and stamps `registration_completed_at` the first time all three are present.
    pub async fn update_contact_fields(
        &self,
        id: i64,
        update: &ContactUpdate,
    ) -> Result<Customer, StorageError> {
        let mut tx = self.pool().begin().await?;

        let mut customer = sqlx::query_as::<_, Customer>("SELECT * FROM customers WHERE id = ?")
            .bind(id)
            .fetch_optional(&mut *tx)
            .await?
            .ok_or_else(|| StorageError::NotFound(format!("customer {}", id)))?;

        if let Some(full_name) = &update.full_name {
            customer.full_name = Some(full_name.clone());
        }
        if let Some(phone) = &update.phone_number {
            customer.phone_number = Some(phone.clone());
        }
        if let Some(email) = &update.email {
            customer.email = Some(email.clone());
        }
        let now = Utc::now();
        if customer.registration_completed_at.is_none() && customer.is_registration_completed() {
            customer.registration_completed_at = Some(now);
        }
        customer.updated_at = now;

        sqlx::query(
            r#"
            UPDATE customers
            SET full_name = ?, phone_number = ?, email = ?, registration_completed_at = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&customer.full_name)
        .bind(&customer.phone_number)
        .bind(&customer.email)
        .bind(customer.registration_completed_at)
        .bind(customer.updated_at)
        .bind(id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(customer)
    }

    pub async fn set_topic_id(&self, id: i64, topic_id: i64) -> Result<(), StorageError> {
        sqlx::query("UPDATE customers SET topic_id = ?, updated_at = ? WHERE id = ?")
            .bind(topic_id)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Clears the topic link. With `expected` set, only clears if the stored topic still matches,
    /// so a topic recreated concurrently is not unlinked by a stale failure.
    pub async fn clear_topic_id(
        &self,
        id: i64,
        expected: Option<i64>,
    ) -> Result<bool, StorageError> {
        let result = match expected {
            Some(topic_id) => {
                sqlx::query(
                    "UPDATE customers SET topic_id = NULL, updated_at = ? WHERE id = ? AND topic_id = ?",
                )
                .bind(Utc::now())
                .bind(id)
                .bind(topic_id)
                .execute(self.pool())
                .await?
            }
            None => {
                sqlx::query("UPDATE customers SET topic_id = NULL, updated_at = ? WHERE id = ?")
                    .bind(Utc::now())
                    .bind(id)
                    .execute(self.pool())
                    .await?
            }
        };
        Ok(result.rows_affected() > 0)
    }

    pub async fn set_contact_message_id(
        &self,
        id: i64,
        message_id: Option<i64>,
    ) -> Result<(), StorageError> {
        sqlx::query("UPDATE customers SET contact_info_message_id = ?, updated_at = ? WHERE id = ?")
            .bind(message_id)
            .bind(Utc::now())
            .bind(id)
            .execute(self.pool())
            .await?;
        Ok(())
    }

    /// Stores a manually chosen topic name and marks it as custom.
    pub async fn set_custom_topic_name(&self, id: i64, name: &str) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE customers SET custom_topic_name = ?, topic_name_edited = 1, updated_at = ? WHERE id = ?",
        )
        .bind(name)
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn clear_custom_topic_name(&self, id: i64) -> Result<(), StorageError> {
        sqlx::query(
            "UPDATE customers SET custom_topic_name = NULL, topic_name_edited = 0, updated_at = ? WHERE id = ?",
        )
        .bind(Utc::now())
        .bind(id)
        .execute(self.pool())
        .await?;
        Ok(())
    }

    pub async fn set_banned(&self, id: i64, banned: bool) -> Result<Customer, StorageError> {
        let now = Utc::now();
        let banned_at = if banned { Some(now) } else { None };
        sqlx::query("UPDATE customers SET is_banned = ?, banned_at = ?, updated_at = ? WHERE id = ?")
            .bind(banned)
            .bind(banned_at)
            .bind(now)
            .bind(id)
            .execute(self.pool())
            .await?;
        self.get(id).await
    }

    /// Customers eligible for broadcast: not banned, chat id set, Telegram platform.
    pub async fn broadcast_recipients(&self) -> Result<Vec<Customer>, StorageError> {
        let customers = sqlx::query_as::<_, Customer>(
            r#"
            SELECT * FROM customers
            WHERE is_banned = 0 AND chat_id IS NOT NULL AND platform = ?
            ORDER BY id
            "#,
        )
        .bind(Platform::Telegram.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(customers)
    }

    /// Customers without a topic, excluding ignored platforms.
    pub async fn without_topic(&self) -> Result<Vec<Customer>, StorageError> {
        let customers = sqlx::query_as::<_, Customer>(
            "SELECT * FROM customers WHERE topic_id IS NULL AND platform != ? ORDER BY id",
        )
        .bind(Platform::Ignore.as_str())
        .fetch_all(self.pool())
        .await?;
        Ok(customers)
    }

    pub async fn count(&self) -> Result<i64, StorageError> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM customers")
            .fetch_one(self.pool())
            .await?;
        Ok(count)
    }

    /// Deletes the customer and its message log in one transaction; nothing is removed on failure.
    pub async fn delete_cascade(&self, id: i64) -> Result<(), StorageError> {
        let mut tx = self.pool().begin().await?;

        // Taking the write lock up front keeps a concurrent delete from interleaving.
        let touched = sqlx::query("UPDATE customers SET updated_at = ? WHERE id = ?")
            .bind(Utc::now())
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if touched == 0 {
            tx.rollback().await?;
            return Err(StorageError::NotFound(format!("customer {}", id)));
        }

        let messages = sqlx::query("DELETE FROM messages WHERE customer_id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        sqlx::query("DELETE FROM customers WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        info!(customer_id = id, messages, "Deleted customer with message log");
        Ok(())
    }
}
