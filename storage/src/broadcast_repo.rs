//! Broadcast batch repository: progress counters and the cancellation flag checked by delivery jobs.

use crate::error::StorageError;
use crate::models::BroadcastBatch;
use crate::sqlite_pool::SqlitePoolManager;
use tracing::info;

#[derive(Clone)]
pub struct BroadcastRepository {
    pool_manager: SqlitePoolManager,
}

impl BroadcastRepository {
    pub fn new(pool_manager: SqlitePoolManager) -> Self {
        Self { pool_manager }
    }

    pub async fn init(&self) -> Result<(), StorageError> {
        info!("Creating broadcast_batches table if not exist");
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS broadcast_batches (
                id TEXT PRIMARY KEY,
                update_id INTEGER NOT NULL,
                message_id INTEGER NOT NULL,
                method TEXT NOT NULL,
                total INTEGER NOT NULL,
                delivered INTEGER NOT NULL DEFAULT 0,
                failed INTEGER NOT NULL DEFAULT 0,
                cancelled INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL
            )
            "#,
        )
        .execute(self.pool_manager.pool())
        .await?;
        Ok(())
    }

    pub async fn create(&self, batch: &BroadcastBatch) -> Result<(), StorageError> {
        sqlx::query(
            r#"
            INSERT INTO broadcast_batches (id, update_id, message_id, method, total, delivered, failed, cancelled, created_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&batch.id)
        .bind(batch.update_id)
        .bind(batch.message_id)
        .bind(&batch.method)
        .bind(batch.total)
        .bind(batch.delivered)
        .bind(batch.failed)
        .bind(batch.cancelled)
        .bind(batch.created_at)
        .execute(self.pool_manager.pool())
        .await?;
        info!(batch_id = %batch.id, total = batch.total, method = %batch.method, "Created broadcast batch");
        Ok(())
    }

    pub async fn find(&self, id: &str) -> Result<Option<BroadcastBatch>, StorageError> {
        let batch =
            sqlx::query_as::<_, BroadcastBatch>("SELECT * FROM broadcast_batches WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool_manager.pool())
                .await?;
        Ok(batch)
    }

    pub async fn list_recent(&self, limit: i64) -> Result<Vec<BroadcastBatch>, StorageError> {
        let batches = sqlx::query_as::<_, BroadcastBatch>(
            "SELECT * FROM broadcast_batches ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(self.pool_manager.pool())
        .await?;
        Ok(batches)
    }

    /// Flags the batch as cancelled; returns false if it does not exist.
    pub async fn cancel(&self, id: &str) -> Result<bool, StorageError> {
        let result = sqlx::query("UPDATE broadcast_batches SET cancelled = 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool_manager.pool())
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// A missing batch counts as cancelled so orphaned jobs stop.
    pub async fn is_cancelled(&self, id: &str) -> Result<bool, StorageError> {
        let row: Option<(bool,)> =
            sqlx::query_as("SELECT cancelled FROM broadcast_batches WHERE id = ?")
                .bind(id)
                .fetch_optional(self.pool_manager.pool())
                .await?;
        Ok(row.map(|(cancelled,)| cancelled).unwrap_or(true))
    }

    pub async fn record_delivered(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE broadcast_batches SET delivered = delivered + 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool_manager.pool())
            .await?;
        Ok(())
    }

    pub async fn record_failed(&self, id: &str) -> Result<(), StorageError> {
        sqlx::query("UPDATE broadcast_batches SET failed = failed + 1 WHERE id = ?")
            .bind(id)
            .execute(self.pool_manager.pool())
            .await?;
        Ok(())
    }
}
