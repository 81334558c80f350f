//! Storage error types.
//!
//! Used by repository implementations and callers of storage APIs.

use thiserror::Error;

/// Errors that can occur when using storage operations.
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Database error: {0}")]
    Database(String),
    /// SQLite reported the database as busy or locked.
    #[error("Database busy: {0}")]
    Busy(String),
    /// Unique or primary key constraint violated.
    #[error("Conflict: {0}")]
    Conflict(String),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
}

impl StorageError {
    /// Busy/locked and constraint conflicts may succeed on another attempt.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StorageError::Busy(_) | StorageError::Conflict(_))
    }
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        if let sqlx::Error::Database(db) = &err {
            let code = db.code().map(|c| c.to_string()).unwrap_or_default();
            // SQLITE_BUSY(5), SQLITE_LOCKED(6) and their extended codes
            if code == "5" || code == "6" || code == "517" || code == "262" {
                return StorageError::Busy(db.message().to_string());
            }
            // SQLITE_CONSTRAINT_UNIQUE(2067), SQLITE_CONSTRAINT_PRIMARYKEY(1555)
            if code == "2067" || code == "1555" {
                return StorageError::Conflict(db.message().to_string());
            }
        }
        if let sqlx::Error::RowNotFound = err {
            return StorageError::NotFound(err.to_string());
        }
        let message = err.to_string();
        if message.contains("database is locked") {
            return StorageError::Busy(message);
        }
        StorageError::Database(message)
    }
}

impl From<StorageError> for desk_core::DeskError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound(m) => desk_core::DeskError::NotFound(m),
            other => desk_core::DeskError::Persistence(other.to_string()),
        }
    }
}
