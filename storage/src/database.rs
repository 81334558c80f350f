//! One pool, all repositories, schema created on connect.

use crate::broadcast_repo::BroadcastRepository;
use crate::customer_repo::CustomerRepository;
use crate::error::StorageError;
use crate::message_repo::MessageRepository;
use crate::sqlite_pool::SqlitePoolManager;

/// Repositories sharing one SQLite pool.
#[derive(Clone)]
pub struct Database {
    pub customers: CustomerRepository,
    pub messages: MessageRepository,
    pub broadcasts: BroadcastRepository,
}

impl Database {
    /// Opens (or creates) the database and makes sure every table exists.
    pub async fn connect(database_url: &str) -> Result<Self, StorageError> {
        let pool_manager = SqlitePoolManager::new(database_url).await?;
        let db = Self {
            customers: CustomerRepository::new(pool_manager.clone()),
            messages: MessageRepository::new(pool_manager.clone()),
            broadcasts: BroadcastRepository::new(pool_manager),
        };
        db.customers.init().await?;
        db.messages.init().await?;
        db.broadcasts.init().await?;
        Ok(db)
    }
}
