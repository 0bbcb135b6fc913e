pub mod postgres;
pub mod sqlite;

use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use tracing::{error, info};

use crate::config::{DatabaseConfig, StorageConfig, StoreBackend};

pub use postgres::PgUserStore;
pub use sqlite::SqliteUserStore;

/// A platform user as persisted in the `users` table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub id: i64,
    pub username: Option<String>,
}

impl UserRecord {
    pub fn new(id: i64, username: Option<String>) -> Self {
        Self { id, username }
    }

    /// Name for log lines; users without a username show as `-`.
    pub fn display_name(&self) -> &str {
        self.username.as_deref().unwrap_or("-")
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Failed to connect to database: {0}")]
    Connection(String),

    #[error("Database query failed: {0}")]
    Query(String),

    /// The blocking worker running the query panicked or was cancelled.
    #[error("Database task failed: {0}")]
    Task(String),
}

/// Persistence for user records, keyed on the platform user id.
#[async_trait]
pub trait UserStore: Send + Sync {
    /// Insert the record, or overwrite the stored username if the id exists.
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StoreError>;

    /// Read a record back. Only used to verify writes; the bot never reads.
    #[allow(dead_code)]
    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, StoreError>;

    /// Create the `users` table if it does not exist yet.
    async fn ensure_schema(&self) -> Result<(), StoreError>;
}

/// Upsert a user, logging the outcome. Never fails: any store error is
/// logged and reported as `false`.
pub async fn save_user(store: &dyn UserStore, user: &UserRecord) -> bool {
    match store.upsert_user(user).await {
        Ok(()) => {
            info!(
                "User {} ({}) inserted/updated in the database.",
                user.id,
                user.display_name()
            );
            true
        }
        Err(e) => {
            error!("Error updating database for user {}: {}", user.id, e);
            false
        }
    }
}

/// Build the store selected by the storage config.
pub fn open(storage: &StorageConfig, database: &DatabaseConfig) -> Result<Arc<dyn UserStore>> {
    let store: Arc<dyn UserStore> = match storage.backend {
        StoreBackend::Postgres => Arc::new(PgUserStore::new(database)),
        StoreBackend::Sqlite => Arc::new(SqliteUserStore::open(&storage.sqlite_path)?),
    };
    Ok(store)
}
