use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use rusqlite::{Connection, OptionalExtension};
use tokio::sync::Mutex;
use tracing::info;

use super::{StoreError, UserRecord, UserStore};

const CREATE_USERS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS users (
        id INTEGER PRIMARY KEY,
        username TEXT
    );
";

/// SQLite-backed user store for running without a PostgreSQL server.
#[derive(Clone)]
pub struct SqliteUserStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteUserStore {
    /// Open or create the SQLite database at the given path.
    pub fn open(path: &Path) -> Result<Self> {
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open database: {}", path.display()))?;

        // journal_mode PRAGMA always returns the resulting mode, so use query_row
        let _: String = conn.query_row("PRAGMA journal_mode=WAL", [], |row| row.get(0))?;

        // Create the table on the raw connection before wrapping in Mutex.
        conn.execute_batch(CREATE_USERS_TABLE)
            .context("Failed to create users table")?;

        info!("User store initialized at: {}", path.display());
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Open an in-memory database (for testing)
    #[cfg(test)]
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(CREATE_USERS_TABLE)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    pub(crate) async fn count_users(&self) -> i64 {
        let conn = self.conn.lock().await;
        conn.query_row("SELECT count(*) FROM users", [], |row| row.get(0))
            .unwrap()
    }

    /// Make every rename fail after the row was already rewritten, so the
    /// surrounding transaction has to roll it back.
    #[cfg(test)]
    pub(crate) async fn reject_renames(&self) {
        let conn = self.conn.lock().await;
        conn.execute_batch(
            "CREATE TRIGGER reject_rename AFTER UPDATE ON users BEGIN
                 SELECT RAISE(ABORT, 'renames are disabled');
             END;",
        )
        .unwrap();
    }
}

fn query_error(e: rusqlite::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

#[async_trait]
impl UserStore for SqliteUserStore {
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        let mut conn = self.conn.lock().await;

        let tx = conn.transaction().map_err(query_error)?;
        tx.execute(
            "INSERT INTO users (id, username) VALUES (?1, ?2)
             ON CONFLICT (id) DO UPDATE SET username = excluded.username",
            rusqlite::params![user.id, user.username],
        )
        .map_err(query_error)?;
        tx.commit().map_err(query_error)?;

        Ok(())
    }

    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        let conn = self.conn.lock().await;

        conn.query_row(
            "SELECT id, username FROM users WHERE id = ?1",
            rusqlite::params![id],
            |row| {
                Ok(UserRecord {
                    id: row.get(0)?,
                    username: row.get(1)?,
                })
            },
        )
        .optional()
        .map_err(query_error)
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        let conn = self.conn.lock().await;
        conn.execute_batch(CREATE_USERS_TABLE).map_err(query_error)
    }
}
