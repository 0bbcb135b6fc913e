use tracing::{error, info};

use crate::platform::GreetingEvent;
use crate::store::{save_user, UserRecord, UserStore};

pub const WELCOME_TEXT: &str = "Hello! Your data has been updated in the database.";
pub const FAILURE_TEXT: &str = "Failed to update your data in the database.";

/// The two replies the bot can give to a greeting.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reply {
    Welcome,
    Failure,
}

impl Reply {
    pub fn text(self) -> &'static str {
        match self {
            Reply::Welcome => WELCOME_TEXT,
            Reply::Failure => FAILURE_TEXT,
        }
    }
}

impl std::fmt::Display for Reply {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Reply::Welcome => write!(f, "welcome"),
            Reply::Failure => write!(f, "failure"),
        }
    }
}

/// Record the sender of a greeting and pick the reply to send back.
pub async fn handle_greeting(store: &dyn UserStore, event: &GreetingEvent) -> Reply {
    info!(
        "Received /start command from {} ({})",
        event.user_id,
        event.username.as_deref().unwrap_or("-")
    );

    let id = match i64::try_from(event.user_id) {
        Ok(id) => id,
        Err(_) => {
            error!("User id {} does not fit the users table", event.user_id);
            return Reply::Failure;
        }
    };

    let user = UserRecord::new(id, event.username.clone());
    if save_user(store, &user).await {
        Reply::Welcome
    } else {
        Reply::Failure
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DatabaseConfig;
    use crate::store::{PgUserStore, SqliteUserStore, StoreError};
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Fails every write and counts how often it was asked.
    #[derive(Default)]
    struct UnavailableStore {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl UserStore for UnavailableStore {
        async fn upsert_user(&self, _user: &UserRecord) -> Result<(), StoreError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn find_user(&self, _id: i64) -> Result<Option<UserRecord>, StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }

        async fn ensure_schema(&self) -> Result<(), StoreError> {
            Err(StoreError::Connection("connection refused".to_string()))
        }
    }

    fn event(user_id: u64, username: &str) -> GreetingEvent {
        GreetingEvent {
            user_id,
            username: Some(username.to_string()),
        }
    }

    #[test]
    fn test_reply_texts() {
        assert_eq!(Reply::Welcome.text(), WELCOME_TEXT);
        assert_eq!(Reply::Failure.text(), FAILURE_TEXT);
        assert_ne!(WELCOME_TEXT, FAILURE_TEXT);
    }

    #[tokio::test]
    async fn test_greeting_scenario() {
        let store = SqliteUserStore::open_in_memory().unwrap();

        let reply = handle_greeting(&store, &event(42, "alice")).await;
        assert_eq!(reply, Reply::Welcome);
        assert_eq!(
            store.find_user(42).await.unwrap(),
            Some(UserRecord::new(42, Some("alice".to_string())))
        );

        let reply = handle_greeting(&store, &event(42, "alice2")).await;
        assert_eq!(reply, Reply::Welcome);
        assert_eq!(
            store.find_user(42).await.unwrap(),
            Some(UserRecord::new(42, Some("alice2".to_string())))
        );
    }

    #[tokio::test]
    async fn test_user_without_username_is_recorded() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        let event = GreetingEvent {
            user_id: 9,
            username: None,
        };

        assert_eq!(handle_greeting(&store, &event).await, Reply::Welcome);
        assert_eq!(
            store.find_user(9).await.unwrap(),
            Some(UserRecord::new(9, None))
        );
    }

    #[tokio::test]
    async fn test_store_failure_sends_failure_text() {
        let store = UnavailableStore::default();

        let reply = handle_greeting(&store, &event(42, "alice")).await;
        assert_eq!(reply, Reply::Failure);
        assert_eq!(reply.text(), FAILURE_TEXT);
        assert_eq!(store.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_failed_write_keeps_previous_row() {
        let store = SqliteUserStore::open_in_memory().unwrap();
        assert_eq!(
            handle_greeting(&store, &event(42, "alice")).await,
            Reply::Welcome
        );
        store.reject_renames().await;

        let reply = handle_greeting(&store, &event(42, "alice2")).await;
        assert_eq!(reply, Reply::Failure);
        assert_eq!(
            store.find_user(42).await.unwrap(),
            Some(UserRecord::new(42, Some("alice".to_string())))
        );
        assert_eq!(store.count_users().await, 1);
    }

    #[tokio::test]
    async fn test_refused_postgres_connection_sends_failure_text() {
        let store = PgUserStore::new(&DatabaseConfig {
            name: "greetbot".to_string(),
            user: "greetbot".to_string(),
            password: String::new(),
            host: "127.0.0.1".to_string(),
            port: 1,
        });

        assert_eq!(
            handle_greeting(&store, &event(42, "alice")).await,
            Reply::Failure
        );
    }

    #[tokio::test]
    async fn test_out_of_range_id_skips_store() {
        let store = UnavailableStore::default();

        let reply = handle_greeting(&store, &event(u64::MAX, "huge")).await;
        assert_eq!(reply, Reply::Failure);
        assert_eq!(store.calls.load(Ordering::SeqCst), 0);
    }
}
