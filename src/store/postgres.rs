use async_trait::async_trait;
use diesel::pg::PgConnection;
use diesel::prelude::*;
use diesel::upsert::excluded;
use tracing::{debug, error, instrument};

use super::{StoreError, UserRecord, UserStore};
use crate::config::DatabaseConfig;

diesel::table! {
    users (id) {
        id -> Int8,
        username -> Nullable<Text>,
    }
}

#[derive(Insertable)]
#[diesel(table_name = users)]
struct NewUser<'a> {
    id: i64,
    username: Option<&'a str>,
}

/// PostgreSQL user store. Every call opens its own connection on the
/// blocking thread pool and drops it when the call finishes.
#[derive(Clone)]
pub struct PgUserStore {
    conninfo: String,
}

impl PgUserStore {
    pub fn new(config: &DatabaseConfig) -> Self {
        Self {
            conninfo: config.conninfo(),
        }
    }

    /// Run `f` against a fresh connection on the blocking pool.
    async fn with_connection<T, F>(&self, f: F) -> Result<T, StoreError>
    where
        T: Send + 'static,
        F: FnOnce(&mut PgConnection) -> Result<T, StoreError> + Send + 'static,
    {
        let conninfo = self.conninfo.clone();

        tokio::task::spawn_blocking(move || {
            let mut conn = establish_connection(&conninfo)?;
            f(&mut conn)
        })
        .await
        .map_err(|e| StoreError::Task(e.to_string()))?
    }
}

#[instrument(name = "database.establish_connection", skip_all)]
fn establish_connection(conninfo: &str) -> Result<PgConnection, StoreError> {
    debug!("Connecting to PostgreSQL database");
    PgConnection::establish(conninfo).map_err(|e| {
        error!(error = %e, "Failed to establish database connection");
        StoreError::Connection(e.to_string())
    })
}

fn query_error(e: diesel::result::Error) -> StoreError {
    StoreError::Query(e.to_string())
}

#[async_trait]
impl UserStore for PgUserStore {
    #[instrument(skip(self, user), fields(user_id = user.id))]
    async fn upsert_user(&self, user: &UserRecord) -> Result<(), StoreError> {
        let user = user.clone();

        self.with_connection(move |conn| {
            conn.transaction::<_, diesel::result::Error, _>(|conn| {
                diesel::insert_into(users::table)
                    .values(&NewUser {
                        id: user.id,
                        username: user.username.as_deref(),
                    })
                    .on_conflict(users::id)
                    .do_update()
                    .set(users::username.eq(excluded(users::username)))
                    .execute(conn)
            })
            .map_err(query_error)?;
            Ok(())
        })
        .await
    }

    async fn find_user(&self, id: i64) -> Result<Option<UserRecord>, StoreError> {
        self.with_connection(move |conn| {
            let row = users::table
                .find(id)
                .select((users::id, users::username))
                .first::<(i64, Option<String>)>(conn)
                .optional()
                .map_err(query_error)?;
            Ok(row.map(|(id, username)| UserRecord { id, username }))
        })
        .await
    }

    async fn ensure_schema(&self) -> Result<(), StoreError> {
        self.with_connection(|conn| {
            diesel::sql_query(
                "CREATE TABLE IF NOT EXISTS users (id BIGINT PRIMARY KEY, username TEXT)",
            )
            .execute(conn)
            .map_err(query_error)?;
            Ok(())
        })
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Nothing listens on port 1, so the connect attempt is refused at once.
    fn unreachable_config() -> DatabaseConfig {
        DatabaseConfig {
            name: "greetbot".to_string(),
            user: "greetbot".to_string(),
            password: "secret".to_string(),
            host: "127.0.0.1".to_string(),
            port: 1,
        }
    }

    #[test]
    fn test_new_uses_escaped_conninfo() {
        let store = PgUserStore::new(&unreachable_config());
        assert!(store.conninfo.contains("host='127.0.0.1'"));
        assert!(store.conninfo.contains("port=1 "));
        assert!(store.conninfo.contains("password='secret'"));
    }

    #[tokio::test]
    async fn test_refused_connection_is_reported() {
        let store = PgUserStore::new(&unreachable_config());

        let err = store
            .upsert_user(&UserRecord::new(42, Some("alice".to_string())))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::Connection(_)));
    }

    #[tokio::test]
    async fn test_refused_connection_on_lookup() {
        let store = PgUserStore::new(&unreachable_config());
        assert!(matches!(
            store.find_user(42).await,
            Err(StoreError::Connection(_))
        ));
    }

    #[tokio::test]
    async fn test_refused_connection_on_schema_check() {
        let store = PgUserStore::new(&unreachable_config());
        assert!(matches!(
            store.ensure_schema().await,
            Err(StoreError::Connection(_))
        ));
    }
}
