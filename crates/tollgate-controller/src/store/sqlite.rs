//! SQLite-backed nonce store.
//!
//! Every controller process that opens the same database file shares one
//! `PRIMARY KEY (nonce, purpose)` constraint, which serializes racing
//! registrations: exactly one insert commits and the rest fail with a
//! constraint violation.

use std::path::Path;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use rusqlite::{params, Connection, ErrorCode};
use tollgate_core::{ConnectionNonce, NoncePurpose};
use tracing::debug;

use super::{NonceStore, NonceStoreError};

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS worker_auth_nonce (
    nonce TEXT NOT NULL,
    purpose TEXT NOT NULL,
    create_time TEXT NOT NULL DEFAULT CURRENT_TIMESTAMP,
    PRIMARY KEY (nonce, purpose)
)";

/// Nonce store persisted in a SQLite database.
#[derive(Debug, Clone)]
pub struct SqliteNonceStore {
    conn: Arc<Mutex<Connection>>,
}

impl SqliteNonceStore {
    /// Open (or create) the database at `path`.
    ///
    /// `busy_timeout` bounds how long an insert waits for another process
    /// holding the write lock.
    pub fn open(path: impl AsRef<Path>, busy_timeout: Duration) -> Result<Self, NonceStoreError> {
        let path = path.as_ref();
        let conn = Connection::open(path).map_err(unavailable)?;
        conn.busy_timeout(busy_timeout).map_err(unavailable)?;
        let mode: String = conn
            .pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))
            .map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;

        debug!(path = %path.display(), journal_mode = %mode, "Nonce store opened");

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    #[cfg(test)]
    fn open_in_memory() -> Result<Self, NonceStoreError> {
        let conn = Connection::open_in_memory().map_err(unavailable)?;
        conn.execute_batch(SCHEMA).map_err(unavailable)?;
        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
        })
    }

    /// Run `f` against the connection on the blocking pool.
    async fn with_conn<T, F>(&self, f: F) -> Result<T, NonceStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&Connection) -> Result<T, NonceStoreError> + Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let guard = match conn.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            f(&*guard)
        })
        .await
        .map_err(|e| NonceStoreError::Unavailable(format!("store task failed: {e}")))?
    }

    #[cfg(test)]
    async fn contains(
        &self,
        nonce: &ConnectionNonce,
        purpose: NoncePurpose,
    ) -> Result<bool, NonceStoreError> {
        use rusqlite::OptionalExtension;

        let nonce = nonce.as_str().to_owned();
        self.with_conn(move |conn| {
            conn.query_row(
                "SELECT 1 FROM worker_auth_nonce WHERE nonce = ?1 AND purpose = ?2",
                params![nonce, purpose.as_str()],
                |_| Ok(()),
            )
            .optional()
            .map(|row| row.is_some())
            .map_err(unavailable)
        })
        .await
    }

    #[cfg(test)]
    fn drop_schema_for_test(&self) {
        let conn = self.conn.lock().unwrap();
        conn.execute_batch("DROP TABLE worker_auth_nonce").unwrap();
    }
}

#[async_trait]
impl NonceStore for SqliteNonceStore {
    async fn add_nonce(
        &self,
        nonce: &ConnectionNonce,
        purpose: NoncePurpose,
    ) -> Result<(), NonceStoreError> {
        let nonce = nonce.as_str().to_owned();
        self.with_conn(move |conn| {
            let result = conn.execute(
                "INSERT INTO worker_auth_nonce (nonce, purpose) VALUES (?1, ?2)",
                params![nonce, purpose.as_str()],
            );
            match result {
                Ok(_) => Ok(()),
                Err(rusqlite::Error::SqliteFailure(e, _))
                    if e.code == ErrorCode::ConstraintViolation =>
                {
                    Err(NonceStoreError::Duplicate { purpose })
                }
                Err(e) => Err(unavailable(e)),
            }
        })
        .await
    }
}

fn unavailable(e: rusqlite::Error) -> NonceStoreError {
    NonceStoreError::Unavailable(e.to_string())
}
