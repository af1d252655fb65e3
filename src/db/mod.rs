use rusqlite::Connection;
use std::path::Path;
use tokio::task;
use crate::error::{Result, RelgraphError};

/// WAL for concurrent readers, foreign keys so relations cascade with their type,
/// busy_timeout so short write contention retries instead of failing.
const CONNECTION_PRAGMAS: &str = "PRAGMA journal_mode = WAL; \
     PRAGMA synchronous = NORMAL; \
     PRAGMA foreign_keys = ON; \
     PRAGMA busy_timeout = 5000; \
     PRAGMA temp_store = MEMORY; \
     PRAGMA cache_size = -16384;";

/// Database connection wrapper
#[derive(Debug, Clone)]
pub struct Db {
    path: std::path::PathBuf,
}

impl Db {
    /// Create a new database connection manager
    pub fn new<P: AsRef<Path>>(db_path: P) -> Self {
        Self {
            path: db_path.as_ref().to_path_buf(),
        }
    }

    /// Path of the underlying SQLite file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Open a new database connection with the standard pragmas
    pub fn open_connection(&self) -> Result<Connection> {
        let conn = Connection::open(&self.path)?;
        conn.execute_batch(CONNECTION_PRAGMAS)?;
        Ok(conn)
    }

    /// Execute a closure with a database connection in a blocking task
    ///
    /// Each call gets its own connection, so one closure is one unit of
    /// isolation: statements inside it see a consistent view only when the
    /// closure opens a transaction.
    pub async fn with_connection<F, T>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let db = self.clone();
        task::spawn_blocking(move || {
            let mut conn = db.open_connection()?;
            f(&mut conn)
        })
        .await
        .map_err(|e| RelgraphError::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?
    }
}

pub mod migrate;
