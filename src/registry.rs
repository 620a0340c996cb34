//! Durable registry of live push-channel connections
//!
//! The registry is the only record of who is listening. Every operation is a
//! single key-level insert, delete or scan, so writers (connect/disconnect)
//! and the dispatcher (scan + prune) never need a lock spanning operations.
//! A snapshot from [`ConnectionRegistry::list_all`] reflects every add/remove
//! that completed before the scan began; concurrent writes may or may not
//! show up.

use std::path::{Path, PathBuf};
use std::time::Duration;

use parking_lot::Mutex;
use rusqlite::{params, Connection};

use crate::error::Result;

/// Busy timeout applied to the SQLite handle
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Identifier of one push-channel session
pub type ConnectionId = String;

/// Store of active connection identifiers
pub trait ConnectionRegistry: Send + Sync {
    /// Insert `connection_id`. Adding an id twice has no further effect.
    fn add(&self, connection_id: &str) -> Result<()>;

    /// Delete `connection_id`. Removing an absent id is not an error.
    fn remove(&self, connection_id: &str) -> Result<()>;

    /// Snapshot of all stored ids
    fn list_all(&self) -> Result<Vec<ConnectionId>>;
}

/// SQLite-backed registry: one table keyed by `connection_id`
pub struct SqliteConnectionRegistry {
    conn: Mutex<Connection>,
    path: Option<PathBuf>,
}

impl SqliteConnectionRegistry {
    /// Open (or create) the registry database at `path`
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode = WAL;")?;
        Self::init(conn, Some(path.to_path_buf()))
    }

    /// Registry that lives only as long as this handle
    pub fn open_in_memory() -> Result<Self> {
        Self::init(Connection::open_in_memory()?, None)
    }

    fn init(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS connections (
                connection_id TEXT PRIMARY KEY NOT NULL
            ) WITHOUT ROWID;",
        )?;
        match &path {
            Some(p) => tracing::info!("Connection registry opened at {}", p.display()),
            None => tracing::info!("Connection registry opened in memory"),
        }
        Ok(Self {
            conn: Mutex::new(conn),
            path,
        })
    }

    /// Location of the database file, if any
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Whether `connection_id` is currently stored
    pub fn contains(&self, connection_id: &str) -> Result<bool> {
        let conn = self.conn.lock();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM connections WHERE connection_id = ?1",
            params![connection_id],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }
}

impl ConnectionRegistry for SqliteConnectionRegistry {
    fn add(&self, connection_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO connections (connection_id) VALUES (?1)",
            params![connection_id],
        )?;
        Ok(())
    }

    fn remove(&self, connection_id: &str) -> Result<()> {
        let conn = self.conn.lock();
        conn.execute(
            "DELETE FROM connections WHERE connection_id = ?1",
            params![connection_id],
        )?;
        Ok(())
    }

    fn list_all(&self) -> Result<Vec<ConnectionId>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare_cached("SELECT connection_id FROM connections ORDER BY connection_id")?;
        let ids = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(ids)
    }
}
