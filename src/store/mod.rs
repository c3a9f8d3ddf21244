//! SQLite table store.
//!
//! Single backing database for the grid tables, the command queue, and
//! the history ledger. WAL mode for concurrent read access. The
//! connection sits behind a mutex so the store can be shared between the
//! dispatcher, the drainer, and the client backend; this serializes
//! physical access only and provides no logical locking.

pub mod grid;
pub mod history;
pub mod queue;

use crate::error::Result;
use parking_lot::Mutex;
use rusqlite::Connection;

/// Storage backend. Owns the SQLite connection.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = Connection::open(path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    /// Create an in-memory database (for testing).
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init()?;
        Ok(store)
    }

    fn init(&self) -> Result<()> {
        let conn = self.conn.lock();

        // WAL mode for concurrent readers
        conn.execute_batch("PRAGMA journal_mode=WAL;")?;

        conn.execute_batch(
            "
            CREATE TABLE IF NOT EXISTS grid_rows (
                sheet       TEXT NOT NULL,
                pos         INTEGER NOT NULL,
                cells       TEXT NOT NULL,
                PRIMARY KEY (sheet, pos)
            );

            CREATE TABLE IF NOT EXISTS queue (
                pos         INTEGER PRIMARY KEY AUTOINCREMENT,
                body        TEXT NOT NULL
            );

            CREATE TABLE IF NOT EXISTS history (
                seq         INTEGER PRIMARY KEY AUTOINCREMENT,
                timestamp   TEXT NOT NULL,
                system_type TEXT NOT NULL,
                task_ref    TEXT NOT NULL,
                changed_by  TEXT NOT NULL,
                description TEXT NOT NULL
            );
            ",
        )?;

        Ok(())
    }

    /// Run a closure against the connection.
    pub(crate) fn with_conn<T>(&self, f: impl FnOnce(&Connection) -> Result<T>) -> Result<T> {
        let conn = self.conn.lock();
        f(&conn)
    }

    /// Execute a closure within a SQLite transaction.
    ///
    /// The transaction commits if the closure returns Ok, rolls back on Err.
    pub(crate) fn with_transaction<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T>,
    ) -> Result<T> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        let result = f(&tx)?;
        tx.commit()?;
        Ok(result)
    }

    /// Simple health check — run a SELECT 1.
    pub fn health_check(&self) -> Result<()> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))?;
            Ok(())
        })
    }
}
