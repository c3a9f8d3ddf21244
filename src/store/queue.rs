//! Command queue operations.
//!
//! An append-only FIFO log of serialized commands, one per row. Position
//! is the only identity and the only ordering key. Entries are appended
//! at the tail and removed only as a contiguous prefix from the head;
//! the store has no visibility into command semantics.

use crate::error::Result;
use rusqlite::params;

/// One queued entry. The position is carried for logging context only —
/// removal is count-based prefix deletion, never by position.
#[derive(Debug, Clone)]
pub struct QueueEntry {
    pub pos: i64,
    pub body: String,
}

impl super::Store {
    /// Append one serialized command at the tail. Returns its position.
    pub fn queue_append(&self, body: &str) -> Result<i64> {
        self.with_conn(|conn| {
            conn.execute("INSERT INTO queue (body) VALUES (?1)", params![body])?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Read the first `n` entries in insertion order without removing them.
    pub fn queue_read_prefix(&self, n: usize) -> Result<Vec<QueueEntry>> {
        self.with_conn(|conn| {
            let mut stmt =
                conn.prepare("SELECT pos, body FROM queue ORDER BY pos ASC LIMIT ?1")?;
            let entries = stmt
                .query_map(params![n as i64], |row| {
                    Ok(QueueEntry {
                        pos: row.get(0)?,
                        body: row.get(1)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(entries)
        })
    }

    /// Remove exactly the first `n` entries. On any failure the entries
    /// are left in place (the statement either applies or it does not).
    /// Returns the number actually removed.
    pub fn queue_delete_prefix(&self, n: usize) -> Result<usize> {
        self.with_conn(|conn| {
            let removed = conn.execute(
                "DELETE FROM queue WHERE pos IN
                     (SELECT pos FROM queue ORDER BY pos ASC LIMIT ?1)",
                params![n as i64],
            )?;
            Ok(removed)
        })
    }

    pub fn queue_len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 = conn.query_row("SELECT COUNT(*) FROM queue", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}
