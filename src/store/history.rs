//! History ledger operations.
//!
//! Append-only audit trail, the sole source of audit truth. One bulk
//! insert per invocation; the timestamp is the moment of logging, not of
//! the original user action. Never reconciled against the queue.

use crate::error::Result;
use crate::model::{AuditDraft, AuditEntry};
use chrono::Utc;
use rusqlite::params;

impl super::Store {
    /// Append audit records in one transaction. The whole batch lands or
    /// none of it does.
    pub fn append_history(&self, drafts: &[AuditDraft]) -> Result<()> {
        if drafts.is_empty() {
            return Ok(());
        }
        let now = Utc::now().to_rfc3339();
        self.with_transaction(|tx| {
            for draft in drafts {
                tx.execute(
                    "INSERT INTO history (timestamp, system_type, task_ref, changed_by, description)
                         VALUES (?1, ?2, ?3, ?4, ?5)",
                    params![
                        now,
                        draft.system_type,
                        draft.task_ref,
                        draft.changed_by,
                        draft.description,
                    ],
                )?;
            }
            Ok(())
        })
    }

    /// The most recent `limit` entries, oldest first. Operator surface;
    /// the write pipeline itself never reads history.
    pub fn history_tail(&self, limit: usize) -> Result<Vec<AuditEntry>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT timestamp, system_type, task_ref, changed_by, description
                     FROM history ORDER BY seq DESC LIMIT ?1",
            )?;
            let mut entries = stmt
                .query_map(params![limit as i64], |row| {
                    Ok(AuditEntry {
                        timestamp: row
                            .get::<_, String>(0)?
                            .parse()
                            .unwrap_or_else(|_| Utc::now()),
                        system_type: row.get(1)?,
                        task_ref: row.get(2)?,
                        changed_by: row.get(3)?,
                        description: row.get(4)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            entries.reverse();
            Ok(entries)
        })
    }

    pub fn history_len(&self) -> Result<usize> {
        self.with_conn(|conn| {
            let count: i64 =
                conn.query_row("SELECT COUNT(*) FROM history", [], |row| row.get(0))?;
            Ok(count as usize)
        })
    }
}
