//! Core data model.
//!
//! A command is a single mutation against a named table: what to do
//! (action), where (target), and with what (payload). Commands are
//! immutable once serialized; the queue stores their JSON form verbatim.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

// ---------------------------------------------------------------------------
// Command
// ---------------------------------------------------------------------------

/// Payload fields keyed by raw column name. Matching against a table's
/// header is case-insensitive and whitespace-trimmed; keys with no
/// matching column are dropped silently at write time.
pub type KeyedFields = BTreeMap<String, String>;

/// A mutation against one named table. The serde form (tagged by
/// `action`, camelCase fields) is the canonical queue entry format.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "camelCase")]
pub enum Command {
    /// Append one row built from the payload.
    #[serde(rename_all = "camelCase")]
    Create {
        target: String,
        fields: KeyedFields,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        attachment: Option<Attachment>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        audit: Vec<AuditDraft>,
    },

    /// Append many rows in one bulk write, preserving input order.
    #[serde(rename_all = "camelCase")]
    BatchCreate {
        target: String,
        rows: Vec<KeyedFields>,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        audit: Vec<AuditDraft>,
    },

    /// Partial update of the row located via the match column.
    #[serde(rename_all = "camelCase")]
    Update {
        target: String,
        match_value: String,
        fields: KeyedFields,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        audit: Vec<AuditDraft>,
    },

    /// Remove the row located via the match column. Deleting a row that
    /// does not exist is a no-op success, not an error.
    #[serde(rename_all = "camelCase")]
    Delete {
        target: String,
        match_value: String,
        #[serde(default, skip_serializing_if = "Vec::is_empty")]
        audit: Vec<AuditDraft>,
    },
}

impl Command {
    /// The wire-format action name.
    pub fn action(&self) -> &'static str {
        match self {
            Command::Create { .. } => "create",
            Command::BatchCreate { .. } => "batchCreate",
            Command::Update { .. } => "update",
            Command::Delete { .. } => "delete",
        }
    }

    /// The logical table this command addresses.
    pub fn target(&self) -> &str {
        match self {
            Command::Create { target, .. }
            | Command::BatchCreate { target, .. }
            | Command::Update { target, .. }
            | Command::Delete { target, .. } => target,
        }
    }

    /// The match value, for actions that locate an existing row.
    pub fn match_value(&self) -> Option<&str> {
        match self {
            Command::Update { match_value, .. } | Command::Delete { match_value, .. } => {
                Some(match_value)
            }
            _ => None,
        }
    }

    /// Audit entries to log once the command is applied.
    pub fn audit(&self) -> &[AuditDraft] {
        match self {
            Command::Create { audit, .. }
            | Command::BatchCreate { audit, .. }
            | Command::Update { audit, .. }
            | Command::Delete { audit, .. } => audit,
        }
    }
}

// ---------------------------------------------------------------------------
// Attachment
// ---------------------------------------------------------------------------

/// A binary attachment carried by a `create` command, base64-encoded on
/// the wire. Persisted by the executor before row construction.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub file_name: String,
    pub mime_type: String,
    /// Base64 (standard alphabet) file content.
    pub content: String,
}

// ---------------------------------------------------------------------------
// Audit
// ---------------------------------------------------------------------------

/// An audit record as submitted with a command. The timestamp is stamped
/// by the history logger at logging time, not here.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditDraft {
    pub system_type: String,
    pub task_ref: String,
    pub changed_by: String,
    pub description: String,
}

/// A row of the append-only history ledger.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditEntry {
    pub timestamp: DateTime<Utc>,
    pub system_type: String,
    pub task_ref: String,
    pub changed_by: String,
    pub description: String,
}
