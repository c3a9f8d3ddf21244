//! Table mutation executor.
//!
//! Applies a single command to its bound grid table: payload
//! normalization against the header row, match-column lookup, read-only
//! column protection, and attachment persistence.

use crate::config::tables::{MatchColumn, TableBinding};
use crate::error::{Error, Result};
use crate::model::{Attachment, Command, KeyedFields};
use crate::store::Store;
use crate::store::grid::{Header, normalize};
use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use tracing::info;
use uuid::Uuid;

/// Field name the attachment URL is injected under before row
/// construction. Fixed by the wire contract.
pub const ATTACHMENT_URL_FIELD: &str = "attachmentUrl";

// ---------------------------------------------------------------------------
// Attachment persistence
// ---------------------------------------------------------------------------

/// Filesystem-backed attachment area. The directory is created on first
/// use; persisted files are addressed by a URL under the configured base.
#[derive(Debug, Clone)]
pub struct AttachmentStore {
    dir: PathBuf,
    base_url: String,
}

impl AttachmentStore {
    pub fn new(dir: impl Into<PathBuf>, base_url: impl Into<String>) -> Self {
        Self {
            dir: dir.into(),
            base_url: base_url.into(),
        }
    }

    /// Decode and persist an attachment, returning its public URL.
    pub fn persist(&self, attachment: &Attachment) -> Result<String> {
        let bytes = BASE64
            .decode(attachment.content.as_bytes())
            .map_err(|e| Error::Parse(format!("bad attachment encoding: {e}")))?;

        std::fs::create_dir_all(&self.dir)?;

        let name = format!("{}-{}", Uuid::new_v4(), safe_file_name(&attachment.file_name));
        std::fs::write(self.dir.join(&name), bytes)?;

        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), name))
    }
}

fn safe_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '-' | '_') {
                c
            } else {
                '_'
            }
        })
        .collect();
    if cleaned.is_empty() {
        "attachment".to_string()
    } else {
        cleaned
    }
}

// ---------------------------------------------------------------------------
// Command application
// ---------------------------------------------------------------------------

/// Apply one command to its bound table. History logging is the caller's
/// concern; this only mutates the grid.
pub fn apply(
    store: &Store,
    binding: &TableBinding,
    attachments: &AttachmentStore,
    cmd: &Command,
) -> Result<()> {
    match cmd {
        Command::Create {
            fields, attachment, ..
        } => {
            let header = store.header(&binding.sheet)?;
            let row = build_create_row(attachments, &header, fields, attachment.as_ref())?;
            store.append_rows(&binding.sheet, std::slice::from_ref(&row))
        }

        Command::BatchCreate { rows, .. } => {
            let header = store.header(&binding.sheet)?;
            let built: Vec<Vec<String>> = rows.iter().map(|f| build_row(&header, f)).collect();
            store.append_rows(&binding.sheet, &built)
        }

        Command::Update {
            match_value,
            fields,
            ..
        } => {
            let header = store.header(&binding.sheet)?;
            let column = match_column_index(&header, &binding.match_column)?;
            let pos = store
                .find_match(&binding.sheet, column, match_value)?
                .ok_or_else(|| Error::NotFound(match_value.clone()))?;
            let updates = update_cells(&header, &binding.readonly, fields);
            store.update_cells(&binding.sheet, pos, &updates)
        }

        Command::Delete { match_value, .. } => {
            let header = store.header(&binding.sheet)?;
            let column = match_column_index(&header, &binding.match_column)?;
            match store.find_match(&binding.sheet, column, match_value)? {
                Some(pos) => store.delete_grid_row(&binding.sheet, pos),
                None => {
                    // Idempotent delete: absent target is a no-op success.
                    info!(
                        target = %binding.name,
                        match_value = %match_value,
                        "delete target absent, no-op"
                    );
                    Ok(())
                }
            }
        }
    }
}

/// Build a create row, persisting the attachment first and injecting its
/// URL under the fixed field name.
pub fn build_create_row(
    attachments: &AttachmentStore,
    header: &Header,
    fields: &KeyedFields,
    attachment: Option<&Attachment>,
) -> Result<Vec<String>> {
    match attachment {
        Some(att) => {
            let url = attachments.persist(att)?;
            let mut fields = fields.clone();
            fields.insert(ATTACHMENT_URL_FIELD.to_string(), url);
            Ok(build_row(header, &fields))
        }
        None => Ok(build_row(header, fields)),
    }
}

/// Normalize a payload against the header: one cell per header column,
/// missing fields become the empty string, unknown keys drop silently.
pub fn build_row(header: &Header, fields: &KeyedFields) -> Vec<String> {
    let by_name = normalized_fields(fields);
    header
        .cells()
        .iter()
        .map(|name| {
            by_name
                .get(&normalize(name))
                .map(|v| v.to_string())
                .unwrap_or_default()
        })
        .collect()
}

/// Resolve a configured match column against a header.
pub fn match_column_index(header: &Header, column: &MatchColumn) -> Result<usize> {
    match column {
        MatchColumn::Index(i) => {
            if *i < header.len() {
                Ok(*i)
            } else {
                Err(Error::Config(format!(
                    "match column index {i} is outside the header"
                )))
            }
        }
        MatchColumn::Name(name) => header
            .get(name)
            .ok_or_else(|| Error::Config(format!("match column '{name}' not in header"))),
    }
}

/// Cell updates for a partial update: every header column present in the
/// payload, minus the read-only set. Columns absent from the payload are
/// left untouched.
fn update_cells(header: &Header, readonly: &[String], fields: &KeyedFields) -> Vec<(usize, String)> {
    let readonly: HashSet<String> = readonly.iter().map(|c| normalize(c)).collect();
    let by_name = normalized_fields(fields);
    header
        .cells()
        .iter()
        .enumerate()
        .filter_map(|(i, name)| {
            let key = normalize(name);
            if readonly.contains(&key) {
                return None;
            }
            by_name.get(&key).map(|v| (i, v.to_string()))
        })
        .collect()
}

fn normalized_fields(fields: &KeyedFields) -> HashMap<String, &str> {
    fields
        .iter()
        .map(|(k, v)| (normalize(k), v.as_str()))
        .collect()
}
