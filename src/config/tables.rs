//! Table registry: which logical tables exist and how each is bound.
//!
//! Loaded from a TOML file at startup. Each binding names the backing
//! sheet, the match column used to locate rows for update/delete, and
//! the columns that `update` must never write.

use crate::error::{Error, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::Path;

/// Top-level TOML wrapper.
#[derive(Debug, Deserialize)]
struct RegistryFile {
    /// Logical name of the high-volume completion table. Creates against
    /// this table are queued; everything else runs synchronously.
    completions: String,
    #[serde(default)]
    table: Vec<TableBinding>,
}

/// One configured target table.
#[derive(Debug, Clone, Deserialize)]
pub struct TableBinding {
    /// Logical name, as addressed by commands.
    pub name: String,
    /// Backing sheet identifier in the table store.
    pub sheet: String,
    /// Match column, by header name or zero-based index.
    pub match_column: MatchColumn,
    /// Columns `update` skips even when present in the payload.
    #[serde(default)]
    pub readonly: Vec<String>,
    /// Header row used by `markq init` to create the sheet. Empty means
    /// the sheet is provisioned externally.
    #[serde(default)]
    pub columns: Vec<String>,
}

/// A match column configured by name or by fixed index.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MatchColumn {
    Index(usize),
    Name(String),
}

/// Registry of configured tables, indexed by logical name.
#[derive(Debug)]
pub struct TableRegistry {
    completions: String,
    tables: HashMap<String, TableBinding>,
}

impl TableRegistry {
    /// Build a registry directly (tests, embedded setups).
    pub fn new(completions: impl Into<String>, bindings: Vec<TableBinding>) -> Self {
        let tables = bindings.into_iter().map(|b| (b.name.clone(), b)).collect();
        Self {
            completions: completions.into(),
            tables,
        }
    }

    /// Load the registry from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::Config(format!("cannot read table registry {}: {e}", path.display()))
        })?;
        Self::from_toml_str(&content)
    }

    /// Parse a registry from TOML text.
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: RegistryFile = toml::from_str(content)
            .map_err(|e| Error::Config(format!("bad table registry: {e}")))?;
        let registry = Self::new(file.completions, file.table);
        if !registry.tables.contains_key(&registry.completions) {
            return Err(Error::Config(format!(
                "completions table '{}' has no binding",
                registry.completions
            )));
        }
        Ok(registry)
    }

    /// Logical name of the completion table.
    pub fn completions_table(&self) -> &str {
        &self.completions
    }

    /// Look up a binding by logical name.
    pub fn get(&self, name: &str) -> Option<&TableBinding> {
        self.tables.get(name)
    }

    /// Resolve a binding or fail with a configuration error.
    pub fn resolve(&self, name: &str) -> Result<&TableBinding> {
        self.get(name)
            .ok_or_else(|| Error::Config(format!("unknown target table: {name}")))
    }

    /// All configured bindings, in no particular order.
    pub fn bindings(&self) -> impl Iterator<Item = &TableBinding> {
        self.tables.values()
    }
}
