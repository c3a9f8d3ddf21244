//! Typed configuration from environment variables.
//!
//! Loads once at startup, fails fast if required vars are missing.
//! Constructed in main and passed to every component; no ambient globals.

pub mod tables;

use crate::error::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;

/// Default cap on entries read per drain cycle.
pub const DEFAULT_BATCH_SIZE: usize = 50;

#[derive(Debug, Clone)]
pub struct Config {
    /// Path to the SQLite database backing all tables.
    pub db_path: PathBuf,
    /// Path to the table registry TOML.
    pub tables_path: PathBuf,
    /// Directory attachments are persisted into (created on first use).
    pub attachment_dir: PathBuf,
    /// Base URL under which persisted attachments are reachable.
    pub attachment_base_url: String,
    /// Max queue entries read per drain cycle.
    pub batch_size: usize,
    /// Period of the drain trigger.
    pub drain_interval: Duration,
    /// Bounded wait for the drain lock; denial is a silent skip.
    pub lock_wait: Duration,
    /// Period of the client refresh timer.
    pub refresh_interval: Duration,
    pub log_level: String,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// In local dev, call `dotenvy::dotenv().ok()` before this.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            db_path: PathBuf::from(required_var("MARKQ_DB")?),
            tables_path: PathBuf::from(var_or("MARKQ_TABLES", "tables.toml")),
            attachment_dir: PathBuf::from(var_or("MARKQ_ATTACHMENT_DIR", "attachments")),
            attachment_base_url: var_or("MARKQ_ATTACHMENT_BASE_URL", "file:///attachments"),
            batch_size: parsed_var("MARKQ_BATCH_SIZE", DEFAULT_BATCH_SIZE)?,
            drain_interval: Duration::from_secs(parsed_var("MARKQ_DRAIN_INTERVAL_SECS", 60)?),
            lock_wait: Duration::from_secs(parsed_var("MARKQ_LOCK_WAIT_SECS", 5)?),
            refresh_interval: Duration::from_secs(parsed_var("MARKQ_REFRESH_INTERVAL_SECS", 30)?),
            log_level: var_or("LOG_LEVEL", "info"),
        })
    }
}

fn required_var(name: &str) -> Result<String> {
    std::env::var(name)
        .map_err(|_| Error::Config(format!("required environment variable {name} is not set")))
}

fn var_or(name: &str, default: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T: std::str::FromStr>(name: &str, default: T) -> Result<T> {
    match std::env::var(name) {
        Ok(raw) => raw
            .parse()
            .map_err(|_| Error::Config(format!("{name} is not a valid value: {raw}"))),
        Err(_) => Ok(default),
    }
}
