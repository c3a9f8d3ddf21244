//! # markq
//!
//! Write pipeline for a shared completion ledger. Mutating commands from
//! many concurrent client sessions are classified, either applied
//! immediately or durably queued, drained by a single lock-serialized
//! background consumer in bounded batches, and reconciled back into each
//! client's optimistic view.

pub mod api;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod model;
pub mod store;
pub mod telemetry;
