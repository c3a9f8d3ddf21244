//! Request classification and dispatch.
//!
//! Every incoming command passes through here: validated against the
//! table registry, then either applied inline with the result propagated,
//! or appended to the queue and acknowledged before application.

use crate::api::{self, ApiResponse};
use crate::config::tables::TableRegistry;
use crate::engine::executor::{self, AttachmentStore};
use crate::error::{Error, Result};
use crate::model::Command;
use crate::store::Store;
use crate::store::grid::normalize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{error, info, warn};

/// How a command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// Applied inline; the caller awaits the result.
    Synchronous,
    /// Appended to the queue; acknowledged before application.
    Queued,
}

/// Routing rule: a command is queued iff it targets the completion table
/// and creates rows. Everything else — including deletes against that
/// same table, which must observe up-to-date state for undo — runs
/// synchronously.
pub fn classify(cmd: &Command, registry: &TableRegistry) -> Route {
    let queued = cmd.target() == registry.completions_table()
        && matches!(cmd, Command::Create { .. } | Command::BatchCreate { .. });
    if queued { Route::Queued } else { Route::Synchronous }
}

/// Outcome of a dispatched command.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ack {
    /// Applied and logged inline.
    Applied,
    /// Durably queued; application happens on a later drain cycle.
    Enqueued,
}

/// The server-side entry point for commands.
pub struct Dispatcher {
    store: Arc<Store>,
    registry: Arc<TableRegistry>,
    attachments: AttachmentStore,
}

impl Dispatcher {
    pub fn new(store: Arc<Store>, registry: Arc<TableRegistry>, attachments: AttachmentStore) -> Self {
        Self {
            store,
            registry,
            attachments,
        }
    }

    /// Handle one command: validate the target, classify, route.
    ///
    /// A command with an unknown target is rejected here, before it can
    /// reach the queue.
    pub fn handle(&self, cmd: Command) -> Result<Ack> {
        let binding = self.registry.resolve(cmd.target())?;

        match classify(&cmd, &self.registry) {
            Route::Queued => {
                let body = serde_json::to_string(&cmd)
                    .map_err(|e| Error::Parse(format!("unserializable command: {e}")))?;
                let pos = self.store.queue_append(&body)?;
                info!(action = cmd.action(), target = cmd.target(), pos, "command queued");
                Ok(Ack::Enqueued)
            }
            Route::Synchronous => {
                executor::apply(&self.store, binding, &self.attachments, &cmd)?;
                self.store.append_history(cmd.audit())?;
                info!(action = cmd.action(), target = cmd.target(), "command applied");
                Ok(Ack::Applied)
            }
        }
    }

    /// Handle a raw request body and produce the wire response.
    ///
    /// Queued acceptance answers success immediately, regardless of the
    /// eventual drain outcome. All errors are logged with context before
    /// being surfaced.
    pub fn handle_body(&self, body: &str) -> ApiResponse {
        let cmd = match api::parse_request(body) {
            Ok(cmd) => cmd,
            Err(e) => {
                warn!("rejected request body: {e}");
                return ApiResponse::error(e.to_string());
            }
        };

        let action = cmd.action();
        let target = cmd.target().to_string();
        let ident = cmd.match_value().map(str::to_string);

        match self.handle(cmd) {
            Ok(Ack::Enqueued) => ApiResponse::success("queued"),
            Ok(Ack::Applied) => ApiResponse::success(format!("{action} applied")),
            Err(e) => {
                error!(
                    action,
                    target = %target,
                    match_value = ident.as_deref().unwrap_or("-"),
                    "command failed: {e}"
                );
                ApiResponse::error(e.to_string())
            }
        }
    }

    /// Authoritative completion snapshot: normalized match-column values
    /// currently present in the completion table.
    pub fn completion_snapshot(&self) -> Result<HashSet<String>> {
        let binding = self.registry.resolve(self.registry.completions_table())?;
        let header = self.store.header(&binding.sheet)?;
        let column = executor::match_column_index(&header, &binding.match_column)?;
        let values = self.store.column_values(&binding.sheet, column)?;
        Ok(values
            .into_iter()
            .filter(|v| !v.trim().is_empty())
            .map(|v| normalize(&v))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::tables::{MatchColumn, TableBinding, TableRegistry};
    use crate::model::KeyedFields;

    fn registry() -> TableRegistry {
        let binding = |name: &str, sheet: &str| TableBinding {
            name: name.to_string(),
            sheet: sheet.to_string(),
            match_column: MatchColumn::Index(0),
            readonly: vec![],
            columns: vec![],
        };
        TableRegistry::new(
            "completions",
            vec![
                binding("completions", "Completions"),
                binding("assignments", "Assignments"),
            ],
        )
    }

    fn create(target: &str) -> Command {
        Command::Create {
            target: target.to_string(),
            fields: KeyedFields::new(),
            attachment: None,
            audit: vec![],
        }
    }

    #[test]
    fn only_completion_creates_are_queued() {
        let registry = registry();

        assert_eq!(classify(&create("completions"), &registry), Route::Queued);
        assert_eq!(
            classify(
                &Command::BatchCreate {
                    target: "completions".to_string(),
                    rows: vec![],
                    audit: vec![],
                },
                &registry
            ),
            Route::Queued
        );

        // A delete against the same table must observe up-to-date state.
        assert_eq!(
            classify(
                &Command::Delete {
                    target: "completions".to_string(),
                    match_value: "T-1".to_string(),
                    audit: vec![],
                },
                &registry
            ),
            Route::Synchronous
        );

        // Any other target is synchronous, whatever the action.
        assert_eq!(
            classify(&create("assignments"), &registry),
            Route::Synchronous
        );
    }
}
