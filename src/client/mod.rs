//! Client-side optimistic state and reconciliation.
//!
//! The board mutates its local view before server confirmation. Queued
//! commands leave an in-flight marker that survives until a refreshed
//! snapshot shows the item's completion populated (or the item gone);
//! synchronous commands are awaited and rolled back locally on failure.
//! Commands are fire-and-forget — once sent, they cannot be unsent.

use crate::engine::{Ack, Dispatcher};
use crate::error::Result;
use crate::model::Command;
use crate::store::grid::normalize;
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{BTreeMap, HashSet};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, warn};

// ---------------------------------------------------------------------------
// Transport
// ---------------------------------------------------------------------------

/// Authoritative completion states from one refresh.
#[derive(Debug, Clone, Default)]
pub struct Snapshot {
    completed: HashSet<String>,
}

impl Snapshot {
    pub fn new(completed: impl IntoIterator<Item = String>) -> Self {
        Self {
            completed: completed.into_iter().map(|v| normalize(&v)).collect(),
        }
    }

    pub fn is_completed(&self, task_ref: &str) -> bool {
        self.completed.contains(&normalize(task_ref))
    }
}

/// Transport seam between the board and the backend.
#[async_trait]
pub trait Backend: Send + Sync {
    /// Submit one command. Queued commands acknowledge before application.
    async fn submit(&self, cmd: Command) -> Result<Ack>;

    /// Fetch the authoritative completion snapshot.
    async fn snapshot(&self) -> Result<Snapshot>;
}

/// In-process backend over the dispatcher.
pub struct LocalBackend {
    dispatcher: Arc<Dispatcher>,
}

impl LocalBackend {
    pub fn new(dispatcher: Arc<Dispatcher>) -> Self {
        Self { dispatcher }
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn submit(&self, cmd: Command) -> Result<Ack> {
        self.dispatcher.handle(cmd)
    }

    async fn snapshot(&self) -> Result<Snapshot> {
        Ok(Snapshot::new(self.dispatcher.completion_snapshot()?))
    }
}

// ---------------------------------------------------------------------------
// Board
// ---------------------------------------------------------------------------

/// One work item as the client sees it.
#[derive(Debug, Clone)]
pub struct ItemView {
    pub task_ref: String,
    pub title: String,
    /// Confirmed complete by the last refresh.
    pub completed: bool,
    /// Submitted but not yet externally confirmed.
    pub submitting: bool,
}

impl ItemView {
    pub fn new(task_ref: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            task_ref: task_ref.into(),
            title: title.into(),
            completed: false,
            submitting: false,
        }
    }
}

/// What a refresh call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshOutcome {
    Refreshed,
    /// Another refresh was already running; this one did nothing.
    AlreadyRunning,
}

/// Client-local optimistic view of the pending work items.
///
/// Shared between the UI task (marking, undoing) and the reconciliation
/// task (periodic refresh); the in-flight set is the only state they
/// coordinate through.
pub struct Board {
    backend: Arc<dyn Backend>,
    items: Mutex<BTreeMap<String, ItemView>>,
    in_flight: Mutex<HashSet<String>>,
    refresh_guard: tokio::sync::Mutex<()>,
    shutdown: Arc<Notify>,
}

impl Board {
    pub fn new(backend: Arc<dyn Backend>, items: Vec<ItemView>) -> Self {
        let items = items
            .into_iter()
            .map(|item| (normalize(&item.task_ref), item))
            .collect();
        Self {
            backend,
            items: Mutex::new(items),
            in_flight: Mutex::new(HashSet::new()),
            refresh_guard: tokio::sync::Mutex::new(()),
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Items not yet confirmed complete, with their submitting flags.
    pub fn pending(&self) -> Vec<ItemView> {
        self.items
            .lock()
            .values()
            .filter(|item| !item.completed)
            .cloned()
            .collect()
    }

    pub fn item(&self, task_ref: &str) -> Option<ItemView> {
        self.items.lock().get(&normalize(task_ref)).cloned()
    }

    pub fn is_submitting(&self, task_ref: &str) -> bool {
        self.in_flight.lock().contains(&normalize(task_ref))
    }

    /// Mark an item done. The submitting flag is set before the request
    /// returns; a synchronous failure rolls it back immediately. A queued
    /// acknowledgement leaves the marker until a refresh confirms the
    /// completion.
    pub async fn mark_done(&self, task_ref: &str, cmd: Command) -> Result<Ack> {
        let key = normalize(task_ref);

        self.in_flight.lock().insert(key.clone());
        if let Some(item) = self.items.lock().get_mut(&key) {
            item.submitting = true;
        }

        match self.backend.submit(cmd).await {
            Ok(ack) => Ok(ack),
            Err(e) => {
                self.in_flight.lock().remove(&key);
                if let Some(item) = self.items.lock().get_mut(&key) {
                    item.submitting = false;
                }
                warn!(task_ref, "mark failed, optimistic state rolled back: {e}");
                Err(e)
            }
        }
    }

    /// Undo a completion. Runs synchronously so it observes up-to-date
    /// state; the optimistic change is rolled back on failure.
    pub async fn undo(&self, task_ref: &str, cmd: Command) -> Result<()> {
        let key = normalize(task_ref);

        if let Some(item) = self.items.lock().get_mut(&key) {
            item.completed = false;
        }

        match self.backend.submit(cmd).await {
            Ok(_) => Ok(()),
            Err(e) => {
                if let Some(item) = self.items.lock().get_mut(&key) {
                    item.completed = true;
                }
                warn!(task_ref, "undo failed, optimistic state rolled back: {e}");
                Err(e)
            }
        }
    }

    /// Re-fetch the authoritative snapshot and reconcile.
    ///
    /// Manual refresh and the periodic timer share the same guard: an
    /// overlapping call observes `AlreadyRunning` and does nothing.
    pub async fn refresh(&self) -> Result<RefreshOutcome> {
        let Ok(_guard) = self.refresh_guard.try_lock() else {
            return Ok(RefreshOutcome::AlreadyRunning);
        };

        let snapshot = self.backend.snapshot().await?;

        let mut items = self.items.lock();
        let mut in_flight = self.in_flight.lock();

        for (key, item) in items.iter_mut() {
            item.completed = snapshot.is_completed(key);
        }

        // A marker is cleared once the snapshot shows the completion
        // populated, or the item has left the pending view entirely;
        // otherwise the item is still "submitting".
        in_flight.retain(|key| match items.get(key) {
            Some(item) => !item.completed,
            None => false,
        });

        for (key, item) in items.iter_mut() {
            item.submitting = in_flight.contains(key);
        }

        Ok(RefreshOutcome::Refreshed)
    }

    /// Signal the refresh loop to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run the periodic refresh loop until shutdown.
    pub async fn run_refresh_loop(&self, interval: Duration) -> Result<()> {
        let mut tick = tokio::time::interval(interval);
        info!(interval_secs = interval.as_secs(), "refresh loop started");

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("refresh loop shutting down");
                    return Ok(());
                }
                _ = tick.tick() => {
                    if let Err(e) = self.refresh().await {
                        error!("refresh failed: {e}");
                    }
                }
            }
        }
    }
}
