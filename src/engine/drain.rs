//! Lock-guarded batch drainer.
//!
//! One cycle: acquire the drain lock within a bounded wait (denial is a
//! silent skip), read up to `batch_size` entries from the queue head,
//! parse each independently, group by target table, apply groups with
//! bulk writes, then delete exactly the attempted prefix — only if the
//! cycle saw no fatal error. A fatal error after partial group writes
//! deletes nothing, so the whole batch replays on the next cycle and
//! already-written rows are duplicated: the pipeline is at-least-once.

use crate::config::Config;
use crate::config::tables::{TableBinding, TableRegistry};
use crate::engine::executor::{self, AttachmentStore};
use crate::error::{Error, Result};
use crate::model::Command;
use crate::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tracing::{error, info, warn};

/// Tunables for the drain loop.
#[derive(Debug, Clone)]
pub struct DrainConfig {
    /// Max entries read per cycle; bounds worst-case cycle time.
    pub batch_size: usize,
    /// Bounded wait for the drain lock.
    pub lock_wait: Duration,
    /// Period of the drain trigger.
    pub interval: Duration,
}

impl Default for DrainConfig {
    fn default() -> Self {
        Self {
            batch_size: crate::config::DEFAULT_BATCH_SIZE,
            lock_wait: Duration::from_secs(5),
            interval: Duration::from_secs(60),
        }
    }
}

impl From<&Config> for DrainConfig {
    fn from(config: &Config) -> Self {
        Self {
            batch_size: config.batch_size,
            lock_wait: config.lock_wait,
            interval: config.drain_interval,
        }
    }
}

/// What one drain cycle did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The lock was busy within the bounded wait; no work was performed.
    /// Not an error — the next scheduled firing tries again.
    LockDenied,
    /// The cycle committed. `attempted` entries were consumed from the
    /// queue, of which `applied` were written and `skipped` dropped.
    Drained {
        attempted: usize,
        applied: usize,
        skipped: usize,
    },
}

/// The queue consumer. Exactly one cycle runs at a time, serialized by a
/// single process-wide lock shared with any other would-be consumer.
pub struct Drainer {
    store: Arc<Store>,
    registry: Arc<TableRegistry>,
    attachments: AttachmentStore,
    config: DrainConfig,
    lock: Arc<Mutex<()>>,
    shutdown: Arc<Notify>,
}

impl Drainer {
    pub fn new(
        store: Arc<Store>,
        registry: Arc<TableRegistry>,
        attachments: AttachmentStore,
        config: DrainConfig,
        lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            store,
            registry,
            attachments,
            config,
            lock,
            shutdown: Arc::new(Notify::new()),
        }
    }

    /// Signal the drain loop to shut down.
    pub fn shutdown(&self) {
        self.shutdown.notify_one();
    }

    /// Run the periodic drain loop until shutdown.
    pub async fn run(&self) -> Result<()> {
        let mut tick = tokio::time::interval(self.config.interval);
        info!(
            batch_size = self.config.batch_size,
            interval_secs = self.config.interval.as_secs(),
            "drainer started"
        );

        loop {
            tokio::select! {
                _ = self.shutdown.notified() => {
                    info!("drainer shutting down");
                    return Ok(());
                }
                _ = tick.tick() => {
                    match self.drain_once().await {
                        Ok(CycleOutcome::LockDenied) => {}
                        Ok(CycleOutcome::Drained { attempted, applied, skipped }) => {
                            if attempted > 0 {
                                info!(attempted, applied, skipped, "drain cycle committed");
                            }
                        }
                        Err(e) => error!("drain cycle aborted: {e}"),
                    }
                }
            }
        }
    }

    /// Run one drain cycle now.
    ///
    /// Fatal errors (unresolvable destination table, storage faults)
    /// abort before the prefix delete; the queue is left intact and the
    /// same batch replays on the next cycle.
    pub async fn drain_once(&self) -> Result<CycleOutcome> {
        let guard = match tokio::time::timeout(self.config.lock_wait, self.lock.lock()).await {
            Ok(guard) => guard,
            Err(_) => {
                info!("drain lock busy, skipping cycle");
                return Ok(CycleOutcome::LockDenied);
            }
        };

        // Lock held for the whole cycle, released on every path below.
        let outcome = self.drain_locked();
        drop(guard);
        outcome
    }

    fn drain_locked(&self) -> Result<CycleOutcome> {
        let entries = self.store.queue_read_prefix(self.config.batch_size)?;
        if entries.is_empty() {
            return Ok(CycleOutcome::Drained {
                attempted: 0,
                applied: 0,
                skipped: 0,
            });
        }
        let attempted = entries.len();
        let mut skipped = 0;

        // Parse independently: a malformed entry is logged and dropped,
        // never fatal to the batch.
        let mut commands = Vec::new();
        for entry in &entries {
            match serde_json::from_str::<Command>(&entry.body) {
                Ok(cmd) => commands.push(cmd),
                Err(e) => {
                    warn!(pos = entry.pos, "dropping malformed queue entry: {e}");
                    skipped += 1;
                }
            }
        }

        // Group by target table, preserving first-seen order, so each
        // table gets one bulk write instead of one write per entry.
        let mut groups: Vec<(String, Vec<Command>)> = Vec::new();
        for cmd in commands {
            match groups
                .iter()
                .position(|(target, _)| target.as_str() == cmd.target())
            {
                Some(i) => groups[i].1.push(cmd),
                None => groups.push((cmd.target().to_string(), vec![cmd])),
            }
        }

        let mut applied = 0;
        for (target, cmds) in &groups {
            let binding = self.registry.resolve(target)?;
            let (group_applied, group_skipped) = self.apply_group(binding, cmds)?;
            applied += group_applied;
            skipped += group_skipped;
        }

        // Commit: consume the attempted prefix. Parse-skipped entries are
        // part of it, so a malformed entry cannot wedge the queue.
        self.store.queue_delete_prefix(attempted)?;

        Ok(CycleOutcome::Drained {
            attempted,
            applied,
            skipped,
        })
    }

    /// Apply one target's commands: created rows land in a single bulk
    /// append, audit records in a single history insert.
    fn apply_group(&self, binding: &TableBinding, cmds: &[Command]) -> Result<(usize, usize)> {
        let header = self.store.header(&binding.sheet)?;
        let mut rows: Vec<Vec<String>> = Vec::new();
        let mut audit = Vec::new();
        let mut applied = 0;
        let mut skipped = 0;

        for cmd in cmds {
            match cmd {
                Command::Create {
                    fields, attachment, ..
                } => {
                    match executor::build_create_row(
                        &self.attachments,
                        &header,
                        fields,
                        attachment.as_ref(),
                    ) {
                        Ok(row) => {
                            rows.push(row);
                            audit.extend_from_slice(cmd.audit());
                            applied += 1;
                        }
                        Err(Error::Parse(msg)) => {
                            warn!(target = %binding.name, "dropping entry with bad attachment: {msg}");
                            skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }

                Command::BatchCreate { rows: batch, .. } => {
                    rows.extend(batch.iter().map(|f| executor::build_row(&header, f)));
                    audit.extend_from_slice(cmd.audit());
                    applied += 1;
                }

                // The classifier never queues update/delete; tolerate a
                // stray entry rather than poisoning the batch.
                Command::Update { .. } | Command::Delete { .. } => {
                    match executor::apply(&self.store, binding, &self.attachments, cmd) {
                        Ok(()) => {
                            audit.extend_from_slice(cmd.audit());
                            applied += 1;
                        }
                        Err(Error::NotFound(value)) => {
                            warn!(
                                target = %binding.name,
                                match_value = %value,
                                "dropping queued entry whose row is missing"
                            );
                            skipped += 1;
                        }
                        Err(e) => return Err(e),
                    }
                }
            }
        }

        self.store.append_rows(&binding.sheet, &rows)?;
        self.store.append_history(&audit)?;
        Ok((applied, skipped))
    }
}
