//! Drain cycle properties: batch bound, commit rule, lock exclusion.

use markq::config::tables::{MatchColumn, TableBinding, TableRegistry};
use markq::engine::{Ack, AttachmentStore, CycleOutcome, DrainConfig, Drainer, Dispatcher};
use markq::model::{Command, KeyedFields};
use markq::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

fn fields(pairs: &[(&str, &str)]) -> KeyedFields {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}

fn test_registry() -> Arc<TableRegistry> {
    Arc::new(TableRegistry::new(
        "completions",
        vec![TableBinding {
            name: "completions".to_string(),
            sheet: "Completions".to_string(),
            match_column: MatchColumn::Name("Task ID".to_string()),
            readonly: vec![],
            columns: vec![],
        }],
    ))
}

fn seeded_store() -> Arc<Store> {
    let store = Store::in_memory().unwrap();
    store
        .create_sheet(
            "Completions",
            &cols(&["Task ID", "Completed By", "Completed On"]),
        )
        .unwrap();
    Arc::new(store)
}

fn attachments() -> AttachmentStore {
    AttachmentStore::new(
        std::env::temp_dir().join(format!("markq-test-{}", uuid::Uuid::new_v4())),
        "https://files.test/attachments",
    )
}

fn drain_config(batch_size: usize) -> DrainConfig {
    DrainConfig {
        batch_size,
        lock_wait: Duration::from_millis(250),
        interval: Duration::from_secs(60),
    }
}

fn drainer(store: &Arc<Store>, batch_size: usize, lock: Arc<Mutex<()>>) -> Drainer {
    Drainer::new(
        store.clone(),
        test_registry(),
        attachments(),
        drain_config(batch_size),
        lock,
    )
}

fn mark_command(task_ref: &str) -> Command {
    Command::Create {
        target: "completions".to_string(),
        fields: fields(&[("Task ID", task_ref), ("Completed By", "ana")]),
        attachment: None,
        audit: vec![],
    }
}

// ---------------------------------------------------------------------------
// One queued command, one cycle
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_create_applies_on_next_cycle() {
    let store = seeded_store();
    let dispatcher = Dispatcher::new(store.clone(), test_registry(), attachments());

    let body = r#"{
        "action": "create",
        "sheetName": "completions",
        "newData": {"Task ID": "T-1", "Completed By": "ana"},
        "historyRecord": {"systemType": "web", "task": "T-1", "changedBy": "ana", "change": "marked done"}
    }"#;
    let response = dispatcher.handle_body(body);
    assert!(response.is_success());
    assert_eq!(response.message, "queued");

    // Acknowledged but not yet applied.
    assert_eq!(store.queue_len().unwrap(), 1);
    assert!(store.rows("Completions").unwrap().is_empty());

    let outcome = drainer(&store, 50, Arc::new(Mutex::new(())))
        .drain_once()
        .await
        .unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Drained {
            attempted: 1,
            applied: 1,
            skipped: 0
        }
    );

    let rows = store.rows("Completions").unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].cells[0], "T-1");
    assert_eq!(store.history_len().unwrap(), 1);
    assert_eq!(store.queue_len().unwrap(), 0);
}

// ---------------------------------------------------------------------------
// Batch bound
// ---------------------------------------------------------------------------

#[tokio::test]
async fn batch_bound_caps_each_cycle() {
    let store = seeded_store();
    let dispatcher = Dispatcher::new(store.clone(), test_registry(), attachments());

    for i in 0..120 {
        let ack = dispatcher.handle(mark_command(&format!("T-{i}"))).unwrap();
        assert_eq!(ack, Ack::Enqueued);
    }

    let drainer = drainer(&store, 50, Arc::new(Mutex::new(())));
    let mut attempted_per_cycle = Vec::new();
    for _ in 0..3 {
        match drainer.drain_once().await.unwrap() {
            CycleOutcome::Drained { attempted, .. } => attempted_per_cycle.push(attempted),
            other => panic!("expected Drained, got {other:?}"),
        }
    }

    assert_eq!(attempted_per_cycle, vec![50, 50, 20]);
    assert_eq!(store.rows("Completions").unwrap().len(), 120);
    assert_eq!(store.queue_len().unwrap(), 0);

    // Order survived the queue.
    let ids: Vec<String> = store.column_values("Completions", 0).unwrap();
    assert_eq!(ids[0], "T-0");
    assert_eq!(ids[119], "T-119");
}

// ---------------------------------------------------------------------------
// Fatal abort: nothing deleted
// ---------------------------------------------------------------------------

#[tokio::test]
async fn unresolvable_target_aborts_without_deletion() {
    let store = seeded_store();

    // Simulates config drift: the entry was queued when its table was
    // still registered.
    let stray = Command::Create {
        target: "retired-table".to_string(),
        fields: fields(&[("Task ID", "T-1")]),
        attachment: None,
        audit: vec![],
    };
    store
        .queue_append(&serde_json::to_string(&stray).unwrap())
        .unwrap();

    let result = drainer(&store, 50, Arc::new(Mutex::new(())))
        .drain_once()
        .await;

    assert!(result.is_err());
    assert_eq!(store.queue_len().unwrap(), 1, "nothing removed on abort");
    assert!(store.rows("Completions").unwrap().is_empty());
    assert_eq!(store.history_len().unwrap(), 0);
}

#[tokio::test]
async fn fatal_mid_batch_replays_earlier_group() {
    let store = seeded_store();
    let dispatcher = Dispatcher::new(store.clone(), test_registry(), attachments());

    // Group 1 resolves and is written; group 2 aborts the cycle before
    // the commit, so the prefix survives and group 1 is applied again on
    // the retry. At-least-once, by design.
    dispatcher.handle(mark_command("T-1")).unwrap();
    let stray = Command::Create {
        target: "retired-table".to_string(),
        fields: fields(&[("Task ID", "T-2")]),
        attachment: None,
        audit: vec![],
    };
    store
        .queue_append(&serde_json::to_string(&stray).unwrap())
        .unwrap();

    let drainer = drainer(&store, 50, Arc::new(Mutex::new(())));

    assert!(drainer.drain_once().await.is_err());
    assert_eq!(store.rows("Completions").unwrap().len(), 1);
    assert_eq!(store.queue_len().unwrap(), 2);

    assert!(drainer.drain_once().await.is_err());
    assert_eq!(
        store.rows("Completions").unwrap().len(),
        2,
        "partial writes duplicate on retry"
    );
}

// ---------------------------------------------------------------------------
// Parse isolation
// ---------------------------------------------------------------------------

#[tokio::test]
async fn malformed_entry_is_skipped_and_consumed() {
    let store = seeded_store();
    let dispatcher = Dispatcher::new(store.clone(), test_registry(), attachments());

    store.queue_append("this is not a command {{{").unwrap();
    dispatcher.handle(mark_command("T-1")).unwrap();

    let outcome = drainer(&store, 50, Arc::new(Mutex::new(())))
        .drain_once()
        .await
        .unwrap();

    assert_eq!(
        outcome,
        CycleOutcome::Drained {
            attempted: 2,
            applied: 1,
            skipped: 1
        }
    );
    assert_eq!(store.rows("Completions").unwrap().len(), 1);
    assert_eq!(store.queue_len().unwrap(), 0, "malformed entry consumed");
}

// ---------------------------------------------------------------------------
// Lock mutual exclusion
// ---------------------------------------------------------------------------

#[tokio::test]
async fn contended_lock_is_a_silent_skip() {
    let store = seeded_store();
    let dispatcher = Dispatcher::new(store.clone(), test_registry(), attachments());
    dispatcher.handle(mark_command("T-1")).unwrap();

    let lock = Arc::new(Mutex::new(()));
    let drainer = drainer(&store, 50, lock.clone());

    // Another consumer holds the named lock for the whole wait window.
    let guard = lock.lock().await;
    let outcome = drainer.drain_once().await.unwrap();
    assert_eq!(outcome, CycleOutcome::LockDenied);
    assert_eq!(store.queue_len().unwrap(), 1, "denied cycle wrote nothing");
    assert!(store.rows("Completions").unwrap().is_empty());
    drop(guard);

    // Next firing drains normally.
    let outcome = drainer.drain_once().await.unwrap();
    assert_eq!(
        outcome,
        CycleOutcome::Drained {
            attempted: 1,
            applied: 1,
            skipped: 0
        }
    );
}
