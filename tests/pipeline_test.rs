//! End-to-end pipeline scenarios: wire body in, drained table state and
//! reconciled client view out.

use markq::client::{Board, ItemView, LocalBackend};
use markq::config::tables::{MatchColumn, TableBinding, TableRegistry};
use markq::engine::{Ack, AttachmentStore, DrainConfig, Drainer, Dispatcher};
use markq::model::{Command, KeyedFields};
use markq::store::Store;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

fn cols(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
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

struct Pipeline {
    store: Arc<Store>,
    dispatcher: Arc<Dispatcher>,
    drainer: Drainer,
}

fn pipeline() -> Pipeline {
    let store = Arc::new(Store::in_memory().unwrap());
    store
        .create_sheet(
            "Completions",
            &cols(&["Task ID", "Completed By", "Completed On"]),
        )
        .unwrap();

    let registry = test_registry();
    let attachments = AttachmentStore::new(
        std::env::temp_dir().join(format!("markq-test-{}", uuid::Uuid::new_v4())),
        "https://files.test/attachments",
    );

    let dispatcher = Arc::new(Dispatcher::new(
        store.clone(),
        registry.clone(),
        attachments.clone(),
    ));
    let drainer = Drainer::new(
        store.clone(),
        registry,
        attachments,
        DrainConfig {
            batch_size: 50,
            lock_wait: Duration::from_millis(250),
            interval: Duration::from_secs(60),
        },
        Arc::new(Mutex::new(())),
    );

    Pipeline {
        store,
        dispatcher,
        drainer,
    }
}

fn mark_command(task_ref: &str, by: &str) -> Command {
    let mut fields = KeyedFields::new();
    fields.insert("Task ID".to_string(), task_ref.to_string());
    fields.insert("Completed By".to_string(), by.to_string());
    Command::Create {
        target: "completions".to_string(),
        fields,
        attachment: None,
        audit: vec![],
    }
}

// ---------------------------------------------------------------------------
// Queued mark, drained, reconciled
// ---------------------------------------------------------------------------

#[tokio::test]
async fn queued_mark_reaches_the_client_after_drain_and_refresh() {
    let pipeline = pipeline();
    let board = Board::new(
        Arc::new(LocalBackend::new(pipeline.dispatcher.clone())),
        vec![
            ItemView::new("T-1", "Fix the gate"),
            ItemView::new("T-2", "Paint the fence"),
        ],
    );

    let ack = board
        .mark_done("T-1", mark_command("T-1", "ana"))
        .await
        .unwrap();
    assert_eq!(ack, Ack::Enqueued);

    // Before the drain, a refresh still shows the item pending with a
    // submitting indicator — the authoritative table has no row yet.
    board.refresh().await.unwrap();
    assert!(board.is_submitting("T-1"));
    assert_eq!(board.pending().len(), 2);

    pipeline.drainer.drain_once().await.unwrap();

    // After the next refresh the item leaves the pending view.
    board.refresh().await.unwrap();
    assert!(!board.is_submitting("T-1"));
    let pending = board.pending();
    assert_eq!(pending.len(), 1);
    assert_eq!(pending[0].task_ref, "T-2");
}

// ---------------------------------------------------------------------------
// Synchronous delete (undo)
// ---------------------------------------------------------------------------

#[tokio::test]
async fn synchronous_delete_roundtrip_via_wire() {
    let pipeline = pipeline();

    // Seed one completion through the queue.
    pipeline.dispatcher.handle(mark_command("T-1", "ana")).unwrap();
    pipeline.drainer.drain_once().await.unwrap();
    assert_eq!(pipeline.store.rows("Completions").unwrap().len(), 1);

    let body = r#"{
        "action": "delete",
        "sheetName": "completions",
        "matchValue": "T-1",
        "historyRecord": {"systemType": "web", "task": "T-1", "changedBy": "ana", "change": "undo completion"}
    }"#;

    let response = pipeline.dispatcher.handle_body(body);
    assert!(response.is_success());
    assert!(pipeline.store.rows("Completions").unwrap().is_empty());
    assert_eq!(pipeline.store.history_len().unwrap(), 1);

    // Repeating the same delete is a no-op success.
    let response = pipeline.dispatcher.handle_body(body);
    assert!(response.is_success());
    assert!(pipeline.store.rows("Completions").unwrap().is_empty());
}

// ---------------------------------------------------------------------------
// Error surfacing
// ---------------------------------------------------------------------------

#[tokio::test]
async fn synchronous_failure_surfaces_the_error_message() {
    let pipeline = pipeline();

    let body = r#"{
        "action": "update",
        "sheetName": "completions",
        "matchValue": "T-404",
        "updatedData": {"Completed By": "bo"}
    }"#;

    let response = pipeline.dispatcher.handle_body(body);
    assert_eq!(response.status, "error");
    assert!(response.message.contains("T-404"));
}

#[tokio::test]
async fn queued_acceptance_succeeds_before_any_drain() {
    let pipeline = pipeline();

    let body = r#"{
        "action": "batchCreate",
        "sheetName": "completions",
        "newDatas": [
            {"Task ID": "T-1", "Completed By": "ana"},
            {"Task ID": "T-2", "Completed By": "bo"}
        ]
    }"#;

    let response = pipeline.dispatcher.handle_body(body);
    assert!(response.is_success());
    assert_eq!(response.message, "queued");
    assert_eq!(pipeline.store.queue_len().unwrap(), 1);

    pipeline.drainer.drain_once().await.unwrap();
    let ids = pipeline.store.column_values("Completions", 0).unwrap();
    assert_eq!(ids, vec!["T-1", "T-2"]);
}
