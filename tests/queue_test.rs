//! Queue store properties: FIFO order, prefix-only deletion.

use markq::store::Store;

fn queue_store() -> Store {
    Store::in_memory().expect("failed to create in-memory store")
}

#[test]
fn store_health_check() {
    assert!(queue_store().health_check().is_ok());
}

// ---------------------------------------------------------------------------
// FIFO preservation
// ---------------------------------------------------------------------------

#[test]
fn read_order_matches_append_order() {
    let store = queue_store();

    for i in 0..10 {
        store.queue_append(&format!("entry-{i}")).unwrap();
    }

    let entries = store.queue_read_prefix(10).unwrap();
    assert_eq!(entries.len(), 10);
    for (i, entry) in entries.iter().enumerate() {
        assert_eq!(entry.body, format!("entry-{i}"));
    }
}

#[test]
fn read_prefix_does_not_remove() {
    let store = queue_store();
    store.queue_append("a").unwrap();
    store.queue_append("b").unwrap();

    store.queue_read_prefix(2).unwrap();
    assert_eq!(store.queue_len().unwrap(), 2);
}

#[test]
fn read_prefix_is_bounded() {
    let store = queue_store();
    for i in 0..7 {
        store.queue_append(&format!("entry-{i}")).unwrap();
    }

    let entries = store.queue_read_prefix(3).unwrap();
    assert_eq!(entries.len(), 3);
    assert_eq!(entries[0].body, "entry-0");
    assert_eq!(entries[2].body, "entry-2");
}

// ---------------------------------------------------------------------------
// Prefix-only deletion
// ---------------------------------------------------------------------------

#[test]
fn delete_prefix_removes_contiguous_head() {
    let store = queue_store();
    for i in 0..5 {
        store.queue_append(&format!("entry-{i}")).unwrap();
    }

    let removed = store.queue_delete_prefix(2).unwrap();
    assert_eq!(removed, 2);

    let remaining = store.queue_read_prefix(10).unwrap();
    let bodies: Vec<&str> = remaining.iter().map(|e| e.body.as_str()).collect();
    assert_eq!(bodies, vec!["entry-2", "entry-3", "entry-4"]);
}

#[test]
fn delete_prefix_beyond_len_empties_queue() {
    let store = queue_store();
    store.queue_append("a").unwrap();
    store.queue_append("b").unwrap();

    let removed = store.queue_delete_prefix(100).unwrap();
    assert_eq!(removed, 2);
    assert_eq!(store.queue_len().unwrap(), 0);
}

#[test]
fn appends_after_delete_keep_order() {
    let store = queue_store();
    store.queue_append("a").unwrap();
    store.queue_append("b").unwrap();
    store.queue_delete_prefix(1).unwrap();
    store.queue_append("c").unwrap();

    let entries = store.queue_read_prefix(10).unwrap();
    let bodies: Vec<&str> = entries.iter().map(|e| e.body.as_str()).collect();
    assert_eq!(bodies, vec!["b", "c"]);
}
