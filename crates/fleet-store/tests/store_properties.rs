//! Behavioural properties of the document store, exercised end to end.

use std::fs;
use std::path::Path;
use std::time::Duration;

use chrono::Utc;
use fleet_store::{DocumentStore, LockRecord, ReadSource, StoreConfig, StoreError};
use serde_json::{json, Value};
use tempfile::tempdir;

const TIMEOUT: Duration = Duration::from_secs(30);

fn dir_names(dir: &Path) -> Vec<String> {
    let mut names: Vec<_> = fs::read_dir(dir)
        .unwrap()
        .map(|e| e.unwrap().file_name().to_string_lossy().to_string())
        .collect();
    names.sort();
    names
}

fn read_json(path: &Path) -> Value {
    serde_json::from_slice(&fs::read(path).unwrap()).unwrap()
}

/// Plants a lock as if `owner` took it `age` ago and then crashed.
fn plant_crashed_lock(root: &Path, file: &str, owner: &str, age: Duration) -> LockRecord {
    let record: LockRecord = serde_json::from_value(json!({
        "lockId": "lock-crashed",
        "ownerId": owner,
        "acquiredAt": Utc::now() - chrono::Duration::from_std(age).unwrap(),
        "pid": 999_999,
    }))
    .unwrap();
    fs::write(root.join(format!("{}.lock", file)), serde_json::to_vec(&record).unwrap()).unwrap();
    record
}

#[test]
fn update_then_get_applies_mutator() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());
    let previous = json!({ "workers": { "w1": "idle" } });

    let lock = store.acquire("status", "seed", TIMEOUT).unwrap();
    store.write("status", &previous, &lock).unwrap();

    let f = |mut v: Value| {
        v["workers"]["w2"] = json!("working");
        v
    };
    let expected = f(previous.clone());
    store.update("status", f, "w2", TIMEOUT).unwrap();

    assert_eq!(store.get("status").unwrap(), expected);
}

#[test]
fn second_owner_within_timeout_is_refused_then_admitted_after() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());
    let short = Duration::from_millis(50);

    let first = store.acquire("tasks.json", "alex", short).unwrap();
    let err = store.acquire("tasks.json", "zephyr", short).unwrap_err();
    assert!(matches!(err, StoreError::LockContention { .. }));

    std::thread::sleep(Duration::from_millis(100));
    let second = store.acquire("tasks.json", "zephyr", short).unwrap();
    assert_ne!(first, second);
}

#[test]
fn superseded_release_is_a_no_op() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());
    let short = Duration::from_millis(30);

    let old = store.acquire("doc", "a", short).unwrap();
    std::thread::sleep(Duration::from_millis(60));
    let new = store.acquire("doc", "b", short).unwrap();

    assert!(!store.release("doc", &old).unwrap());
    assert!(dir.path().join("doc.json.lock").exists());

    // The new holder can still write.
    store.write("doc", &json!({ "by": "b" }), &new).unwrap();
    assert_eq!(store.get("doc").unwrap(), json!({ "by": "b" }));
}

#[test]
fn invalid_json_leaves_target_byte_identical() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());

    let lock = store.acquire("doc", "a", TIMEOUT).unwrap();
    store.write("doc", &json!({ "keep": "me" }), &lock).unwrap();
    let before = fs::read(dir.path().join("doc.json")).unwrap();

    let lock = store.acquire("doc", "a", TIMEOUT).unwrap();
    let err = store.write_bytes("doc", b"{\"keep\": ", &lock).unwrap_err();

    assert!(matches!(err, StoreError::Validation { .. }));
    assert_eq!(fs::read(dir.path().join("doc.json")).unwrap(), before);
    assert_eq!(dir_names(dir.path()), vec![".backups", "doc.json"]);
}

#[test]
fn retention_keeps_exactly_ten_newest_first() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());

    // First write creates the document; the next 13 each snapshot it.
    for n in 0..14 {
        let lock = store.acquire("counter", "a", TIMEOUT).unwrap();
        store.write("counter", &json!({ "n": n }), &lock).unwrap();
    }

    let backups = store.backups("counter").unwrap();
    assert_eq!(backups.len(), 10);
    assert!(backups.windows(2).all(|w| w[0].timestamp > w[1].timestamp));

    let newest: Value = serde_json::from_slice(&fs::read(&backups[0].path).unwrap()).unwrap();
    let oldest: Value = serde_json::from_slice(&fs::read(&backups[9].path).unwrap()).unwrap();
    assert_eq!(newest, json!({ "n": 12 }));
    assert_eq!(oldest, json!({ "n": 3 }));
}

#[test]
fn retention_is_configurable() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::new(StoreConfig::new(dir.path()).with_backup_retention(2));

    for n in 0..5 {
        let lock = store.acquire("doc", "a", TIMEOUT).unwrap();
        store.write("doc", &json!(n), &lock).unwrap();
    }
    assert_eq!(store.backups("doc").unwrap().len(), 2);
}

#[test]
fn trailing_comma_is_repaired_and_persisted() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());
    fs::write(dir.path().join("doc.json"), b"{\"a\":1,}").unwrap();

    let outcome = store.safe_read("doc").unwrap();
    assert_eq!(outcome.value, json!({ "a": 1 }));
    assert!(matches!(outcome.source, ReadSource::Repaired { .. }));

    let on_disk = read_json(&dir.path().join("doc.json"));
    assert_eq!(on_disk, json!({ "a": 1 }));
    assert!(!dir.path().join("doc.json.lock").exists());
    assert_eq!(store.safe_read("doc").unwrap().source, ReadSource::Disk);
}

#[test]
fn irreparable_document_is_restored_from_backup() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());

    let lock = store.acquire("doc", "a", TIMEOUT).unwrap();
    store.write("doc", &json!({ "version": 1 }), &lock).unwrap();
    let lock = store.acquire("doc", "a", TIMEOUT).unwrap();
    store.write("doc", &json!({ "version": 2 }), &lock).unwrap();
    assert_eq!(store.backups("doc").unwrap().len(), 1);

    fs::write(dir.path().join("doc.json"), b"\0\0 garbage }}").unwrap();

    let outcome = store.safe_read("doc").unwrap();
    assert_eq!(outcome.value, json!({ "version": 1 }));
    assert!(matches!(outcome.source, ReadSource::Backup { .. }));

    let on_disk = read_json(&dir.path().join("doc.json"));
    assert_eq!(on_disk, json!({ "version": 1 }));
}

#[test]
fn unrecoverable_without_backup_returns_default_and_flags_loss() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());
    fs::write(dir.path().join("tasks.json"), b"}}}").unwrap();

    let outcome = store.safe_read("tasks").unwrap();
    assert_eq!(outcome.value, json!({ "tasks": [] }));
    assert!(outcome.is_data_loss());
    assert_eq!(store.get("tasks").unwrap(), json!({ "tasks": [] }));
}

#[test]
fn crashed_owner_scenario() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());

    // alex took the lock 31s ago and crashed.
    let crashed =
        plant_crashed_lock(dir.path(), "tasks.json", "alex", Duration::from_millis(31_000));

    let fresh = store.acquire("tasks.json", "zephyr", Duration::from_millis(30_000)).unwrap();
    assert_ne!(fresh, crashed.lock_id);

    // alex comes back and releases with its old token.
    assert!(!store.release("tasks.json", &crashed.lock_id).unwrap());

    match store.lock_status("tasks").unwrap() {
        Some(fleet_store::LockState::Held(record)) => {
            assert_eq!(record.lock_id, fresh);
            assert_eq!(record.owner_id, "zephyr");
        }
        other => panic!("expected zephyr's lock, got {:?}", other),
    }
}

#[test]
fn live_crashed_lock_still_blocks() {
    let dir = tempdir().unwrap();
    let store = DocumentStore::open(dir.path());
    plant_crashed_lock(dir.path(), "tasks.json", "alex", Duration::from_millis(5_000));

    let err = store.acquire("tasks", "zephyr", TIMEOUT).unwrap_err();
    assert!(err.is_retryable());
}
