// tests/store_maintenance.rs

use std::collections::HashSet;
use std::fs;
use std::sync::Arc;

use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;
use snapwatch::errors::SnapwatchError;
use snapwatch::maintenance::{self, MaintenanceLock};
use snapwatch::store::{
    FileStore, MemoryKv, MemoryStore, NewSnapshot, RemoteStore, SnapshotStore, SqliteStore,
    key_digest,
};

fn at(content: &str, minutes: i64) -> NewSnapshot {
    let base = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
    NewSnapshot {
        captured_at: base + Duration::minutes(minutes),
        ..NewSnapshot::now(content.as_bytes().to_vec())
    }
}

fn contents(store: &dyn SnapshotStore, key: &str) -> Vec<String> {
    store
        .load_history(key, 0)
        .unwrap()
        .into_iter()
        .map(|s| String::from_utf8(s.content).unwrap())
        .collect()
}

fn bounded_engines() -> Vec<Arc<dyn SnapshotStore>> {
    vec![
        Arc::new(MemoryStore::new()),
        Arc::new(SqliteStore::open_in_memory().unwrap()),
    ]
}

proptest! {
    #[test]
    fn retention_never_exceeds_max_snapshots(
        appends in proptest::collection::vec(0usize..6, 1..25),
        max in 1usize..5,
    ) {
        for store in bounded_engines() {
            for (i, variant) in appends.iter().enumerate() {
                store
                    .append("job", NewSnapshot::now(format!("{i}:{variant}").into_bytes()), max)
                    .unwrap();
                let history = store.load_history("job", 0).unwrap();
                prop_assert!(history.len() <= max);
                prop_assert_eq!(
                    String::from_utf8(history[0].content.clone()).unwrap(),
                    format!("{i}:{variant}")
                );
            }
        }
    }
}

#[test]
fn zero_max_snapshots_is_unbounded() {
    for store in bounded_engines() {
        for i in 0..10 {
            store.append("k", NewSnapshot::now(vec![i]), 0).unwrap();
        }
        assert_eq!(store.load_history("k", 0).unwrap().len(), 10);
    }
}

#[test]
fn rollback_removes_only_later_snapshots() {
    for store in bounded_engines() {
        store.append("a", at("a1", 0), 0).unwrap();
        store.append("a", at("a2", 10), 0).unwrap();
        store.append("b", at("b1", 5), 0).unwrap();
        store.append("b", at("b2", 20), 0).unwrap();

        let cutoff = Utc.with_ymd_and_hms(2024, 5, 1, 12, 7, 0).unwrap();
        let removed = maintenance::rollback(store.as_ref(), cutoff).unwrap();

        assert_eq!(removed, 2);
        assert_eq!(contents(store.as_ref(), "a"), vec!["a1"]);
        assert_eq!(contents(store.as_ref(), "b"), vec!["b1"]);
    }
}

#[test]
fn rollback_is_refused_without_support_and_touches_nothing() {
    let store = RemoteStore::new(MemoryKv::new());
    store.append("a", at("a1", 0), 0).unwrap();
    store.append("a", at("a2", 10), 0).unwrap();

    let err = maintenance::rollback(&store, Utc::now() - Duration::days(3650)).unwrap_err();
    assert!(matches!(err, SnapwatchError::StoreCapability { .. }));
    assert_eq!(contents(&store, "a"), vec!["a2", "a1"]);
}

#[test]
fn remote_appends_grow_until_compacted() {
    let store = RemoteStore::new(MemoryKv::new());
    for i in 0..5 {
        store.append("feed", at(&format!("v{i}"), i), 2).unwrap();
    }
    assert_eq!(store.load_history("feed", 0).unwrap().len(), 5);

    let report = maintenance::compact(&store, 2).unwrap();
    assert_eq!(report.removed_snapshots, 3);
    assert_eq!(contents(&store, "feed"), vec!["v4", "v3"]);
}

#[test]
fn gc_drops_orphaned_keys_and_trims_the_rest() {
    let store = MemoryStore::new();
    for i in 0..3 {
        store.append("kept", at(&format!("k{i}"), i), 0).unwrap();
        store.append("orphan", at(&format!("o{i}"), i), 0).unwrap();
    }

    let active: HashSet<String> = ["kept".to_string()].into();
    let report = store.gc(&active, 1).unwrap();

    assert_eq!(report.removed_keys, 1);
    assert_eq!(report.removed_snapshots, 5);
    assert_eq!(contents(&store, "kept"), vec!["k2"]);
    assert!(store.keys().unwrap().iter().all(|k| k != "orphan"));
}

#[test]
fn delete_latest_exposes_previous_snapshot() {
    for store in bounded_engines() {
        store.append("a", at("old", 0), 0).unwrap();
        store.append("a", at("new", 1), 0).unwrap();

        assert!(store.delete_latest("a").unwrap());
        assert_eq!(contents(store.as_ref(), "a"), vec!["old"]);
        assert!(store.delete_latest("a").unwrap());
        assert!(!store.delete_latest("a").unwrap());
    }
}

#[test]
fn file_store_keeps_only_the_latest_state() {
    let dir = tempfile::tempdir().unwrap();
    let store = FileStore::new(dir.path());
    store.append("cmd", at("one", 0), 5).unwrap();
    store.append("cmd", at("two", 1), 5).unwrap();

    assert_eq!(contents(&store, "cmd"), vec!["two"]);
    let err = maintenance::rollback(&store, Utc::now()).unwrap_err();
    assert!(matches!(err, SnapwatchError::StoreCapability { .. }));
}

#[test]
fn migrate_copies_legacy_history_oldest_first() {
    let legacy = tempfile::tempdir().unwrap();
    let key = "https://example.org/page";
    let base = Utc.with_ymd_and_hms(2023, 1, 1, 0, 0, 0).unwrap();
    for (i, body) in ["first", "second"].iter().enumerate() {
        let captured = base + Duration::hours(i as i64);
        let name = format!("{}-{}.snap", key_digest(key), captured.timestamp_millis());
        fs::write(
            legacy.path().join(name),
            format!("{}\n{body}", serde_json::to_string(key).unwrap()),
        )
        .unwrap();
    }

    let target = SqliteStore::open_in_memory().unwrap();
    let copied = maintenance::migrate(&target, legacy.path()).unwrap();

    assert_eq!(copied, 2);
    let history = target.load_history(key, 0).unwrap();
    assert_eq!(contents(&target, key), vec!["second", "first"]);
    assert_eq!(history[1].captured_at, base);
}

#[test]
fn migrate_requires_an_existing_directory() {
    let target = MemoryStore::new();
    let err = maintenance::migrate(&target, std::path::Path::new("/nonexistent/legacy")).unwrap_err();
    assert!(matches!(err, SnapwatchError::ConfigError(_)));
}

#[test]
fn second_maintenance_lock_is_refused() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("snapwatch.db.lock");

    let _held = MaintenanceLock::acquire(Some(path.clone())).unwrap();
    assert!(MaintenanceLock::acquire(Some(path)).is_err());
}
