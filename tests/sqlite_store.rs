use intervault::{KeyValueStore, SqliteStore, StorageError};
use tempfile::tempdir;

#[test]
fn set_get_delete_and_sorted_listing() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("kv.sqlite3"), None).unwrap();

    store.set("interview-backup-b", b"two").unwrap();
    store.set("interview-backup-a", b"one").unwrap();
    store.set("persist:candidates", b"{}").unwrap();

    assert_eq!(store.get("interview-backup-a").unwrap(), Some(b"one".to_vec()));
    assert_eq!(
        store.list_keys("interview-backup-").unwrap(),
        vec!["interview-backup-a".to_string(), "interview-backup-b".to_string()]
    );
    assert_eq!(store.list_keys("").unwrap().len(), 3);

    store.set("interview-backup-a", b"uno").unwrap();
    assert_eq!(store.get("interview-backup-a").unwrap(), Some(b"uno".to_vec()));

    store.delete("interview-backup-a").unwrap();
    store.delete("interview-backup-a").unwrap();
    assert_eq!(store.get("interview-backup-a").unwrap(), None);
}

#[test]
fn quota_rejects_oversized_writes_and_keeps_old_value() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("kv.sqlite3"), Some(32)).unwrap();

    store.set("k", b"small").unwrap();
    let err = store.set("k", &[0u8; 64]).unwrap_err();
    assert!(matches!(err, StorageError::QuotaExceeded { limit: 32, .. }));
    assert_eq!(store.get("k").unwrap(), Some(b"small".to_vec()));
}

#[test]
fn quota_counts_stored_keys_in_bytes() {
    let dir = tempdir().unwrap();
    let store = SqliteStore::open(dir.path().join("kv.sqlite3"), Some(18)).unwrap();

    store.set("éé", &[1u8; 10]).unwrap();
    let err = store.set("k", b"four").unwrap_err();
    assert!(matches!(
        err,
        StorageError::QuotaExceeded { needed: 19, limit: 18, .. }
    ));
    assert_eq!(store.get("k").unwrap(), None);
}

#[test]
fn values_survive_reopen() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("kv.sqlite3");
    {
        let store = SqliteStore::open(path.clone(), None).unwrap();
        store.set("autosave:draft", br#"{"candidateId":"c1"}"#).unwrap();
    }

    let reopened = SqliteStore::open(path, None).unwrap();
    assert_eq!(
        reopened.get("autosave:draft").unwrap(),
        Some(br#"{"candidateId":"c1"}"#.to_vec())
    );
}
