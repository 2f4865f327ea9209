//! Typed view over the durable key space.
//!
//! Every key the crate writes belongs to exactly one [`Namespace`]. Call sites
//! ask the [`Repository`] for entries of a namespace and receive the owner id
//! already parsed; nothing outside this module looks at key prefixes.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::snapshot::decode_candidate;
use crate::db::KeyValueStore;
use crate::error::StorageError;
use crate::log_warn;

const ENABLE_LOGS: bool = true;

pub const PRIMARY_KEY: &str = "persist:candidates";
pub const AUTOSAVE_KEY: &str = "autosave:draft";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Namespace {
    Primary,
    Backup,
    Emergency,
    Autosave,
}

impl Namespace {
    pub const ALL: [Namespace; 4] = [
        Namespace::Primary,
        Namespace::Backup,
        Namespace::Emergency,
        Namespace::Autosave,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Namespace::Primary => "primary",
            Namespace::Backup => "backup",
            Namespace::Emergency => "emergency",
            Namespace::Autosave => "autosave",
        }
    }

    /// Prefixes of per-candidate keys, current scheme first.
    fn owner_prefixes(&self) -> &'static [&'static str] {
        match self {
            Namespace::Backup => &["backup:", "interview-backup-"],
            Namespace::Emergency => &["emergency:", "completed-interview-"],
            Namespace::Primary | Namespace::Autosave => &[],
        }
    }

    fn singleton_key(&self) -> Option<&'static str> {
        match self {
            Namespace::Primary => Some(PRIMARY_KEY),
            Namespace::Autosave => Some(AUTOSAVE_KEY),
            Namespace::Backup | Namespace::Emergency => None,
        }
    }

    /// Key written for `owner_id` in a per-candidate namespace.
    pub fn key_for(&self, owner_id: &str) -> Option<String> {
        self.owner_prefixes()
            .first()
            .map(|prefix| format!("{prefix}{owner_id}"))
    }

    /// Classifies a raw key, returning its namespace and owner id.
    pub fn classify(key: &str) -> Option<(Namespace, Option<String>)> {
        for namespace in Namespace::ALL {
            if namespace.singleton_key() == Some(key) {
                return Some((namespace, None));
            }
            for prefix in namespace.owner_prefixes() {
                if let Some(owner) = key.strip_prefix(prefix).filter(|o| !o.is_empty()) {
                    return Some((namespace, Some(owner.to_string())));
                }
            }
        }
        None
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Entry {
    pub key: String,
    pub namespace: Namespace,
    pub owner_id: Option<String>,
    pub bytes: Vec<u8>,
}

/// Namespace-aware access to a [`KeyValueStore`].
#[derive(Clone)]
pub struct Repository {
    store: Arc<dyn KeyValueStore>,
}

impl Repository {
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn KeyValueStore> {
        &self.store
    }

    pub fn read_primary(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.store.get(PRIMARY_KEY)
    }

    pub fn write_primary(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.store.set(PRIMARY_KEY, bytes)
    }

    pub fn write_owned(
        &self,
        namespace: Namespace,
        owner_id: &str,
        bytes: &[u8],
    ) -> Result<(), StorageError> {
        let key = namespace.key_for(owner_id).ok_or_else(|| {
            StorageError::Backend(format!("{} has no per-candidate keys", namespace.as_str()))
        })?;
        self.store.set(&key, bytes)
    }

    pub fn read_autosave(&self) -> Result<Option<Vec<u8>>, StorageError> {
        self.store.get(AUTOSAVE_KEY)
    }

    pub fn write_autosave(&self, bytes: &[u8]) -> Result<(), StorageError> {
        self.store.set(AUTOSAVE_KEY, bytes)
    }

    pub fn clear_autosave(&self) -> Result<(), StorageError> {
        self.store.delete(AUTOSAVE_KEY)
    }

    /// Every entry of `namespace`, legacy-format keys included, in key order.
    /// Keys that vanish between listing and reading are skipped.
    pub fn list_by_namespace(&self, namespace: Namespace) -> Result<Vec<Entry>, StorageError> {
        let mut prefixes: Vec<&str> = namespace.owner_prefixes().to_vec();
        if let Some(key) = namespace.singleton_key() {
            prefixes.push(key);
        }

        let mut entries = Vec::new();
        for prefix in prefixes {
            for key in self.store.list_keys(prefix)? {
                let Some((found, owner_id)) = Namespace::classify(&key) else {
                    continue;
                };
                if found != namespace {
                    continue;
                }
                if let Some(bytes) = self.store.get(&key)? {
                    entries.push(Entry {
                        key,
                        namespace,
                        owner_id,
                        bytes,
                    });
                }
            }
        }
        entries.sort_by(|a, b| a.key.cmp(&b.key));
        Ok(entries)
    }

    /// Every stored key, grouped: keys of known namespaces and keys nothing
    /// in this crate wrote.
    pub fn partition_keys(&self) -> Result<(Vec<(Namespace, String)>, Vec<String>), StorageError> {
        let mut known = Vec::new();
        let mut unknown = Vec::new();
        for key in self.store.list_keys("")? {
            match Namespace::classify(&key) {
                Some((namespace, _)) => known.push((namespace, key)),
                None => unknown.push(key),
            }
        }
        Ok((known, unknown))
    }

    /// Removes every durable copy owned by `owner_id` in the backup and
    /// emergency namespaces, legacy keys included. Attempts every key and
    /// returns the first failure.
    pub fn purge_candidate(&self, owner_id: &str) -> Result<usize, StorageError> {
        let mut removed = 0;
        let mut first_err = None;
        for namespace in [Namespace::Backup, Namespace::Emergency] {
            for prefix in namespace.owner_prefixes() {
                let key = format!("{prefix}{owner_id}");
                match self.store.delete(&key) {
                    Ok(()) => removed += 1,
                    Err(err) => {
                        first_err.get_or_insert(err);
                    }
                }
            }
        }
        match first_err {
            Some(err) => Err(err),
            None => Ok(removed),
        }
    }

    /// Deletes every key of a known namespace. Keys this crate never wrote
    /// are left alone.
    pub fn clear_all(&self) -> Result<usize, StorageError> {
        let (known, _) = self.partition_keys()?;
        for (_, key) in &known {
            self.store.delete(key)?;
        }
        Ok(known.len())
    }

    /// Deletes backup entries saved before `cutoff`. Emergency copies and
    /// backups that do not decode are kept.
    pub fn prune_backups(&self, cutoff: DateTime<Utc>) -> Result<Vec<String>, StorageError> {
        let mut removed = Vec::new();
        for entry in self.list_by_namespace(Namespace::Backup)? {
            match decode_candidate(&entry.bytes) {
                Ok(snapshot) if snapshot.saved_at < cutoff => {
                    self.store.delete(&entry.key)?;
                    removed.push(entry.key);
                }
                Ok(_) => {}
                Err(err) => {
                    log_warn!("keeping undecodable backup {}: {err}", entry.key);
                }
            }
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::MemoryStore;
    use crate::models::{Candidate, CandidateFields};
    use crate::persistence::snapshot::encode_candidate;
    use chrono::{Duration, TimeZone};

    fn repo() -> (Arc<MemoryStore>, Repository) {
        let store = Arc::new(MemoryStore::new());
        (store.clone(), Repository::new(store))
    }

    #[test]
    fn classify_recognises_current_and_legacy_keys() {
        assert_eq!(
            Namespace::classify("backup:c1"),
            Some((Namespace::Backup, Some("c1".into())))
        );
        assert_eq!(
            Namespace::classify("interview-backup-c1"),
            Some((Namespace::Backup, Some("c1".into())))
        );
        assert_eq!(
            Namespace::classify("completed-interview-c2"),
            Some((Namespace::Emergency, Some("c2".into())))
        );
        assert_eq!(Namespace::classify(PRIMARY_KEY), Some((Namespace::Primary, None)));
        assert_eq!(Namespace::classify("backup:"), None);
        assert_eq!(Namespace::classify("theme"), None);
    }

    #[test]
    fn list_by_namespace_returns_typed_entries() {
        let (store, repo) = repo();
        store.set("backup:b", b"2").unwrap();
        store.set("interview-backup-a", b"1").unwrap();
        store.set("emergency:a", b"3").unwrap();

        let backups = repo.list_by_namespace(Namespace::Backup).unwrap();
        let owners: Vec<_> = backups.iter().map(|e| e.owner_id.as_deref()).collect();
        assert_eq!(owners, vec![Some("b"), Some("a")]);
        assert!(backups.iter().all(|e| e.namespace == Namespace::Backup));
    }

    #[test]
    fn purge_removes_every_scheme() {
        let (store, repo) = repo();
        for key in ["backup:x", "interview-backup-x", "emergency:x", "completed-interview-x", "backup:y"] {
            store.set(key, b"{}").unwrap();
        }
        repo.purge_candidate("x").unwrap();
        assert_eq!(store.list_keys("").unwrap(), vec!["backup:y"]);
    }

    #[test]
    fn clear_all_keeps_foreign_keys() {
        let (store, repo) = repo();
        for key in [PRIMARY_KEY, AUTOSAVE_KEY, "backup:x", "completed-interview-y", "theme"] {
            store.set(key, b"{}").unwrap();
        }
        assert_eq!(repo.clear_all().unwrap(), 4);
        assert_eq!(store.list_keys("").unwrap(), vec!["theme"]);
    }

    #[test]
    fn prune_drops_only_stale_backups() {
        let (store, repo) = repo();
        let t0 = Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap();
        let candidate = Candidate::new("old".into(), CandidateFields::new("Old", "", ""), t0);
        let stale = encode_candidate(&candidate, t0).unwrap();
        let fresh = encode_candidate(&candidate, t0 + Duration::days(10)).unwrap();

        repo.write_owned(Namespace::Backup, "old", &stale).unwrap();
        store.set("interview-backup-new", &fresh).unwrap();
        repo.write_owned(Namespace::Emergency, "old", &stale).unwrap();
        store.set("backup:junk", b"not json").unwrap();

        let removed = repo.prune_backups(t0 + Duration::days(3)).unwrap();
        assert_eq!(removed, vec!["backup:old".to_string()]);
        assert_eq!(
            store.list_keys("").unwrap(),
            vec!["backup:junk", "emergency:old", "interview-backup-new"]
        );
    }
}
