//! Redundant snapshot writes triggered by lifecycle events.
//!
//! | event               | primary     | backup:<id> | emergency:<id> |
//! |---------------------|-------------|-------------|----------------|
//! | answer submitted    | throttled   | write       |                |
//! | interview completed | throttled   | write       | write          |
//! | candidate deleted   | immediate   | purge       | purge          |
//!
//! Throttled primary writes that land inside the throttle window are left
//! dirty and picked up by the next [`BackupWriter::flush`].

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use super::namespace::{Namespace, Repository};
use super::snapshot::{encode_candidate, encode_primary};
use crate::error::StorageError;
use crate::store::CandidateStore;
use crate::{log_debug, log_info, log_warn};

const ENABLE_LOGS: bool = true;

pub struct BackupWriter {
    repo: Repository,
    throttle: Duration,
    last_primary_write: Option<Instant>,
    primary_dirty: bool,
    dirty_candidates: BTreeSet<String>,
    last_error: Option<StorageError>,
}

impl BackupWriter {
    pub fn new(repo: Repository, throttle: Duration) -> Self {
        Self {
            repo,
            throttle,
            last_primary_write: None,
            primary_dirty: false,
            dirty_candidates: BTreeSet::new(),
            last_error: None,
        }
    }

    pub fn repository(&self) -> &Repository {
        &self.repo
    }

    pub fn is_dirty(&self) -> bool {
        self.primary_dirty || !self.dirty_candidates.is_empty()
    }

    /// Most recent write failure, cleared by the next fully successful flush.
    pub fn last_error(&self) -> Option<&StorageError> {
        self.last_error.as_ref()
    }

    /// Any store mutation that has no dedicated hook.
    pub fn mark_dirty(&mut self, candidate_id: Option<&str>) {
        self.primary_dirty = true;
        if let Some(id) = candidate_id {
            self.dirty_candidates.insert(id.to_string());
        }
    }

    pub fn on_answer_submitted(&mut self, store: &CandidateStore, id: &str, now: DateTime<Utc>) -> bool {
        let backed_up = self.write_backup(store, id, now);
        self.primary_dirty = true;
        let primary = self.write_primary_throttled(store, now);
        backed_up && primary
    }

    pub fn on_interview_completed(&mut self, store: &CandidateStore, id: &str, now: DateTime<Utc>) -> bool {
        let backed_up = self.write_backup(store, id, now);
        let emergency = self.write_emergency(store, id, now);
        self.primary_dirty = true;
        let primary = self.write_primary_throttled(store, now);
        backed_up && emergency && primary
    }

    /// Purges every durable copy of `id`, then writes the primary snapshot
    /// straight away so the tombstone is durable before anything else runs.
    pub fn on_candidate_deleted(&mut self, store: &CandidateStore, id: &str, now: DateTime<Utc>) -> bool {
        self.dirty_candidates.remove(id);
        let purged = match self.repo.purge_candidate(id) {
            Ok(removed) => {
                log_info!("purged durable copies of deleted candidate {id} ({removed} keys)");
                true
            }
            Err(err) => {
                log_warn!("failed to purge candidate {id}: {err}");
                self.last_error = Some(err);
                false
            }
        };
        self.primary_dirty = true;
        purged && self.write_primary(store, now)
    }

    /// Writes everything pending, bypassing the throttle. Safe to call at any
    /// time; with nothing dirty it still rewrites the primary snapshot.
    pub fn flush(&mut self, store: &CandidateStore, now: DateTime<Utc>) -> bool {
        let pending: Vec<String> = std::mem::take(&mut self.dirty_candidates).into_iter().collect();
        let mut ok = true;
        for id in pending {
            if store.contains(&id) && !self.write_backup(store, &id, now) {
                self.dirty_candidates.insert(id);
                ok = false;
            }
        }
        ok &= self.write_primary(store, now);
        if ok {
            self.last_error = None;
        }
        ok
    }

    fn write_primary_throttled(&mut self, store: &CandidateStore, now: DateTime<Utc>) -> bool {
        let within_window = self
            .last_primary_write
            .is_some_and(|last| last.elapsed() < self.throttle);
        if within_window {
            log_debug!("primary write coalesced");
            return true;
        }
        self.write_primary(store, now)
    }

    fn write_primary(&mut self, store: &CandidateStore, now: DateTime<Utc>) -> bool {
        let bytes = match encode_primary(store, now) {
            Ok(bytes) => bytes,
            Err(err) => {
                log_warn!("failed to encode primary snapshot: {err}");
                return false;
            }
        };
        match self.repo.write_primary(&bytes) {
            Ok(()) => {
                self.primary_dirty = false;
                self.last_primary_write = Some(Instant::now());
                log_debug!("primary snapshot written ({} candidates)", store.len());
                true
            }
            Err(err) => {
                log_warn!("primary snapshot write rejected: {err}");
                self.last_error = Some(err);
                false
            }
        }
    }

    fn write_backup(&mut self, store: &CandidateStore, id: &str, now: DateTime<Utc>) -> bool {
        self.write_owned(Namespace::Backup, store, id, now)
    }

    fn write_emergency(&mut self, store: &CandidateStore, id: &str, now: DateTime<Utc>) -> bool {
        self.write_owned(Namespace::Emergency, store, id, now)
    }

    fn write_owned(
        &mut self,
        namespace: Namespace,
        store: &CandidateStore,
        id: &str,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(candidate) = store.get(id) else {
            log_warn!("no candidate {id} to back up");
            return false;
        };
        let result = encode_candidate(candidate, now)
            .map_err(|err| StorageError::Backend(err.to_string()))
            .and_then(|bytes| self.repo.write_owned(namespace, id, &bytes));
        match result {
            Ok(()) => true,
            Err(err) => {
                log_warn!("{} snapshot of {id} rejected: {err}", namespace.as_str());
                self.dirty_candidates.insert(id.to_string());
                self.last_error = Some(err);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{KeyValueStore, MemoryStore};
    use crate::models::{CandidateFields, Difficulty, Question};
    use crate::persistence::namespace::PRIMARY_KEY;
    use crate::persistence::snapshot::decode_primary;
    use crate::store::AnswerEvent;
    use std::sync::Arc;

    fn setup(quota: Option<u64>) -> (Arc<MemoryStore>, BackupWriter, CandidateStore, String) {
        let kv = Arc::new(quota.map(MemoryStore::with_quota).unwrap_or_default());
        let writer = BackupWriter::new(Repository::new(kv.clone()), Duration::from_millis(100));
        let mut store = CandidateStore::new();
        let now = Utc::now();
        let id = store
            .create_candidate(CandidateFields::new("Ada", "", ""), now)
            .unwrap();
        store
            .start_interview(&id, vec![Question::new("q1", "?", Difficulty::Easy)], now)
            .unwrap();
        (kv, writer, store, id)
    }

    #[tokio::test(start_paused = true)]
    async fn answer_writes_backup_and_throttles_primary() {
        let (kv, mut writer, mut store, id) = setup(None);
        let now = Utc::now();
        store
            .submit_answer(&id, AnswerEvent::manual("q1", "a", None, 7, "ok"), now)
            .unwrap();

        assert!(writer.on_answer_submitted(&store, &id, now));
        assert!(kv.get(&format!("backup:{id}")).unwrap().is_some());
        assert!(!writer.is_dirty());

        store.set_search_term("ad");
        assert!(writer.on_answer_submitted(&store, &id, now));
        assert!(writer.is_dirty(), "second primary write inside the window is coalesced");

        tokio::time::advance(Duration::from_millis(150)).await;
        assert!(writer.flush(&store, now));
        let primary = decode_primary(&kv.get(PRIMARY_KEY).unwrap().unwrap()).unwrap();
        assert_eq!(primary.store.view().search_term, "ad");
    }

    #[tokio::test]
    async fn completion_writes_emergency_snapshot() {
        let (kv, mut writer, mut store, id) = setup(None);
        store.next_question(&id, Utc::now()).unwrap();
        assert!(writer.on_interview_completed(&store, &id, Utc::now()));
        assert!(kv.get(&format!("emergency:{id}")).unwrap().is_some());
    }

    #[tokio::test]
    async fn deletion_purges_and_records_tombstone() {
        let (kv, mut writer, mut store, id) = setup(None);
        writer.on_interview_completed(&store, &id, Utc::now());
        kv.set(&format!("interview-backup-{id}"), b"{}").unwrap();

        store.delete_candidate(&id);
        assert!(writer.on_candidate_deleted(&store, &id, Utc::now()));
        assert_eq!(kv.list_keys("").unwrap(), vec![PRIMARY_KEY.to_string()]);
        let primary = decode_primary(&kv.get(PRIMARY_KEY).unwrap().unwrap()).unwrap();
        assert!(primary.store.is_tombstoned(&id));
    }

    #[tokio::test]
    async fn quota_failure_is_reported_not_fatal() {
        let (_kv, mut writer, store, id) = setup(Some(32));
        writer.mark_dirty(Some(&id));
        assert!(!writer.flush(&store, Utc::now()));
        assert!(matches!(writer.last_error(), Some(StorageError::QuotaExceeded { .. })));
        assert!(writer.is_dirty());
    }
}
