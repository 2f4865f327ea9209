//! Merges backup and emergency snapshots into the in-memory store.
//!
//! A pass is read-only with respect to storage and may be repeated: running
//! it twice over the same keys leaves the store as one run did.
//!
//! Merge policy for an id already in memory: the snapshot replaces the record
//! only if the snapshot is completed and its `interviewCompletedAt` is later
//! than the in-memory one, or the in-memory record has no completion time.
//! Replacement is always whole-record.

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::namespace::{Namespace, Repository};
use super::snapshot::decode_candidate;
use crate::models::Candidate;
use crate::store::CandidateStore;
use crate::{log_info, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeOutcome {
    Inserted,
    Replaced,
    Kept,
    Tombstoned,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DecodeFailure {
    pub key: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileReport {
    pub scanned: usize,
    pub inserted: Vec<String>,
    pub replaced: Vec<String>,
    pub kept: usize,
    pub tombstoned: Vec<String>,
    pub decode_failures: Vec<DecodeFailure>,
    /// Set when listing keys failed and the pass could not run.
    pub storage_error: Option<String>,
    /// Restored records that were mid-question with no countdown behind
    /// them, now paused. Filled by the caller that owns the clock.
    pub paused: Vec<String>,
}

impl ReconcileReport {
    pub fn changed(&self) -> bool {
        !self.inserted.is_empty() || !self.replaced.is_empty()
    }
}

/// One reconciliation pass over the backup and emergency namespaces.
pub fn reconcile(store: &mut CandidateStore, repo: &Repository, now: DateTime<Utc>) -> ReconcileReport {
    let mut report = ReconcileReport::default();

    for namespace in [Namespace::Backup, Namespace::Emergency] {
        let entries = match repo.list_by_namespace(namespace) {
            Ok(entries) => entries,
            Err(err) => {
                log_warn!("could not list {} keys: {err}", namespace.as_str());
                report.storage_error = Some(err.to_string());
                continue;
            }
        };

        for entry in entries {
            report.scanned += 1;
            let snapshot = match decode_candidate(&entry.bytes) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    log_warn!("skipping undecodable snapshot {}: {err}", entry.key);
                    report.decode_failures.push(DecodeFailure {
                        key: entry.key,
                        reason: err.to_string(),
                    });
                    continue;
                }
            };

            let id = snapshot.candidate.id.clone();
            match merge_candidate(store, snapshot.candidate, now) {
                MergeOutcome::Inserted => report.inserted.push(id),
                MergeOutcome::Replaced => report.replaced.push(id),
                MergeOutcome::Kept => report.kept += 1,
                MergeOutcome::Tombstoned => report.tombstoned.push(id),
            }
        }
    }

    if report.changed() {
        log_info!(
            "reconciliation restored {} and replaced {} candidates",
            report.inserted.len(),
            report.replaced.len()
        );
    }
    report
}

/// Merges one decoded candidate. The tombstone check runs before anything
/// else looks at the record.
pub fn merge_candidate(store: &mut CandidateStore, mut decoded: Candidate, now: DateTime<Utc>) -> MergeOutcome {
    if store.is_tombstoned(&decoded.id) {
        return MergeOutcome::Tombstoned;
    }

    match store.position(&decoded.id) {
        None => {
            decoded.restored_at = Some(now);
            store.push(decoded);
            MergeOutcome::Inserted
        }
        Some(index) => {
            if snapshot_wins(&store.candidates()[index], &decoded) {
                decoded.restored_at = Some(now);
                store.replace(index, decoded);
                MergeOutcome::Replaced
            } else {
                MergeOutcome::Kept
            }
        }
    }
}

fn snapshot_wins(existing: &Candidate, decoded: &Candidate) -> bool {
    if !decoded.is_completed() {
        return false;
    }
    match (existing.interview_completed_at, decoded.interview_completed_at) {
        (None, Some(_)) => true,
        (None, None) => !existing.is_completed(),
        (Some(current), Some(candidate)) => candidate > current,
        (Some(_), None) => false,
    }
}
