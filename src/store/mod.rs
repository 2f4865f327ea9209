//! In-memory authoritative collection of candidates.
//!
//! The store owns the candidate list, the active/selected references, the
//! dashboard view state and the tombstone set of deleted ids. Lifecycle
//! transitions live in [`lifecycle`]; this module holds the collection itself
//! and the read-side queries the dashboard needs.

pub mod lifecycle;

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::models::{Candidate, CandidateStatus, SortBy, SortOrder, ViewState};

pub use lifecycle::{AnswerEvent, Progress};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct CandidateStore {
    candidates: Vec<Candidate>,
    active_candidate_id: Option<String>,
    view: ViewState,
    tombstones: BTreeSet<String>,
}

/// Answered/total counts for an unfinished interview.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct InterviewProgress {
    pub answered: usize,
    pub total: usize,
}

impl CandidateStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Rebuilds a store from a decoded primary snapshot. Candidates whose id
    /// is tombstoned are dropped, as are duplicate ids after the first.
    pub fn from_parts(
        candidates: Vec<Candidate>,
        active_candidate_id: Option<String>,
        view: ViewState,
        tombstones: impl IntoIterator<Item = String>,
    ) -> Self {
        let tombstones: BTreeSet<String> = tombstones.into_iter().collect();
        let mut kept: Vec<Candidate> = Vec::with_capacity(candidates.len());
        for candidate in candidates {
            if tombstones.contains(&candidate.id) || kept.iter().any(|c| c.id == candidate.id) {
                continue;
            }
            kept.push(candidate);
        }

        let mut store = Self {
            candidates: kept,
            active_candidate_id: None,
            view,
            tombstones,
        };
        store.active_candidate_id = active_candidate_id.filter(|id| store.contains(id));
        if let Some(selected) = store.view.selected_candidate_id.clone() {
            if !store.contains(&selected) {
                store.view.selected_candidate_id = None;
            }
        }
        store
    }

    pub fn candidates(&self) -> &[Candidate] {
        &self.candidates
    }

    pub fn len(&self) -> usize {
        self.candidates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.candidates.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Candidate> {
        self.candidates.iter().find(|c| c.id == id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    pub(crate) fn position(&self, id: &str) -> Option<usize> {
        self.candidates.iter().position(|c| c.id == id)
    }

    pub fn is_tombstoned(&self, id: &str) -> bool {
        self.tombstones.contains(id)
    }

    pub fn tombstones(&self) -> &BTreeSet<String> {
        &self.tombstones
    }

    /// Tombstones only grow; merging never removes an entry.
    pub(crate) fn absorb_tombstones(&mut self, ids: impl IntoIterator<Item = String>) {
        for id in ids {
            self.candidates.retain(|c| c.id != id);
            self.clear_references_to(&id);
            self.tombstones.insert(id);
        }
    }

    pub fn view(&self) -> &ViewState {
        &self.view
    }

    pub fn active_candidate_id(&self) -> Option<&str> {
        self.active_candidate_id.as_deref()
    }

    pub fn active_candidate(&self) -> Option<&Candidate> {
        self.active_candidate_id
            .as_deref()
            .and_then(|id| self.get(id))
    }

    /// Any interview currently running or paused.
    pub fn has_in_progress(&self) -> bool {
        self.candidates.iter().any(|c| c.status.is_in_progress())
    }

    pub fn set_active_candidate(&mut self, id: &str) -> bool {
        if !self.contains(id) {
            return false;
        }
        self.active_candidate_id = Some(id.to_string());
        true
    }

    pub fn clear_active_candidate(&mut self) {
        self.active_candidate_id = None;
    }

    pub fn set_selected_candidate(&mut self, id: Option<&str>) -> bool {
        match id {
            Some(id) if !self.contains(id) => false,
            _ => {
                self.view.selected_candidate_id = id.map(str::to_string);
                true
            }
        }
    }

    pub fn set_search_term(&mut self, term: impl Into<String>) {
        self.view.search_term = term.into();
    }

    pub fn set_sort(&mut self, sort_by: SortBy, sort_order: SortOrder) {
        self.view.sort_by = sort_by;
        self.view.sort_order = sort_order;
    }

    /// Candidates matching the current search term, in the current sort order.
    pub fn visible_candidates(&self) -> Vec<&Candidate> {
        let term = self.view.search_term.trim();
        let needle = term.to_lowercase();

        let mut visible: Vec<&Candidate> = self
            .candidates
            .iter()
            .filter(|c| term.is_empty() || matches_search(c, term, &needle))
            .collect();

        let sort_by = self.view.sort_by;
        visible.sort_by(|a, b| {
            let ordering = compare_by(a, b, sort_by);
            match self.view.sort_order {
                SortOrder::Asc => ordering,
                SortOrder::Desc => ordering.reverse(),
            }
        });
        visible
    }

    /// Interviews a returning user may want to resume.
    pub fn unfinished_candidates(&self) -> Vec<&Candidate> {
        self.candidates
            .iter()
            .filter(|c| {
                c.status == CandidateStatus::Paused
                    || (c.status == CandidateStatus::Interview && !c.questions.is_empty())
            })
            .collect()
    }

    pub fn progress(&self, id: &str) -> Option<InterviewProgress> {
        self.get(id).map(|c| InterviewProgress {
            answered: c.answered_count(),
            total: c.questions.len(),
        })
    }

    pub(crate) fn clear_references_to(&mut self, id: &str) {
        if self.active_candidate_id.as_deref() == Some(id) {
            self.active_candidate_id = None;
        }
        if self.view.selected_candidate_id.as_deref() == Some(id) {
            self.view.selected_candidate_id = None;
        }
    }

    pub(crate) fn candidate_mut(&mut self, index: usize) -> &mut Candidate {
        &mut self.candidates[index]
    }

    pub(crate) fn push(&mut self, candidate: Candidate) {
        self.candidates.push(candidate);
    }

    pub(crate) fn replace(&mut self, index: usize, candidate: Candidate) {
        self.candidates[index] = candidate;
    }

    pub(crate) fn remove(&mut self, index: usize) -> Candidate {
        self.candidates.remove(index)
    }
}

fn matches_search(candidate: &Candidate, raw: &str, needle: &str) -> bool {
    candidate.name.to_lowercase().contains(needle)
        || candidate.email.to_lowercase().contains(needle)
        || candidate.phone.contains(raw)
        || candidate
            .summary
            .as_ref()
            .is_some_and(|s| s.overall_rating.to_lowercase().contains(needle))
}

fn compare_by(a: &Candidate, b: &Candidate, sort_by: SortBy) -> Ordering {
    match sort_by {
        SortBy::Score => a.total_score.cmp(&b.total_score),
        SortBy::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
        SortBy::Date => a.created_at.cmp(&b.created_at),
        SortBy::Status => a.status.rank().cmp(&b.status.rank()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{CandidateFields, Difficulty, InterviewSummary, Question};
    use chrono::{Duration, TimeZone, Utc};

    fn seeded() -> CandidateStore {
        let t0 = Utc.with_ymd_and_hms(2024, 1, 1, 9, 0, 0).unwrap();
        let mut store = CandidateStore::new();
        let ada = store
            .create_candidate(CandidateFields::new("Ada", "ada@example.com", "5550001"), t0)
            .unwrap();
        let bob = store
            .create_candidate(
                CandidateFields::new("bob", "bob@example.com", "5550002"),
                t0 + Duration::minutes(1),
            )
            .unwrap();
        store
            .start_interview(&bob, vec![Question::new("q1", "?", Difficulty::Easy)], t0)
            .unwrap();
        store
            .submit_answer(
                &bob,
                AnswerEvent::manual("q1", "yes", None, 10, "ok"),
                t0 + Duration::minutes(2),
            )
            .unwrap();
        store
            .start_interview(&ada, vec![Question::new("q1", "?", Difficulty::Hard)], t0)
            .unwrap();
        store.pause_interview(&ada, t0 + Duration::minutes(3)).unwrap();
        store
    }

    #[test]
    fn default_sort_is_score_descending() {
        let store = seeded();
        let names: Vec<&str> = store.visible_candidates().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["bob", "Ada"]);
    }

    #[test]
    fn name_sort_is_case_insensitive() {
        let mut store = seeded();
        store.set_sort(SortBy::Name, SortOrder::Asc);
        let names: Vec<&str> = store.visible_candidates().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["Ada", "bob"]);
    }

    #[test]
    fn search_filters_by_email_and_phone() {
        let mut store = seeded();
        store.set_search_term("ADA@");
        assert_eq!(store.visible_candidates().len(), 1);
        store.set_search_term("5550002");
        assert_eq!(store.visible_candidates()[0].name, "bob");
        store.set_search_term("nobody");
        assert!(store.visible_candidates().is_empty());
    }

    #[test]
    fn search_matches_summary_rating_and_raw_phone() {
        let mut store = seeded();
        let bob = store
            .visible_candidates()
            .iter()
            .find(|c| c.name == "bob")
            .map(|c| c.id.clone())
            .unwrap();
        let t1 = Utc.with_ymd_and_hms(2024, 1, 1, 10, 0, 0).unwrap();
        store
            .complete_interview(&bob, InterviewSummary::fallback("bob", 10, 10, t1), t1)
            .unwrap();

        store.set_search_term("EXCELLENT");
        let names: Vec<&str> = store.visible_candidates().iter().map(|c| c.name.as_str()).collect();
        assert_eq!(names, vec!["bob"]);
        store.set_search_term("555-0001");
        assert!(store.visible_candidates().is_empty());
    }

    #[test]
    fn unfinished_lists_paused_and_running() {
        let store = seeded();
        let unfinished = store.unfinished_candidates();
        assert_eq!(unfinished.len(), 2);
        let ada = unfinished.iter().find(|c| c.name == "Ada").unwrap();
        assert_eq!(
            store.progress(&ada.id),
            Some(InterviewProgress { answered: 0, total: 1 })
        );
    }

    #[test]
    fn from_parts_drops_tombstoned_and_dangling_references() {
        let store = seeded();
        let ids: Vec<String> = store.candidates().iter().map(|c| c.id.clone()).collect();
        let view = ViewState {
            selected_candidate_id: Some(ids[0].clone()),
            ..ViewState::default()
        };
        let rebuilt = CandidateStore::from_parts(
            store.candidates().to_vec(),
            Some(ids[0].clone()),
            view,
            vec![ids[0].clone()],
        );
        assert_eq!(rebuilt.len(), 1);
        assert!(rebuilt.is_tombstoned(&ids[0]));
        assert!(rebuilt.active_candidate_id().is_none());
        assert!(rebuilt.view().selected_candidate_id.is_none());
    }
}
