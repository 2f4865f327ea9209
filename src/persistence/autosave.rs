//! Answer drafts for the question on screen.
//!
//! One draft at a time lives under the autosave key. Option selections are
//! written immediately; free text is debounced so only the last keystroke of
//! a burst reaches storage.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;

use super::namespace::Repository;
use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct AnswerDraft {
    pub candidate_id: String,
    pub current_question_index: usize,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub selected_option: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub current_answer_text: Option<String>,
    pub timestamp: DateTime<Utc>,
}

/// A debounced text write that has not landed yet.
struct PendingDraft {
    candidate_id: String,
    handle: JoinHandle<()>,
}

pub struct DraftAutosave {
    repo: Repository,
    debounce: Duration,
    pending: Option<PendingDraft>,
}

impl DraftAutosave {
    pub fn new(repo: Repository, debounce: Duration) -> Self {
        Self {
            repo,
            debounce,
            pending: None,
        }
    }

    fn cancel_pending(&mut self) {
        if let Some(pending) = self.pending.take() {
            pending.handle.abort();
        }
    }

    /// Writes a selection draft right away, superseding any pending text draft.
    pub fn record_selection(
        &mut self,
        candidate_id: &str,
        question_index: usize,
        option: usize,
        now: DateTime<Utc>,
    ) -> bool {
        self.cancel_pending();
        let draft = AnswerDraft {
            candidate_id: candidate_id.to_string(),
            current_question_index: question_index,
            selected_option: Some(option),
            current_answer_text: None,
            timestamp: now,
        };
        write_draft(&self.repo, &draft)
    }

    /// Schedules a text draft write after the debounce window. Blank text is
    /// ignored. Must run inside a tokio runtime.
    pub fn record_text(&mut self, candidate_id: &str, question_index: usize, text: &str, now: DateTime<Utc>) {
        if text.trim().is_empty() {
            return;
        }
        self.cancel_pending();

        let draft = AnswerDraft {
            candidate_id: candidate_id.to_string(),
            current_question_index: question_index,
            selected_option: None,
            current_answer_text: Some(text.to_string()),
            timestamp: now,
        };
        let repo = self.repo.clone();
        let debounce = self.debounce;
        let candidate_id = draft.candidate_id.clone();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(debounce).await;
            write_draft(&repo, &draft);
        });
        self.pending = Some(PendingDraft {
            candidate_id,
            handle,
        });
    }

    /// The stored draft, only if it belongs to this candidate and question.
    pub fn restore(&self, candidate_id: &str, question_index: usize) -> Option<AnswerDraft> {
        self.load()
            .filter(|d| d.candidate_id == candidate_id && d.current_question_index == question_index)
    }

    pub fn clear(&mut self) {
        self.cancel_pending();
        if let Err(err) = self.repo.clear_autosave() {
            log_warn!("failed to clear answer draft: {err}");
        }
    }

    /// Drops the stored draft and any text write still waiting on the
    /// debounce, but only those belonging to `candidate_id`.
    pub fn clear_for(&mut self, candidate_id: &str) {
        if self
            .pending
            .as_ref()
            .is_some_and(|p| p.candidate_id == candidate_id)
        {
            self.cancel_pending();
        }
        if self.load().is_some_and(|d| d.candidate_id == candidate_id) {
            if let Err(err) = self.repo.clear_autosave() {
                log_warn!("failed to clear answer draft: {err}");
            }
        }
    }

    pub fn load(&self) -> Option<AnswerDraft> {
        let bytes = match self.repo.read_autosave() {
            Ok(bytes) => bytes?,
            Err(err) => {
                log_warn!("failed to read answer draft: {err}");
                return None;
            }
        };
        match serde_json::from_slice(&bytes) {
            Ok(draft) => Some(draft),
            Err(err) => {
                log_warn!("discarding unreadable answer draft: {err}");
                None
            }
        }
    }
}

impl Drop for DraftAutosave {
    fn drop(&mut self) {
        self.cancel_pending();
    }
}

fn write_draft(repo: &Repository, draft: &AnswerDraft) -> bool {
    let result = serde_json::to_vec(draft)
        .map_err(|err| err.to_string())
        .and_then(|bytes| repo.write_autosave(&bytes).map_err(|err| err.to_string()));
    match result {
        Ok(()) => {
            log_debug!(
                "draft saved for {} question {}",
                draft.candidate_id,
                draft.current_question_index
            );
            true
        }
        Err(err) => {
            log_warn!("failed to save answer draft: {err}");
            false
        }
    }
}
