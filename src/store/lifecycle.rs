//! Candidate lifecycle transitions.
//!
//! ```text
//! info_collection --start_interview--> interview
//! interview --pause--> paused --resume--> interview
//! interview --next_question past last index | complete_interview--> completed
//! ```
//!
//! Every operation validates first and mutates second, so an `Err` always
//! leaves the store untouched. `completed` is terminal: only deletion removes
//! a completed candidate.

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::LifecycleError;
use crate::models::candidate::max_score_for;
use crate::models::{
    Candidate, CandidateFields, CandidateStatus, ChatMessage, InterviewSummary, Question,
};

use super::CandidateStore;
use crate::{log_debug, log_warn};

const ENABLE_LOGS: bool = true;

pub const EXPIRED_TEXT_FEEDBACK: &str = "Time expired with no answer provided.";
pub const EXPIRED_CHOICE_FEEDBACK: &str = "Time expired with no answer selected.";

/// How an answer boundary was reached. Both variants go through the same
/// submission path; `Expired` only supplies the empty defaults.
#[derive(Debug, Clone, PartialEq)]
pub enum AnswerEvent {
    Manual {
        question_id: String,
        answer: String,
        selected_answer: Option<usize>,
        score: u32,
        feedback: String,
    },
    Expired {
        question_id: String,
    },
}

impl AnswerEvent {
    pub fn manual(
        question_id: impl Into<String>,
        answer: impl Into<String>,
        selected_answer: Option<usize>,
        score: u32,
        feedback: impl Into<String>,
    ) -> Self {
        AnswerEvent::Manual {
            question_id: question_id.into(),
            answer: answer.into(),
            selected_answer,
            score,
            feedback: feedback.into(),
        }
    }

    pub fn expired(question_id: impl Into<String>) -> Self {
        AnswerEvent::Expired {
            question_id: question_id.into(),
        }
    }

    pub fn question_id(&self) -> &str {
        match self {
            AnswerEvent::Manual { question_id, .. } | AnswerEvent::Expired { question_id } => {
                question_id
            }
        }
    }
}

/// Outcome of `next_question`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Advanced(usize),
    Completed,
}

impl CandidateStore {
    fn locate(&self, id: &str) -> Result<usize, LifecycleError> {
        self.position(id).ok_or_else(|| {
            log_warn!("lifecycle event for unknown candidate {id}; ignoring");
            LifecycleError::NotFound(id.to_string())
        })
    }

    fn require_status(
        &self,
        index: usize,
        allowed: &[CandidateStatus],
        action: &'static str,
    ) -> Result<(), LifecycleError> {
        let candidate = &self.candidates()[index];
        if allowed.contains(&candidate.status) {
            Ok(())
        } else {
            log_warn!(
                "candidate {} cannot {action} while {}",
                candidate.id,
                candidate.status.as_str()
            );
            Err(LifecycleError::InvalidTransition {
                id: candidate.id.clone(),
                from: candidate.status,
                action,
            })
        }
    }

    /// Inserts a fresh candidate in `info_collection` and makes it active.
    /// Returns `None` without touching the store when `fields` are malformed.
    pub fn create_candidate(&mut self, fields: CandidateFields, now: DateTime<Utc>) -> Option<String> {
        if !fields.is_well_formed() {
            log_warn!("rejecting malformed candidate fields");
            return None;
        }

        let id = Uuid::new_v4().to_string();
        self.push(Candidate::new(id.clone(), fields, now));
        self.set_active_candidate(&id);
        log_debug!("created candidate {id}");
        Some(id)
    }

    /// Merges non-empty profile fields while the candidate is still collecting info.
    pub fn update_candidate_info(
        &mut self,
        id: &str,
        fields: CandidateFields,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let index = self.locate(id)?;
        self.require_status(index, &[CandidateStatus::InfoCollection], "update info")?;
        if !fields.is_well_formed() {
            return Err(LifecycleError::Malformed("candidate fields".into()));
        }

        let candidate = self.candidate_mut(index);
        let CandidateFields {
            name,
            email,
            phone,
            skills,
            resume_text,
            file_name,
        } = fields;
        for (slot, value) in [
            (&mut candidate.name, name),
            (&mut candidate.email, email),
            (&mut candidate.phone, phone),
            (&mut candidate.resume_text, resume_text),
            (&mut candidate.file_name, file_name),
        ] {
            if !value.is_empty() {
                *slot = value;
            }
        }
        if !skills.is_empty() {
            candidate.skills = skills;
        }
        candidate.updated_at = now;
        Ok(())
    }

    pub fn start_interview(
        &mut self,
        id: &str,
        questions: Vec<Question>,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let index = self.locate(id)?;
        self.require_status(index, &[CandidateStatus::InfoCollection], "start interview")?;
        if questions.is_empty() {
            return Err(LifecycleError::Malformed("interview needs at least one question".into()));
        }

        let candidate = self.candidate_mut(index);
        candidate.max_score = max_score_for(&questions);
        candidate.total_score = questions.iter().filter_map(|q| q.score).sum();
        candidate.questions = questions;
        candidate.current_question_index = 0;
        candidate.status = CandidateStatus::Interview;
        candidate.interview_started_at = Some(now);
        candidate.updated_at = now;
        Ok(())
    }

    /// Records an answer and recomputes `total_score` from every question, so
    /// replaying the same submission converges to the same total. Returns the
    /// new total.
    pub fn submit_answer(
        &mut self,
        id: &str,
        event: AnswerEvent,
        now: DateTime<Utc>,
    ) -> Result<u32, LifecycleError> {
        let index = self.locate(id)?;
        self.require_status(
            index,
            &[CandidateStatus::Interview, CandidateStatus::Paused],
            "submit an answer",
        )?;
        let question_index = self.candidates()[index]
            .questions
            .iter()
            .position(|q| q.id == event.question_id())
            .ok_or_else(|| LifecycleError::QuestionNotFound {
                candidate_id: id.to_string(),
                question_id: event.question_id().to_string(),
            })?;

        let candidate = self.candidate_mut(index);
        let question = &mut candidate.questions[question_index];
        let (answer, selected_answer, score, feedback) = match event {
            AnswerEvent::Manual {
                answer,
                selected_answer,
                score,
                feedback,
                ..
            } => (answer, selected_answer, score, feedback),
            AnswerEvent::Expired { .. } => {
                let feedback = if question.has_options() {
                    EXPIRED_CHOICE_FEEDBACK
                } else {
                    EXPIRED_TEXT_FEEDBACK
                };
                (String::new(), None, 0, feedback.to_string())
            }
        };
        question.answer = Some(answer);
        question.selected_answer = selected_answer;
        question.score = Some(score);
        question.feedback = Some(feedback);
        question.answered_at = Some(now);

        candidate.total_score = candidate.score_sum();
        candidate.updated_at = now;
        Ok(candidate.total_score)
    }

    /// Advances to the next question, or completes the interview when the
    /// current question is the last one.
    pub fn next_question(&mut self, id: &str, now: DateTime<Utc>) -> Result<Progress, LifecycleError> {
        let index = self.locate(id)?;
        self.require_status(index, &[CandidateStatus::Interview], "advance")?;

        let candidate = self.candidate_mut(index);
        let progress = match candidate.last_question_index() {
            Some(last) if candidate.current_question_index < last => {
                candidate.current_question_index += 1;
                Progress::Advanced(candidate.current_question_index)
            }
            _ => {
                candidate.status = CandidateStatus::Completed;
                candidate.interview_completed_at = Some(now);
                Progress::Completed
            }
        };
        candidate.updated_at = now;
        Ok(progress)
    }

    /// Idempotent: a completed candidate keeps its completion time and only
    /// gains a summary if it had none.
    pub fn complete_interview(
        &mut self,
        id: &str,
        summary: InterviewSummary,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let index = self.locate(id)?;
        self.require_status(
            index,
            &[
                CandidateStatus::Interview,
                CandidateStatus::Paused,
                CandidateStatus::Completed,
            ],
            "complete",
        )?;

        let candidate = self.candidate_mut(index);
        if candidate.is_completed() && candidate.summary.is_some() {
            return Ok(());
        }
        candidate.status = CandidateStatus::Completed;
        candidate.interview_completed_at.get_or_insert(now);
        if candidate.summary.is_none() {
            candidate.summary = Some(summary);
        }
        candidate.updated_at = now;
        Ok(())
    }

    pub fn pause_interview(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.toggle(id, CandidateStatus::Interview, CandidateStatus::Paused, "pause", now)
    }

    pub fn resume_interview(&mut self, id: &str, now: DateTime<Utc>) -> Result<(), LifecycleError> {
        self.toggle(id, CandidateStatus::Paused, CandidateStatus::Interview, "resume", now)
    }

    fn toggle(
        &mut self,
        id: &str,
        from: CandidateStatus,
        to: CandidateStatus,
        action: &'static str,
        now: DateTime<Utc>,
    ) -> Result<(), LifecycleError> {
        let index = self.locate(id)?;
        self.require_status(index, &[from], action)?;
        let candidate = self.candidate_mut(index);
        candidate.status = to;
        candidate.updated_at = now;
        Ok(())
    }

    pub fn add_chat_message(
        &mut self,
        id: &str,
        kind: &str,
        text: &str,
        sender: &str,
        now: DateTime<Utc>,
    ) -> Result<String, LifecycleError> {
        let index = self.locate(id)?;
        let message_id = Uuid::new_v4().to_string();
        let candidate = self.candidate_mut(index);
        candidate.chat_history.push(ChatMessage {
            id: message_id.clone(),
            kind: kind.to_string(),
            text: text.to_string(),
            sender: sender.to_string(),
            timestamp: now,
        });
        candidate.updated_at = now;
        Ok(message_id)
    }

    /// Removes the record and tombstones its id. The id is tombstoned even
    /// when no in-memory record exists, so a backup-only copy stays dead too.
    pub fn delete_candidate(&mut self, id: &str) -> Option<Candidate> {
        let removed = self.position(id).map(|index| self.remove(index));
        self.absorb_tombstones([id.to_string()]);
        removed
    }
}
