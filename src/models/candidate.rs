//! Candidate records and the dashboard view state stored alongside them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{InterviewSummary, Question};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "snake_case")]
pub enum CandidateStatus {
    #[default]
    InfoCollection,
    Interview,
    Paused,
    Completed,
}

impl CandidateStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CandidateStatus::InfoCollection => "info_collection",
            CandidateStatus::Interview => "interview",
            CandidateStatus::Paused => "paused",
            CandidateStatus::Completed => "completed",
        }
    }

    /// Interview started and not yet finished.
    pub fn is_in_progress(&self) -> bool {
        matches!(self, CandidateStatus::Interview | CandidateStatus::Paused)
    }

    /// Ordering used by the dashboard status sort.
    pub fn rank(&self) -> u8 {
        match self {
            CandidateStatus::InfoCollection => 0,
            CandidateStatus::Paused => 1,
            CandidateStatus::Interview => 2,
            CandidateStatus::Completed => 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub id: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub text: String,
    pub sender: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Candidate {
    pub id: String,
    pub name: String,
    pub email: String,
    pub phone: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub resume_text: String,
    #[serde(default)]
    pub file_name: String,
    pub status: CandidateStatus,
    pub questions: Vec<Question>,
    pub current_question_index: usize,
    pub total_score: u32,
    pub max_score: u32,
    pub interview_started_at: Option<DateTime<Utc>>,
    pub interview_completed_at: Option<DateTime<Utc>>,
    pub summary: Option<InterviewSummary>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub chat_history: Vec<ChatMessage>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub restored_at: Option<DateTime<Utc>>,
}

impl Candidate {
    pub fn new(id: String, fields: CandidateFields, now: DateTime<Utc>) -> Self {
        Self {
            id,
            name: fields.name,
            email: fields.email,
            phone: fields.phone,
            skills: fields.skills,
            resume_text: fields.resume_text,
            file_name: fields.file_name,
            status: CandidateStatus::InfoCollection,
            questions: Vec::new(),
            current_question_index: 0,
            total_score: 0,
            max_score: 0,
            interview_started_at: None,
            interview_completed_at: None,
            summary: None,
            created_at: now,
            updated_at: now,
            chat_history: Vec::new(),
            restored_at: None,
        }
    }

    pub fn is_completed(&self) -> bool {
        self.status == CandidateStatus::Completed
    }

    pub fn current_question(&self) -> Option<&Question> {
        self.questions.get(self.current_question_index)
    }

    pub fn answered_count(&self) -> usize {
        self.questions.iter().filter(|q| q.is_answered()).count()
    }

    /// Sum of every question's score. `total_score` must always equal this.
    pub fn score_sum(&self) -> u32 {
        self.questions.iter().filter_map(|q| q.score).sum()
    }

    pub fn last_question_index(&self) -> Option<usize> {
        self.questions.len().checked_sub(1)
    }
}

/// Sum of the difficulty caps of `questions`.
pub fn max_score_for(questions: &[Question]) -> u32 {
    questions.iter().map(Question::score_cap).sum()
}

/// Flat profile handed over by the resume extraction collaborator.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CandidateFields {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub phone: String,
    #[serde(default)]
    pub skills: Vec<String>,
    #[serde(default)]
    pub resume_text: String,
    #[serde(default)]
    pub file_name: String,
}

impl CandidateFields {
    pub fn new(name: impl Into<String>, email: impl Into<String>, phone: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
            phone: phone.into(),
            ..Self::default()
        }
    }

    /// Empty fields are fine; present ones must look like what they claim to be.
    pub fn is_well_formed(&self) -> bool {
        let email_ok = self.email.is_empty() || self.email.contains('@');
        let phone_ok = self
            .phone
            .chars()
            .all(|c| c.is_ascii_digit() || matches!(c, ' ' | '+' | '-' | '(' | ')'));
        email_ok && phone_ok
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortBy {
    #[default]
    Score,
    Name,
    Date,
    Status,
}

impl SortBy {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "score" => Some(SortBy::Score),
            "name" => Some(SortBy::Name),
            "date" => Some(SortBy::Date),
            "status" => Some(SortBy::Status),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    #[default]
    Desc,
}

impl SortOrder {
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "asc" => Some(SortOrder::Asc),
            "desc" => Some(SortOrder::Desc),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ViewState {
    #[serde(default)]
    pub selected_candidate_id: Option<String>,
    #[serde(default)]
    pub search_term: String,
    #[serde(default)]
    pub sort_by: SortBy,
    #[serde(default)]
    pub sort_order: SortOrder,
}
