use thiserror::Error;

use crate::models::CandidateStatus;

/// Failure reported by a durable storage medium. Never fatal to the caller.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("storage quota exceeded writing '{key}': needs {needed} bytes, limit {limit}")]
    QuotaExceeded { key: String, needed: u64, limit: u64 },

    #[error("storage backend error: {0}")]
    Backend(String),

    #[error("storage worker is no longer running")]
    WorkerGone,
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        StorageError::Backend(err.to_string())
    }
}

/// A durable snapshot that could not be turned back into a record.
#[derive(Debug, Error)]
pub enum DecodeError {
    #[error("snapshot is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("snapshot version {0} is newer than supported")]
    UnsupportedVersion(u32),

    #[error("snapshot has no candidate id")]
    MissingId,

    #[error("unexpected snapshot shape: {0}")]
    Shape(String),
}

/// Rejected lifecycle event. The store is left exactly as it was.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("candidate {0} not found")]
    NotFound(String),

    #[error("candidate {id} cannot {action} while {}", .from.as_str())]
    InvalidTransition {
        id: String,
        from: CandidateStatus,
        action: &'static str,
    },

    #[error("question {question_id} not found for candidate {candidate_id}")]
    QuestionNotFound {
        candidate_id: String,
        question_id: String,
    },

    #[error("malformed event: {0}")]
    Malformed(String),
}

/// The external scoring collaborator could not produce a score.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ScoringError {
    #[error("scoring unavailable: {0}")]
    Unavailable(String),
}
