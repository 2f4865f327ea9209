pub mod candidate;
pub mod question;
pub mod summary;

pub use candidate::{
    Candidate, CandidateFields, CandidateStatus, ChatMessage, SortBy, SortOrder, ViewState,
};
pub use question::{Difficulty, Question};
pub use summary::InterviewSummary;
