//! Score bookkeeping helpers and the collaborator seam for answer scoring.
//!
//! The lifecycle engine never validates caps itself. Everything that turns an
//! answer into a number goes through this module, which keeps scores within
//! [`Difficulty::score_cap`].

use crate::error::ScoringError;
use crate::models::{Difficulty, Question};

/// Message shown to the candidate when the scorer failed and the fallback
/// score was applied instead.
pub const FALLBACK_MESSAGE: &str = "could not score this answer, default applied";

const FALLBACK_FEEDBACK: &str = "Answer received and evaluated.";

/// What the candidate handed in for one question.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AnswerInput {
    pub text: String,
    pub selected_option: Option<usize>,
}

impl AnswerInput {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            selected_option: None,
        }
    }

    pub fn choice(index: usize) -> Self {
        Self {
            text: String::new(),
            selected_option: Some(index),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Scored {
    pub score: u32,
    pub feedback: String,
}

impl Scored {
    /// Clamps `score` to the question's cap.
    pub fn capped(question: &Question, score: u32, feedback: impl Into<String>) -> Self {
        Self {
            score: score.min(question.score_cap()),
            feedback: feedback.into(),
        }
    }
}

/// Grades one answer. Implementations may call out to remote services and
/// may fail; callers substitute [`fallback_scored`] on error.
pub trait AnswerScorer: Send + Sync {
    fn score(&self, question: &Question, answer: &AnswerInput) -> Result<Scored, ScoringError>;
}

/// Half the difficulty cap.
pub fn fallback_score(difficulty: Difficulty) -> u32 {
    difficulty.score_cap() / 2
}

pub fn fallback_scored(question: &Question) -> Scored {
    Scored {
        score: fallback_score(question.difficulty),
        feedback: FALLBACK_FEEDBACK.to_string(),
    }
}

/// Deterministic scorer for multiple-choice questions: the full cap for the
/// correct option, nothing otherwise.
#[derive(Debug, Clone, Copy, Default)]
pub struct ChoiceScorer;

impl AnswerScorer for ChoiceScorer {
    fn score(&self, question: &Question, answer: &AnswerInput) -> Result<Scored, ScoringError> {
        let Some(correct) = question.correct_answer else {
            return Err(ScoringError::Unavailable(format!(
                "question {} has no answer key",
                question.id
            )));
        };
        let Some(selected) = answer.selected_option else {
            return Ok(Scored::capped(question, 0, "No answer selected."));
        };

        let correct_text = question.option_text(correct).unwrap_or_default();
        if selected == correct {
            let mut feedback = format!("Correct! {correct_text}");
            if let Some(explanation) = &question.explanation {
                feedback = format!("{feedback}. {explanation}");
            }
            Ok(Scored::capped(question, question.score_cap(), feedback))
        } else {
            Ok(Scored::capped(
                question,
                0,
                format!("Incorrect. The correct answer was: {correct_text}"),
            ))
        }
    }
}

/// Questions used when generation fails: two per difficulty, in interview order.
pub fn fallback_questions() -> Vec<Question> {
    let q = |id: &str, text: &str, difficulty, options: [&str; 4], correct, explanation: &str| {
        Question::multiple_choice(
            id,
            text,
            difficulty,
            options.iter().map(|o| o.to_string()).collect(),
            correct,
        )
        .with_explanation(explanation)
    };

    vec![
        q(
            "fallback-1",
            "Which hook is used to manage local state in a React function component?",
            Difficulty::Easy,
            ["useEffect", "useState", "useMemo", "useRef"],
            1,
            "useState returns the current value and a setter",
        ),
        q(
            "fallback-2",
            "Which HTTP method is conventionally used to create a new resource?",
            Difficulty::Easy,
            ["GET", "DELETE", "POST", "HEAD"],
            2,
            "POST submits a new entity to the collection",
        ),
        q(
            "fallback-3",
            "What does the Node.js event loop allow a single thread to do?",
            Difficulty::Medium,
            [
                "Run JavaScript in parallel on all cores",
                "Perform non-blocking I/O",
                "Share memory between processes",
                "Compile JavaScript ahead of time",
            ],
            1,
            "I/O completes asynchronously while the thread keeps running callbacks",
        ),
        q(
            "fallback-4",
            "What is the main purpose of a database index?",
            Difficulty::Medium,
            [
                "Encrypt rows at rest",
                "Enforce foreign keys",
                "Speed up lookups on the indexed columns",
                "Compress the table",
            ],
            2,
            "An index trades write cost and space for faster reads",
        ),
        q(
            "fallback-5",
            "Which technique best prevents a React list from re-rendering unchanged rows?",
            Difficulty::Hard,
            [
                "Using array indexes as keys",
                "Memoising row components and giving rows stable keys",
                "Calling forceUpdate on the parent",
                "Storing rows in a global variable",
            ],
            1,
            "Stable keys plus memoisation let React skip rows whose props did not change",
        ),
        q(
            "fallback-6",
            "A Node.js service leaks memory under load. What is the most likely culprit?",
            Difficulty::Hard,
            [
                "Too many CPU cores",
                "Listeners or caches that keep references alive",
                "Using const instead of let",
                "Short HTTP timeouts",
            ],
            1,
            "Unbounded caches and unremoved listeners keep objects reachable",
        ),
    ]
}
