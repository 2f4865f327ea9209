use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

impl Difficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            Difficulty::Easy => "Easy",
            Difficulty::Medium => "Medium",
            Difficulty::Hard => "Hard",
        }
    }

    /// Maximum score a question of this tier can earn.
    pub fn score_cap(&self) -> u32 {
        match self {
            Difficulty::Easy => 10,
            Difficulty::Medium => 20,
            Difficulty::Hard => 30,
        }
    }

    /// Answer window in seconds.
    pub fn time_limit_secs(&self) -> u32 {
        match self {
            Difficulty::Easy => 20,
            Difficulty::Medium => 60,
            Difficulty::Hard => 120,
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Easy" => Some(Difficulty::Easy),
            "Medium" => Some(Difficulty::Medium),
            "Hard" => Some(Difficulty::Hard),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Question {
    pub id: String,
    pub question: String,
    pub difficulty: Difficulty,
    /// Seconds allowed; derived from `difficulty` when the question is built.
    pub time: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub options: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub correct_answer: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub explanation: Option<String>,

    #[serde(default)]
    pub answer: Option<String>,
    #[serde(default)]
    pub selected_answer: Option<usize>,
    #[serde(default)]
    pub score: Option<u32>,
    #[serde(default)]
    pub feedback: Option<String>,
    #[serde(default)]
    pub answered_at: Option<DateTime<Utc>>,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<String>, difficulty: Difficulty) -> Self {
        Self {
            id: id.into(),
            question: text.into(),
            difficulty,
            time: difficulty.time_limit_secs(),
            options: None,
            correct_answer: None,
            explanation: None,
            answer: None,
            selected_answer: None,
            score: None,
            feedback: None,
            answered_at: None,
        }
    }

    pub fn multiple_choice(
        id: impl Into<String>,
        text: impl Into<String>,
        difficulty: Difficulty,
        options: Vec<String>,
        correct_answer: usize,
    ) -> Self {
        Self {
            options: Some(options),
            correct_answer: Some(correct_answer),
            ..Self::new(id, text, difficulty)
        }
    }

    pub fn with_explanation(mut self, explanation: impl Into<String>) -> Self {
        self.explanation = Some(explanation.into());
        self
    }

    pub fn is_answered(&self) -> bool {
        self.answered_at.is_some()
    }

    pub fn has_options(&self) -> bool {
        self.options.as_ref().is_some_and(|options| !options.is_empty())
    }

    pub fn score_cap(&self) -> u32 {
        self.difficulty.score_cap()
    }

    pub fn option_text(&self, index: usize) -> Option<&str> {
        self.options
            .as_ref()
            .and_then(|options| options.get(index))
            .map(String::as_str)
    }
}
