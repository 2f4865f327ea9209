use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Structured interview result attached when a candidate completes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct InterviewSummary {
    pub overall_rating: String,
    pub summary: String,
    #[serde(default)]
    pub technical_strengths: Vec<String>,
    #[serde(default)]
    pub areas_for_improvement: Vec<String>,
    pub recommendation: String,
    #[serde(default)]
    pub key_highlights: Vec<String>,
    pub final_score: u32,
    pub max_score: u32,
    pub completed_at: DateTime<Utc>,
}

impl InterviewSummary {
    /// Summary derived purely from the score, used when the summary
    /// collaborator is unavailable.
    pub fn fallback(name: &str, total_score: u32, max_score: u32, now: DateTime<Utc>) -> Self {
        let percentage = if max_score == 0 {
            0.0
        } else {
            f64::from(total_score) / f64::from(max_score) * 100.0
        };

        let (rating, recommendation) = if percentage >= 80.0 {
            ("Excellent", "Strong Hire")
        } else if percentage >= 65.0 {
            ("Good", "Hire")
        } else if percentage >= 50.0 {
            ("Average", "Maybe")
        } else {
            ("Below Average", "No Hire")
        };

        Self {
            overall_rating: rating.to_string(),
            summary: format!(
                "{name} completed the interview with a score of {total_score}/{max_score} ({percentage:.1}%)."
            ),
            technical_strengths: vec![
                "Completed all questions".to_string(),
                "Participated in full interview".to_string(),
            ],
            areas_for_improvement: vec![
                "Could improve technical depth".to_string(),
                "Practice more coding scenarios".to_string(),
            ],
            recommendation: recommendation.to_string(),
            key_highlights: vec![
                format!("Score: {total_score}/{max_score}"),
                "Interview completion rate: 100%".to_string(),
            ],
            final_score: total_score,
            max_score,
            completed_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_thresholds() {
        let now = Utc::now();
        let cases = [
            (80, "Excellent", "Strong Hire"),
            (65, "Good", "Hire"),
            (50, "Average", "Maybe"),
            (49, "Below Average", "No Hire"),
        ];
        for (score, rating, recommendation) in cases {
            let summary = InterviewSummary::fallback("Ada", score, 100, now);
            assert_eq!(summary.overall_rating, rating);
            assert_eq!(summary.recommendation, recommendation);
        }
    }

    #[test]
    fn fallback_tolerates_zero_max() {
        let summary = InterviewSummary::fallback("Ada", 0, 0, Utc::now());
        assert_eq!(summary.recommendation, "No Hire");
        assert!(summary.summary.contains("0/0"));
    }
}
