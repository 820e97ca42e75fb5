//! Structured feedback returned to the candidate.

use serde::Serialize;

/// Upper bound on improvement suggestions in one report.
pub const MAX_IMPROVEMENTS: usize = 5;

/// Score used when the analysis text carries no usable score, and by the fallback report.
pub const DEFAULT_SCORE: u8 = 75;

pub const FALLBACK_FEEDBACK: &str = "Thank you for completing your interview! Based on general best practices, focus on speaking clearly, providing specific examples, and maintaining confident body language. Keep practicing to improve your interview skills!";

const GENERIC_IMPROVEMENTS: [&str; 4] = [
    "Practice speaking more clearly and at a steady pace",
    "Prepare more specific examples from your experience",
    "Work on maintaining eye contact and confident body language",
    "Research the company and role thoroughly before interviews",
];

/// Feedback on one interview answer.
///
/// ## Invariants:
/// - `score` is within `[0, 100]`
/// - `improvements` holds between 1 and `MAX_IMPROVEMENTS` entries
///
/// Both hold because the only constructors are `new` and `fallback`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FeedbackReport {
    feedback: String,
    score: u8,
    improvements: Vec<String>,
}

impl FeedbackReport {
    /// Build a report, clamping the score and normalizing the improvement list.
    ///
    /// An empty list is replaced by `default_improvements()`; a longer list is
    /// truncated to `MAX_IMPROVEMENTS`.
    pub fn new(feedback: impl Into<String>, score: u8, mut improvements: Vec<String>) -> Self {
        if improvements.is_empty() {
            improvements = default_improvements();
        }
        improvements.truncate(MAX_IMPROVEMENTS);

        Self {
            feedback: feedback.into(),
            score: score.min(100),
            improvements,
        }
    }

    /// The generic report sent whenever analysis cannot run or fails.
    pub fn fallback() -> Self {
        Self {
            feedback: FALLBACK_FEEDBACK.to_string(),
            score: DEFAULT_SCORE,
            improvements: GENERIC_IMPROVEMENTS.iter().map(|s| s.to_string()).collect(),
        }
    }

    pub fn feedback(&self) -> &str {
        &self.feedback
    }

    pub fn score(&self) -> u8 {
        self.score
    }

    pub fn improvements(&self) -> &[String] {
        &self.improvements
    }

    pub fn into_parts(self) -> (String, u8, Vec<String>) {
        (self.feedback, self.score, self.improvements)
    }
}

/// Suggestions used when none could be extracted from the analysis.
pub fn default_improvements() -> Vec<String> {
    GENERIC_IMPROVEMENTS[..3].iter().map(|s| s.to_string()).collect()
}
