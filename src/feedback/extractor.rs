//! # Feedback Extraction
//!
//! Pulls a numeric score and a short list of improvement suggestions out of the
//! free-form analysis text the LLM returns. The text is markdown-ish prose with no
//! guaranteed structure, so extraction is a line scan with fixed rules and fixed
//! defaults. Neither function can fail or panic.
//!
//! ## Score Rules:
//! - A line qualifies when it mentions "score" (any case) and contains a digit
//! - The first token on a qualifying line that reads as an integer in `[0, 100]` wins
//! - `85/100` reads as 85; wrapping markdown (`**85**`) and trailing `,;:!%` are ignored
//! - A trailing `.` is kept, so list markers like `1.` never count
//! - No match anywhere gives `DEFAULT_SCORE`
//!
//! ## Improvement Rules:
//! - A line mentioning "improvement" or "areas for" opens the section
//! - Inside it, `-`, `*` and `•` bullets and `1.`-style items are captured; a bare
//!   marker with no text is skipped
//! - A line starting with a lowercase letter continues the previous item
//! - Any other non-empty line closes the section
//! - At most `MAX_IMPROVEMENTS` are kept; none at all gives the default list

use crate::feedback::report::{default_improvements, FeedbackReport, DEFAULT_SCORE, MAX_IMPROVEMENTS};

const SECTION_TRIGGERS: [&str; 2] = ["improvement", "areas for"];

const BULLET_MARKERS: [char; 3] = ['-', '*', '•'];

const TOKEN_WRAPPING: [char; 11] = ['*', '_', '(', ')', '[', ']', ',', ';', ':', '!', '%'];

/// Turns raw analysis text into a structured report.
pub trait FeedbackExtractor: Send + Sync {
    fn extract(&self, raw: &str) -> FeedbackReport;
}

/// Line-scanning extractor; see the module docs for the rules.
#[derive(Debug, Default, Clone, Copy)]
pub struct HeuristicExtractor;

impl FeedbackExtractor for HeuristicExtractor {
    fn extract(&self, raw: &str) -> FeedbackReport {
        FeedbackReport::new(raw, extract_score(raw), extract_improvements(raw))
    }
}

/// Find the overall score in the analysis text.
pub fn extract_score(text: &str) -> u8 {
    text.lines()
        .filter(|line| {
            line.to_lowercase().contains("score") && line.chars().any(|c| c.is_ascii_digit())
        })
        .find_map(|line| line.split_whitespace().find_map(parse_score_token))
        .unwrap_or(DEFAULT_SCORE)
}

fn parse_score_token(token: &str) -> Option<u8> {
    let token = token.trim_matches(&TOKEN_WRAPPING[..]);
    let number = match token.split_once('/') {
        Some((numerator, _)) => numerator.trim_matches(&TOKEN_WRAPPING[..]),
        None => token,
    };

    if number.is_empty() || !number.chars().all(|c| c.is_ascii_digit()) {
        return None;
    }

    number.parse::<u8>().ok().filter(|score| *score <= 100)
}

/// Collect the improvement suggestions listed in the analysis text.
pub fn extract_improvements(text: &str) -> Vec<String> {
    let mut improvements = Vec::new();
    let mut in_section = false;

    for line in text.lines().map(str::trim) {
        let lower = line.to_lowercase();
        if SECTION_TRIGGERS.iter().any(|trigger| lower.contains(trigger)) {
            in_section = true;
            continue;
        }

        if !in_section {
            continue;
        }

        let Some(first) = line.chars().next() else {
            continue;
        };

        let item = if BULLET_MARKERS.contains(&first) {
            Some(&line[first.len_utf8()..])
        } else if first.is_ascii_digit() && line.contains('.') {
            line.split_once('.').map(|(_, item)| item)
        } else if first.is_lowercase() {
            continue;
        } else {
            in_section = false;
            None
        };

        // A bare marker carries no suggestion
        if let Some(item) = item.map(str::trim).filter(|item| !item.is_empty()) {
            improvements.push(item.to_string());
        }

        if improvements.len() >= MAX_IMPROVEMENTS {
            break;
        }
    }

    if improvements.is_empty() {
        return default_improvements();
    }

    improvements
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_score_fraction() {
        assert_eq!(extract_score("Overall Score: 85/100"), 85);
        assert_eq!(extract_score("**Score:** (92/100)"), 92);
    }

    #[test]
    fn test_score_plain_and_wrapped() {
        assert_eq!(extract_score("Your score is 64"), 64);
        assert_eq!(extract_score("SCORE: **70**, solid"), 70);
        assert_eq!(extract_score("Performance score: 88%"), 88);
    }

    #[test]
    fn test_score_defaults_without_digit_bearing_line() {
        assert_eq!(extract_score("Great answer, no score given."), 75);
        assert_eq!(extract_score("I rate this 90 out of 100"), 75);
        assert_eq!(extract_score(""), 75);
    }

    #[test]
    fn test_score_skips_list_markers_and_out_of_range() {
        assert_eq!(extract_score("1. Overall performance score"), 75);
        assert_eq!(extract_score("Score: 150 points"), 75);
        assert_eq!(extract_score("1. Overall performance score: 78"), 78);
    }

    #[test]
    fn test_score_continues_past_unusable_line() {
        let text = "1. Overall performance score (0-100)\nScore: 81";
        assert_eq!(extract_score(text), 81);
    }

    #[test]
    fn test_improvements_bullets_in_order() {
        let text = "Feedback text.\n\nAreas for improvement:\n- Slow down\n* Use examples\n• Make eye contact\n\nPositive aspects:\n- Friendly tone";
        assert_eq!(
            extract_improvements(text),
            vec!["Slow down", "Use examples", "Make eye contact"]
        );
    }

    #[test]
    fn test_improvements_numbered_and_continuations() {
        let text = "Specific improvements:\n1. Structure answers with STAR\n   which helps the listener\n2. Quantify results\nStrengths:\n- Clear voice";
        assert_eq!(
            extract_improvements(text),
            vec!["Structure answers with STAR", "Quantify results"]
        );
    }

    #[test]
    fn test_improvements_skip_bare_markers() {
        let text = "Areas for improvement:\n-\n- Keep answers focused\n*   \n3.\n4. Mention outcomes";
        assert_eq!(
            extract_improvements(text),
            vec!["Keep answers focused", "Mention outcomes"]
        );
        assert_eq!(extract_improvements("Areas for improvement:\n-\n-"), default_improvements());
    }

    #[test]
    fn test_improvements_capped_at_five() {
        let mut text = String::from("Areas for growth:\n");
        for i in 0..8 {
            text.push_str(&format!("- Tip {}\n", i));
        }
        let improvements = extract_improvements(&text);
        assert_eq!(improvements.len(), 5);
        assert_eq!(improvements[4], "Tip 4");
    }

    #[test]
    fn test_improvements_default_when_none_found() {
        assert_eq!(extract_improvements("Well done overall."), default_improvements());
        assert_eq!(
            extract_improvements("Areas for improvement:\nNone really."),
            default_improvements()
        );
    }

    #[test]
    fn test_heuristic_extractor_builds_report() {
        let raw = "Score: 82/100\nAreas for improvement:\n- Pause before answering";
        let report = HeuristicExtractor.extract(raw);

        assert_eq!(report.score(), 82);
        assert_eq!(report.feedback(), raw);
        assert_eq!(report.improvements(), ["Pause before answering".to_string()]);
    }
}
