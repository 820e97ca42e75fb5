//! # Feedback Module
//!
//! Turns a transcript into a scored report.
//!
//! ## Key Components:
//! - **Analyzer**: asks the LLM for free-form coaching feedback
//! - **Extractor**: reads the score and improvement bullets out of that text
//! - **Report**: the structured result, including the generic fallback

pub mod analyzer;
pub mod extractor;
pub mod report;

pub use analyzer::{ChatCompletionAnalyzer, FeedbackAnalyzer};
pub use extractor::{FeedbackExtractor, HeuristicExtractor};
pub use report::FeedbackReport;
