//! # Pipeline Module
//!
//! Sequences one recording through the audio, transcription and feedback stages and
//! defines the events a run emits.

pub mod events;
pub mod orchestrator;

pub use events::{ClientEvent, EventSink, ServerEvent};
pub use orchestrator::{Pipeline, ProcessVideoResponse};

#[cfg(test)]
pub use orchestrator::testing;
