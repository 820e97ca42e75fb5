//! # Event Channel Messages
//!
//! Every text frame on the socket is a JSON envelope `{"event": <name>, "data": <payload>}`.
//!
//! ## Server → Client:
//! - `feedback`: greeting string sent on connect
//! - `processing_step`: `{step}` with 1 = converting, 2 = transcribing, 3 = analyzing,
//!   4 = generating feedback
//! - `transcription`: `{text}`, the transcript or a status message when it failed
//! - `ai_feedback`: the feedback report, plus `transcription` on success
//! - `error`: `{code, message}` for busy sessions, full buffers and bad messages
//!
//! ## Client → Server:
//! - `video_chunk`: bytes as a JSON array (binary frames are the usual route)
//! - `video_complete`: no payload, starts the pipeline
//! - `configure`: `{format}` changes the declared container format

use crate::audio::processor::ContainerFormat;
use crate::feedback::FeedbackReport;
use serde::{Deserialize, Serialize};

pub const GREETING: &str = "Connected to AI Interview Assistant!";

/// Progress markers, emitted before each unit of work starts.
pub mod step {
    pub const CONVERTING: u8 = 1;
    pub const TRANSCRIBING: u8 = 2;
    pub const ANALYZING: u8 = 3;
    pub const GENERATING_FEEDBACK: u8 = 4;
}

/// Messages sent to the client.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ServerEvent {
    Feedback(String),
    ProcessingStep { step: u8 },
    Transcription { text: String },
    AiFeedback(AiFeedback),
    Error { code: String, message: String },
}

impl ServerEvent {
    pub fn greeting() -> Self {
        ServerEvent::Feedback(GREETING.to_string())
    }

    pub fn step(step: u8) -> Self {
        ServerEvent::ProcessingStep { step }
    }

    pub fn transcription(text: impl Into<String>) -> Self {
        ServerEvent::Transcription { text: text.into() }
    }

    pub fn error(code: &str, message: impl Into<String>) -> Self {
        ServerEvent::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ServerEvent::Feedback(_) => "feedback",
            ServerEvent::ProcessingStep { .. } => "processing_step",
            ServerEvent::Transcription { .. } => "transcription",
            ServerEvent::AiFeedback(_) => "ai_feedback",
            ServerEvent::Error { .. } => "error",
        }
    }
}

/// Payload of `ai_feedback`: the report fields, flattened, with the transcript when
/// the analysis actually ran.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AiFeedback {
    #[serde(flatten)]
    pub report: FeedbackReport,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub transcription: Option<String>,
}

impl AiFeedback {
    pub fn fallback() -> Self {
        Self {
            report: FeedbackReport::fallback(),
            transcription: None,
        }
    }
}

/// Messages accepted from the client as JSON text frames.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum ClientEvent {
    VideoChunk(Vec<u8>),
    VideoComplete,
    Configure { format: ContainerFormat },
}

/// Where a pipeline run sends its events. The socket actor implements this by
/// forwarding to its mailbox; tests record into a vector.
pub trait EventSink: Send + Sync {
    fn emit(&self, event: ServerEvent);
}
