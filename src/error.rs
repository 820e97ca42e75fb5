//! # Error Handling
//!
//! Two layers of errors live here:
//!
//! - **PipelineError**: what a single pipeline stage (decode, transcribe, analyze) can fail
//!   with. These never reach a client directly; the orchestrator turns each kind into a
//!   status message plus the fallback report.
//! - **AppError**: errors at the HTTP boundary, converted into JSON responses through
//!   actix-web's `ResponseError` trait.
//!
//! ## Propagation:
//! Every stage returns `Result<T, PipelineError>` and uses `?` internally, so the
//! orchestrator is the only place that decides what the client sees.

use actix_web::{HttpResponse, ResponseError};
use serde_json::json;
use std::fmt;
use thiserror::Error;

/// Failure kinds of one pipeline run.
///
/// ## Variants:
/// - **Decode**: the payload is not a valid instance of the declared container
///   (corrupt, truncated, empty, unsupported codec)
/// - **UnintelligibleAudio**: the speech service returned no recognizable speech
/// - **Service**: a network/service failure from either external API, including
///   timeouts, non-2xx statuses and malformed JSON
/// - **EmptyInput**: nothing was recorded; a soft case, not an error for the client
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PipelineError {
    #[error("could not decode audio: {0}")]
    Decode(String),

    #[error("speech could not be recognized")]
    UnintelligibleAudio,

    #[error("{0}")]
    Service(String),

    #[error("no audio received")]
    EmptyInput,
}

impl PipelineError {
    /// Human-readable status sent to the client in place of a transcript.
    pub fn status_message(&self) -> String {
        match self {
            PipelineError::UnintelligibleAudio => {
                "Could not understand the audio clearly. Please try speaking more clearly.".to_string()
            }
            PipelineError::Service(cause) => format!("Speech recognition service error: {}", cause),
            PipelineError::Decode(cause) => format!("Processing error: {}", cause),
            PipelineError::EmptyInput => {
                "No audio was received. Please record your answer and try again.".to_string()
            }
        }
    }

    /// Whether this failure is the soft "nothing recorded" case.
    pub fn is_soft(&self) -> bool {
        matches!(self, PipelineError::EmptyInput)
    }
}

impl From<reqwest::Error> for PipelineError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            PipelineError::Service(format!("request timed out: {}", err))
        } else if let Some(status) = err.status() {
            PipelineError::Service(format!("HTTP {}", status))
        } else {
            PipelineError::Service(err.to_string())
        }
    }
}

impl From<hound::Error> for PipelineError {
    fn from(err: hound::Error) -> Self {
        PipelineError::Decode(format!("WAV encoding failed: {}", err))
    }
}

/// Errors returned by HTTP handlers.
///
/// ## Error Categories:
/// - **Internal**: server-side problems (500)
/// - **BadRequest**: client sent invalid data, e.g. an unknown container format (400)
/// - **Unavailable**: capacity exhausted, e.g. the session limit (503)
#[derive(Debug)]
pub enum AppError {
    /// Internal server errors
    Internal(String),

    /// Client sent invalid or malformed data
    BadRequest(String),

    /// The server cannot take more work right now
    Unavailable(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
            AppError::BadRequest(msg) => write!(f, "Bad request: {}", msg),
            AppError::Unavailable(msg) => write!(f, "Service unavailable: {}", msg),
        }
    }
}

/// Converts errors into JSON responses of the shape:
///
/// ```json
/// {
///   "error": {
///     "type": "unavailable",
///     "message": "Maximum concurrent sessions (100) reached",
///     "timestamp": "2025-01-01T12:00:00Z"
///   }
/// }
/// ```
impl ResponseError for AppError {
    fn error_response(&self) -> HttpResponse {
        use actix_web::http::StatusCode;

        let (status, error_type, message) = match self {
            AppError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "internal_error", msg),
            AppError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            AppError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, "unavailable", msg),
        };

        HttpResponse::build(status).json(json!({
            "error": {
                "type": error_type,
                "message": message,
                "timestamp": chrono::Utc::now().to_rfc3339()
            }
        }))
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err.to_string())
    }
}

/// JSON parsing errors are almost always the client's fault, so they map to 400.
impl From<serde_json::Error> for AppError {
    fn from(err: serde_json::Error) -> Self {
        AppError::BadRequest(format!("JSON parsing error: {}", err))
    }
}

/// Shorthand for handler results.
pub type AppResult<T> = Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_messages_distinguish_failure_kinds() {
        assert!(PipelineError::UnintelligibleAudio
            .status_message()
            .starts_with("Could not understand the audio"));
        assert_eq!(
            PipelineError::Service("HTTP 503".to_string()).status_message(),
            "Speech recognition service error: HTTP 503"
        );
        assert_eq!(
            PipelineError::Decode("truncated stream".to_string()).status_message(),
            "Processing error: truncated stream"
        );
        assert!(PipelineError::EmptyInput.is_soft());
        assert!(!PipelineError::UnintelligibleAudio.is_soft());
    }

    #[test]
    fn test_unavailable_maps_to_503() {
        let response = AppError::Unavailable("full".to_string()).error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::SERVICE_UNAVAILABLE);

        let response = AppError::BadRequest("nope".to_string()).error_response();
        assert_eq!(response.status(), actix_web::http::StatusCode::BAD_REQUEST);
    }
}
