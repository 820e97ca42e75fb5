//! # Transcription Engine
//!
//! Sends normalized audio to an OpenAI-compatible `audio/transcriptions` endpoint
//! (Groq's hosted Whisper by default) and turns the reply into a `TranscriptionResult`.
//!
//! ## Key Responsibilities:
//! - **Request building**: multipart form with the WAV file, model and language
//! - **Error mapping**: timeouts, non-2xx statuses and malformed JSON become
//!   `PipelineError::Service`; an empty transcript becomes `UnintelligibleAudio`
//! - **Performance logging**: audio duration and round-trip time per request

use crate::audio::processor::NormalizedAudio;
use crate::config::TranscriptionConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use reqwest::multipart;
use serde::{Deserialize, Serialize};
use std::time::Instant;

/// Result of a transcription request.
///
/// Only `text` leaves the server; the rest is logged.
#[derive(Debug, Clone, Serialize)]
pub struct TranscriptionResult {
    /// The transcribed text, trimmed
    pub text: String,

    /// Duration of audio processed (seconds)
    pub audio_duration: f64,

    /// Round-trip time of the request (milliseconds)
    pub processing_time_ms: u64,

    /// Model used for transcription
    pub model_name: String,
}

/// Speech-to-text collaborator.
#[async_trait]
pub trait Transcriber: Send + Sync {
    async fn transcribe(&self, audio: &NormalizedAudio) -> Result<TranscriptionResult, PipelineError>;
}

#[derive(Debug, Deserialize)]
struct TranscriptionResponse {
    #[serde(default)]
    text: String,
}

/// HTTP client for a hosted Whisper-style transcription API.
pub struct RemoteTranscriber {
    client: reqwest::Client,
    api_url: String,
    api_key: String,
    model: String,
    language: String,
}

impl RemoteTranscriber {
    /// ## Parameters:
    /// - **config**: endpoint, model, language and timeout
    /// - **api_key**: bearer token (resolved by `AppConfig::transcription_api_key`)
    pub fn new(config: &TranscriptionConfig, api_key: &str) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;

        tracing::info!(
            url = %config.api_url,
            model = %config.model,
            timeout_secs = config.timeout_secs,
            "Transcription client initialized"
        );

        Ok(Self {
            client,
            api_url: config.api_url.clone(),
            api_key: api_key.to_string(),
            model: config.model.clone(),
            language: config.language.clone(),
        })
    }
}

#[async_trait]
impl Transcriber for RemoteTranscriber {
    async fn transcribe(&self, audio: &NormalizedAudio) -> Result<TranscriptionResult, PipelineError> {
        let start_time = Instant::now();

        let file_part = multipart::Part::bytes(audio.wav.clone())
            .file_name("audio.wav")
            .mime_str("audio/wav")
            .map_err(|e| PipelineError::Service(e.to_string()))?;

        let mut form = multipart::Form::new()
            .text("model", self.model.clone())
            .text("response_format", "json")
            .part("file", file_part);
        if !self.language.is_empty() {
            form = form.text("language", self.language.clone());
        }

        let response = self
            .client
            .post(&self.api_url)
            .bearer_auth(&self.api_key)
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%status, body = %body, "Transcription service rejected request");
            return Err(PipelineError::Service(format!("HTTP {}", status)));
        }

        let parsed: TranscriptionResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Service(format!("malformed transcription response: {}", e)))?;

        let text = parsed.text.trim().to_string();
        let processing_time_ms = start_time.elapsed().as_millis() as u64;

        tracing::info!(
            audio_duration = audio.duration_secs,
            sample_rate = audio.sample_rate,
            processing_time_ms,
            characters = text.len(),
            "Transcription completed"
        );

        if text.is_empty() {
            return Err(PipelineError::UnintelligibleAudio);
        }

        Ok(TranscriptionResult {
            text,
            audio_duration: audio.duration_secs,
            processing_time_ms,
            model_name: self.model.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::spawn_upstream;
    use actix_web::http::StatusCode;

    fn config(api_url: &str) -> TranscriptionConfig {
        TranscriptionConfig {
            api_url: api_url.to_string(),
            api_key: String::new(),
            model: "whisper-large-v3".to_string(),
            language: "en".to_string(),
            timeout_secs: 1,
        }
    }

    #[test]
    fn test_response_without_text_parses_as_empty() {
        let parsed: TranscriptionResponse = serde_json::from_str(r#"{"x_groq":{}}"#).unwrap();
        assert!(parsed.text.is_empty());
    }

    fn silence() -> NormalizedAudio {
        NormalizedAudio {
            wav: vec![0; 44],
            sample_rate: 16_000,
            duration_secs: 0.0,
        }
    }

    async fn transcribe_against(status: StatusCode, body: &'static str) -> Result<TranscriptionResult, PipelineError> {
        let url = spawn_upstream(status, body);
        let transcriber = RemoteTranscriber::new(&config(&url), "key").unwrap();
        transcriber.transcribe(&silence()).await
    }

    #[tokio::test]
    async fn test_unreachable_service_is_service_error() {
        // Port 9 (discard) on localhost is closed in test environments
        let transcriber = RemoteTranscriber::new(&config("http://127.0.0.1:9/v1"), "key").unwrap();

        let err = transcriber.transcribe(&silence()).await.unwrap_err();
        assert!(matches!(err, PipelineError::Service(_)));
    }

    #[actix_web::test]
    async fn test_transcript_is_trimmed() {
        let result = transcribe_against(StatusCode::OK, r#"{"text":"  I am a hard worker "}"#)
            .await
            .unwrap();
        assert_eq!(result.text, "I am a hard worker");
        assert_eq!(result.model_name, "whisper-large-v3");
    }

    #[actix_web::test]
    async fn test_blank_transcript_is_unintelligible() {
        let err = transcribe_against(StatusCode::OK, r#"{"text":"  "}"#).await.unwrap_err();
        assert_eq!(err, PipelineError::UnintelligibleAudio);
    }

    #[actix_web::test]
    async fn test_error_status_is_service_error() {
        let err = transcribe_against(StatusCode::INTERNAL_SERVER_ERROR, r#"{"error":"overloaded"}"#)
            .await
            .unwrap_err();
        assert!(matches!(err, PipelineError::Service(msg) if msg.contains("500")));
    }

    #[actix_web::test]
    async fn test_malformed_body_is_service_error() {
        let err = transcribe_against(StatusCode::OK, "<html>").await.unwrap_err();
        assert!(matches!(err, PipelineError::Service(msg) if msg.contains("malformed")));
    }
}
