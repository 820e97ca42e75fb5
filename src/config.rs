//! # Configuration Management
//!
//! Loads application configuration from multiple sources:
//! - Built-in defaults (the `Default` impl below)
//! - An optional `config.toml` in the working directory
//! - Environment variables with the `APP_` prefix, `__` separating nested keys
//!   (`APP_LLM__MODEL=llama-3.3-70b-versatile`, `APP_SERVER__PORT=8080`)
//! - Well-known deployment variables: `GROQ_API_KEY`, `GROQ_API_URL`, `HOST`, `PORT`
//!
//! ## Configuration Priority (highest to lowest):
//! 1. Well-known variables (`GROQ_API_KEY`, `GROQ_API_URL`, `HOST`, `PORT`)
//! 2. `APP_` environment variables
//! 3. Configuration file (config.toml)
//! 4. Default values
//!
//! The LLM key and endpoint have no usable defaults. `validate` rejects a configuration
//! without them so the server fails at startup instead of on the first recording.

use crate::audio::processor::ContainerFormat;
use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::time::Duration;

/// Main application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub llm: LlmConfig,
    pub transcription: TranscriptionConfig,
    pub audio: AudioConfig,
    pub performance: PerformanceConfig,
}

/// Where the HTTP/WebSocket server listens.
///
/// `max_frame_bytes` caps a single WebSocket frame. Browser recorders flush about one
/// second of video per chunk, which is well past the 64 KiB codec default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub max_frame_bytes: usize,
}

/// Chat-completions endpoint used to generate interview feedback.
///
/// ## Fields:
/// - `api_url`: full URL of the chat completions endpoint
/// - `api_key`: bearer token
/// - `model`: model name sent in the request body
/// - `temperature` / `max_tokens`: sampling parameters, 0.7 and 1000 by default
/// - `timeout_secs`: whole-request timeout, 30 seconds by default
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LlmConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub temperature: f32,
    pub max_tokens: u32,
    pub timeout_secs: u64,
}

/// Speech-to-text endpoint (OpenAI-compatible `audio/transcriptions`).
///
/// An empty `api_key` means "reuse the LLM key", which is the common case when both
/// services come from the same provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptionConfig {
    pub api_url: String,
    pub api_key: String,
    pub model: String,
    pub language: String,
    pub timeout_secs: u64,
}

/// Audio normalization settings.
///
/// ## Fields:
/// - `sample_rate`: rate of the canonical WAV handed to the transcriber
/// - `default_format`: container assumed for streamed chunks (browsers record WebM)
/// - `ffmpeg_path`: transcoder used for codecs the built-in decoder lacks; empty disables it
/// - `max_buffer_bytes`: per-session cap on accumulated chunk bytes
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AudioConfig {
    pub sample_rate: u32,
    pub default_format: ContainerFormat,
    pub ffmpeg_path: String,
    pub max_buffer_bytes: usize,
}

/// Capacity limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub max_concurrent_sessions: usize,
    pub max_upload_bytes: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 5000,
                max_frame_bytes: 16 * 1024 * 1024,
            },
            llm: LlmConfig {
                api_url: String::new(),
                api_key: String::new(),
                model: "llama-3.1-70b-versatile".to_string(),
                temperature: 0.7,
                max_tokens: 1000,
                timeout_secs: 30,
            },
            transcription: TranscriptionConfig {
                api_url: "https://api.groq.com/openai/v1/audio/transcriptions".to_string(),
                api_key: String::new(),
                model: "whisper-large-v3".to_string(),
                language: "en".to_string(),
                timeout_secs: 10,
            },
            audio: AudioConfig {
                sample_rate: 16000,
                default_format: ContainerFormat::Webm,
                ffmpeg_path: "ffmpeg".to_string(),
                max_buffer_bytes: 100 * 1024 * 1024,
            },
            performance: PerformanceConfig {
                max_concurrent_sessions: 100,
                max_upload_bytes: 100 * 1024 * 1024,
            },
        }
    }
}

impl AppConfig {
    /// Load configuration from defaults, `config.toml` and the environment.
    ///
    /// ## Environment Variable Examples:
    /// - `GROQ_API_KEY=gsk_...`: LLM (and by default transcription) bearer token
    /// - `GROQ_API_URL=https://api.groq.com/openai/v1/chat/completions`: LLM endpoint
    /// - `APP_TRANSCRIPTION__TIMEOUT_SECS=20`: override the transcription timeout
    /// - `PORT=3000`: special case for deployment platforms
    pub fn load() -> Result<Self> {
        let mut settings = config::Config::builder()
            .add_source(config::Config::try_from(&AppConfig::default())?)
            .add_source(config::File::with_name("config").required(false))
            .add_source(
                config::Environment::with_prefix("APP")
                    .prefix_separator("_")
                    .separator("__"),
            );

        let overrides = [
            ("GROQ_API_KEY", "llm.api_key"),
            ("GROQ_API_URL", "llm.api_url"),
            ("HOST", "server.host"),
            ("PORT", "server.port"),
        ];
        for (var, key) in overrides {
            if let Ok(value) = env::var(var) {
                settings = settings.set_override(key, value)?;
            }
        }

        let config = settings.build()?.try_deserialize()?;
        Ok(config)
    }

    /// Validate that the configuration is usable.
    pub fn validate(&self) -> Result<()> {
        if self.server.port == 0 {
            return Err(anyhow::anyhow!("Server port cannot be 0"));
        }

        if self.server.max_frame_bytes == 0 {
            return Err(anyhow::anyhow!("WebSocket frame limit must be greater than 0"));
        }

        if self.llm.api_key.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "LLM API key is not configured (set GROQ_API_KEY or APP_LLM__API_KEY)"
            ));
        }

        if self.llm.api_url.trim().is_empty() {
            return Err(anyhow::anyhow!(
                "LLM API URL is not configured (set GROQ_API_URL or APP_LLM__API_URL)"
            ));
        }

        if !(0.0..=2.0).contains(&self.llm.temperature) {
            return Err(anyhow::anyhow!(
                "LLM temperature must be between 0 and 2, got {}",
                self.llm.temperature
            ));
        }

        if self.llm.timeout_secs == 0 || self.transcription.timeout_secs == 0 {
            return Err(anyhow::anyhow!("Collaborator timeouts must be greater than 0"));
        }

        if self.transcription.api_url.trim().is_empty() {
            return Err(anyhow::anyhow!("Transcription API URL cannot be empty"));
        }

        if self.audio.sample_rate == 0 {
            return Err(anyhow::anyhow!("Audio sample rate must be greater than 0"));
        }

        if self.audio.max_buffer_bytes == 0 || self.performance.max_upload_bytes == 0 {
            return Err(anyhow::anyhow!("Audio size limits must be greater than 0"));
        }

        if self.performance.max_concurrent_sessions == 0 {
            return Err(anyhow::anyhow!("Max concurrent sessions must be greater than 0"));
        }

        Ok(())
    }

    /// Bearer token for the transcription service.
    pub fn transcription_api_key(&self) -> &str {
        if self.transcription.api_key.trim().is_empty() {
            &self.llm.api_key
        } else {
            &self.transcription.api_key
        }
    }

    /// Path of the ffmpeg binary, if transcoding fallback is enabled.
    pub fn ffmpeg_path(&self) -> Option<&str> {
        let path = self.audio.ffmpeg_path.trim();
        if path.is_empty() {
            None
        } else {
            Some(path)
        }
    }
}

impl LlmConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl TranscriptionConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn configured() -> AppConfig {
        let mut config = AppConfig::default();
        config.llm.api_key = "gsk_test".to_string();
        config.llm.api_url = "https://llm.example/v1/chat/completions".to_string();
        config
    }

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 5000);
        assert!(config.server.max_frame_bytes > 64 * 1024);
        assert_eq!(config.llm.timeout_secs, 30);
        assert_eq!(config.transcription.timeout_secs, 10);
        assert_eq!(config.llm.max_tokens, 1000);
        assert!((config.llm.temperature - 0.7).abs() < f32::EPSILON);
        assert_eq!(config.audio.default_format, ContainerFormat::Webm);
    }

    #[test]
    fn test_missing_credentials_fail_fast() {
        let config = AppConfig::default();
        assert!(config.validate().is_err());

        let mut config = configured();
        config.llm.api_url = "  ".to_string();
        assert!(config.validate().is_err());

        assert!(configured().validate().is_ok());
    }

    #[test]
    fn test_config_validation() {
        let mut config = configured();
        config.server.port = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.server.max_frame_bytes = 0;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.llm.temperature = 3.5;
        assert!(config.validate().is_err());

        let mut config = configured();
        config.transcription.timeout_secs = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_transcription_key_falls_back_to_llm_key() {
        let mut config = configured();
        assert_eq!(config.transcription_api_key(), "gsk_test");

        config.transcription.api_key = "stt_key".to_string();
        assert_eq!(config.transcription_api_key(), "stt_key");
    }

    #[test]
    fn test_empty_ffmpeg_path_disables_transcoding() {
        let mut config = configured();
        assert_eq!(config.ffmpeg_path(), Some("ffmpeg"));

        config.audio.ffmpeg_path = String::new();
        assert_eq!(config.ffmpeg_path(), None);
    }
}
