//! LLM-backed interview analysis over an OpenAI-compatible chat completions API.

use crate::config::LlmConfig;
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Instant;

const SYSTEM_PROMPT: &str = "You are an expert interview coach providing constructive feedback to help candidates improve their interview performance.";

/// Produces free-form analysis text for a transcript.
#[async_trait]
pub trait FeedbackAnalyzer: Send + Sync {
    async fn analyze(&self, transcription: &str) -> Result<String, PipelineError>;
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Serialize)]
struct Message {
    role: &'static str,
    content: String,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ResponseMessage,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: String,
}

/// Build the user message for a transcript.
pub fn build_prompt(transcription: &str) -> String {
    format!(
        "You are an expert interview coach and HR professional. Analyze this interview transcription and provide detailed feedback.

Interview Transcription:
\"{transcription}\"

Please provide:
1. Overall performance score (0-100)
2. Detailed feedback on communication skills, confidence, clarity, and professionalism
3. Specific areas for improvement (as a list)
4. Positive aspects of the performance

Format your response as constructive and encouraging feedback that will help the candidate improve."
    )
}

/// Chat completions client configured from `LlmConfig`.
pub struct ChatCompletionAnalyzer {
    client: reqwest::Client,
    config: LlmConfig,
}

impl ChatCompletionAnalyzer {
    pub fn new(config: LlmConfig) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout()).build()?;

        tracing::info!(
            model = %config.model,
            timeout_secs = config.timeout_secs,
            "Feedback analyzer initialized"
        );

        Ok(Self { client, config })
    }
}

#[async_trait]
impl FeedbackAnalyzer for ChatCompletionAnalyzer {
    async fn analyze(&self, transcription: &str) -> Result<String, PipelineError> {
        let start_time = Instant::now();

        let request = ChatRequest {
            model: &self.config.model,
            messages: vec![
                Message {
                    role: "system",
                    content: SYSTEM_PROMPT.to_string(),
                },
                Message {
                    role: "user",
                    content: build_prompt(transcription),
                },
            ],
            temperature: self.config.temperature,
            max_tokens: self.config.max_tokens,
        };

        let response = self
            .client
            .post(&self.config.api_url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::error!(%status, body = %body, "LLM API error");
            return Err(PipelineError::Service(format!("HTTP {}", status)));
        }

        let chat: ChatResponse = response
            .json()
            .await
            .map_err(|e| PipelineError::Service(format!("malformed LLM response: {}", e)))?;

        let content = chat
            .choices
            .into_iter()
            .next()
            .map(|choice| choice.message.content)
            .ok_or_else(|| PipelineError::Service("LLM response has no choices".to_string()))?;

        tracing::info!(
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            characters = content.len(),
            "Interview analysis received"
        );

        Ok(content)
    }
}
