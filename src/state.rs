//! # Application State Management
//!
//! Shared state handed to every HTTP handler and WebSocket actor through
//! `web::Data<AppState>`.
//!
//! ## What lives here:
//! - **config**: the effective configuration, read-only after startup
//! - **sessions**: the live recording sessions, one per socket connection
//! - **pipeline**: the collaborators every run shares (normalizer, transcriber,
//!   analyzer, extractor)
//! - **metrics**: request counters written by `MetricsMiddleware` and pipeline counters
//!   written by the socket and upload handlers
//!
//! ### Arc<RwLock<T>> Pattern
//! Metrics are written on every request and read by the metrics endpoints, so they sit
//! behind an `RwLock`. Every lock is held only for a counter update or a snapshot copy,
//! never across an `.await`.

use crate::audio::processor::AudioProcessor;
use crate::audio::session::SessionManager;
use crate::config::AppConfig;
use crate::feedback::{ChatCompletionAnalyzer, HeuristicExtractor};
use crate::pipeline::Pipeline;
use crate::transcription::RemoteTranscriber;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use std::time::Instant;

/// The main application state that's shared across all handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,

    pub sessions: Arc<SessionManager>,

    pub pipeline: Pipeline,

    /// Counters, constantly updated by requests and pipeline runs
    pub metrics: Arc<RwLock<AppMetrics>>,

    /// When the server started
    pub start_time: Instant,
}

/// Metrics collected since server start.
///
/// ## Why these metrics matter:
/// - **request_count / error_count**: load and reliability of the HTTP surface
/// - **pipeline_runs / fallback_reports**: how often a recording got a real analysis
/// - **busy_rejections**: clients sending `video_complete` twice
/// - **endpoint_metrics**: per-endpoint latency
#[derive(Debug, Default, Clone)]
pub struct AppMetrics {
    pub request_count: u64,

    pub error_count: u64,

    /// Streaming runs plus one-shot uploads
    pub pipeline_runs: u64,

    /// Runs that answered with the fallback or failure report
    pub fallback_reports: u64,

    pub busy_rejections: u64,

    /// Key: endpoint name (e.g., "POST /process_video")
    pub endpoint_metrics: HashMap<String, EndpointMetric>,
}

/// Performance metrics for one endpoint.
///
/// ## Derived values:
/// - **Average response time**: total_duration_ms / request_count
/// - **Error rate**: error_count / request_count
#[derive(Debug, Default, Clone)]
pub struct EndpointMetric {
    pub request_count: u64,

    /// Total time spent processing all requests to this endpoint (milliseconds)
    pub total_duration_ms: u64,

    pub error_count: u64,
}

impl AppState {
    /// Assemble state around an already-built pipeline.
    pub fn new(config: AppConfig, pipeline: Pipeline) -> Self {
        let sessions = SessionManager::new(
            config.performance.max_concurrent_sessions,
            config.audio.max_buffer_bytes,
        );

        Self {
            config: Arc::new(config),
            sessions: Arc::new(sessions),
            pipeline,
            metrics: Arc::new(RwLock::new(AppMetrics::default())),
            start_time: Instant::now(),
        }
    }

    /// Build the production collaborators from configuration.
    ///
    /// ## Errors:
    /// Fails when an HTTP client cannot be constructed (e.g. TLS backend initialization).
    pub fn from_config(config: AppConfig) -> anyhow::Result<Self> {
        let normalizer = AudioProcessor::new(
            config.audio.sample_rate,
            config.ffmpeg_path().map(str::to_string),
        );
        let transcriber =
            RemoteTranscriber::new(&config.transcription, config.transcription_api_key())?;
        let analyzer = ChatCompletionAnalyzer::new(config.llm.clone())?;

        let pipeline = Pipeline::new(
            Arc::new(normalizer),
            Arc::new(transcriber),
            Arc::new(analyzer),
            Arc::new(HeuristicExtractor),
        );

        Ok(Self::new(config, pipeline))
    }

    pub fn get_config(&self) -> &AppConfig {
        &self.config
    }

    /// Increment the total request counter (called by middleware for every request).
    pub fn increment_request_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.request_count += 1;
    }

    /// Increment the total error counter (4xx and 5xx responses).
    pub fn increment_error_count(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.error_count += 1;
    }

    /// Record detailed metrics for a specific endpoint.
    ///
    /// ## Parameters:
    /// - **endpoint**: method and path (e.g., "GET /health")
    /// - **duration_ms**: how long the request took to process
    /// - **is_error**: whether this request resulted in an error
    pub fn record_endpoint_request(&self, endpoint: &str, duration_ms: u64, is_error: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);

        let endpoint_metric = metrics.endpoint_metrics.entry(endpoint.to_string()).or_default();
        endpoint_metric.request_count += 1;
        endpoint_metric.total_duration_ms += duration_ms;

        if is_error {
            endpoint_metric.error_count += 1;
        }
    }

    /// Count a finished pipeline run.
    pub fn record_pipeline_run(&self, used_fallback: bool) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.pipeline_runs += 1;
        if used_fallback {
            metrics.fallback_reports += 1;
        }
    }

    pub fn record_busy_rejection(&self) {
        let mut metrics = self.metrics.write().unwrap_or_else(PoisonError::into_inner);
        metrics.busy_rejections += 1;
    }

    /// Get a copy of current metrics, so no lock is held while serializing.
    pub fn get_metrics_snapshot(&self) -> AppMetrics {
        self.metrics.read().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn get_uptime_seconds(&self) -> u64 {
        self.start_time.elapsed().as_secs()
    }
}

impl EndpointMetric {
    pub fn average_duration_ms(&self) -> f64 {
        if self.request_count > 0 {
            self.total_duration_ms as f64 / self.request_count as f64
        } else {
            0.0
        }
    }

    /// Fraction of requests that failed, from 0.0 to 1.0.
    pub fn error_rate(&self) -> f64 {
        if self.request_count > 0 {
            self.error_count as f64 / self.request_count as f64
        } else {
            0.0
        }
    }
}

#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::error::PipelineError;
    use crate::pipeline::testing::pipeline;

    /// A configured state whose remote services are stubbed.
    pub fn app_state(
        transcript: Result<String, PipelineError>,
        analysis: Result<String, PipelineError>,
    ) -> AppState {
        let mut config = AppConfig::default();
        config.llm.api_key = "test-key".to_string();
        config.llm.api_url = "http://127.0.0.1:9/v1/chat/completions".to_string();
        AppState::new(config, pipeline(transcript, analysis))
    }
}
