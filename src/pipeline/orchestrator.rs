//! # Session Orchestrator
//!
//! Runs one recording through normalize → transcribe → analyze → extract and reports
//! progress through an `EventSink`.
//!
//! ## Failure Policy:
//! - **Empty recording**: status message plus the fallback report; the run ends `Done`
//! - **Decode / transcription failure**: the status message goes out in place of the
//!   transcript, then the fallback report; the run ends `Failed`
//! - **LLM failure**: the transcript was already sent, so only the report falls back;
//!   the run ends `Done`
//!
//! The client always receives exactly one `ai_feedback` per run. Errors are matched
//! here and nowhere else, so no stage error ever reaches the client raw.

use crate::audio::processor::{AudioNormalizer, ContainerFormat};
use crate::audio::session::{AudioSession, SessionStage};
use crate::error::PipelineError;
use crate::feedback::{FeedbackAnalyzer, FeedbackExtractor, FeedbackReport};
use crate::pipeline::events::{step, AiFeedback, EventSink, ServerEvent};
use crate::transcription::{Transcriber, TranscriptionResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Instant;

pub const UPLOAD_SUCCESS_MESSAGE: &str = "Video processed successfully!";

/// How a streaming run ended.
#[derive(Debug, Clone, PartialEq)]
pub struct RunOutcome {
    /// Terminal stage recorded on the session
    pub stage: SessionStage,

    /// Whether the client got the fallback report instead of a real analysis
    pub used_fallback: bool,

    pub error: Option<PipelineError>,
}

/// How a one-shot upload ended.
#[derive(Debug, Clone, PartialEq)]
pub struct UploadOutcome {
    pub response: ProcessVideoResponse,

    /// Whether the response carries a fallback report, including a processed upload
    /// whose analysis failed
    pub used_fallback: bool,
}

/// Response body of `POST /process_video`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum ProcessVideoResponse {
    Processed {
        message: String,
        transcription: String,
        feedback: String,
        score: u8,
        improvements: Vec<String>,
    },
    Failed {
        error: String,
        feedback: String,
        score: u8,
        improvements: Vec<String>,
    },
}

impl ProcessVideoResponse {
    fn processed(transcription: String, report: FeedbackReport) -> Self {
        let (feedback, score, improvements) = report.into_parts();
        ProcessVideoResponse::Processed {
            message: UPLOAD_SUCCESS_MESSAGE.to_string(),
            transcription,
            feedback,
            score,
            improvements,
        }
    }

    /// The payload could not be decoded or transcribed.
    pub fn processing_failed() -> Self {
        ProcessVideoResponse::Failed {
            error: "Failed to process video".to_string(),
            feedback: "Unable to process the video file. Please try again with a different format."
                .to_string(),
            score: 0,
            improvements: vec![
                "Try recording in a different format".to_string(),
                "Ensure good audio quality".to_string(),
            ],
        }
    }

    /// The request itself could not be read.
    pub fn invalid_request() -> Self {
        ProcessVideoResponse::Failed {
            error: "Invalid request".to_string(),
            feedback: "There was an error processing your request.".to_string(),
            score: 0,
            improvements: Vec::new(),
        }
    }
}

/// The four collaborators of a run. Cheap to clone; shared by every connection.
#[derive(Clone)]
pub struct Pipeline {
    normalizer: Arc<dyn AudioNormalizer>,
    transcriber: Arc<dyn Transcriber>,
    analyzer: Arc<dyn FeedbackAnalyzer>,
    extractor: Arc<dyn FeedbackExtractor>,
}

impl Pipeline {
    pub fn new(
        normalizer: Arc<dyn AudioNormalizer>,
        transcriber: Arc<dyn Transcriber>,
        analyzer: Arc<dyn FeedbackAnalyzer>,
        extractor: Arc<dyn FeedbackExtractor>,
    ) -> Self {
        Self {
            normalizer,
            transcriber,
            analyzer,
            extractor,
        }
    }

    /// Process one drained recording for a streaming session.
    ///
    /// ## Parameters:
    /// - **session**: already claimed through `AudioSession::begin_run`
    /// - **input**: the drained recording
    /// - **format**: container declared by the client
    /// - **sink**: receives every progress and result event
    ///
    /// ## Returns:
    /// The terminal stage, which is also recorded on the session.
    pub async fn run(
        &self,
        session: &AudioSession,
        input: Vec<u8>,
        format: ContainerFormat,
        sink: &dyn EventSink,
    ) -> RunOutcome {
        let start_time = Instant::now();
        let session_id = session.session_id.as_str();

        sink.emit(ServerEvent::step(step::CONVERTING));

        if input.is_empty() {
            return self.fall_back(session, sink, PipelineError::EmptyInput, SessionStage::Done);
        }

        tracing::info!(session_id, bytes = input.len(), %format, "Processing recording");

        let transcript = match self.transcribe(session, &input, format, sink).await {
            Ok(result) => result.text,
            Err(err) => return self.fall_back(session, sink, err, SessionStage::Failed),
        };
        sink.emit(ServerEvent::transcription(transcript.clone()));

        session.set_stage(SessionStage::Analyzing);
        sink.emit(ServerEvent::step(step::ANALYZING));
        let analysis = self.analyzer.analyze(&transcript).await;

        sink.emit(ServerEvent::step(step::GENERATING_FEEDBACK));
        let (payload, error) = match analysis {
            Ok(raw) => (
                AiFeedback {
                    report: self.extractor.extract(&raw),
                    transcription: Some(transcript),
                },
                None,
            ),
            Err(err) => {
                tracing::error!(session_id, error = %err, "Feedback analysis failed, using fallback");
                (AiFeedback::fallback(), Some(err))
            }
        };

        tracing::info!(
            session_id,
            score = payload.report.score(),
            improvements = payload.report.improvements().len(),
            fallback = error.is_some(),
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Recording processed"
        );

        sink.emit(ServerEvent::AiFeedback(payload));
        session.finish_run(SessionStage::Done);

        RunOutcome {
            stage: SessionStage::Done,
            used_fallback: error.is_some(),
            error,
        }
    }

    /// Run the whole pipeline for a single uploaded file.
    ///
    /// An LLM failure still counts as processed and carries the fallback report;
    /// decode and transcription failures answer with score 0 and an `error` field.
    pub async fn process_upload(&self, input: &[u8], format: ContainerFormat) -> UploadOutcome {
        let transcript = match self.normalize_and_transcribe(input, format).await {
            Ok(result) => result.text,
            Err(err) => {
                tracing::warn!(bytes = input.len(), error = %err, "Upload could not be processed");
                return UploadOutcome {
                    response: ProcessVideoResponse::processing_failed(),
                    used_fallback: true,
                };
            }
        };

        let (report, used_fallback) = match self.analyzer.analyze(&transcript).await {
            Ok(raw) => (self.extractor.extract(&raw), false),
            Err(err) => {
                tracing::error!(error = %err, "Feedback analysis failed, using fallback");
                (FeedbackReport::fallback(), true)
            }
        };

        tracing::info!(
            bytes = input.len(),
            score = report.score(),
            feedback_chars = report.feedback().len(),
            fallback = used_fallback,
            "Upload processed"
        );

        UploadOutcome {
            response: ProcessVideoResponse::processed(transcript, report),
            used_fallback,
        }
    }

    async fn transcribe(
        &self,
        session: &AudioSession,
        input: &[u8],
        format: ContainerFormat,
        sink: &dyn EventSink,
    ) -> Result<TranscriptionResult, PipelineError> {
        let audio = self.normalizer.normalize(input, format).await?;

        session.set_stage(SessionStage::Transcribing);
        sink.emit(ServerEvent::step(step::TRANSCRIBING));
        self.transcriber.transcribe(&audio).await
    }

    async fn normalize_and_transcribe(
        &self,
        input: &[u8],
        format: ContainerFormat,
    ) -> Result<TranscriptionResult, PipelineError> {
        let audio = self.normalizer.normalize(input, format).await?;
        self.transcriber.transcribe(&audio).await
    }

    fn fall_back(
        &self,
        session: &AudioSession,
        sink: &dyn EventSink,
        reason: PipelineError,
        stage: SessionStage,
    ) -> RunOutcome {
        if reason.is_soft() {
            tracing::info!(session_id = %session.session_id, "Recording completed with no audio");
        } else {
            tracing::warn!(
                session_id = %session.session_id,
                error = %reason,
                "Recording could not be transcribed, sending fallback"
            );
        }

        sink.emit(ServerEvent::transcription(reason.status_message()));
        sink.emit(ServerEvent::AiFeedback(AiFeedback::fallback()));
        session.finish_run(stage);

        RunOutcome {
            stage,
            used_fallback: true,
            error: Some(reason),
        }
    }
}

/// In-process stand-ins for the external collaborators.
#[cfg(test)]
pub mod testing {
    use super::*;
    use crate::audio::processor::{AudioProcessor, NormalizedAudio};
    use crate::feedback::HeuristicExtractor;
    use async_trait::async_trait;
    use std::sync::Mutex;

    /// Returns a fixed transcript or error.
    pub struct StubTranscriber(pub Result<String, PipelineError>);

    #[async_trait]
    impl Transcriber for StubTranscriber {
        async fn transcribe(&self, audio: &NormalizedAudio) -> Result<TranscriptionResult, PipelineError> {
            self.0.clone().map(|text| TranscriptionResult {
                text,
                audio_duration: audio.duration_secs,
                processing_time_ms: 0,
                model_name: "stub".to_string(),
            })
        }
    }

    /// Returns fixed analysis text or error.
    pub struct StubAnalyzer(pub Result<String, PipelineError>);

    #[async_trait]
    impl FeedbackAnalyzer for StubAnalyzer {
        async fn analyze(&self, _transcription: &str) -> Result<String, PipelineError> {
            self.0.clone()
        }
    }

    /// Records every emitted event.
    #[derive(Default)]
    pub struct RecordingSink(pub Mutex<Vec<ServerEvent>>);

    impl RecordingSink {
        pub fn events(&self) -> Vec<ServerEvent> {
            self.0.lock().unwrap().clone()
        }
    }

    impl EventSink for RecordingSink {
        fn emit(&self, event: ServerEvent) {
            self.0.lock().unwrap().push(event);
        }
    }

    /// Real normalizer (no ffmpeg) with stubbed remote services.
    pub fn pipeline(
        transcript: Result<String, PipelineError>,
        analysis: Result<String, PipelineError>,
    ) -> Pipeline {
        Pipeline::new(
            Arc::new(AudioProcessor::new(16_000, None)),
            Arc::new(StubTranscriber(transcript)),
            Arc::new(StubAnalyzer(analysis)),
            Arc::new(HeuristicExtractor),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::testing::*;
    use super::*;
    use crate::audio::processor::tests::stereo_tone_wav;

    fn session_with(bytes: &[u8]) -> (AudioSession, Vec<u8>) {
        let session = AudioSession::new("test-session".to_string(), 10 * 1024 * 1024);
        session.append_chunk(bytes).unwrap();
        let input = session.begin_run().unwrap();
        (session, input)
    }

    #[tokio::test]
    async fn test_llm_failure_sends_transcript_then_fallback() {
        let pipeline = pipeline(
            Ok("I am a hard worker".to_string()),
            Err(PipelineError::Service("HTTP 500".to_string())),
        );
        let (session, input) = session_with(&stereo_tone_wav(0.3));
        let sink = RecordingSink::default();

        let outcome = pipeline.run(&session, input, ContainerFormat::Wav, &sink).await;

        assert_eq!(
            sink.events(),
            vec![
                ServerEvent::step(1),
                ServerEvent::step(2),
                ServerEvent::transcription("I am a hard worker"),
                ServerEvent::step(3),
                ServerEvent::step(4),
                ServerEvent::AiFeedback(AiFeedback::fallback()),
            ]
        );
        assert_eq!(outcome.stage, SessionStage::Done);
        assert!(outcome.used_fallback);
        assert_eq!(session.stage(), SessionStage::Done);
    }

    #[tokio::test]
    async fn test_successful_run_reports_extracted_feedback() {
        let analysis = "Score: 88/100\nAreas for improvement:\n- Use the STAR method\n- Slow down";
        let pipeline = pipeline(Ok("I led the migration".to_string()), Ok(analysis.to_string()));
        let (session, input) = session_with(&stereo_tone_wav(0.3));
        let sink = RecordingSink::default();

        let outcome = pipeline.run(&session, input, ContainerFormat::Auto, &sink).await;

        let events = sink.events();
        match events.last() {
            Some(ServerEvent::AiFeedback(payload)) => {
                assert_eq!(payload.report.score(), 88);
                assert_eq!(payload.report.improvements(), ["Use the STAR method", "Slow down"]);
                assert_eq!(payload.transcription.as_deref(), Some("I led the migration"));
            }
            other => panic!("expected ai_feedback, got {:?}", other),
        }
        assert!(!outcome.used_fallback);
        assert_eq!(outcome.error, None);
    }

    #[tokio::test]
    async fn test_empty_recording_skips_decoding() {
        let pipeline = pipeline(Ok("unused".to_string()), Ok("unused".to_string()));
        let session = AudioSession::new("empty".to_string(), 1024);
        let input = session.begin_run().unwrap();
        let sink = RecordingSink::default();

        let outcome = pipeline.run(&session, input, ContainerFormat::Webm, &sink).await;

        assert_eq!(
            sink.events(),
            vec![
                ServerEvent::step(1),
                ServerEvent::transcription(PipelineError::EmptyInput.status_message()),
                ServerEvent::AiFeedback(AiFeedback::fallback()),
            ]
        );
        assert_eq!(outcome.stage, SessionStage::Done);
        assert_eq!(outcome.error, Some(PipelineError::EmptyInput));
    }

    #[tokio::test]
    async fn test_corrupt_recording_falls_back() {
        let pipeline = pipeline(Ok("unused".to_string()), Ok("unused".to_string()));
        let (session, input) = session_with(b"RIFF\x10\x00\x00\x00WAVEfmt truncated");
        let sink = RecordingSink::default();

        let outcome = pipeline.run(&session, input, ContainerFormat::Wav, &sink).await;

        let events = sink.events();
        assert_eq!(events.len(), 3);
        match &events[1] {
            ServerEvent::Transcription { text } => assert!(text.starts_with("Processing error:")),
            other => panic!("expected status message, got {:?}", other),
        }
        assert_eq!(events[2], ServerEvent::AiFeedback(AiFeedback::fallback()));
        assert_eq!(outcome.stage, SessionStage::Failed);
        assert!(matches!(outcome.error, Some(PipelineError::Decode(_))));
        assert!(!session.stage().is_running());
    }

    #[tokio::test]
    async fn test_unintelligible_audio_status_message() {
        let pipeline = pipeline(Err(PipelineError::UnintelligibleAudio), Ok("unused".to_string()));
        let (session, input) = session_with(&stereo_tone_wav(0.2));
        let sink = RecordingSink::default();

        pipeline.run(&session, input, ContainerFormat::Wav, &sink).await;

        let events = sink.events();
        assert!(events.contains(&ServerEvent::transcription(
            "Could not understand the audio clearly. Please try speaking more clearly."
        )));
        assert_eq!(events.last(), Some(&ServerEvent::AiFeedback(AiFeedback::fallback())));
        assert_eq!(session.stage(), SessionStage::Failed);
    }

    #[tokio::test]
    async fn test_upload_success_and_failures() {
        let pipeline = pipeline(
            Ok("I am a hard worker".to_string()),
            Err(PipelineError::Service("timeout".to_string())),
        );

        let outcome = pipeline.process_upload(&stereo_tone_wav(0.2), ContainerFormat::Auto).await;
        assert!(outcome.used_fallback);
        match outcome.response {
            ProcessVideoResponse::Processed { message, transcription, score, .. } => {
                assert_eq!(message, UPLOAD_SUCCESS_MESSAGE);
                assert_eq!(transcription, "I am a hard worker");
                assert_eq!(score, 75);
            }
            other => panic!("expected processed response, got {:?}", other),
        }

        let empty = pipeline.process_upload(&[], ContainerFormat::Webm).await;
        assert!(empty.used_fallback);
        assert_eq!(empty.response, ProcessVideoResponse::processing_failed());

        let value = serde_json::to_value(&empty.response).unwrap();
        assert_eq!(value["error"], "Failed to process video");
        assert_eq!(value["score"], 0);
    }

    #[tokio::test]
    async fn test_analyzed_upload_is_not_a_fallback() {
        let pipeline = pipeline(Ok("I led the team".to_string()), Ok("Score: 64".to_string()));

        let outcome = pipeline.process_upload(&stereo_tone_wav(0.2), ContainerFormat::Wav).await;

        assert!(!outcome.used_fallback);
        assert!(matches!(outcome.response, ProcessVideoResponse::Processed { score: 64, .. }));
    }
}
