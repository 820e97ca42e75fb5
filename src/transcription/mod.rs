//! # Transcription Module
//!
//! Speech-to-text is delegated to a hosted Whisper-compatible API. The `Transcriber`
//! trait is the seam: the pipeline only sees `NormalizedAudio` in and text out, and
//! tests substitute a stub.

pub mod engine;      // Remote transcription client

pub use engine::{RemoteTranscriber, Transcriber, TranscriptionResult};
