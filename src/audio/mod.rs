//! # Audio Module
//!
//! Everything between raw recorder bytes and the canonical WAV handed to the
//! transcriber.
//!
//! ## Key Components:
//! - **Session Buffer**: accumulates streamed chunks of one recording
//! - **Session Manager**: tracks live sessions and their pipeline stage
//! - **Audio Processor**: decodes any supported container to 16 kHz mono 16-bit WAV
//! - **ffmpeg**: transcoding fallback for codecs the built-in decoder lacks
//!
//! ## Output Format:
//! - **Sample Rate**: 16kHz by default (`audio.sample_rate`)
//! - **Bit Depth**: 16-bit PCM
//! - **Channels**: Mono

pub mod buffer;       // Per-session chunk accumulator
pub mod ffmpeg;       // External transcoder fallback
pub mod processor;    // Decode, downmix, resample, encode
pub mod session;      // Session state management
