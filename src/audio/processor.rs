//! # Audio Normalization
//!
//! Turns whatever the client recorded into the one format the transcription service
//! is given: a 16-bit mono PCM WAV at the configured sample rate (16 kHz by default).
//!
//! ## Processing Steps:
//! 1. **Decode**: symphonia probes the bytes (the declared container is only a hint)
//!    and decodes every packet of the first audio track to interleaved `f32`
//! 2. **Transcode fallback**: codecs symphonia lacks (Opus inside browser WebM) are
//!    piped through ffmpeg when it is configured, see `audio::ffmpeg`
//! 3. **Downmix**: average all channels into mono
//! 4. **Resample**: linear interpolation to the target rate
//! 5. **Encode**: hound writes the WAV container in memory
//!
//! Decoding is CPU-bound, so it runs on tokio's blocking pool.

use crate::audio::ffmpeg;
use crate::error::PipelineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::io::Cursor;
use std::str::FromStr;
use symphonia::core::audio::SampleBuffer;
use symphonia::core::codecs::{DecoderOptions, CODEC_TYPE_NULL};
use symphonia::core::errors::Error as SymphoniaError;
use symphonia::core::formats::FormatOptions;
use symphonia::core::io::MediaSourceStream;
use symphonia::core::meta::MetadataOptions;
use symphonia::core::probe::Hint;

/// Container format declared by the client.
///
/// `Auto` gives the decoder no hint and relies on content sniffing alone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContainerFormat {
    #[default]
    Webm,
    Ogg,
    Wav,
    Mp3,
    Mp4,
    Flac,
    Auto,
}

impl ContainerFormat {
    /// File extension used as a probe hint.
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            ContainerFormat::Webm => Some("webm"),
            ContainerFormat::Ogg => Some("ogg"),
            ContainerFormat::Wav => Some("wav"),
            ContainerFormat::Mp3 => Some("mp3"),
            ContainerFormat::Mp4 => Some("mp4"),
            ContainerFormat::Flac => Some("flac"),
            ContainerFormat::Auto => None,
        }
    }

    /// Demuxer name understood by `ffmpeg -f`.
    pub fn ffmpeg_demuxer(&self) -> Option<&'static str> {
        match self {
            ContainerFormat::Webm => Some("webm"),
            ContainerFormat::Ogg => Some("ogg"),
            ContainerFormat::Wav => Some("wav"),
            ContainerFormat::Mp3 => Some("mp3"),
            ContainerFormat::Mp4 => Some("mp4"),
            ContainerFormat::Flac => Some("flac"),
            ContainerFormat::Auto => None,
        }
    }
}

impl fmt::Display for ContainerFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.extension().unwrap_or("auto"))
    }
}

impl FromStr for ContainerFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "webm" | "mkv" | "matroska" => Ok(ContainerFormat::Webm),
            "ogg" | "oga" | "opus" => Ok(ContainerFormat::Ogg),
            "wav" | "wave" => Ok(ContainerFormat::Wav),
            "mp3" => Ok(ContainerFormat::Mp3),
            "mp4" | "m4a" | "aac" => Ok(ContainerFormat::Mp4),
            "flac" => Ok(ContainerFormat::Flac),
            "auto" | "" => Ok(ContainerFormat::Auto),
            other => Err(format!("Unknown container format: {}", other)),
        }
    }
}

/// Canonical audio handed to the transcriber.
#[derive(Debug, Clone)]
pub struct NormalizedAudio {
    /// Complete WAV file (RIFF header included)
    pub wav: Vec<u8>,
    pub sample_rate: u32,
    pub duration_secs: f64,
}

/// Converts a recorded payload into canonical PCM WAV.
#[async_trait]
pub trait AudioNormalizer: Send + Sync {
    async fn normalize(
        &self,
        raw: &[u8],
        format: ContainerFormat,
    ) -> Result<NormalizedAudio, PipelineError>;
}

/// Decoded but not yet normalized audio.
#[derive(Debug)]
struct DecodedPcm {
    samples: Vec<f32>,
    sample_rate: u32,
    channels: usize,
}

/// Why the built-in decoder gave up. `Unsupported` is worth retrying with ffmpeg;
/// `Invalid` means the bytes themselves are broken.
#[derive(Debug)]
enum DecodeFailure {
    Unsupported(String),
    Invalid(String),
}

impl From<SymphoniaError> for DecodeFailure {
    fn from(err: SymphoniaError) -> Self {
        match err {
            SymphoniaError::Unsupported(what) => DecodeFailure::Unsupported(what.to_string()),
            other => DecodeFailure::Invalid(other.to_string()),
        }
    }
}

impl fmt::Display for DecodeFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DecodeFailure::Unsupported(what) => write!(f, "unsupported audio: {}", what),
            DecodeFailure::Invalid(why) => write!(f, "{}", why),
        }
    }
}

/// Default normalizer: symphonia decoding with an optional ffmpeg fallback.
pub struct AudioProcessor {
    target_sample_rate: u32,
    ffmpeg_path: Option<String>,
}

impl AudioProcessor {
    /// ## Parameters:
    /// - **target_sample_rate**: rate of the produced WAV
    /// - **ffmpeg_path**: transcoder binary; `None` disables the fallback
    pub fn new(target_sample_rate: u32, ffmpeg_path: Option<String>) -> Self {
        Self {
            target_sample_rate,
            ffmpeg_path,
        }
    }

    async fn decode(&self, raw: &[u8], format: ContainerFormat) -> Result<DecodedPcm, PipelineError> {
        let data = raw.to_vec();
        let decoded = tokio::task::spawn_blocking(move || decode_with_symphonia(data, format))
            .await
            .map_err(|e| PipelineError::Decode(format!("decoder task failed: {}", e)))?;

        match decoded {
            Ok(pcm) => Ok(pcm),
            Err(DecodeFailure::Unsupported(reason)) => match &self.ffmpeg_path {
                Some(path) => {
                    tracing::debug!(
                        format = %format,
                        reason = %reason,
                        "Built-in decoder cannot handle payload, transcoding with ffmpeg"
                    );
                    let samples =
                        ffmpeg::transcode_to_pcm(path, raw, format, self.target_sample_rate).await?;
                    Ok(DecodedPcm {
                        samples: pcm_to_float(&samples),
                        sample_rate: self.target_sample_rate,
                        channels: 1,
                    })
                }
                None => Err(PipelineError::Decode(format!("unsupported audio: {}", reason))),
            },
            Err(failure) => Err(PipelineError::Decode(failure.to_string())),
        }
    }
}

#[async_trait]
impl AudioNormalizer for AudioProcessor {
    async fn normalize(
        &self,
        raw: &[u8],
        format: ContainerFormat,
    ) -> Result<NormalizedAudio, PipelineError> {
        if raw.is_empty() {
            return Err(PipelineError::Decode("audio payload is empty".to_string()));
        }

        let decoded = self.decode(raw, format).await?;
        let mono = downmix_to_mono(&decoded.samples, decoded.channels);
        let resampled = resample_linear(&mono, decoded.sample_rate, self.target_sample_rate);

        if resampled.is_empty() {
            return Err(PipelineError::Decode("no decodable audio frames".to_string()));
        }

        let wav = encode_wav(&float_to_pcm(&resampled), self.target_sample_rate)?;
        let duration_secs = resampled.len() as f64 / self.target_sample_rate as f64;

        tracing::debug!(
            input_bytes = raw.len(),
            source_rate = decoded.sample_rate,
            source_channels = decoded.channels,
            duration_secs,
            "Audio normalized to PCM WAV"
        );

        Ok(NormalizedAudio {
            wav,
            sample_rate: self.target_sample_rate,
            duration_secs,
        })
    }
}

/// Decode every packet of the first audio track to interleaved `f32` samples.
fn decode_with_symphonia(data: Vec<u8>, format: ContainerFormat) -> Result<DecodedPcm, DecodeFailure> {
    let source = MediaSourceStream::new(Box::new(Cursor::new(data)), Default::default());

    let mut hint = Hint::new();
    if let Some(extension) = format.extension() {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe().format(
        &hint,
        source,
        &FormatOptions::default(),
        &MetadataOptions::default(),
    )?;
    let mut reader = probed.format;

    let track = reader
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL)
        .ok_or_else(|| DecodeFailure::Invalid("no audio track found".to_string()))?;
    let track_id = track.id;
    let params = track.codec_params.clone();

    let mut decoder = symphonia::default::get_codecs().make(&params, &DecoderOptions::default())?;

    let mut sample_rate = params.sample_rate;
    let mut channels = params.channels.map(|c| c.count());
    let mut samples = Vec::new();

    loop {
        let packet = match reader.next_packet() {
            Ok(packet) => packet,
            // End of stream (or a truncated tail): keep what decoded so far
            Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
            Err(SymphoniaError::ResetRequired) => break,
            Err(e) => return Err(e.into()),
        };

        if packet.track_id() != track_id {
            continue;
        }

        match decoder.decode(&packet) {
            Ok(buffer) => {
                let spec = *buffer.spec();
                sample_rate.get_or_insert(spec.rate);
                channels.get_or_insert(spec.channels.count());

                let mut interleaved = SampleBuffer::<f32>::new(buffer.capacity() as u64, spec);
                interleaved.copy_interleaved_ref(buffer);
                samples.extend_from_slice(interleaved.samples());
            }
            Err(SymphoniaError::DecodeError(reason)) => {
                tracing::debug!(reason, "Skipping undecodable packet");
            }
            Err(e) => return Err(e.into()),
        }
    }

    if samples.is_empty() {
        return Err(DecodeFailure::Invalid("no decodable audio frames".to_string()));
    }

    let sample_rate = sample_rate
        .filter(|rate| *rate > 0)
        .ok_or_else(|| DecodeFailure::Invalid("stream has no sample rate".to_string()))?;

    Ok(DecodedPcm {
        samples,
        sample_rate,
        channels: channels.unwrap_or(1).max(1),
    })
}

/// Average interleaved frames into mono.
pub fn downmix_to_mono(samples: &[f32], channels: usize) -> Vec<f32> {
    match channels {
        0 => Vec::new(),
        1 => samples.to_vec(),
        n => samples
            .chunks_exact(n)
            .map(|frame| frame.iter().sum::<f32>() / n as f32)
            .collect(),
    }
}

/// Resample mono audio with linear interpolation.
///
/// The output length is `ceil(len * target / source)`; equal rates return a copy.
pub fn resample_linear(samples: &[f32], source_rate: u32, target_rate: u32) -> Vec<f32> {
    if source_rate == target_rate || samples.is_empty() || source_rate == 0 {
        return samples.to_vec();
    }

    let ratio = target_rate as f64 / source_rate as f64;
    let output_len = (samples.len() as f64 * ratio).ceil() as usize;

    (0..output_len)
        .map(|i| {
            let position = i as f64 / ratio;
            let index = position as usize;
            let frac = (position - index as f64) as f32;

            match (samples.get(index), samples.get(index + 1)) {
                (Some(a), Some(b)) => a * (1.0 - frac) + b * frac,
                (Some(a), None) => *a,
                _ => 0.0,
            }
        })
        .collect()
}

/// Scale 16-bit samples to `[-1.0, 1.0]`.
pub fn pcm_to_float(samples: &[i16]) -> Vec<f32> {
    samples.iter().map(|&sample| sample as f32 / 32768.0).collect()
}

/// Scale `[-1.0, 1.0]` samples back to 16-bit, clamping out-of-range values.
pub fn float_to_pcm(samples: &[f32]) -> Vec<i16> {
    samples
        .iter()
        .map(|&sample| (sample * 32768.0).clamp(-32768.0, 32767.0) as i16)
        .collect()
}

/// Write a mono 16-bit PCM WAV into memory.
pub fn encode_wav(samples: &[i16], sample_rate: u32) -> Result<Vec<u8>, PipelineError> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = Cursor::new(Vec::new());
    {
        let mut writer = hound::WavWriter::new(&mut cursor, spec)?;
        for &sample in samples {
            writer.write_sample(sample)?;
        }
        writer.finalize()?;
    }

    Ok(cursor.into_inner())
}
