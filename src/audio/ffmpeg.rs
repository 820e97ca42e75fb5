//! ffmpeg transcoding for containers and codecs symphonia cannot decode.
//!
//! Browser recorders emit WebM/Opus, which is the common case here. The payload is
//! piped to ffmpeg's stdin and raw signed 16-bit little-endian mono PCM is read back.

use crate::audio::processor::ContainerFormat;
use crate::error::PipelineError;
use byteorder::{ByteOrder, LittleEndian};
use std::process::Stdio;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::Command;

/// Transcode `input` to mono PCM at `sample_rate`.
///
/// ## Returns:
/// - **Ok(samples)**: decoded mono samples
/// - **Err(PipelineError::Decode)**: ffmpeg is missing, rejected the input, or produced
///   no audio
pub async fn transcode_to_pcm(
    ffmpeg_path: &str,
    input: &[u8],
    format: ContainerFormat,
    sample_rate: u32,
) -> Result<Vec<i16>, PipelineError> {
    let mut command = Command::new(ffmpeg_path);
    command.args(["-hide_banner", "-loglevel", "error"]);
    if let Some(demuxer) = format.ffmpeg_demuxer() {
        command.args(["-f", demuxer]);
    }
    command
        .args(["-i", "pipe:0", "-vn", "-ac", "1", "-ar"])
        .arg(sample_rate.to_string())
        .args(["-f", "s16le", "pipe:1"])
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command
        .spawn()
        .map_err(|e| PipelineError::Decode(format!("failed to start ffmpeg: {}", e)))?;

    let mut stdin = child
        .stdin
        .take()
        .ok_or_else(|| PipelineError::Decode("ffmpeg stdin unavailable".to_string()))?;
    let payload = input.to_vec();

    // ffmpeg stops reading once its output pipe fills, so feed it concurrently
    let writer = tokio::spawn(async move {
        let result = stdin.write_all(&payload).await;
        drop(stdin);
        result
    });

    let mut stdout = child
        .stdout
        .take()
        .ok_or_else(|| PipelineError::Decode("ffmpeg stdout unavailable".to_string()))?;
    let mut raw = Vec::new();
    stdout
        .read_to_end(&mut raw)
        .await
        .map_err(|e| PipelineError::Decode(format!("failed to read ffmpeg output: {}", e)))?;

    let mut stderr = String::new();
    if let Some(mut pipe) = child.stderr.take() {
        let _ = pipe.read_to_string(&mut stderr).await;
    }

    let status = child
        .wait()
        .await
        .map_err(|e| PipelineError::Decode(format!("ffmpeg did not exit cleanly: {}", e)))?;

    match writer.await {
        Ok(Ok(())) => {}
        // A broken pipe means ffmpeg quit early; its exit status says why
        Ok(Err(e)) => tracing::debug!(error = %e, "ffmpeg closed stdin early"),
        Err(e) => tracing::warn!(error = %e, "ffmpeg stdin writer task failed"),
    }

    if !status.success() {
        let reason = stderr.lines().last().unwrap_or("unknown error").trim().to_string();
        return Err(PipelineError::Decode(format!("ffmpeg failed: {}", reason)));
    }

    let samples = decode_s16le(&raw);
    if samples.is_empty() {
        return Err(PipelineError::Decode("ffmpeg produced no audio".to_string()));
    }

    Ok(samples)
}

/// Read little-endian 16-bit samples; a trailing odd byte is ignored.
fn decode_s16le(raw: &[u8]) -> Vec<i16> {
    raw.chunks_exact(2).map(LittleEndian::read_i16).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_s16le() {
        let raw = [0x00, 0x00, 0xff, 0x7f, 0x00, 0x80, 0x01];
        assert_eq!(decode_s16le(&raw), vec![0, i16::MAX, i16::MIN]);
    }

    #[tokio::test]
    async fn test_missing_binary_is_decode_error() {
        let err = transcode_to_pcm(
            "/nonexistent/ffmpeg-binary",
            b"not audio",
            ContainerFormat::Webm,
            16_000,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Decode(msg) if msg.contains("failed to start ffmpeg")));
    }
}
