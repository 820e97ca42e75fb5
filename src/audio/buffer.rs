//! # Session Buffer
//!
//! Accumulates the binary chunks of one recording into a single byte sequence.
//! Chunks are whatever the client's recorder emits (usually WebM fragments), so the
//! buffer does no validation of its own: decoding happens once, when the recording
//! is complete.
//!
//! ## Key Features:
//! - **Append-only** until drained
//! - **Atomic drain**: `drain_and_reset` hands back everything and leaves an empty buffer
//!   under one lock, so a chunk can never be split between two recordings
//! - **Bounded**: a configurable byte cap rejects chunks that would exceed it

use crate::audio::session::SessionError;
use std::sync::{Mutex, PoisonError};

/// Byte accumulator for one session.
#[derive(Debug)]
pub struct SessionBuffer {
    data: Mutex<Vec<u8>>,

    /// Maximum number of bytes the buffer may hold
    max_bytes: usize,
}

impl SessionBuffer {
    pub fn new(max_bytes: usize) -> Self {
        Self {
            data: Mutex::new(Vec::new()),
            max_bytes,
        }
    }

    /// Append a chunk.
    ///
    /// ## Returns:
    /// - **Ok(())**: the chunk was appended
    /// - **Err(SessionError::BufferFull)**: the chunk would exceed the cap; the buffer is
    ///   left unchanged
    pub fn append(&self, chunk: &[u8]) -> Result<(), SessionError> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);

        if data.len() + chunk.len() > self.max_bytes {
            return Err(SessionError::BufferFull {
                limit: self.max_bytes,
            });
        }

        data.extend_from_slice(chunk);
        Ok(())
    }

    /// Take the whole accumulated recording and reset to an empty buffer.
    pub fn drain_and_reset(&self) -> Vec<u8> {
        let mut data = self.data.lock().unwrap_or_else(PoisonError::into_inner);
        std::mem::take(&mut *data)
    }

    /// Number of bytes currently buffered.
    pub fn len(&self) -> usize {
        self.data.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn max_bytes(&self) -> usize {
        self.max_bytes
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_append_accumulates_in_order() {
        let buffer = SessionBuffer::new(1024);
        buffer.append(b"webm").unwrap();
        buffer.append(b"-chunk").unwrap();

        assert_eq!(buffer.len(), 10);
        assert_eq!(buffer.drain_and_reset(), b"webm-chunk".to_vec());
    }

    #[test]
    fn test_drain_then_append_starts_fresh() {
        let buffer = SessionBuffer::new(1024);
        buffer.append(&[1, 2, 3]).unwrap();

        assert_eq!(buffer.drain_and_reset(), vec![1, 2, 3]);
        assert!(buffer.is_empty());
        assert!(buffer.drain_and_reset().is_empty());

        buffer.append(&[9]).unwrap();
        assert_eq!(buffer.drain_and_reset(), vec![9]);
    }

    #[test]
    fn test_cap_rejects_oversized_chunk() {
        let buffer = SessionBuffer::new(4);
        buffer.append(&[0; 3]).unwrap();

        let err = buffer.append(&[0; 2]).unwrap_err();
        assert_eq!(err, SessionError::BufferFull { limit: 4 });
        assert_eq!(buffer.len(), 3);

        buffer.append(&[0]).unwrap();
        assert_eq!(buffer.len(), 4);
    }
}
