//! # Audio Session Management
//!
//! Each WebSocket connection owns one `AudioSession`: a chunk buffer, the current
//! pipeline stage, and a few counters. The `SessionManager` maps session identifiers
//! to sessions so nothing is global and sessions never share mutable state.
//!
//! ## Session Lifecycle:
//! 1. **Idle**: created on connect, nothing received yet
//! 2. **Receiving**: chunks are arriving
//! 3. **Converting / Transcribing / Analyzing**: a pipeline run is in flight
//! 4. **Done / Failed**: the last run finished; the next chunk starts a new recording
//!
//! Only one run may be in flight per session. `begin_run` checks and claims the
//! session under a single lock, so a second completion signal is rejected with
//! `SessionError::Busy` instead of racing the first.

use crate::audio::buffer::SessionBuffer;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use thiserror::Error;
use uuid::Uuid;

/// Pipeline stage of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStage {
    Idle,
    Receiving,
    Converting,
    Transcribing,
    Analyzing,
    Done,
    Failed,
}

impl SessionStage {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStage::Idle => "idle",
            SessionStage::Receiving => "receiving",
            SessionStage::Converting => "converting",
            SessionStage::Transcribing => "transcribing",
            SessionStage::Analyzing => "analyzing",
            SessionStage::Done => "done",
            SessionStage::Failed => "failed",
        }
    }

    /// Whether a pipeline run currently owns the session.
    pub fn is_running(&self) -> bool {
        matches!(
            self,
            SessionStage::Converting | SessionStage::Transcribing | SessionStage::Analyzing
        )
    }
}

/// Session-level failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error("a recording is already being processed for this session")]
    Busy,

    #[error("maximum concurrent sessions ({0}) reached")]
    LimitReached(usize),

    #[error("recording exceeds the {limit} byte limit")]
    BufferFull { limit: usize },
}

#[derive(Debug, Default)]
struct SessionCounters {
    bytes_received: usize,
    chunks_received: u64,
    completed_runs: u64,
}

/// One client's recording session.
#[derive(Debug)]
pub struct AudioSession {
    pub session_id: String,

    /// Accumulated chunks of the current recording
    pub buffer: SessionBuffer,

    pub created_at: DateTime<Utc>,

    stage: Mutex<SessionStage>,

    counters: Mutex<SessionCounters>,
}

impl AudioSession {
    pub fn new(session_id: String, max_buffer_bytes: usize) -> Self {
        Self {
            session_id,
            buffer: SessionBuffer::new(max_buffer_bytes),
            created_at: Utc::now(),
            stage: Mutex::new(SessionStage::Idle),
            counters: Mutex::new(SessionCounters::default()),
        }
    }

    pub fn stage(&self) -> SessionStage {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Move the session to a new stage. Used by the orchestrator as the run progresses.
    pub fn set_stage(&self, stage: SessionStage) {
        *self.stage.lock().unwrap_or_else(PoisonError::into_inner) = stage;
    }

    /// Append a chunk of the current recording.
    ///
    /// ## State Transition:
    /// Idle/Done/Failed → Receiving. A chunk arriving while a run is in flight belongs
    /// to the next recording: it is buffered and the stage is left alone.
    pub fn append_chunk(&self, chunk: &[u8]) -> Result<(), SessionError> {
        self.buffer.append(chunk)?;

        {
            let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
            if !stage.is_running() {
                *stage = SessionStage::Receiving;
            }
        }

        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.bytes_received += chunk.len();
        counters.chunks_received += 1;
        Ok(())
    }

    /// Claim the session for a pipeline run and drain the recording.
    ///
    /// ## Returns:
    /// - **Ok(bytes)**: the full recording (possibly empty); the buffer is now empty
    ///   and the stage is `Converting`
    /// - **Err(SessionError::Busy)**: another run is still in flight
    pub fn begin_run(&self) -> Result<Vec<u8>, SessionError> {
        let mut stage = self.stage.lock().unwrap_or_else(PoisonError::into_inner);
        if stage.is_running() {
            return Err(SessionError::Busy);
        }

        *stage = SessionStage::Converting;
        Ok(self.buffer.drain_and_reset())
    }

    /// Record the terminal stage of a run, releasing the session for the next one.
    pub fn finish_run(&self, outcome: SessionStage) {
        self.set_stage(outcome);
        let mut counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        counters.completed_runs += 1;
    }

    pub fn summary(&self) -> SessionSummary {
        let counters = self.counters.lock().unwrap_or_else(PoisonError::into_inner);
        SessionSummary {
            session_id: self.session_id.clone(),
            stage: self.stage(),
            buffered_bytes: self.buffer.len(),
            buffer_limit_bytes: self.buffer.max_bytes(),
            bytes_received: counters.bytes_received,
            chunks_received: counters.chunks_received,
            completed_runs: counters.completed_runs,
            age_seconds: Utc::now().signed_duration_since(self.created_at).num_seconds(),
        }
    }
}

/// Point-in-time view of a session, listed by the metrics endpoint.
#[derive(Debug, Clone, Serialize)]
pub struct SessionSummary {
    pub session_id: String,
    pub stage: SessionStage,
    pub buffered_bytes: usize,
    pub buffer_limit_bytes: usize,
    pub bytes_received: usize,
    pub chunks_received: u64,
    pub completed_runs: u64,
    pub age_seconds: i64,
}

/// Registry of live sessions keyed by session identifier.
///
/// ## Thread Safety:
/// The map sits behind an `RwLock`; each session guards its own buffer and stage, so
/// appending to one session never blocks another.
#[derive(Debug)]
pub struct SessionManager {
    sessions: RwLock<HashMap<String, Arc<AudioSession>>>,

    max_concurrent_sessions: usize,

    max_buffer_bytes: usize,
}

impl SessionManager {
    pub fn new(max_concurrent_sessions: usize, max_buffer_bytes: usize) -> Self {
        Self {
            sessions: RwLock::new(HashMap::new()),
            max_concurrent_sessions,
            max_buffer_bytes,
        }
    }

    /// Create a session with a fresh UUID.
    pub fn create_session(&self) -> Result<Arc<AudioSession>, SessionError> {
        self.get_or_create(&Uuid::new_v4().to_string())
    }

    /// Fetch a session, creating it if absent.
    pub fn get_or_create(&self, session_id: &str) -> Result<Arc<AudioSession>, SessionError> {
        if let Some(session) = self.get_session(session_id) {
            return Ok(session);
        }

        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        if let Some(session) = sessions.get(session_id) {
            return Ok(session.clone());
        }

        if sessions.len() >= self.max_concurrent_sessions {
            return Err(SessionError::LimitReached(self.max_concurrent_sessions));
        }

        let session = Arc::new(AudioSession::new(session_id.to_string(), self.max_buffer_bytes));
        sessions.insert(session_id.to_string(), session.clone());
        Ok(session)
    }

    pub fn get_session(&self, session_id: &str) -> Option<Arc<AudioSession>> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        sessions.get(session_id).cloned()
    }

    /// Append a chunk to a session's buffer, creating the session if absent.
    pub fn append(&self, session_id: &str, chunk: &[u8]) -> Result<(), SessionError> {
        self.get_or_create(session_id)?.append_chunk(chunk)
    }

    /// Take a session's accumulated bytes and reset its buffer.
    /// An unknown session drains as empty.
    pub fn drain_and_reset(&self, session_id: &str) -> Vec<u8> {
        self.get_session(session_id)
            .map(|session| session.buffer.drain_and_reset())
            .unwrap_or_default()
    }

    pub fn remove_session(&self, session_id: &str) -> bool {
        let mut sessions = self.sessions.write().unwrap_or_else(PoisonError::into_inner);
        sessions.remove(session_id).is_some()
    }

    pub fn active_session_count(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn max_concurrent_sessions(&self) -> usize {
        self.max_concurrent_sessions
    }

    /// Snapshot of every live session, oldest first.
    pub fn summaries(&self) -> Vec<SessionSummary> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut summaries: Vec<_> = sessions.values().map(|session| session.summary()).collect();
        summaries.sort_by(|a, b| b.age_seconds.cmp(&a.age_seconds));
        summaries
    }

    /// Count sessions per stage, for the health endpoint.
    pub fn stage_counts(&self) -> HashMap<&'static str, usize> {
        let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
        let mut counts = HashMap::new();
        for session in sessions.values() {
            *counts.entry(session.stage().as_str()).or_insert(0) += 1;
        }
        counts
    }
}
