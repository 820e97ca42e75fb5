//! # Interview WebSocket Handler
//!
//! Clients connect to `/ws` (optionally `/ws?format=mp4`), stream their recording as
//! binary frames, then send `{"event":"video_complete"}` to get feedback.
//!
//! ## WebSocket Protocol:
//! 1. **Connection**: a session is registered and the greeting `feedback` event is sent
//! 2. **Streaming**: binary frames (or `video_chunk` JSON events) are appended to the
//!    session buffer
//! 3. **Completion**: `video_complete` drains the buffer and starts a pipeline run;
//!    progress and results arrive as `processing_step`, `transcription`, `ai_feedback`
//! 4. **Disconnect**: any in-flight run is aborted and the session is removed
//!
//! ## Actor Model:
//! Each connection is one actor. The pipeline runs in a spawned tokio task and talks
//! back to the actor through its address, so the actor never blocks on I/O.

use crate::audio::processor::ContainerFormat;
use crate::audio::session::{AudioSession, SessionError};
use crate::error::{AppError, AppResult};
use crate::pipeline::{ClientEvent, EventSink, ServerEvent};
use crate::state::AppState;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(60);

/// Message carrying one server event to the socket.
#[derive(Message)]
#[rtype(result = "()")]
struct Emit(ServerEvent);

/// Sent by a run task when it has finished, tagged with its run number.
#[derive(Message)]
#[rtype(result = "()")]
struct RunFinished(u64);

/// Forwards pipeline events into the actor's mailbox.
struct ActorSink {
    addr: Addr<InterviewSocket>,
}

impl EventSink for ActorSink {
    fn emit(&self, event: ServerEvent) {
        self.addr.do_send(Emit(event));
    }
}

/// WebSocket actor for one interview recording session.
pub struct InterviewSocket {
    state: web::Data<AppState>,

    session: Arc<AudioSession>,

    /// Container format declared for this connection's recordings
    format: ContainerFormat,

    last_heartbeat: Instant,

    /// The in-flight pipeline run and its number, aborted on disconnect
    run: Option<(u64, JoinHandle<()>)>,

    runs_started: u64,
}

impl InterviewSocket {
    pub fn new(state: web::Data<AppState>, session: Arc<AudioSession>, format: ContainerFormat) -> Self {
        Self {
            state,
            session,
            format,
            last_heartbeat: Instant::now(),
            run: None,
            runs_started: 0,
        }
    }

    fn send_event(&self, ctx: &mut ws::WebsocketContext<Self>, event: &ServerEvent) {
        match serde_json::to_string(event) {
            Ok(json) => ctx.text(json),
            Err(err) => error!("Failed to serialize {} event: {}", event.name(), err),
        }
    }

    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, code: &str, message: &str) {
        warn!(session_id = %self.session.session_id, "WebSocket error {}: {}", code, message);
        self.send_event(ctx, &ServerEvent::error(code, message));
    }

    fn handle_chunk(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        match self.state.sessions.append(&self.session.session_id, data) {
            Ok(()) => debug!(
                session_id = %self.session.session_id,
                "Received {} bytes, {} buffered",
                data.len(),
                self.session.buffer.len()
            ),
            Err(err) => self.send_error(ctx, error_code(&err), &err.to_string()),
        }
    }

    fn handle_complete(&mut self, ctx: &mut ws::WebsocketContext<Self>) {
        if self.session.buffer.is_empty() {
            debug!(session_id = %self.session.session_id, "Completion signal with nothing buffered");
        }

        let input = match self.session.begin_run() {
            Ok(input) => input,
            Err(err) => {
                if err == SessionError::Busy {
                    self.state.record_busy_rejection();
                }
                self.send_error(ctx, error_code(&err), &err.to_string());
                return;
            }
        };

        info!(
            session_id = %self.session.session_id,
            bytes = input.len(),
            format = %self.format,
            "Recording complete, starting pipeline"
        );

        let pipeline = self.state.pipeline.clone();
        let state = self.state.clone();
        let session = self.session.clone();
        let format = self.format;
        let addr = ctx.address();
        self.runs_started += 1;
        let run_id = self.runs_started;

        let handle = tokio::spawn(async move {
            let sink = ActorSink { addr: addr.clone() };
            let outcome = pipeline.run(&session, input, format, &sink).await;
            if let Some(err) = &outcome.error {
                debug!(
                    session_id = %session.session_id,
                    stage = outcome.stage.as_str(),
                    error = %err,
                    "Run ended with the fallback report"
                );
            }
            state.record_pipeline_run(outcome.used_fallback);
            addr.do_send(RunFinished(run_id));
        });
        self.run = Some((run_id, handle));
    }

    fn handle_text(&mut self, text: &str, ctx: &mut ws::WebsocketContext<Self>) {
        match serde_json::from_str::<ClientEvent>(text) {
            Ok(ClientEvent::VideoChunk(data)) => self.handle_chunk(&data, ctx),
            Ok(ClientEvent::VideoComplete) => self.handle_complete(ctx),
            Ok(ClientEvent::Configure { format }) => {
                info!(session_id = %self.session.session_id, %format, "Container format changed");
                self.format = format;
            }
            Err(err) => self.send_error(ctx, "invalid_message", &format!("Invalid message: {}", err)),
        }
    }
}

/// Event code sent to the client for a session error.
fn error_code(err: &SessionError) -> &'static str {
    match err {
        SessionError::Busy => "busy",
        SessionError::BufferFull { .. } => "buffer_full",
        SessionError::LimitReached(_) => "session_limit",
    }
}

impl Actor for InterviewSocket {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(session_id = %self.session.session_id, "WebSocket connection started");
        self.send_event(ctx, &ServerEvent::greeting());

        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(session_id = %act.session.session_id, "WebSocket heartbeat timeout, closing connection");
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some((_, run)) = self.run.take() {
            if !run.is_finished() {
                info!(session_id = %self.session.session_id, "Client disconnected mid-run, cancelling");
            }
            run.abort();
        }

        let discarded = self.state.sessions.drain_and_reset(&self.session.session_id);
        if !discarded.is_empty() {
            info!(
                session_id = %self.session.session_id,
                bytes = discarded.len(),
                "Discarding unprocessed recording"
            );
        }

        self.state.sessions.remove_session(&self.session.session_id);
        info!(session_id = %self.session.session_id, "WebSocket connection stopped");
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for InterviewSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Binary(data)) => {
                self.last_heartbeat = Instant::now();
                self.handle_chunk(&data, ctx);
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();
                self.handle_text(&text, ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                ctx.pong(&data);
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(session_id = %self.session.session_id, "WebSocket closed: {:?}", reason);
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!("Received unexpected continuation frame");
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(session_id = %self.session.session_id, "WebSocket protocol error: {}", err);
                ctx.stop();
            }
        }
    }
}

impl Handler<Emit> for InterviewSocket {
    type Result = ();

    fn handle(&mut self, msg: Emit, ctx: &mut Self::Context) {
        self.send_event(ctx, &msg.0);
    }
}

impl Handler<RunFinished> for InterviewSocket {
    type Result = ();

    fn handle(&mut self, msg: RunFinished, _ctx: &mut Self::Context) {
        // A newer run may already be in flight
        if matches!(self.run, Some((id, _)) if id == msg.0) {
            self.run = None;
        }
        debug!(session_id = %self.session.session_id, stage = self.session.stage().as_str(), "Pipeline run finished");
    }
}

#[derive(Debug, Deserialize)]
pub struct SocketParams {
    format: Option<String>,
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// Registers the session before upgrading, so a full server answers 503 instead of
/// accepting a socket it cannot serve. An unknown `format` answers 400. Frames up to
/// `server.max_frame_bytes` are accepted, since one recorder chunk is one frame.
pub async fn interview_socket(
    req: HttpRequest,
    stream: web::Payload,
    params: web::Query<SocketParams>,
    state: web::Data<AppState>,
) -> AppResult<HttpResponse> {
    info!("New WebSocket connection request from: {:?}", req.connection_info().peer_addr());

    let format = match params.format.as_deref() {
        Some(raw) => raw.parse::<ContainerFormat>().map_err(AppError::BadRequest)?,
        None => state.get_config().audio.default_format,
    };

    let session = state
        .sessions
        .create_session()
        .map_err(|err| AppError::Unavailable(err.to_string()))?;
    let session_id = session.session_id.clone();

    let max_frame_bytes = state.get_config().server.max_frame_bytes;
    let socket = InterviewSocket::new(state.clone(), session, format);
    ws::WsResponseBuilder::new(socket, &req, stream)
        .frame_size(max_frame_bytes)
        .start()
        .map_err(|err| {
            state.sessions.remove_session(&session_id);
            AppError::BadRequest(format!("WebSocket handshake failed: {}", err))
        })
}
