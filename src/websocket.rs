//! # WebSocket Streaming Handler
//!
//! Binds one transport connection to one streaming session. Clients connect
//! on any path and drive the protocol with two frame kinds:
//!
//! ## WebSocket Protocol:
//! - **Binary frames**: raw PCM audio (float32 or int16, classified by byte
//!   length). Each frame is fed into the session, then the session decides
//!   whether enough audio has accumulated for an inference pass.
//! - **Text frames**: JSON control messages with a `type` field (`config`,
//!   `flush`, `reset`). All responses are JSON text frames.
//!
//! Errors are advisory: a malformed frame produces an `error` response and
//! the connection stays open. Closing is the client's prerogative.
//!
//! Inference runs on this actor's task and blocks it until complete, which
//! serializes all work within a session; frames arriving meanwhile queue at
//! the transport. Different sessions run on separate connections and may
//! infer concurrently.

use crate::audio::{self, decode, session::StreamSession};
use crate::state::AppState;
use crate::transcription::WhisperEngine;

use actix::prelude::*;
use actix_web::{web, HttpRequest, HttpResponse, Result as ActixResult};
use actix_web_actors::ws;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Maximum accepted WebSocket frame payload: 16 MiB.
const MAX_FRAME_SIZE: usize = 16 * 1024 * 1024;

/// How often the server pings an idle client.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(30);

/// How long a client may stay silent before the connection is dropped.
const CLIENT_TIMEOUT: Duration = Duration::from_secs(120);

/// Control messages accepted from clients.
#[derive(Debug, Deserialize)]
#[serde(tag = "type")]
pub enum ClientMessage {
    /// Session configuration update. Acknowledged, but the fields are
    /// reserved for forward compatibility: session parameters are fixed at
    /// connection time.
    #[serde(rename = "config")]
    Config {
        language: Option<String>,
        translate: Option<bool>,
    },

    /// Submit all buffered audio immediately and return the tail transcript
    #[serde(rename = "flush")]
    Flush,

    /// Clear all stream state, including decoding context
    #[serde(rename = "reset")]
    Reset,
}

/// Messages sent to clients. All are JSON text frames.
#[derive(Debug, Serialize)]
#[serde(tag = "type")]
pub enum ServerMessage {
    /// Welcome message sent once after the connection is accepted
    #[serde(rename = "connected")]
    Connected {
        user_id: i32,
        message: String,
        format: String,
        sample_rate: u32,
    },

    /// Incremental transcription produced by a scheduled inference pass
    #[serde(rename = "transcription")]
    Transcription { text: String, user_id: i32 },

    /// Result of an explicit flush (possibly empty)
    #[serde(rename = "flush_complete")]
    FlushComplete { text: String, user_id: i32 },

    /// Acknowledgement of a reset
    #[serde(rename = "reset")]
    Reset { status: String },

    /// Acknowledgement of a config message
    #[serde(rename = "config_updated")]
    ConfigUpdated { status: String },

    /// Advisory error; the connection stays open
    #[serde(rename = "error")]
    Error { message: String },
}

/// WebSocket actor owning one streaming session.
pub struct StreamWebSocket {
    /// The session core for this connection
    session: StreamSession,

    /// Shared gateway state, for connection metrics
    state: AppState,

    /// Last time the client gave any sign of life
    last_heartbeat: Instant,
}

impl StreamWebSocket {
    pub fn new(session: StreamSession, state: AppState) -> Self {
        Self {
            session,
            state,
            last_heartbeat: Instant::now(),
        }
    }

    /// Serialize and send a server message as a text frame.
    fn send(&self, ctx: &mut ws::WebsocketContext<Self>, message: &ServerMessage) {
        match serde_json::to_string(message) {
            Ok(json) => ctx.text(json),
            Err(err) => error!(
                user_id = self.session.user_id(),
                error = %err,
                "failed to serialize outbound message"
            ),
        }
    }

    /// Send an advisory error frame.
    fn send_error(&self, ctx: &mut ws::WebsocketContext<Self>, message: &str) {
        warn!(user_id = self.session.user_id(), "{}", message);
        self.send(
            ctx,
            &ServerMessage::Error {
                message: message.to_string(),
            },
        );
    }

    /// Handle a parsed control message.
    fn handle_control(&mut self, message: ClientMessage, ctx: &mut ws::WebsocketContext<Self>) {
        match message {
            ClientMessage::Config {
                language,
                translate,
            } => {
                // Session parameters are fixed at accept time; a mid-stream
                // language switch would invalidate the prompt-token context.
                info!(
                    user_id = self.session.user_id(),
                    ?language,
                    ?translate,
                    "config update acknowledged (fields reserved)"
                );
                self.send(
                    ctx,
                    &ServerMessage::ConfigUpdated {
                        status: "ok".to_string(),
                    },
                );
            }
            ClientMessage::Flush => {
                let text = self.session.flush();
                self.send(
                    ctx,
                    &ServerMessage::FlushComplete {
                        text,
                        user_id: self.session.user_id(),
                    },
                );
            }
            ClientMessage::Reset => {
                self.session.reset();
                info!(user_id = self.session.user_id(), "session reset");
                self.send(
                    ctx,
                    &ServerMessage::Reset {
                        status: "ok".to_string(),
                    },
                );
            }
        }
    }

    /// Handle a binary PCM frame: decode, feed, and drain if a pass is due.
    fn handle_audio_frame(&mut self, data: &[u8], ctx: &mut ws::WebsocketContext<Self>) {
        let samples = match decode::decode_samples(data) {
            Ok(samples) => samples,
            Err(message) => {
                self.send_error(ctx, &message);
                return;
            }
        };

        debug!(
            user_id = self.session.user_id(),
            bytes = data.len(),
            samples = samples.len(),
            "received audio frame"
        );

        self.session.push_audio(&samples);

        let text = self.session.drain_if_ready();
        if !text.is_empty() {
            self.send(
                ctx,
                &ServerMessage::Transcription {
                    text,
                    user_id: self.session.user_id(),
                },
            );
        }
    }
}

impl Actor for StreamWebSocket {
    type Context = ws::WebsocketContext<Self>;

    /// Called when the WebSocket connection starts.
    fn started(&mut self, ctx: &mut Self::Context) {
        self.state.record_connection_opened();
        let metrics = self.state.get_metrics_snapshot();
        info!(
            user_id = self.session.user_id(),
            active_sessions = metrics.active_sessions,
            "WebSocket connection opened"
        );

        self.send(
            ctx,
            &ServerMessage::Connected {
                user_id: self.session.user_id(),
                message: "Ready to receive PCM audio data".to_string(),
                format: "Send binary PCM data: float32 or int16".to_string(),
                sample_rate: audio::SAMPLE_RATE,
            },
        );

        // Keepalive: ping on an interval, drop clients silent past the timeout
        ctx.run_interval(HEARTBEAT_INTERVAL, |act, ctx| {
            if Instant::now().duration_since(act.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    user_id = act.session.user_id(),
                    "WebSocket heartbeat timeout, closing connection"
                );
                ctx.stop();
            } else {
                ctx.ping(b"");
            }
        });
    }

    /// Called when the WebSocket connection stops.
    fn stopped(&mut self, _ctx: &mut Self::Context) {
        self.state.record_connection_closed();
        let metrics = self.state.get_metrics_snapshot();
        info!(
            user_id = self.session.user_id(),
            active_sessions = metrics.active_sessions,
            "WebSocket connection closed"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for StreamWebSocket {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => self.handle_control(message, ctx),
                Err(err) => {
                    self.send_error(ctx, &format!("Invalid JSON: {}", err));
                }
            },
            Ok(ws::Message::Binary(data)) => {
                self.handle_audio_frame(&data, ctx);
            }
            Ok(ws::Message::Ping(data)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&data);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Close(reason)) => {
                info!(
                    user_id = self.session.user_id(),
                    ?reason,
                    "WebSocket close requested"
                );
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) => {
                warn!(
                    user_id = self.session.user_id(),
                    "received unexpected continuation frame"
                );
            }
            Ok(ws::Message::Nop) => {}
            Err(err) => {
                error!(
                    user_id = self.session.user_id(),
                    error = %err,
                    "WebSocket protocol error"
                );
                ctx.stop();
            }
        }
    }
}

/// WebSocket endpoint handler.
///
/// ## HTTP to WebSocket Upgrade:
/// Every path upgrades to a streaming session. The session is constructed
/// here (user id, parameters, and a fresh inference state over the shared
/// model) and handed to the actor that owns it for the connection's life.
pub async fn stream_websocket(
    req: HttpRequest,
    stream: web::Payload,
    state: web::Data<AppState>,
) -> ActixResult<HttpResponse> {
    let user_id = state.allocate_user_id();
    let config = state.get_config();

    let engine = match WhisperEngine::new(state.whisper(), config.stream.clone()) {
        Ok(engine) => engine,
        Err(err) => {
            error!(user_id, error = %err, "failed to create inference state");
            return Ok(HttpResponse::InternalServerError().finish());
        }
    };

    let session = StreamSession::new(
        Box::new(engine),
        config.stream,
        audio::SAMPLE_RATE,
        user_id,
    );

    ws::WsResponseBuilder::new(
        StreamWebSocket::new(session, state.get_ref().clone()),
        &req,
        stream,
    )
    .frame_size(MAX_FRAME_SIZE)
    .start()
}
