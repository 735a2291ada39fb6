//! WebSocket session transport
//!
//! One socket per session carries client audio and chat upstream and
//! recognition transcripts, streamed reply text, and status downstream.
//! All frames are JSON with a `type` tag.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, State};
use axum::response::Response;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use futures::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use uuid::Uuid;

use super::ApiState;
use super::session::require_session;
use crate::Result;
use crate::session::{Session, SessionEvent};
use crate::speech::input::forward_turn_events;

#[derive(Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Incoming {
    /// Base64 PCM16 audio chunk for speech recognition
    Audio { chunk: String },
    /// Typed chat message
    Chat { text: String },
    StopSpeaking,
    Ping,
}

#[derive(Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
enum Control {
    Connected { session_id: Uuid },
    Pong,
}

pub async fn upgrade(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    ws: WebSocketUpgrade,
) -> Result<Response> {
    let session = require_session(&state, id).await?;
    Ok(ws.on_upgrade(move |socket| handle(socket, state, session)))
}

async fn handle(socket: WebSocket, state: Arc<ApiState>, session: Arc<Session>) {
    let (mut sink, mut stream) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<String>(64);

    // Attach this socket as the session's event channel
    let (event_tx, mut event_rx) = mpsc::channel::<SessionEvent>(64);
    session.attach_event_channel(event_tx.clone()).await;

    let event_out = out_tx.clone();
    let event_task = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(json) => {
                    if event_out.send(json).await.is_err() {
                        return;
                    }
                }
                Err(e) => tracing::error!(error = %e, "failed to encode session event"),
            }
        }
    });

    let writer = tokio::spawn(async move {
        while let Some(text) = out_rx.recv().await {
            if sink.send(Message::Text(text.into())).await.is_err() {
                return;
            }
        }
        let _ = sink.close().await;
    });

    if let Ok(json) = serde_json::to_string(&Control::Connected { session_id: session.id }) {
        let _ = out_tx.send(json).await;
    }
    tracing::info!(session = %session.id, "websocket attached");

    while let Some(message) = stream.next().await {
        let message = match message {
            Ok(m) => m,
            Err(e) => {
                tracing::debug!(session = %session.id, error = %e, "websocket read error");
                break;
            }
        };
        match message {
            Message::Text(text) => {
                match serde_json::from_str::<Incoming>(&text) {
                    Ok(incoming) => dispatch(incoming, &state, &session, &out_tx).await,
                    Err(e) => {
                        send_error(&out_tx, format!("unrecognized message: {e}")).await;
                    }
                }
            }
            // Binary frames are raw audio without the JSON envelope
            Message::Binary(bytes) => {
                if let Err(e) = state.input.push_audio(&session, &bytes).await {
                    send_error(&out_tx, e.to_string()).await;
                }
            }
            Message::Close(_) => break,
            Message::Ping(_) | Message::Pong(_) => {}
        }
    }

    // Detach only if a newer socket has not replaced this channel
    session.detach_event_channel(&event_tx).await;
    drop(out_tx);
    event_task.abort();
    let _ = writer.await;
    tracing::info!(session = %session.id, "websocket detached");
}

async fn dispatch(
    incoming: Incoming,
    state: &Arc<ApiState>,
    session: &Arc<Session>,
    out: &mpsc::Sender<String>,
) {
    match incoming {
        Incoming::Audio { chunk } => match BASE64.decode(chunk.as_bytes()) {
            Ok(bytes) => {
                if let Err(e) = state.input.push_audio(session, &bytes).await {
                    send_error(out, e.to_string()).await;
                }
            }
            Err(e) => send_error(out, format!("bad audio encoding: {e}")).await,
        },
        Incoming::Chat { text } => {
            let rx = state.turn.handle_turn(Arc::clone(session), text);
            let session = Arc::clone(session);
            tokio::spawn(async move {
                forward_turn_events(&session, rx).await;
            });
        }
        Incoming::StopSpeaking => {
            session.touch();
            session.speaker.interrupt(false).await;
        }
        Incoming::Ping => {
            if let Ok(json) = serde_json::to_string(&Control::Pong) {
                let _ = out.send(json).await;
            }
        }
    }
}

async fn send_error(out: &mpsc::Sender<String>, message: String) {
    if let Ok(json) = serde_json::to_string(&SessionEvent::Error { message }) {
        let _ = out.send(json).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn incoming_frames_parse() {
        let audio: Incoming =
            serde_json::from_str(r#"{"type":"audio","chunk":"AAAA"}"#).unwrap();
        assert!(matches!(audio, Incoming::Audio { .. }));

        let chat: Incoming = serde_json::from_str(r#"{"type":"chat","text":"hi"}"#).unwrap();
        assert!(matches!(chat, Incoming::Chat { .. }));

        let stop: Incoming = serde_json::from_str(r#"{"type":"stop_speaking"}"#).unwrap();
        assert!(matches!(stop, Incoming::StopSpeaking));
    }

    #[test]
    fn outgoing_events_are_type_tagged() {
        let json = serde_json::to_string(&SessionEvent::ChatChunk { text: "hey".to_string() })
            .unwrap();
        assert!(json.contains(r#""type":"chat_chunk"#));

        let json = serde_json::to_string(&Control::Pong).unwrap();
        assert_eq!(json, r#"{"type":"pong"}"#);
    }
}
