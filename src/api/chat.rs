//! Text chat endpoint
//!
//! Runs a dialogue turn from typed text and streams the reply back as it
//! is produced. Latency markers are embedded inline the way the streaming
//! clients expect: `<FTL>ms</FTL>` for first token, `<FSL>ms</FSL>` for
//! first sentence.

use std::convert::Infallible;
use std::sync::Arc;

use axum::Json;
use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::header;
use axum::response::Response;
use futures::StreamExt;
use serde::Deserialize;
use tokio_stream::wrappers::ReceiverStream;
use uuid::Uuid;

use super::ApiState;
use super::session::require_session;
use crate::dialogue::TurnEvent;
use crate::{Error, Result};

#[derive(Deserialize)]
pub struct ChatRequest {
    pub text: String,
}

pub async fn chat(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ChatRequest>,
) -> Result<Response> {
    let session = require_session(&state, id).await?;
    // Clients that never connect the avatar get the greeting here
    state.turn.greet(&session).await;
    let rx = state.turn.handle_turn(session, request.text);

    let stream = ReceiverStream::new(rx).map(|event| {
        let text = match event {
            TurnEvent::Token(text) => text,
            TurnEvent::Latency { marker: "first_token", ms } => format!("<FTL>{ms}</FTL>"),
            TurnEvent::Latency { marker: "first_sentence", ms } => format!("<FSL>{ms}</FSL>"),
            TurnEvent::Latency { .. } => String::new(),
            TurnEvent::Error(message) => format!("\n[error] {message}"),
        };
        Ok::<_, Infallible>(text)
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "text/plain; charset=utf-8")
        .body(Body::from_stream(stream))
        .map_err(|e| Error::Completion(e.to_string()))
}
