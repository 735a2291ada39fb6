//! Session lifecycle endpoints

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::Serialize;
use uuid::Uuid;

use super::ApiState;
use crate::session::Session;
use crate::{Error, Result};

/// Look up a session or fail with 404
pub(crate) async fn require_session(
    state: &ApiState,
    id: Uuid,
) -> Result<Arc<Session>> {
    state
        .registry
        .get(id)
        .await
        .ok_or_else(|| Error::SessionNotFound(id.to_string()))
}

#[derive(Serialize)]
pub struct CreateResponse {
    pub session_id: Uuid,
}

pub async fn create(State(state): State<Arc<ApiState>>) -> Json<CreateResponse> {
    let session = state.registry.create().await;
    Json(CreateResponse { session_id: session.id })
}

#[derive(Serialize)]
pub struct StatusResponse {
    pub session_id: Uuid,
    pub speaking: bool,
    pub queued_sentences: usize,
    pub speech_input_connected: bool,
    pub avatar_connected: bool,
    pub history_len: usize,
    pub idle_secs: i64,
}

pub async fn status(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<StatusResponse>> {
    let session = require_session(&state, id).await?;
    let (speech_input_connected, avatar_connected, history_len) = {
        let s = session.state.lock().await;
        (s.recognition.is_some(), s.synthesis_connected, s.history.len())
    };
    Ok(Json(StatusResponse {
        session_id: session.id,
        speaking: session.speaker.is_speaking().await,
        queued_sentences: session.speaker.queued().await,
        speech_input_connected,
        avatar_connected,
        history_len,
        idle_secs: session.idle_secs(),
    }))
}

pub async fn release(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> StatusCode {
    state.registry.release(id).await;
    StatusCode::NO_CONTENT
}

pub async fn clear_history(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let session = require_session(&state, id).await?;
    session.touch();
    session.clear_history().await;
    Ok(StatusCode::NO_CONTENT)
}
