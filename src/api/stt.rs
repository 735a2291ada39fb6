//! Speech input endpoints

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use uuid::Uuid;

use super::session::require_session;
use super::{ApiState, TOKEN_WAIT};
use crate::Result;
use crate::engines::RecognitionConfig;

pub async fn connect(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let session = require_session(&state, id).await?;
    session.touch();

    let token = state.speech_token.wait(TOKEN_WAIT).await?;
    let config = RecognitionConfig {
        endpoint: state.speech.transcription_endpoint(),
        auth_token: token,
        prompt_context: None,
    };
    state.input.connect(session, config).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn disconnect(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let session = require_session(&state, id).await?;
    session.touch();
    state.input.disconnect(&session).await;
    Ok(StatusCode::NO_CONTENT)
}
