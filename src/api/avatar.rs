//! Avatar (synthesis) endpoints
//!
//! Connect opens the synthesis leg, binds it to the session's speaker, and
//! speaks the greeting once per session. Reconnecting after a drop resumes
//! the queue, repeating the sentence that was cut off when configured to.

use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::session::require_session;
use super::{ApiState, TOKEN_WAIT};
use crate::engines::{AvatarParams, IceServer, SynthesisConfig};
use crate::{Error, Result};

#[derive(Deserialize)]
pub struct ConnectRequest {
    /// WebRTC SDP offer from the client, when avatar video is wanted
    pub client_sdp: Option<String>,
    pub voice: Option<String>,
    /// Personal-voice speaker profile id
    pub speaker_profile_id: Option<String>,
    pub custom_voice_endpoint_id: Option<String>,
    #[serde(default)]
    pub avatar: Option<AvatarRequest>,
}

#[derive(Deserialize)]
pub struct AvatarRequest {
    pub character: Option<String>,
    pub style: Option<String>,
    pub background_color: Option<String>,
    pub background_image_url: Option<String>,
    #[serde(default)]
    pub transparent_background: bool,
    #[serde(default)]
    pub video_crop: bool,
    #[serde(default)]
    pub customized: bool,
}

impl AvatarRequest {
    fn into_params(self) -> AvatarParams {
        let defaults = AvatarParams::default();
        AvatarParams {
            character: self.character.unwrap_or(defaults.character),
            style: self.style.unwrap_or(defaults.style),
            background_color: self.background_color.unwrap_or(defaults.background_color),
            background_image_url: self.background_image_url,
            transparent_background: self.transparent_background,
            video_crop: self.video_crop,
            customized: self.customized,
        }
    }
}

#[derive(Serialize)]
pub struct ConnectResponse {
    pub remote_sdp: Option<String>,
}

pub async fn connect(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<ConnectRequest>,
) -> Result<Json<ConnectResponse>> {
    let session = require_session(&state, id).await?;
    session.touch();

    if session.state.lock().await.synthesis_connected {
        return Err(Error::AlreadyConnected("avatar"));
    }

    let token = state.speech_token.wait(TOKEN_WAIT).await?;
    let ice_server = match &state.ice_override {
        Some(ice) => Some(IceServer {
            urls: vec![ice.url.clone()],
            username: ice.username.clone(),
            credential: ice.password.clone(),
        }),
        None => state.relay_token.current(),
    };

    let voice = request.voice.unwrap_or_else(|| state.speech.default_voice.clone());
    let config = SynthesisConfig {
        endpoint: state.speech.synthesis_endpoint(),
        auth_token: token,
        voice: voice.clone(),
        custom_voice_endpoint_id: request.custom_voice_endpoint_id,
        client_sdp: request.client_sdp,
        ice_server,
        avatar: request.avatar.map(AvatarRequest::into_params),
    };

    let (handle, info) = state.synthesis.connect(config).await?;

    // Re-check under the lock: a concurrent connect may have won while
    // the engine handshake ran
    let first = {
        let mut s = session.state.lock().await;
        if s.synthesis_connected {
            drop(s);
            handle.close().await;
            return Err(Error::AlreadyConnected("avatar"));
        }
        s.synthesis_connected = true;
        !s.greeting_sent
    };
    session.speaker.bind(handle, voice, request.speaker_profile_id).await;

    if first {
        state.turn.greet(&session).await;
    } else {
        // Reconnect: pick the queue back up where it stopped
        session
            .speaker
            .resume_after_reconnect(state.dialogue.repeat_interrupted_sentence)
            .await;
    }

    tracing::info!(session = %id, "avatar connected");
    Ok(Json(ConnectResponse { remote_sdp: info.remote_sdp }))
}

pub async fn disconnect(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let session = require_session(&state, id).await?;
    session.touch();

    session.speaker.interrupt(true).await;
    if let Some(handle) = session.speaker.take_handle().await {
        handle.close().await;
    }
    session.state.lock().await.synthesis_connected = false;
    tracing::info!(session = %id, "avatar disconnected");
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Deserialize)]
pub struct SpeakRequest {
    pub text: String,
    #[serde(default)]
    pub trailing_silence_ms: u64,
}

/// Queue arbitrary text for speech, outside any dialogue turn
pub async fn speak(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
    Json(request): Json<SpeakRequest>,
) -> Result<StatusCode> {
    let session = require_session(&state, id).await?;
    session.touch();
    session.speaker.enqueue(request.text, request.trailing_silence_ms).await;
    Ok(StatusCode::ACCEPTED)
}

pub async fn stop_speaking(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let session = require_session(&state, id).await?;
    session.touch();
    session.speaker.interrupt(false).await;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn continue_speaking(
    State(state): State<Arc<ApiState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode> {
    let session = require_session(&state, id).await?;
    session.touch();
    session
        .speaker
        .resume_after_reconnect(state.dialogue.repeat_interrupted_sentence)
        .await;
    Ok(StatusCode::NO_CONTENT)
}
