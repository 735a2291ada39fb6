//! Client-facing token endpoints
//!
//! The browser client needs a speech bearer token for its local SDK and
//! ICE credentials for the avatar's WebRTC leg. Both come from the
//! background refreshers; a static ICE override from configuration wins
//! over the relay service.

use std::sync::Arc;

use axum::Json;
use axum::extract::State;
use serde::Serialize;

use super::{ApiState, TOKEN_WAIT};
use crate::Result;
use crate::engines::IceServer;

#[derive(Serialize)]
pub struct SpeechTokenResponse {
    pub token: String,
    pub region: String,
}

pub async fn speech_token(
    State(state): State<Arc<ApiState>>,
) -> Result<Json<SpeechTokenResponse>> {
    let token = state.speech_token.wait(TOKEN_WAIT).await?;
    Ok(Json(SpeechTokenResponse { token, region: state.speech.region.clone() }))
}

pub async fn ice_token(State(state): State<Arc<ApiState>>) -> Result<Json<IceServer>> {
    if let Some(ice) = &state.ice_override {
        return Ok(Json(IceServer {
            urls: vec![ice.remote_url.clone().unwrap_or_else(|| ice.url.clone())],
            username: ice.username.clone(),
            credential: ice.password.clone(),
        }));
    }
    let server = state.relay_token.wait(TOKEN_WAIT).await?;
    Ok(Json(server))
}
