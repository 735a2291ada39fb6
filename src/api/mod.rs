//! HTTP and WebSocket API
//!
//! Route map:
//! - `GET  /health`
//! - `GET  /api/speech-token` and `GET /api/ice-token`
//! - `POST /api/session`, `GET`/`DELETE /api/session/{id}`
//! - `POST /api/session/{id}/clear-history`
//! - `POST /api/session/{id}/avatar/connect|disconnect`
//! - `POST /api/session/{id}/speak|stop-speaking|continue-speaking`
//! - `POST /api/session/{id}/stt/connect|disconnect`
//! - `POST /api/session/{id}/chat` (streamed reply)
//! - `GET  /api/session/{id}/ws`

pub mod avatar;
pub mod chat;
pub mod health;
pub mod session;
pub mod stt;
pub mod tokens;
pub mod websocket;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::auth::TokenCache;
use crate::config::{DialogueConfig, IceOverride, SpeechConfig};
use crate::dialogue::TurnEngine;
use crate::engines::{IceServer, SynthesisEngine};
use crate::error::Error;
use crate::session::registry::SessionRegistry;
use crate::speech::SpeechInputController;

/// How long a handler waits for a token refresh before giving up
pub(crate) const TOKEN_WAIT: Duration = Duration::from_secs(10);

/// Shared state behind every handler
pub struct ApiState {
    pub registry: Arc<SessionRegistry>,
    pub input: Arc<SpeechInputController>,
    pub turn: Arc<TurnEngine>,
    pub synthesis: Arc<dyn SynthesisEngine>,
    pub speech: SpeechConfig,
    pub dialogue: DialogueConfig,
    pub speech_token: TokenCache<String>,
    pub relay_token: TokenCache<IceServer>,
    pub ice_override: Option<IceOverride>,
}

pub struct ApiServer {
    state: Arc<ApiState>,
    port: u16,
}

impl ApiServer {
    #[must_use]
    pub fn new(state: Arc<ApiState>, port: u16) -> Self {
        Self { state, port }
    }

    #[must_use]
    pub fn router(state: Arc<ApiState>) -> Router {
        Router::new()
            .route("/health", get(health::health))
            .route("/api/speech-token", get(tokens::speech_token))
            .route("/api/ice-token", get(tokens::ice_token))
            .route("/api/session", post(session::create))
            .route("/api/session/{id}", get(session::status).delete(session::release))
            .route("/api/session/{id}/clear-history", post(session::clear_history))
            .route("/api/session/{id}/avatar/connect", post(avatar::connect))
            .route("/api/session/{id}/avatar/disconnect", post(avatar::disconnect))
            .route("/api/session/{id}/speak", post(avatar::speak))
            .route("/api/session/{id}/stop-speaking", post(avatar::stop_speaking))
            .route("/api/session/{id}/continue-speaking", post(avatar::continue_speaking))
            .route("/api/session/{id}/stt/connect", post(stt::connect))
            .route("/api/session/{id}/stt/disconnect", post(stt::disconnect))
            .route("/api/session/{id}/chat", post(chat::chat))
            .route("/api/session/{id}/ws", get(websocket::upgrade))
            .layer(CorsLayer::permissive())
            .layer(TraceLayer::new_for_http())
            .with_state(state)
    }

    /// Bind and serve until the process exits.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] when the port cannot be bound.
    pub async fn serve(self) -> crate::Result<()> {
        let listener = tokio::net::TcpListener::bind(("0.0.0.0", self.port)).await?;
        tracing::info!(port = self.port, "gateway listening");
        axum::serve(listener, Self::router(self.state)).await?;
        Ok(())
    }
}

impl IntoResponse for Error {
    fn into_response(self) -> Response {
        let status = match &self {
            Self::SessionNotFound(_) => StatusCode::NOT_FOUND,
            Self::AlreadyConnected(_) => StatusCode::CONFLICT,
            Self::Token(_) => StatusCode::SERVICE_UNAVAILABLE,
            Self::Serialization(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        tracing::debug!(status = %status, error = %self, "request failed");
        (status, axum::Json(serde_json::json!({ "error": self.to_string() }))).into_response()
    }
}
