//! Speech synthesis / avatar engine interface
//!
//! One live handle per session. Synthesis calls are serialized by the
//! session's speaker queue; the handle itself only promises that a stop
//! signal cancels the in-flight utterance best-effort.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::watch;
use uuid::Uuid;

use crate::{Error, Result};

/// ICE server credentials handed to the avatar video negotiation
#[derive(Debug, Clone, Serialize)]
pub struct IceServer {
    pub urls: Vec<String>,
    pub username: String,
    pub credential: String,
}

/// Avatar appearance and framing parameters
#[derive(Debug, Clone)]
pub struct AvatarParams {
    pub character: String,
    pub style: String,
    pub background_color: String,
    pub background_image_url: Option<String>,
    pub transparent_background: bool,
    pub video_crop: bool,
    pub customized: bool,
}

impl Default for AvatarParams {
    fn default() -> Self {
        Self {
            character: "lori".to_string(),
            style: "graceful".to_string(),
            background_color: "#FFFFFFFF".to_string(),
            background_image_url: None,
            transparent_background: false,
            video_crop: false,
            customized: false,
        }
    }
}

/// Per-connection synthesis configuration
#[derive(Debug, Clone)]
pub struct SynthesisConfig {
    /// Engine endpoint
    pub endpoint: String,
    /// Bearer token or subscription key
    pub auth_token: String,
    /// Voice identifier applied to this connection
    pub voice: String,
    /// Custom voice deployment id (optional)
    pub custom_voice_endpoint_id: Option<String>,
    /// Client SDP offer for avatar video (optional; audio-only otherwise)
    pub client_sdp: Option<String>,
    /// ICE server for the avatar's WebRTC leg
    pub ice_server: Option<IceServer>,
    /// Avatar appearance parameters
    pub avatar: Option<AvatarParams>,
}

/// Result of opening a synthesis connection
#[derive(Debug, Clone, Default)]
pub struct ConnectInfo {
    /// Remote SDP answer from the avatar handshake, when the engine
    /// negotiates video
    pub remote_sdp: Option<String>,
}

/// Live synthesis connection
#[async_trait]
pub trait SynthesisHandle: Send + Sync {
    /// Synthesize one markup document, returning the engine result id.
    ///
    /// # Errors
    ///
    /// Returns [`Error::SynthesisCanceled`] when a stop signal cancels the
    /// utterance, or [`Error::Synthesis`] on engine failure.
    async fn synthesize(&self, markup: &str) -> Result<String>;

    /// Ask the engine to stop the current utterance. Best-effort and
    /// fire-and-forget; callers must not wait on engine acknowledgement.
    async fn send_stop(&self);

    /// Close the connection. Idempotent.
    async fn close(&self);
}

/// Factory for synthesis connections
#[async_trait]
pub trait SynthesisEngine: Send + Sync {
    /// Open a synthesis connection.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Synthesis`] if the connection cannot be opened.
    async fn connect(
        &self,
        config: SynthesisConfig,
    ) -> Result<(Arc<dyn SynthesisHandle>, ConnectInfo)>;
}

/// Build the avatar negotiation payload sent during connection setup.
///
/// Thin data shaping only: voice, WebRTC client description plus ICE
/// credentials, video format, and avatar appearance.
#[must_use]
pub fn avatar_config_payload(config: &SynthesisConfig) -> serde_json::Value {
    let avatar = config.avatar.clone().unwrap_or_default();
    let (crop_left, crop_right) = if avatar.video_crop { (600, 1320) } else { (0, 1920) };
    let background_color = if avatar.transparent_background {
        "#00FF00FF".to_string()
    } else {
        avatar.background_color.clone()
    };

    serde_json::json!({
        "synthesis": {
            "synthesisConfig": { "voice": config.voice },
            "video": {
                "protocol": {
                    "name": "WebRTC",
                    "webrtcConfig": {
                        "clientDescription": config.client_sdp,
                        "iceServers": config.ice_server.as_ref().map(|s| vec![s.clone()]),
                    },
                },
                "format": {
                    "crop": {
                        "topLeft": { "x": crop_left, "y": 0 },
                        "bottomRight": { "x": crop_right, "y": 1080 },
                    },
                    "bitrate": 500_000,
                },
                "talkingAvatar": {
                    "customized": avatar.customized,
                    "character": avatar.character,
                    "style": avatar.style,
                    "background": {
                        "color": background_color,
                        "image": { "url": avatar.background_image_url },
                    },
                },
            },
        },
    })
}

/// REST synthesis engine
///
/// Issues one HTTPS synthesis request per markup document. Stop signals
/// cancel the in-flight request cooperatively through a watch channel;
/// queued entries are untouched (the speaker owns the queue).
pub struct RestSynthesisEngine {
    client: reqwest::Client,
}

impl RestSynthesisEngine {
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for RestSynthesisEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SynthesisEngine for RestSynthesisEngine {
    async fn connect(
        &self,
        config: SynthesisConfig,
    ) -> Result<(Arc<dyn SynthesisHandle>, ConnectInfo)> {
        let payload = avatar_config_payload(&config);
        tracing::debug!(voice = %config.voice, payload = %payload, "opening synthesis connection");

        let (cancel_tx, _) = watch::channel(0u64);
        let handle: Arc<dyn SynthesisHandle> = Arc::new(RestHandle {
            client: self.client.clone(),
            config,
            cancel: cancel_tx,
        });
        // REST transport has no SDP answer; avatar video requires the
        // engine's streaming protocol
        Ok((handle, ConnectInfo { remote_sdp: None }))
    }
}

struct RestHandle {
    client: reqwest::Client,
    config: SynthesisConfig,
    /// Bumped on every stop signal; in-flight requests watch for a change
    cancel: watch::Sender<u64>,
}

#[async_trait]
impl SynthesisHandle for RestHandle {
    async fn synthesize(&self, markup: &str) -> Result<String> {
        let mut cancel = self.cancel.subscribe();
        cancel.mark_unchanged();

        let mut request = self
            .client
            .post(&self.config.endpoint)
            .header("Content-Type", "application/ssml+xml")
            .header("X-Microsoft-OutputFormat", "audio-16khz-32kbitrate-mono-mp3")
            .body(markup.to_string());
        if let Some(endpoint_id) = &self.config.custom_voice_endpoint_id {
            request = request.header("X-DeploymentId", endpoint_id.clone());
        }
        request = request.header("Authorization", format!("Bearer {}", self.config.auth_token));

        let send = async {
            let response = request.send().await?;
            let status = response.status();
            let result_id = response
                .headers()
                .get("x-requestid")
                .and_then(|v| v.to_str().ok())
                .map_or_else(|| Uuid::new_v4().to_string(), String::from);
            if !status.is_success() {
                let body = response.text().await.unwrap_or_default();
                return Err(Error::Synthesis(format!(
                    "synthesis API error {status} (result id {result_id}): {body}"
                )));
            }
            // Drain the audio body; playback happens engine-side for the
            // avatar and is out of scope here
            let _ = response.bytes().await?;
            Ok(result_id)
        };

        tokio::select! {
            result = send => result,
            _ = cancel.changed() => {
                Err(Error::SynthesisCanceled("stop signal received".to_string()))
            }
        }
    }

    async fn send_stop(&self) {
        self.cancel.send_modify(|epoch| *epoch += 1);
        tracing::debug!("synthesis stop signaled");
    }

    async fn close(&self) {
        self.send_stop().await;
    }
}
