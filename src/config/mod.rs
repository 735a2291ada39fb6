//! Configuration management for the avatar gateway
//!
//! Layering: built-in defaults, then the optional TOML file, then
//! environment variables. Environment wins.

pub mod file;

use std::path::PathBuf;

use crate::{Error, Result};
use file::GatewayConfigFile;

/// Default synthesis voice
pub const DEFAULT_VOICE: &str = "en-US-AmandaMultilingualNeural";

/// Default greeting spoken after avatar connect
pub const DEFAULT_GREETING: &str =
    "Hello! I'm your clinical assistant. Please provide the patient's name.";

/// Default word cap applied to a full assistant reply
pub const DEFAULT_REPLY_WORD_CAP: usize = 20;

/// Canned quick replies, used while a slow completion is pending
pub const QUICK_REPLIES: &[&str] = &["Let me take a look.", "Let me check.", "One moment, please."];

/// Gateway configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Speech service configuration
    pub speech: SpeechConfig,

    /// Completion service configuration
    pub completion: CompletionConfig,

    /// Record store configuration (optional; lookup tools disabled without it)
    pub records: Option<RecordsConfig>,

    /// Static TURN server override for avatar relay
    pub ice_override: Option<IceOverride>,

    /// Dialogue behavior configuration
    pub dialogue: DialogueConfig,

    /// Port to listen on
    pub port: u16,

    /// Idle session timeout in seconds (0 disables the sweeper)
    pub idle_timeout_secs: u64,
}

/// Speech service (recognition + synthesis) configuration
#[derive(Debug, Clone)]
pub struct SpeechConfig {
    /// Service region, e.g. "westus2"
    pub region: String,

    /// Subscription key
    pub key: Option<String>,

    /// Private endpoint URL (optional)
    pub private_endpoint: Option<String>,

    /// Use bearer-token auth instead of the subscription key
    pub token_auth: bool,

    /// Default synthesis voice identifier
    pub default_voice: String,

    /// Batch transcription model identifier
    pub transcription_model: String,
}

impl SpeechConfig {
    /// WebSocket base endpoint for synthesis connections
    #[must_use]
    pub fn synthesis_endpoint(&self) -> String {
        self.private_endpoint.as_ref().map_or_else(
            || {
                format!(
                    "wss://{}.tts.speech.microsoft.com/cognitiveservices/websocket/v1",
                    self.region
                )
            },
            |ep| format!("{}/tts/cognitiveservices/websocket/v1", to_wss(ep)),
        )
    }

    /// WebSocket base endpoint for recognition connections
    #[must_use]
    pub fn recognition_endpoint(&self) -> String {
        self.private_endpoint.as_ref().map_or_else(
            || format!("wss://{}.stt.speech.microsoft.com/speech/universal/v2", self.region),
            |ep| format!("{}/stt/speech/universal/v2", to_wss(ep)),
        )
    }

    /// HTTPS endpoint for batch utterance transcription
    #[must_use]
    pub fn transcription_endpoint(&self) -> String {
        self.private_endpoint.as_ref().map_or_else(
            || {
                format!(
                    "https://{}.api.cognitive.microsoft.com/openai/audio/transcriptions",
                    self.region
                )
            },
            |ep| format!("{ep}/openai/audio/transcriptions"),
        )
    }

    /// HTTPS endpoint issuing short-lived speech bearer tokens
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!(
            "https://{}.api.cognitive.microsoft.com/sts/v1.0/issueToken",
            self.region
        )
    }

    /// HTTPS endpoint issuing avatar relay (ICE) tokens
    #[must_use]
    pub fn relay_token_endpoint(&self) -> String {
        self.private_endpoint.as_ref().map_or_else(
            || {
                format!(
                    "https://{}.tts.speech.microsoft.com/cognitiveservices/avatar/relay/token/v1",
                    self.region
                )
            },
            |ep| format!("{ep}/tts/cognitiveservices/avatar/relay/token/v1"),
        )
    }
}

fn to_wss(endpoint: &str) -> String {
    endpoint.replacen("https://", "wss://", 1)
}

/// Completion service configuration
#[derive(Debug, Clone)]
pub struct CompletionConfig {
    /// Base endpoint URL
    pub endpoint: String,

    /// API key
    pub api_key: String,

    /// Deployment/model identifier
    pub deployment: String,

    /// Maximum tokens per reply
    pub max_tokens: u32,
}

/// Record store configuration
#[derive(Debug, Clone)]
pub struct RecordsConfig {
    /// Search endpoint URL
    pub url: String,

    /// API key
    pub api_key: String,

    /// Index name to query
    pub index: String,
}

/// Static TURN/ICE server override
#[derive(Debug, Clone)]
pub struct IceOverride {
    pub url: String,
    /// Separate URL handed to the remote side, when different from `url`
    pub remote_url: Option<String>,
    pub username: String,
    pub password: String,
}

/// Dialogue behavior configuration
#[derive(Debug, Clone)]
pub struct DialogueConfig {
    /// System prompt for the assistant
    pub system_prompt: String,

    /// Greeting spoken after avatar connect
    pub greeting: String,

    /// Word cap applied to a full assistant reply
    pub reply_word_cap: usize,

    /// Enable canned quick replies before slow completions
    pub quick_replies: bool,

    /// Repeat the interrupted sentence after a reconnect
    pub repeat_interrupted_sentence: bool,

    /// Extra lookup-trigger patterns (regex, case-insensitive)
    pub trigger_patterns: Vec<String>,

    /// Known record keys matched verbatim by the trigger policy
    pub known_record_keys: Vec<String>,
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            system_prompt: "You are a concise clinical voice assistant.".to_string(),
            greeting: DEFAULT_GREETING.to_string(),
            reply_word_cap: DEFAULT_REPLY_WORD_CAP,
            quick_replies: false,
            repeat_interrupted_sentence: true,
            trigger_patterns: Vec::new(),
            known_record_keys: Vec::new(),
        }
    }
}

impl Config {
    /// Load configuration from the optional TOML file and environment.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] when a required value (speech region,
    /// completion endpoint/key/deployment) is missing, or [`Error::Toml`]
    /// when the config file is malformed.
    pub fn load() -> Result<Self> {
        let file = Self::load_file()?.unwrap_or_default();
        Self::from_parts(&file)
    }

    /// Default config file path (`~/.config/omni/avatar-gateway/config.toml`)
    #[must_use]
    pub fn file_path() -> Option<PathBuf> {
        directories::BaseDirs::new()
            .map(|dirs| dirs.config_dir().join("omni/avatar-gateway/config.toml"))
    }

    fn load_file() -> Result<Option<GatewayConfigFile>> {
        let Some(path) = Self::file_path() else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let raw = std::fs::read_to_string(&path)?;
        let parsed = toml::from_str(&raw)?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(Some(parsed))
    }

    fn from_parts(file: &GatewayConfigFile) -> Result<Self> {
        let region = env_or("SPEECH_REGION", file.speech.region.clone())
            .ok_or_else(|| Error::Config("SPEECH_REGION is required".to_string()))?;
        let key = env_or("SPEECH_KEY", file.speech.key.clone());
        let token_auth = env_or("SPEECH_TOKEN_AUTH", None)
            .map(|v| v == "true" || v == "1")
            .or(file.speech.token_auth)
            .unwrap_or(false);
        if key.is_none() && !token_auth {
            return Err(Error::Config(
                "SPEECH_KEY is required unless token auth is enabled".to_string(),
            ));
        }

        let speech = SpeechConfig {
            region,
            key,
            private_endpoint: env_or("SPEECH_PRIVATE_ENDPOINT", file.speech.private_endpoint.clone()),
            token_auth,
            default_voice: env_or("TTS_VOICE", file.speech.default_voice.clone())
                .unwrap_or_else(|| DEFAULT_VOICE.to_string()),
            transcription_model: env_or("STT_MODEL", file.speech.transcription_model.clone())
                .unwrap_or_else(|| "whisper-1".to_string()),
        };

        let completion = CompletionConfig {
            endpoint: env_or("COMPLETION_ENDPOINT", file.completion.endpoint.clone())
                .ok_or_else(|| Error::Config("COMPLETION_ENDPOINT is required".to_string()))?,
            api_key: env_or("COMPLETION_API_KEY", file.completion.api_key.clone())
                .ok_or_else(|| Error::Config("COMPLETION_API_KEY is required".to_string()))?,
            deployment: env_or("COMPLETION_DEPLOYMENT", file.completion.deployment.clone())
                .ok_or_else(|| Error::Config("COMPLETION_DEPLOYMENT is required".to_string()))?,
            max_tokens: env_or("COMPLETION_MAX_TOKENS", None)
                .and_then(|v| v.parse().ok())
                .or(file.completion.max_tokens)
                .unwrap_or(150),
        };

        let records = match (
            env_or("RECORD_STORE_URL", file.records.url.clone()),
            env_or("RECORD_STORE_API_KEY", file.records.api_key.clone()),
            env_or("RECORD_STORE_INDEX", file.records.index.clone()),
        ) {
            (Some(url), Some(api_key), Some(index)) => Some(RecordsConfig { url, api_key, index }),
            _ => None,
        };

        let ice_override = match (
            env_or("ICE_SERVER_URL", file.ice.url.clone()),
            env_or("ICE_SERVER_USERNAME", file.ice.username.clone()),
            env_or("ICE_SERVER_PASSWORD", file.ice.password.clone()),
        ) {
            (Some(url), Some(username), Some(password)) => Some(IceOverride {
                url,
                remote_url: env_or("ICE_SERVER_URL_REMOTE", file.ice.remote_url.clone()),
                username,
                password,
            }),
            _ => None,
        };

        let defaults = DialogueConfig::default();
        let dialogue = DialogueConfig {
            system_prompt: env_or("SYSTEM_PROMPT", file.dialogue.system_prompt.clone())
                .unwrap_or(defaults.system_prompt),
            greeting: env_or("GREETING", file.dialogue.greeting.clone())
                .unwrap_or(defaults.greeting),
            reply_word_cap: env_or("REPLY_WORD_CAP", None)
                .and_then(|v| v.parse().ok())
                .or(file.dialogue.reply_word_cap)
                .unwrap_or(defaults.reply_word_cap),
            quick_replies: file.dialogue.quick_replies.unwrap_or(defaults.quick_replies),
            repeat_interrupted_sentence: file
                .dialogue
                .repeat_interrupted_sentence
                .unwrap_or(defaults.repeat_interrupted_sentence),
            trigger_patterns: file.dialogue.trigger_patterns.clone().unwrap_or_default(),
            known_record_keys: file.dialogue.known_record_keys.clone().unwrap_or_default(),
        };

        Ok(Self {
            speech,
            completion,
            records,
            ice_override,
            dialogue,
            port: env_or("GATEWAY_PORT", None)
                .and_then(|v| v.parse().ok())
                .or(file.server.port)
                .unwrap_or(18790),
            idle_timeout_secs: env_or("SESSION_IDLE_TIMEOUT_SECS", None)
                .and_then(|v| v.parse().ok())
                .or(file.server.idle_timeout_secs)
                .unwrap_or(0),
        })
    }
}

fn env_or(name: &str, fallback: Option<String>) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.is_empty()).or(fallback)
}
