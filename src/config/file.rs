//! TOML configuration file loading
//!
//! Supports `~/.config/omni/avatar-gateway/config.toml` as a persistent
//! config source. All fields are optional; the file is a partial overlay
//! applied before environment variables.

use serde::Deserialize;

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Deserialize)]
pub struct GatewayConfigFile {
    /// Speech service (recognition + synthesis) configuration
    #[serde(default)]
    pub speech: SpeechFileConfig,

    /// Completion service configuration
    #[serde(default)]
    pub completion: CompletionFileConfig,

    /// Record store configuration
    #[serde(default)]
    pub records: RecordsFileConfig,

    /// Static TURN server override for avatar relay
    #[serde(default)]
    pub ice: IceFileConfig,

    /// Dialogue behavior configuration
    #[serde(default)]
    pub dialogue: DialogueFileConfig,

    /// Server/runtime configuration
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Speech service configuration
#[derive(Debug, Default, Deserialize)]
pub struct SpeechFileConfig {
    /// Service region (e.g. "westus2")
    pub region: Option<String>,

    /// Subscription key
    pub key: Option<String>,

    /// Private endpoint URL (optional)
    pub private_endpoint: Option<String>,

    /// Use bearer-token auth instead of the subscription key
    pub token_auth: Option<bool>,

    /// Default synthesis voice identifier
    pub default_voice: Option<String>,

    /// Batch transcription model identifier
    pub transcription_model: Option<String>,
}

/// Completion service configuration
#[derive(Debug, Default, Deserialize)]
pub struct CompletionFileConfig {
    /// Base endpoint URL
    pub endpoint: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Deployment/model identifier
    pub deployment: Option<String>,

    /// Maximum tokens per reply
    pub max_tokens: Option<u32>,
}

/// Record store configuration
#[derive(Debug, Default, Deserialize)]
pub struct RecordsFileConfig {
    /// Search endpoint URL
    pub url: Option<String>,

    /// API key
    pub api_key: Option<String>,

    /// Index name to query
    pub index: Option<String>,
}

/// Static TURN/ICE server override
#[derive(Debug, Default, Deserialize)]
pub struct IceFileConfig {
    pub url: Option<String>,
    /// Separate URL handed to the remote side, when different from `url`
    pub remote_url: Option<String>,
    pub username: Option<String>,
    pub password: Option<String>,
}

/// Dialogue behavior configuration
#[derive(Debug, Default, Deserialize)]
pub struct DialogueFileConfig {
    /// System prompt for the assistant
    pub system_prompt: Option<String>,

    /// Greeting spoken after avatar connect
    pub greeting: Option<String>,

    /// Word cap applied to a full assistant reply
    pub reply_word_cap: Option<usize>,

    /// Enable canned quick replies before slow completions
    pub quick_replies: Option<bool>,

    /// Repeat the interrupted sentence after a reconnect
    pub repeat_interrupted_sentence: Option<bool>,

    /// Extra lookup-trigger patterns (regex, case-insensitive)
    pub trigger_patterns: Option<Vec<String>>,

    /// Known record keys matched verbatim by the trigger policy
    pub known_record_keys: Option<Vec<String>>,
}

/// Server/runtime configuration
#[derive(Debug, Default, Deserialize)]
pub struct ServerFileConfig {
    /// Port to listen on
    pub port: Option<u16>,

    /// Idle session timeout in seconds (0 disables the sweeper)
    pub idle_timeout_secs: Option<u64>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_parses_to_defaults() {
        let parsed: GatewayConfigFile = toml::from_str("").unwrap();
        assert!(parsed.speech.region.is_none());
        assert!(parsed.dialogue.reply_word_cap.is_none());
    }

    #[test]
    fn partial_file_overlays() {
        let parsed: GatewayConfigFile = toml::from_str(
            r#"
            [speech]
            region = "westus2"

            [dialogue]
            reply_word_cap = 20
            trigger_patterns = ["patient\\s+is"]
            "#,
        )
        .unwrap();
        assert_eq!(parsed.speech.region.as_deref(), Some("westus2"));
        assert_eq!(parsed.dialogue.reply_word_cap, Some(20));
        assert_eq!(parsed.dialogue.trigger_patterns.unwrap().len(), 1);
    }
}
