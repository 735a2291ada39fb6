//! Error types for the avatar gateway

use thiserror::Error;

/// Result type alias for gateway operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the avatar gateway
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error
    #[error("configuration error: {0}")]
    Config(String),

    /// Session not found in the registry
    #[error("session not found: {0}")]
    SessionNotFound(String),

    /// Speech recognition error
    #[error("recognition error: {0}")]
    Recognition(String),

    /// Speech synthesis error
    #[error("synthesis error: {0}")]
    Synthesis(String),

    /// Synthesis request was canceled by the engine
    #[error("synthesis canceled: {0}")]
    SynthesisCanceled(String),

    /// Completion service error
    #[error("completion error: {0}")]
    Completion(String),

    /// Record store error
    #[error("record store error: {0}")]
    RecordStore(String),

    /// Authentication token error (issuance failure or bounded wait expiry)
    #[error("token error: {0}")]
    Token(String),

    /// A speech engine connection already exists for this session
    #[error("already connected: {0}")]
    AlreadyConnected(&'static str),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP error
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// TOML parsing error
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
}
