//! Bayeux client error types.

use thiserror::Error;

/// Bayeux client errors
#[derive(Error, Debug)]
pub enum BayeuxError {
    // === Lifecycle Errors ===
    #[error("Invalid session state: {0}")]
    InvalidState(String),

    #[error("Transport negotiation failed: {0}")]
    NegotiationFailed(String),

    #[error("Transport error: {0}")]
    Transport(String),

    // === Protocol Errors ===
    #[error("Protocol error: {0}")]
    Protocol(String),

    #[error("Invalid channel name: {0}")]
    InvalidChannel(String),

    #[error("Message is frozen")]
    FrozenMessage,

    // === Pipeline Errors ===
    #[error("Extension error: {0}")]
    Extension(String),

    #[error("Listener error: {0}")]
    Listener(String),

    // === Configuration Errors ===
    #[error("Config error: {0}")]
    Config(String),

    // === Standard Errors ===
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for Bayeux operations
pub type Result<T> = std::result::Result<T, BayeuxError>;

impl From<toml::de::Error> for BayeuxError {
    fn from(err: toml::de::Error) -> Self {
        BayeuxError::Config(err.to_string())
    }
}
