use thiserror::Error;

use crate::trust::TrustError;

/// Errors that can occur in the supervisor agent.
#[derive(Error, Debug)]
pub enum AgentError {
    /// IO error occurred (file operations, directory creation, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error (invalid config, missing fields, etc.)
    #[error("Configuration error: {0}")]
    Config(String),

    /// Native monitor subsystem fault (handle-level failure, not a result code)
    #[error("Monitor error: {0}")]
    Monitor(String),

    /// Worker lifecycle hook reported a failure
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Command name not present in the callback registry
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Peer certificate failed trust validation
    #[error("Trust error: {0}")]
    Trust(#[from] TrustError),
}

/// Result type alias for agent operations.
pub type Result<T> = std::result::Result<T, AgentError>;

impl From<toml::ser::Error> for AgentError {
    fn from(e: toml::ser::Error) -> Self {
        AgentError::Serialization(e.to_string())
    }
}

impl From<toml::de::Error> for AgentError {
    fn from(e: toml::de::Error) -> Self {
        AgentError::Serialization(e.to_string())
    }
}

impl From<serde_json::Error> for AgentError {
    fn from(e: serde_json::Error) -> Self {
        AgentError::Serialization(e.to_string())
    }
}
