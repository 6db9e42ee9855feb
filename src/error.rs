//! Error types for the wakegate engine

use thiserror::Error;

/// Result type alias for wakegate operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in the wakegate engine
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error (invalid value, named key)
    #[error("configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    /// YAML parsing error
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// Serialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
