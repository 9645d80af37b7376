//! Activity feed error types.

use thiserror::Error;

/// Crate-specific result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while configuring or driving the feed.
#[derive(Error, Debug)]
pub enum Error {
    /// Invalid scheduler or period configuration.
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Configuration (de)serialization failure.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a generic error.
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}
