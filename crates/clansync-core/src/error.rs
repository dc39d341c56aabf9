//! Error types for the clan sync system
//!
//! This module defines all error types used throughout the crate.
//!
//! Only [`Error::Authentication`] is fatal: it is raised when the remote
//! entity source cannot be initialized at startup. Every other variant is
//! recoverable and is logged by the component that observes it.

use thiserror::Error;

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for the clan sync system
#[derive(Error, Debug)]
pub enum Error {
    /// Remote entity no longer exists, or its tag is unknown upstream
    #[error("Entity not found: {0}")]
    NotFound(String),

    /// Remote source is temporarily unavailable system-wide
    #[error("Remote source in maintenance: {0}")]
    Maintenance(String),

    /// Storage connection could not be established
    #[error("Storage unavailable: {0}")]
    StorageUnavailable(String),

    /// Storage read or write failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Remote source rejected our credentials at startup
    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Remote source returned something we could not use
    #[error("Entity source error: {0}")]
    Source(String),

    /// HTTP transport errors
    #[error("HTTP error: {0}")]
    Http(String),

    /// Tag failed normalization or validation
    #[error("Invalid tag: {0}")]
    InvalidTag(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// A dispatcher handler reported a failure
    #[error("Handler error ({event}): {message}")]
    Handler {
        /// Event type the handler was registered for
        event: String,
        /// Error message
        message: String,
    },

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create a "not found" error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a maintenance error
    pub fn maintenance(msg: impl Into<String>) -> Self {
        Self::Maintenance(msg.into())
    }

    /// Create a storage-unavailable error
    pub fn storage_unavailable(msg: impl Into<String>) -> Self {
        Self::StorageUnavailable(msg.into())
    }

    /// Create a storage error
    pub fn storage(msg: impl Into<String>) -> Self {
        Self::Storage(msg.into())
    }

    /// Create an authentication error
    pub fn auth(msg: impl Into<String>) -> Self {
        Self::Authentication(msg.into())
    }

    /// Create an entity source error
    pub fn upstream(msg: impl Into<String>) -> Self {
        Self::Source(msg.into())
    }

    /// Create an HTTP error
    pub fn http(msg: impl Into<String>) -> Self {
        Self::Http(msg.into())
    }

    /// Create an invalid tag error
    pub fn invalid_tag(msg: impl Into<String>) -> Self {
        Self::InvalidTag(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a handler error
    pub fn handler(event: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Handler {
            event: event.into(),
            message: message.into(),
        }
    }

    /// Whether the orchestrator may keep running after this error
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::Authentication(_))
    }

    /// Whether the error means the remote entity is gone
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }
}

/// Helper for converting anyhow::Error to our Error type
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_authentication_is_fatal() {
        assert!(!Error::auth("bad token").is_recoverable());
        assert!(Error::storage_unavailable("down").is_recoverable());
        assert!(Error::maintenance("upstream").is_recoverable());
        assert!(Error::not_found("#2PP").is_recoverable());
    }

    #[test]
    fn anyhow_errors_become_other() {
        let err: Error = anyhow::anyhow!("boom").into();
        assert!(matches!(err, Error::Other(ref m) if m == "boom"));
    }
}
