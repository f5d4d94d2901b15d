//! Error types for Relay
//!
//! Every library error funnels through [`Error`].

use thiserror::Error;

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;

/// Relay error type
#[derive(Error, Debug)]
pub enum Error {
    // ========================================================================
    // Configuration
    // ========================================================================
    #[error("Configuration error: {0}")]
    Config(String),

    // ========================================================================
    // Storage
    // ========================================================================
    #[error("Storage error: {0}")]
    Storage(String),

    // ========================================================================
    // Process
    // ========================================================================
    #[error("Process error: {0}")]
    Process(String),

    // ========================================================================
    // General
    // ========================================================================
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    // ========================================================================
    // Conversions
    // ========================================================================
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Storage error with the offending path in the message
    pub fn storage(path: &std::path::Path, message: impl std::fmt::Display) -> Self {
        Error::Storage(format!("{}: {}", path.display(), message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_storage_message_has_path() {
        let err = Error::storage(std::path::Path::new("/tmp/x.json"), "boom");
        assert_eq!(err.to_string(), "Storage error: /tmp/x.json: boom");
    }
}
