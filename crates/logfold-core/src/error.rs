//! Error types for logfold.

use thiserror::Error;

/// Result type alias using logfold's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for logfold operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Database operation failed (wraps sqlx::Error)
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Invalid input (empty record, non-positive chunk size, ...)
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Operation on a closed or already-consumed reader/listener
    #[error("Lifecycle error: {0}")]
    Lifecycle(String),

    /// Filter could not be evaluated (malformed message regex)
    #[error("Filter error: {0}")]
    Filter(String),

    /// Serialization/deserialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Authentication failed
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Internal error
    #[error("Internal error: {0}")]
    Internal(String),

    /// File I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display_invalid_input() {
        let err = Error::InvalidInput("empty message".to_string());
        assert_eq!(err.to_string(), "Invalid input: empty message");
    }

    #[test]
    fn test_error_display_lifecycle() {
        let err = Error::Lifecycle("stream already started".to_string());
        assert_eq!(err.to_string(), "Lifecycle error: stream already started");
    }

    #[test]
    fn test_error_display_filter() {
        let err = Error::Filter("unclosed group".to_string());
        assert_eq!(err.to_string(), "Filter error: unclosed group");
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_err = serde_json::from_str::<i32>("not a number").unwrap_err();
        let err: Error = json_err.into();
        match err {
            Error::Serialization(msg) => assert!(!msg.is_empty()),
            _ => panic!("Expected Serialization error"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: Error = io_err.into();
        assert!(err.to_string().contains("I/O error:"));
    }

    #[test]
    fn test_error_is_send_sync() {
        fn assert_send<T: Send>() {}
        fn assert_sync<T: Sync>() {}

        assert_send::<Error>();
        assert_sync::<Error>();
    }
}
