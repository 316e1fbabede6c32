//! Common error types used throughout pixelforge.
//!
//! This module provides a unified error type covering the failure classes the
//! conversion engine distinguishes: security rejections, missing backends,
//! encode failures, resource exhaustion, and the usual database/IO cases.

/// Common error type for pixelforge.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The file failed a security precondition (path confinement, MIME
    /// allow-list, MIME/content mismatch, or dimension ceiling).
    #[error("Security rejected: {0}")]
    SecurityRejected(String),

    /// No capable codec backend was selected.
    #[error("No capable codec backend available")]
    BackendUnavailable,

    /// A backend failed to encode a variant.
    #[error("Encode failed: {0}")]
    EncodeFailed(String),

    /// A memory or time budget was hit.
    #[error("Resource exhausted: {0}")]
    ResourceExhausted(String),

    /// The requested asset was not found.
    #[error("Not found: {0}")]
    NotFound(String),

    /// A database operation failed.
    #[error("Database error: {0}")]
    Database(String),

    /// An I/O operation failed.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input was provided.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An internal error occurred.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a new SecurityRejected error.
    pub fn security<S: Into<String>>(msg: S) -> Self {
        Self::SecurityRejected(msg.into())
    }

    /// Create a new EncodeFailed error.
    pub fn encode<S: Into<String>>(msg: S) -> Self {
        Self::EncodeFailed(msg.into())
    }

    /// Create a new ResourceExhausted error.
    pub fn resource<S: Into<String>>(msg: S) -> Self {
        Self::ResourceExhausted(msg.into())
    }

    /// Create a new NotFound error.
    pub fn not_found<S: Into<String>>(msg: S) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create a new Database error.
    pub fn database<S: Into<String>>(msg: S) -> Self {
        Self::Database(msg.into())
    }

    /// Create a new InvalidInput error.
    pub fn invalid_input<S: Into<String>>(msg: S) -> Self {
        Self::InvalidInput(msg.into())
    }

    /// Create a new Internal error.
    pub fn internal<S: Into<String>>(msg: S) -> Self {
        Self::Internal(msg.into())
    }

    /// Whether a queue item failing with this error should re-enter the
    /// retry cycle. Security rejections and missing sources are terminal;
    /// encode failures and environment trouble may clear up on a later run.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::SecurityRejected(_) | Self::NotFound(_) | Self::InvalidInput(_) => false,
            Self::BackendUnavailable
            | Self::EncodeFailed(_)
            | Self::ResourceExhausted(_)
            | Self::Database(_)
            | Self::Io(_)
            | Self::Internal(_) => true,
        }
    }
}

/// Result type alias using the common Error type.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::security("path escapes root");
        assert_eq!(err.to_string(), "Security rejected: path escapes root");

        let err = Error::BackendUnavailable;
        assert_eq!(err.to_string(), "No capable codec backend available");

        let err = Error::encode("cwebp exited with status 1");
        assert_eq!(err.to_string(), "Encode failed: cwebp exited with status 1");

        let err = Error::not_found("asset");
        assert_eq!(err.to_string(), "Not found: asset");

        let err = Error::database("locked");
        assert_eq!(err.to_string(), "Database error: locked");
    }

    #[test]
    fn test_error_from_io() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = Error::from(io_err);
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_retryable_classification() {
        assert!(!Error::security("bad").is_retryable());
        assert!(!Error::not_found("gone").is_retryable());
        assert!(!Error::invalid_input("bad").is_retryable());
        assert!(Error::encode("boom").is_retryable());
        assert!(Error::resource("oom").is_retryable());
        assert!(Error::BackendUnavailable.is_retryable());
        assert!(Error::database("locked").is_retryable());
    }

    #[test]
    fn test_result_type() {
        fn ok_fn() -> Result<i32> {
            Ok(42)
        }
        assert_eq!(ok_fn().unwrap(), 42);

        fn err_fn() -> Result<i32> {
            Err(Error::BackendUnavailable)
        }
        assert!(err_fn().is_err());
    }
}
