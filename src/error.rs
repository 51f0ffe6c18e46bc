//! Error types for the sagitta search core.

use thiserror::Error;

/// Errors that can occur while preparing or executing queries.
#[derive(Error, Debug)]
pub enum SagittaError {
    /// No scorer with the given name is registered.
    #[error("Unknown scorer: {0}")]
    UnknownScorer(String),

    /// Scorer arguments could not be parsed.
    #[error("Malformed scorer arguments: {0}")]
    MalformedArgs(String),

    /// The requested field does not exist in this segment.
    #[error("Missing field: {0}")]
    MissingField(String),

    /// The requested column does not exist in this segment.
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A reader was opened against data written by an incompatible codec.
    #[error("Codec mismatch: {0}")]
    CodecMismatch(String),

    /// An I/O error from the underlying directory.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// The operation was cancelled by the caller.
    #[error("Operation cancelled")]
    Cancelled,

    /// An entry with the same identity already exists.
    #[error("Already present: {0}")]
    AlreadyPresent(String),

    /// A caller contract violation.
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

impl SagittaError {
    /// Create an unknown-scorer error.
    pub fn unknown_scorer<S: Into<String>>(name: S) -> Self {
        SagittaError::UnknownScorer(name.into())
    }

    /// Create a malformed-arguments error.
    pub fn malformed_args<S: Into<String>>(msg: S) -> Self {
        SagittaError::MalformedArgs(msg.into())
    }

    /// Create a missing-field error.
    pub fn missing_field<S: Into<String>>(name: S) -> Self {
        SagittaError::MissingField(name.into())
    }

    /// Create a missing-column error.
    pub fn missing_column<S: Into<String>>(name: S) -> Self {
        SagittaError::MissingColumn(name.into())
    }

    /// Create a codec-mismatch error.
    pub fn codec_mismatch<S: Into<String>>(msg: S) -> Self {
        SagittaError::CodecMismatch(msg.into())
    }

    /// Create an already-present error.
    pub fn already_present<S: Into<String>>(what: S) -> Self {
        SagittaError::AlreadyPresent(what.into())
    }

    /// Create an invalid-argument error.
    pub fn invalid_argument<S: Into<String>>(msg: S) -> Self {
        SagittaError::InvalidArgument(msg.into())
    }
}

/// Result type for sagitta operations.
pub type Result<T> = std::result::Result<T, SagittaError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = SagittaError::unknown_scorer("bm42");
        assert_eq!(err.to_string(), "Unknown scorer: bm42");

        let err = SagittaError::missing_field("body");
        assert_eq!(err.to_string(), "Missing field: body");

        let err = SagittaError::Cancelled;
        assert_eq!(err.to_string(), "Operation cancelled");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: SagittaError = io.into();
        assert!(matches!(err, SagittaError::Io(_)));
    }
}
