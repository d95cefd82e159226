//! Error types for the devtools daemon

use thiserror::Error;

/// Main error type for daemon operations.
///
/// Timeouts carry no variant of their own: an expired inspection answers
/// the client as `NotFound`, and an expired `wait` reports
/// `{met:false, timeout:true}` in response data.
#[derive(Error, Debug)]
pub enum DevtoolsError {
    #[error("Component {reference} not found")]
    NotFound { reference: String },

    #[error("{message}")]
    NotReady { message: String },

    #[error("Malformed operations batch: {message}")]
    MalformedBatch { message: String },

    #[error("Transport error: {message}")]
    Transport { message: String },

    #[error("Failed to bind {what}: {message}")]
    BindFailure { what: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl DevtoolsError {
    /// NotFound for a component id or label, echoing the reference as the
    /// client wrote it
    pub fn component_not_found(reference: impl std::fmt::Display) -> Self {
        Self::NotFound {
            reference: reference.to_string(),
        }
    }

    pub fn not_ready(message: impl Into<String>) -> Self {
        Self::NotReady {
            message: message.into(),
        }
    }

    pub fn malformed(message: impl Into<String>) -> Self {
        Self::MalformedBatch {
            message: message.into(),
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
        }
    }
}

/// Result type alias for daemon operations
pub type Result<T> = std::result::Result<T, DevtoolsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_message_matches_client_contract() {
        let err = DevtoolsError::component_not_found(3);
        assert_eq!(err.to_string(), "Component 3 not found");

        let err = DevtoolsError::component_not_found("@c7");
        assert_eq!(err.to_string(), "Component @c7 not found");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::AddrInUse, "busy");
        let err: DevtoolsError = io.into();
        assert!(matches!(err, DevtoolsError::Io(_)));
    }
}
