use thiserror::Error;

use crate::core::types::RequestId;

/// Errors surfaced by the tracing API itself.
///
/// These are usage errors of the measurement layer. Failures inside measured
/// regions are never converted into this type; they propagate to the caller
/// unchanged and are only recorded on the closed span.
#[derive(Error, Debug)]
pub enum ReqspanError {
    #[error("a trace context for request {current} is already active on this thread (requested {requested})")]
    ContextAlreadyActive {
        current: RequestId,
        requested: RequestId,
    },

    #[error("end called with no active trace context (request {0})")]
    NoActiveContext(RequestId),

    #[error("handle for request {handle} does not match the active context for request {active}")]
    HandleMismatch {
        handle: RequestId,
        active: RequestId,
    },

    #[error("invalid request id: {0}")]
    InvalidRequestId(String),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("response payload is not a JSON object: {0}")]
    InvalidPayload(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias for reqspan operations.
pub type Result<T> = std::result::Result<T, ReqspanError>;

impl ReqspanError {
    /// Creates a new configuration error.
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new invalid-payload error.
    pub fn invalid_payload<S: Into<String>>(msg: S) -> Self {
        Self::InvalidPayload(msg.into())
    }

    /// Returns the error category for logging.
    pub fn category(&self) -> &'static str {
        match self {
            Self::ContextAlreadyActive { .. }
            | Self::NoActiveContext(_)
            | Self::HandleMismatch { .. } => "usage",
            Self::InvalidRequestId(_) => "validation",
            Self::Config(_) => "config",
            Self::InvalidPayload(_) | Self::Serialization(_) => "serialization",
            Self::Io(_) => "io",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = ReqspanError::config("bad threshold");
        assert_eq!(err.to_string(), "configuration error: bad threshold");
        assert_eq!(err.category(), "config");
    }

    #[test]
    fn test_usage_error_category() {
        let id = RequestId::new("req_1".to_string()).unwrap();
        assert_eq!(ReqspanError::NoActiveContext(id).category(), "usage");
    }
}
