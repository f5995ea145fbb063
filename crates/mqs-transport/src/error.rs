//! Error types for channel and remote service operations.

use thiserror::Error;

/// Errors surfaced by channel operations
#[derive(Debug, Error)]
pub enum ChannelError {
    /// No message is currently available. Expected and non-fatal; callers
    /// back off and retry later.
    #[error("no messages available")]
    Empty,

    #[error("fanout exchanges are not supported by this transport")]
    FanoutUnsupported,

    #[error("remote service error: {0}")]
    Service(#[from] ServiceError),

    #[error("serialization failed: {0}")]
    Serialization(#[from] SerializationError),
}

impl ChannelError {
    /// Check whether this is the non-fatal empty signal
    pub fn is_empty(&self) -> bool {
        matches!(self, Self::Empty)
    }
}

/// Errors returned by the remote queue service boundary
#[derive(Debug, Error)]
pub enum ServiceError {
    #[error("queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("message not found or receipt expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("queue already exists with conflicting attributes: {queue_name}")]
    QueueConflict { queue_name: String },

    #[error("connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String },

    #[error("service fault ({code}): {message}")]
    ServiceFault { code: String, message: String },

    #[error("malformed service response: {message}")]
    MalformedResponse { message: String },

    #[error("invalid configuration: {message}")]
    InvalidConfiguration { message: String },
}

impl ServiceError {
    /// Check if error is transient and worth a retry by the caller
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::QueueConflict { .. } => false,
            Self::ConnectionFailed { .. } => true,
            Self::AuthenticationFailed { .. } => false,
            Self::ServiceFault { .. } => true,
            Self::MalformedResponse { .. } => false,
            Self::InvalidConfiguration { .. } => false,
        }
    }
}

/// Errors during envelope serialization/deserialization
#[derive(Debug, Error)]
pub enum SerializationError {
    #[error("JSON serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
