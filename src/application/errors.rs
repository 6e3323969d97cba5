//! Application layer errors

use std::time::Duration;
use thiserror::Error;

/// Errors raised while an inbound event travels through the middleware chain.
///
/// Middleware either passes the inner error through untouched or replaces it
/// with one of its own variants when its concern is violated. Nothing here is
/// retried.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("handler timeout after {0:?}")]
    Timeout(Duration),

    #[error("rate limit exceeded for user {user_id}")]
    RateLimitExceeded { user_id: i64 },

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("request cancelled")]
    Cancelled,

    #[error("internal error: {0}")]
    Internal(String),

    /// A handler panicked with an error value as its payload
    #[error("handler panicked: {0}")]
    Panicked(#[source] Box<dyn std::error::Error + Send + Sync>),

    #[error(transparent)]
    Handler(#[from] BotError),
}

/// Coarse classification of a [`PipelineError`], cheap to copy and compare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Timeout,
    RateLimitExceeded,
    InvalidRequest,
    Cancelled,
    Internal,
    Handler,
}

impl PipelineError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::Timeout(_) => ErrorKind::Timeout,
            PipelineError::RateLimitExceeded { .. } => ErrorKind::RateLimitExceeded,
            PipelineError::InvalidRequest(_) => ErrorKind::InvalidRequest,
            PipelineError::Cancelled => ErrorKind::Cancelled,
            PipelineError::Internal(_) | PipelineError::Panicked(_) => ErrorKind::Internal,
            PipelineError::Handler(_) => ErrorKind::Handler,
        }
    }

    /// True for rejections decided before the terminal handler ran.
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            PipelineError::RateLimitExceeded { .. } | PipelineError::InvalidRequest(_)
        )
    }
}

impl ErrorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::Timeout => "timeout",
            ErrorKind::RateLimitExceeded => "rate_limited",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::Cancelled => "cancelled",
            ErrorKind::Internal => "internal",
            ErrorKind::Handler => "handler",
        }
    }
}

/// General bot errors returned by the domain handler and its collaborators
#[derive(Error, Debug)]
pub enum BotError {
    #[error("Validation error for field {field}: {message}")]
    Validation { field: String, message: String },

    #[error("User not found with id {0}")]
    UserNotFound(i64),

    #[error("User {0} is already active")]
    AlreadyActive(i64),

    #[error("Quota usage {used} exceeds limit {limit}")]
    QuotaExceeded { used: i64, limit: i64 },

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl BotError {
    pub fn validation(field: impl Into<String>, message: impl Into<String>) -> Self {
        BotError::Validation {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Storage errors
#[derive(Error, Debug)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Duplicate key: {0}")]
    Duplicate(String),
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    #[error("Parse error: {0}")]
    Parse(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_domain_error_passes_through_transparently() {
        let err: PipelineError = BotError::UserNotFound(42).into();
        assert_eq!(err.kind(), ErrorKind::Handler);
        assert_eq!(err.to_string(), "User not found with id 42");
    }

    #[test]
    fn test_rejection_kinds() {
        assert!(PipelineError::RateLimitExceeded { user_id: 1 }.is_rejection());
        assert!(PipelineError::InvalidRequest("no sender".into()).is_rejection());
        assert!(!PipelineError::Timeout(Duration::from_secs(1)).is_rejection());
        assert!(!PipelineError::Internal("boom".into()).is_rejection());
    }
}
