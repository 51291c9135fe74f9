//! Error types for message dispatch and handler execution.

use std::time::Duration;
use thiserror::Error;

/// Error raised by a message handler, or by a middleware stage wrapping it.
///
/// Any `Err` travelling up the pipeline is the equivalent of an exception:
/// the error boundary converts it into an unsuccessful (`false`) result.
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error("Handler failed: {message}")]
    Failed { message: String },

    #[error("Handler failed: {0}")]
    Source(#[from] Box<dyn std::error::Error + Send + Sync>),

    #[error("Handler panicked: {message}")]
    Panicked { message: String },

    #[error("Message lock operation failed: {0}")]
    Lock(#[from] LockError),

    #[error("Handling was cancelled")]
    Cancelled,
}

impl HandlerError {
    /// Create a failure with a plain description
    pub fn failed(message: impl Into<String>) -> Self {
        Self::Failed {
            message: message.into(),
        }
    }

    /// Wrap an arbitrary error raised by handler code
    pub fn from_error<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Source(Box::new(error))
    }

    /// Short category name used when reporting to a monitor
    pub fn category(&self) -> &'static str {
        match self {
            Self::Failed { .. } => "handler",
            Self::Source(_) => "handler",
            Self::Panicked { .. } => "panic",
            Self::Lock(_) => "lock",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Errors reported by a message lock store
#[derive(Debug, Error)]
pub enum LockError {
    #[error("Lock store unavailable: {message}")]
    Unavailable { message: String },

    #[error("Lock operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Invalid lock key '{key}': {message}")]
    InvalidKey { key: String, message: String },
}

/// Errors reported by a transport message source
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("Queue not found: {queue_name}")]
    QueueNotFound { queue_name: String },

    #[error("Message not found or receipt expired: {receipt}")]
    MessageNotFound { receipt: String },

    #[error("Operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("Connection failed: {message}")]
    ConnectionFailed { message: String },

    #[error("Permission denied for operation: {operation}")]
    PermissionDenied { operation: String },

    #[error("Provider error ({provider}): {code} - {message}")]
    ProviderError {
        provider: String,
        code: String,
        message: String,
    },
}

impl TransportError {
    /// Check if error is transient and the operation may succeed when retried
    pub fn is_transient(&self) -> bool {
        match self {
            Self::QueueNotFound { .. } => false,
            Self::MessageNotFound { .. } => false,
            Self::Timeout { .. } => true,
            Self::ConnectionFailed { .. } => true,
            Self::PermissionDenied { .. } => false,
            Self::ProviderError { .. } => true,
        }
    }

    /// Get suggested delay before the operation is attempted again
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Timeout { .. } => Some(Duration::from_secs(1)),
            Self::ConnectionFailed { .. } => Some(Duration::from_secs(5)),
            _ => None,
        }
    }
}

/// Errors returned by [`crate::rate_limit::RateLimiter::wait`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum RateLimitError {
    #[error("Waiting for a rate limit token was cancelled")]
    Cancelled,

    #[error("Rate limiter has been disposed")]
    Disposed,
}

/// Configuration errors. Always raised at construction time.
#[derive(Debug, Error)]
pub enum ConfigurationError {
    #[error("Invalid configuration: {message}")]
    Invalid { message: String },

    #[error("Missing required configuration: {key}")]
    Missing { key: String },

    #[error("Configuration parsing failed: {message}")]
    Parsing { message: String },

    #[error(
        "A handler is already registered for message type '{message_type}' on queue '{queue}'"
    )]
    DuplicateHandler { queue: String, message_type: String },

    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

/// Validation errors for domain identifiers
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("Required field missing: {field}")]
    Required { field: String },

    #[error("Invalid format for {field}: {message}")]
    InvalidFormat { field: String, message: String },

    #[error("Value out of range for {field}: {message}")]
    OutOfRange { field: String, message: String },
}

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
