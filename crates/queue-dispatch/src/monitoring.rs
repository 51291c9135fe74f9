//! Observability hooks for message handling.
//!
//! The runtime reports what happens to every message through the
//! [`MessageMonitor`] trait. Infrastructure layers implement it on top of
//! their metrics backend; the runtime itself ships a no-op implementation and
//! one that writes `tracing` events.
//!
//! # Best-Effort Pattern
//!
//! Monitor calls are synchronous fire-and-forget notifications made from the
//! hot path. Implementations must never block and must never fail; an
//! implementation that needs I/O should buffer and flush on its own task.
//!
//! # Examples
//!
//! ```rust
//! use queue_dispatch::monitoring::{MessageMonitor, NoOpMessageMonitor};
//! use std::sync::Arc;
//! use std::time::Duration;
//!
//! let monitor: Arc<dyn MessageMonitor> = Arc::new(NoOpMessageMonitor);
//! monitor.increment_throttling_statistic();
//! monitor.handle_throttling_time(Duration::from_millis(40));
//! ```

use crate::error::{HandlerError, TransportError};
use crate::message::{Message, MessageType, QueueName};
use std::time::Duration;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "monitoring_tests.rs"]
mod tests;

/// Receiver of handling, error, timing and throttling events.
///
/// All methods take `&self` so a single monitor can be shared as
/// `Arc<dyn MessageMonitor>` across every worker.
pub trait MessageMonitor: Send + Sync {
    /// A message has left the pipeline, successfully or not.
    ///
    /// Reported exactly once per pipeline invocation.
    fn handled(&self, message: &Message);

    /// A handler or middleware stage raised an error for a message of
    /// `message_type`.
    fn handle_exception(&self, message_type: &MessageType, error: &HandlerError);

    /// Duration of a single handler invocation.
    ///
    /// # Parameters
    ///
    /// - `handler_type`: Name the handler was registered under
    /// - `message_type`: Runtime type of the handled message
    /// - `duration`: Wall-clock time of everything downstream of the stopwatch
    fn handler_executed(&self, handler_type: &str, message_type: &MessageType, duration: Duration);

    /// Fetching stalled because the concurrency gate was full.
    fn increment_throttling_statistic(&self);

    /// Total time one fetch cycle spent waiting for a free worker.
    fn handle_throttling_time(&self, duration: Duration);

    /// Time taken to receive one batch from `queue`.
    fn handle_receive_message_time(&self, queue: &QueueName, duration: Duration);

    /// A transport operation failed outside the handler's control.
    ///
    /// # Parameters
    ///
    /// - `queue`: Queue the operation targeted
    /// - `operation`: Operation name, e.g. `"receive"`, `"delete"`,
    ///   `"change_visibility"`
    /// - `error`: The transport error
    fn handle_transport_error(&self, queue: &QueueName, operation: &str, error: &TransportError);
}

/// Monitor that ignores every event.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpMessageMonitor;

impl MessageMonitor for NoOpMessageMonitor {
    fn handled(&self, _message: &Message) {
        // No-op
    }

    fn handle_exception(&self, _message_type: &MessageType, _error: &HandlerError) {
        // No-op
    }

    fn handler_executed(
        &self,
        _handler_type: &str,
        _message_type: &MessageType,
        _duration: Duration,
    ) {
        // No-op
    }

    fn increment_throttling_statistic(&self) {
        // No-op
    }

    fn handle_throttling_time(&self, _duration: Duration) {
        // No-op
    }

    fn handle_receive_message_time(&self, _queue: &QueueName, _duration: Duration) {
        // No-op
    }

    fn handle_transport_error(
        &self,
        _queue: &QueueName,
        _operation: &str,
        _error: &TransportError,
    ) {
        // No-op
    }
}

/// Monitor that records every event as a `tracing` event.
///
/// Useful when no metrics backend is wired up: timings are emitted at `debug`
/// level, errors at `warn`.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingMessageMonitor;

impl MessageMonitor for TracingMessageMonitor {
    fn handled(&self, message: &Message) {
        debug!(
            message_id = %message.id,
            message_type = %message.message_type,
            "Message handled"
        );
    }

    fn handle_exception(&self, message_type: &MessageType, error: &HandlerError) {
        warn!(
            message_type = %message_type,
            category = error.category(),
            error = %error,
            "Message handler raised an error"
        );
    }

    fn handler_executed(&self, handler_type: &str, message_type: &MessageType, duration: Duration) {
        debug!(
            handler_type,
            message_type = %message_type,
            duration_ms = duration.as_millis() as u64,
            "Handler executed"
        );
    }

    fn increment_throttling_statistic(&self) {
        debug!("Message fetching throttled");
    }

    fn handle_throttling_time(&self, duration: Duration) {
        debug!(
            duration_ms = duration.as_millis() as u64,
            "Waited for available workers"
        );
    }

    fn handle_receive_message_time(&self, queue: &QueueName, duration: Duration) {
        debug!(
            queue = %queue,
            duration_ms = duration.as_millis() as u64,
            "Received message batch"
        );
    }

    fn handle_transport_error(&self, queue: &QueueName, operation: &str, error: &TransportError) {
        warn!(
            queue = %queue,
            operation,
            transient = error.is_transient(),
            error = %error,
            "Transport operation failed"
        );
    }
}
