//! Structured logging of handling outcomes.

use super::{Middleware, Next};
use crate::context::HandleMessageContext;
use crate::error::HandlerError;
use async_trait::async_trait;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[cfg(test)]
#[path = "logging_tests.rs"]
mod tests;

/// Writes one `tracing` event per invocation.
///
/// Successes are logged at `info`, unsuccessful results at `warn` and errors
/// at `error`. The outcome is passed through unchanged.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Middleware for LoggingMiddleware {
    async fn handle(
        &self,
        context: &mut HandleMessageContext,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        let handler = next.handler_name().to_string();
        let started = Instant::now();
        let result = next.run(context, cancel).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        let message = context.message();
        match &result {
            Ok(true) => info!(
                queue = %context.queue_name(),
                message_id = %message.id,
                message_type = %message.message_type,
                handler = %handler,
                elapsed_ms,
                "Succeeded handling message"
            ),
            Ok(false) => warn!(
                queue = %context.queue_name(),
                message_id = %message.id,
                message_type = %message.message_type,
                handler = %handler,
                elapsed_ms,
                "Failed handling message"
            ),
            Err(e) => error!(
                queue = %context.queue_name(),
                message_id = %message.id,
                message_type = %message.message_type,
                handler = %handler,
                elapsed_ms,
                error = %e,
                "Error while handling message"
            ),
        }

        result
    }
}
