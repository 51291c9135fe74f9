//! Backoff guard: spaces out redeliveries of failing messages.

use super::{Middleware, Next};
use crate::backoff::BackoffStrategy;
use crate::context::HandleMessageContext;
use crate::error::HandlerError;
use crate::monitoring::MessageMonitor;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;

/// Extends a failed message's visibility window by a strategy-computed delay.
///
/// Runs only when the downstream result is unsuccessful (`Ok(false)` or
/// `Err`). The delay is derived from the transport's approximate receive
/// count; when that attribute is missing or unparseable the message keeps the
/// transport's default redelivery timing.
///
/// Failing to change visibility is logged and reported but never replaces the
/// downstream outcome.
pub struct BackoffMiddleware {
    strategy: Arc<dyn BackoffStrategy>,
    monitor: Arc<dyn MessageMonitor>,
}

impl BackoffMiddleware {
    pub fn new(strategy: Arc<dyn BackoffStrategy>, monitor: Arc<dyn MessageMonitor>) -> Self {
        Self { strategy, monitor }
    }

    async fn try_update_visibility(
        &self,
        context: &HandleMessageContext,
        error: Option<&HandlerError>,
    ) {
        let Some(delivery_count) = context.approximate_receive_count() else {
            debug!(
                queue = %context.queue_name(),
                message_id = %context.message().id,
                "No usable receive count; leaving default redelivery timing"
            );
            return;
        };

        let last_error = error.or_else(|| context.last_error());
        let delay = self
            .strategy
            .backoff_duration(context.message(), delivery_count, last_error);

        match context.update_visibility(delay).await {
            Ok(()) => debug!(
                queue = %context.queue_name(),
                message_id = %context.message().id,
                delivery_count,
                delay_ms = delay.as_millis() as u64,
                "Extended visibility of failed message"
            ),
            Err(e) => {
                warn!(
                    queue = %context.queue_name(),
                    message_id = %context.message().id,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Failed to update message visibility timeout during backoff"
                );
                self.monitor
                    .handle_transport_error(context.queue_name(), "change_visibility", &e);
            }
        }
    }
}

#[async_trait]
impl Middleware for BackoffMiddleware {
    async fn handle(
        &self,
        context: &mut HandleMessageContext,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        match next.run(context, cancel).await {
            Ok(true) => Ok(true),
            Ok(false) => {
                self.try_update_visibility(context, None).await;
                Ok(false)
            }
            Err(error) => {
                self.try_update_visibility(context, Some(&error)).await;
                Err(error)
            }
        }
    }
}
