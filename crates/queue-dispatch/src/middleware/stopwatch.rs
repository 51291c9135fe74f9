//! Handler timing.

use super::{Middleware, Next};
use crate::context::HandleMessageContext;
use crate::error::HandlerError;
use crate::monitoring::MessageMonitor;
use async_trait::async_trait;
use std::sync::Arc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "stopwatch_tests.rs"]
mod tests;

/// Reports the duration of everything downstream to the monitor.
///
/// One sample is emitted per invocation, including failed ones. The result
/// and any error pass through untouched.
pub struct StopwatchMiddleware {
    monitor: Arc<dyn MessageMonitor>,
    handler_type: Option<String>,
}

impl StopwatchMiddleware {
    /// Tag samples with the name of the handler at the end of the chain
    pub fn new(monitor: Arc<dyn MessageMonitor>) -> Self {
        Self {
            monitor,
            handler_type: None,
        }
    }

    /// Tag samples with an explicit handler type instead
    pub fn with_handler_type(mut self, handler_type: impl Into<String>) -> Self {
        self.handler_type = Some(handler_type.into());
        self
    }
}

#[async_trait]
impl Middleware for StopwatchMiddleware {
    async fn handle(
        &self,
        context: &mut HandleMessageContext,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        let name = self
            .handler_type
            .clone()
            .unwrap_or_else(|| next.handler_name().to_string());

        let started = Instant::now();
        let result = next.run(context, cancel).await;
        let elapsed = started.elapsed();

        let message_type = &context.message().message_type;
        self.monitor.handler_executed(&name, message_type, elapsed);

        result
    }
}
