//! Error boundary for the handler pipeline.

use super::{Middleware, Next};
use crate::context::HandleMessageContext;
use crate::error::HandlerError;
use crate::monitoring::MessageMonitor;
use async_trait::async_trait;
use futures::FutureExt;
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "error_handler_tests.rs"]
mod tests;

/// Converts downstream errors and panics into an unsuccessful result.
///
/// This must be the outermost middleware: it is the only stage that never
/// returns `Err`. Every invocation, however it ends, is reported to the
/// monitor as handled exactly once.
pub struct ErrorHandlerMiddleware {
    monitor: Arc<dyn MessageMonitor>,
}

impl ErrorHandlerMiddleware {
    pub fn new(monitor: Arc<dyn MessageMonitor>) -> Self {
        Self { monitor }
    }
}

#[async_trait]
impl Middleware for ErrorHandlerMiddleware {
    async fn handle(
        &self,
        context: &mut HandleMessageContext,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        let outcome = AssertUnwindSafe(next.run(context, cancel))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(HandlerError::Panicked {
                    message: panic_message(payload.as_ref()),
                })
            });

        let handled = match outcome {
            Ok(handled) => handled,
            Err(error) => {
                let message_type = context.message_type();
                self.monitor.handle_exception(message_type, &error);
                context.set_last_error(error);
                false
            }
        };

        self.monitor.handled(context.message());
        Ok(handled)
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "handler panicked with a non-string payload".to_string()
    }
}
