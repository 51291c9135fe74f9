//! Exactly-once handling guard.
//!
//! Lock state for one message+handler key moves through
//!
//! ```text
//! Unlocked -> TemporarilyLocked -> PermanentlyLocked
//!                               -> Released (handler error)
//! ```
//!
//! and falls back to `Unlocked` when a temporary lock times out inside the
//! lock store.

use super::{Middleware, Next};
use crate::context::HandleMessageContext;
use crate::error::HandlerError;
use crate::lock::MessageLockStore;
use crate::monitoring::MessageMonitor;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

#[cfg(test)]
#[path = "exactly_once_tests.rs"]
mod tests;

/// Ensures a message is handled successfully at most once per handler.
///
/// - permanently locked: the message was already handled, return `true`
///   without calling the handler so the transport drops the redelivery
/// - locked by another consumer: return `false` and let it be redelivered
/// - acquired: run the handler; promote the lock to permanent on success,
///   release it if the handler errors
///
/// An unsuccessful result without an error keeps the temporary lock until it
/// expires, which also spaces out the next attempt. A lock that cannot be
/// released after a handler error is reported to the monitor.
pub struct ExactlyOnceMiddleware {
    lock_store: Arc<dyn MessageLockStore>,
    lock_timeout: Duration,
    lock_key_suffix: Option<String>,
    monitor: Arc<dyn MessageMonitor>,
}

impl ExactlyOnceMiddleware {
    pub fn new(
        lock_store: Arc<dyn MessageLockStore>,
        lock_timeout: Duration,
        monitor: Arc<dyn MessageMonitor>,
    ) -> Self {
        Self {
            lock_store,
            lock_timeout,
            lock_key_suffix: None,
            monitor,
        }
    }

    /// Use `suffix` instead of the handler name to identify the handler in
    /// lock keys
    pub fn with_lock_key_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.lock_key_suffix = Some(suffix.into());
        self
    }

    fn lock_key(&self, context: &HandleMessageContext, handler_name: &str) -> String {
        let suffix = self.lock_key_suffix.as_deref().unwrap_or(handler_name);
        format!(
            "{}-{}",
            context.message().unique_key(),
            suffix.to_lowercase()
        )
    }
}

#[async_trait]
impl Middleware for ExactlyOnceMiddleware {
    async fn handle(
        &self,
        context: &mut HandleMessageContext,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        let lock_key = self.lock_key(context, next.handler_name());

        let response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(HandlerError::Cancelled),
            response = self.lock_store.try_acquire_lock(&lock_key, self.lock_timeout) => response?,
        };

        if !response.exclusive {
            if response.permanent {
                debug!(
                    lock_key = %lock_key,
                    message_id = %context.message().id,
                    "Message already handled; skipping redelivery"
                );
                return Ok(true);
            }

            debug!(
                lock_key = %lock_key,
                message_id = %context.message().id,
                "Message is locked by another consumer; leaving for redelivery"
            );
            return Ok(false);
        }

        match next.run(context, cancel).await {
            Ok(true) => {
                self.lock_store
                    .try_acquire_lock_permanently(&lock_key)
                    .await?;
                Ok(true)
            }
            Ok(false) => Ok(false),
            Err(error) => {
                if let Err(release_error) = self.lock_store.release_lock(&lock_key).await {
                    warn!(
                        lock_key = %lock_key,
                        error = %release_error,
                        "Failed to release message lock after handler error"
                    );
                    let lock_error = HandlerError::Lock(release_error);
                    let message_type = context.message_type();
                    self.monitor.handle_exception(message_type, &lock_error);
                }
                Err(error)
            }
        }
    }
}
