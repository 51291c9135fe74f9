//! Message handlers: application code at the end of every pipeline.

use crate::error::HandlerError;
use crate::message::Message;
use async_trait::async_trait;
use std::future::Future;
use std::marker::PhantomData;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "handler_tests.rs"]
mod tests;

/// Application handler for one message type.
///
/// Returning `Ok(true)` means the message was handled and can be removed from
/// the queue. `Ok(false)` and `Err(_)` both leave the message for redelivery;
/// an error is additionally reported to the monitor.
///
/// Handlers may observe `cancel` to stop early during shutdown, but are not
/// required to.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    async fn handle(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError>;

    /// Identity used for metrics tags and exactly-once lock keys.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Handler built from an async closure. See [`handler_fn`].
pub struct FnHandler<F, Fut> {
    name: String,
    f: F,
    _future: PhantomData<fn() -> Fut>,
}

/// Build a handler from an async closure.
///
/// The closure receives an owned copy of the message (bodies are
/// reference-counted, so this is cheap) and the cancellation token.
///
/// # Examples
///
/// ```rust
/// use queue_dispatch::handler::{handler_fn, MessageHandler};
///
/// let handler = handler_fn("audit", |message, _cancel| async move {
///     tracing::info!(message_id = %message.id, "Auditing message");
///     Ok(true)
/// });
/// assert_eq!(handler.name(), "audit");
/// ```
pub fn handler_fn<F, Fut>(name: impl Into<String>, f: F) -> FnHandler<F, Fut>
where
    F: Fn(Message, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, HandlerError>> + Send,
{
    FnHandler {
        name: name.into(),
        f,
        _future: PhantomData,
    }
}

#[async_trait]
impl<F, Fut> MessageHandler for FnHandler<F, Fut>
where
    F: Fn(Message, CancellationToken) -> Fut + Send + Sync,
    Fut: Future<Output = Result<bool, HandlerError>> + Send,
{
    async fn handle(
        &self,
        message: &Message,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        (self.f)(message.clone(), cancel.clone()).await
    }

    fn name(&self) -> &str {
        &self.name
    }
}
