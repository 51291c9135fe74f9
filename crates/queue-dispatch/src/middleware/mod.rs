//! # Handler Middleware
//!
//! Every message handler runs inside a chain of middleware. Each stage sees
//! the handling context before the stages it wraps and sees their result
//! afterwards:
//!
//! ```text
//! ErrorHandler -> Logging -> Stopwatch -> Backoff -> ExactlyOnce -> handler
//! ```
//!
//! A stage implements [`Middleware`] and decides whether to call
//! [`Next::run`]. Chains are assembled with [`PipelineBuilder`]; the first
//! middleware added is the outermost.

use crate::context::HandleMessageContext;
use crate::error::HandlerError;
use crate::handler::MessageHandler;
use async_trait::async_trait;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub mod backoff;
pub mod error_handler;
pub mod exactly_once;
pub mod logging;
pub mod pipeline;
pub mod stopwatch;

pub use backoff::BackoffMiddleware;
pub use error_handler::ErrorHandlerMiddleware;
pub use exactly_once::ExactlyOnceMiddleware;
pub use logging::LoggingMiddleware;
pub use pipeline::{HandlerPipeline, PipelineBuilder};
pub use stopwatch::StopwatchMiddleware;

/// One stage of a handler pipeline.
///
/// Implementations call `next.run(context, cancel)` to continue down the
/// chain, or return without calling it to short-circuit. Unless a stage has a
/// specific reason to, it should return the downstream result unchanged and
/// pass `cancel` through as given.
#[async_trait]
pub trait Middleware: Send + Sync {
    async fn handle(
        &self,
        context: &mut HandleMessageContext,
        next: Next<'_>,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError>;
}

/// The remainder of a pipeline, as seen from inside a middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Middleware>],
    handler: &'a dyn MessageHandler,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        remaining: &'a [Arc<dyn Middleware>],
        handler: &'a dyn MessageHandler,
    ) -> Self {
        Self { remaining, handler }
    }

    /// Run the rest of the chain, ending with the handler.
    pub async fn run(
        self,
        context: &mut HandleMessageContext,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        match self.remaining.split_first() {
            Some((current, rest)) => {
                current
                    .handle(context, Next::new(rest, self.handler), cancel)
                    .await
            }
            None => self.handler.handle(context.message(), cancel).await,
        }
    }

    /// Name of the handler at the end of the chain
    pub fn handler_name(&self) -> &str {
        self.handler.name()
    }
}
