//! Pipeline assembly.

use super::{
    BackoffMiddleware, ErrorHandlerMiddleware, ExactlyOnceMiddleware, LoggingMiddleware,
    Middleware, Next, StopwatchMiddleware,
};
use crate::backoff::BackoffStrategy;
use crate::config::DispatchConfig;
use crate::context::HandleMessageContext;
use crate::error::{ConfigurationError, HandlerError};
use crate::handler::MessageHandler;
use crate::lock::MessageLockStore;
use crate::monitoring::MessageMonitor;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "pipeline_tests.rs"]
mod tests;

type MiddlewareFactory =
    Box<dyn FnOnce() -> Result<Arc<dyn Middleware>, ConfigurationError> + Send>;

enum MiddlewareEntry {
    Instance(Arc<dyn Middleware>),
    Factory(MiddlewareFactory),
}

/// Builds a [`HandlerPipeline`] from an ordered list of middleware.
///
/// Middleware run in the order they are added: the first one added is the
/// outermost and observes every invocation first and last.
///
/// # Examples
///
/// ```rust
/// use queue_dispatch::handler::handler_fn;
/// use queue_dispatch::middleware::PipelineBuilder;
/// use queue_dispatch::monitoring::NoOpMessageMonitor;
/// use std::sync::Arc;
///
/// let handler = handler_fn("noop", |_message, _cancel| async move { Ok(true) });
/// let pipeline = PipelineBuilder::new()
///     .use_defaults(Arc::new(NoOpMessageMonitor), None)
///     .build(Arc::new(handler))
///     .unwrap();
/// assert_eq!(pipeline.len(), 3);
/// ```
#[derive(Default)]
pub struct PipelineBuilder {
    entries: Vec<MiddlewareEntry>,
}

impl PipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a middleware instance
    pub fn use_middleware<M>(self, middleware: M) -> Self
    where
        M: Middleware + 'static,
    {
        self.use_shared(Arc::new(middleware))
    }

    /// Append a middleware instance shared with other pipelines
    pub fn use_shared(mut self, middleware: Arc<dyn Middleware>) -> Self {
        self.entries.push(MiddlewareEntry::Instance(middleware));
        self
    }

    /// Append a middleware created when the pipeline is built.
    ///
    /// The factory runs once, inside [`PipelineBuilder::build`], so it may
    /// resolve dependencies that are not available yet. A factory error
    /// fails the build.
    pub fn use_factory<F>(mut self, factory: F) -> Self
    where
        F: FnOnce() -> Result<Arc<dyn Middleware>, ConfigurationError> + Send + 'static,
    {
        let entry = MiddlewareEntry::Factory(Box::new(factory));
        self.entries.push(entry);
        self
    }

    /// Append the error boundary. Should be the first middleware added.
    pub fn use_error_handler(self, monitor: Arc<dyn MessageMonitor>) -> Self {
        self.use_middleware(ErrorHandlerMiddleware::new(monitor))
    }

    pub fn use_logging(self) -> Self {
        self.use_middleware(LoggingMiddleware::new())
    }

    /// Append handler timing, tagged with the handler's own name
    pub fn use_stopwatch(self, monitor: Arc<dyn MessageMonitor>) -> Self {
        self.use_middleware(StopwatchMiddleware::new(monitor))
    }

    /// Append the backoff guard.
    ///
    /// With no strategy nothing is added: the transport's default redelivery
    /// timing applies.
    pub fn use_backoff(
        self,
        strategy: Option<Arc<dyn BackoffStrategy>>,
        monitor: Arc<dyn MessageMonitor>,
    ) -> Self {
        match strategy {
            Some(strategy) => self.use_middleware(BackoffMiddleware::new(strategy, monitor)),
            None => self,
        }
    }

    /// Append the exactly-once guard. Locks that cannot be released after a
    /// handler error are reported to `monitor`.
    pub fn use_exactly_once(
        self,
        lock_store: Arc<dyn MessageLockStore>,
        lock_timeout: Duration,
        monitor: Arc<dyn MessageMonitor>,
    ) -> Self {
        let middleware = ExactlyOnceMiddleware::new(lock_store, lock_timeout, monitor);
        self.use_middleware(middleware)
    }

    /// Append the standard stages: error boundary, logging, stopwatch and,
    /// when a strategy is given, backoff.
    pub fn use_defaults(
        self,
        monitor: Arc<dyn MessageMonitor>,
        backoff: Option<Arc<dyn BackoffStrategy>>,
    ) -> Self {
        self.use_error_handler(Arc::clone(&monitor))
            .use_logging()
            .use_stopwatch(Arc::clone(&monitor))
            .use_backoff(backoff, monitor)
    }

    /// Append the standard stages as set up by `config`.
    ///
    /// The backoff stage uses the configured policy and is left out when
    /// backoff is disabled. With a lock store the exactly-once guard is added
    /// last, holding temporary locks for `subscription.lock_timeout`.
    pub fn use_configured(
        self,
        config: &DispatchConfig,
        monitor: Arc<dyn MessageMonitor>,
        lock_store: Option<Arc<dyn MessageLockStore>>,
    ) -> Self {
        let backoff = config
            .backoff
            .strategy()
            .map(|strategy| Arc::new(strategy) as Arc<dyn BackoffStrategy>);
        let builder = self.use_defaults(Arc::clone(&monitor), backoff);

        match lock_store {
            Some(lock_store) => {
                let lock_timeout = config.subscription.lock_timeout;
                builder.use_exactly_once(lock_store, lock_timeout, monitor)
            }
            None => builder,
        }
    }

    /// Number of middleware added so far
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolve factories and produce the pipeline ending in `handler`
    pub fn build(
        self,
        handler: Arc<dyn MessageHandler>,
    ) -> Result<HandlerPipeline, ConfigurationError> {
        let middleware = self
            .entries
            .into_iter()
            .map(|entry| match entry {
                MiddlewareEntry::Instance(middleware) => Ok(middleware),
                MiddlewareEntry::Factory(factory) => factory(),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(HandlerPipeline {
            middleware: middleware.into(),
            handler,
        })
    }
}

/// An immutable middleware chain ending in a handler.
///
/// Cloning is cheap and a single pipeline may run any number of invocations
/// concurrently; per-invocation state lives in the [`HandleMessageContext`].
#[derive(Clone)]
pub struct HandlerPipeline {
    middleware: Arc<[Arc<dyn Middleware>]>,
    handler: Arc<dyn MessageHandler>,
}

impl HandlerPipeline {
    /// Run the chain for one message.
    ///
    /// Returns whether the message was handled. An `Err` is only possible
    /// when the chain has no error boundary.
    pub async fn run(
        &self,
        context: &mut HandleMessageContext,
        cancel: &CancellationToken,
    ) -> Result<bool, HandlerError> {
        Next::new(&self.middleware, self.handler.as_ref())
            .run(context, cancel)
            .await
    }

    pub fn handler_name(&self) -> &str {
        self.handler.name()
    }

    /// Number of middleware in the chain, excluding the handler
    pub fn len(&self) -> usize {
        self.middleware.len()
    }

    pub fn is_empty(&self) -> bool {
        self.middleware.is_empty()
    }
}

impl std::fmt::Debug for HandlerPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandlerPipeline")
            .field("handler", &self.handler.name())
            .field("middleware", &self.middleware.len())
            .finish()
    }
}
