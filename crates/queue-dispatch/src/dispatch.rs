//! # Message Dispatch
//!
//! A [`SubscriptionGroup`] pulls batches from its sources and feeds every
//! message through the pipeline registered for its queue and type:
//!
//! ```text
//! source --receive--> gate --start_worker--> pipeline --true--> delete
//!                                                     --false-> left for redelivery
//! ```
//!
//! Each source gets its own receive loop; all loops in a group share one
//! processing strategy, so the concurrency limit applies to the group as a
//! whole. A [`MessageDispatcher`] runs several groups side by side.
//!
//! Shutdown is driven by a [`CancellationToken`]. Once it fires the loops stop
//! receiving, and `run` returns after every admitted message has finished.

use crate::config::SubscriptionConfig;
use crate::context::HandleMessageContext;
use crate::error::ConfigurationError;
use crate::message::QueueName;
use crate::middleware::HandlerPipeline;
use crate::monitoring::{MessageMonitor, NoOpMessageMonitor};
use crate::processing::{MessageProcessingStrategy, Throttled};
use crate::rate_limit::RateLimiter;
use crate::registry::HandlerRegistry;
use crate::source::{MessageSource, ReceivedMessage};
use futures::future::join_all;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

#[cfg(test)]
#[path = "dispatch_tests.rs"]
mod tests;

// ============================================================================
// Subscription Group
// ============================================================================

/// A set of sources sharing one registry, monitor and concurrency gate.
pub struct SubscriptionGroup {
    name: String,
    sources: Vec<Arc<dyn MessageSource>>,
    registry: Arc<HandlerRegistry>,
    strategy: Arc<dyn MessageProcessingStrategy>,
    monitor: Arc<dyn MessageMonitor>,
    settings: SubscriptionConfig,
    rate_limiter: Option<RateLimiter>,
}

impl SubscriptionGroup {
    pub fn builder(
        name: impl Into<String>,
        registry: Arc<HandlerRegistry>,
    ) -> SubscriptionGroupBuilder {
        SubscriptionGroupBuilder::new(name, registry)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Queues this group reads from
    pub fn queues(&self) -> impl Iterator<Item = &QueueName> {
        self.sources.iter().map(|source| source.queue_name())
    }

    /// Receive and handle messages until `cancel` fires, then wait for
    /// admitted work to finish.
    ///
    /// A group runs once; its gate and rate limiter are shut down on return.
    pub async fn run(&self, cancel: &CancellationToken) {
        info!(
            group = %self.name,
            sources = self.sources.len(),
            max_concurrency = self.settings.max_concurrency,
            max_batch_size = self.settings.max_batch_size,
            "Starting subscription group"
        );
        if cfg!(panic = "abort") {
            warn!(
                group = %self.name,
                "Built with panic=abort; a panicking handler will abort the process"
            );
        }

        join_all(
            self.sources
                .iter()
                .map(|source| self.receive_loop(Arc::clone(source), cancel)),
        )
        .await;

        debug!(group = %self.name, "Receive loops stopped; draining workers");
        self.strategy.drain().await;

        if let Some(limiter) = &self.rate_limiter {
            limiter.dispose();
        }
        info!(group = %self.name, "Subscription group stopped");
    }

    async fn receive_loop(&self, source: Arc<dyn MessageSource>, cancel: &CancellationToken) {
        let queue = source.queue_name().clone();
        debug!(group = %self.name, queue = %queue, "Receive loop started");

        while !cancel.is_cancelled() {
            if !self.strategy.wait_for_available_workers(cancel).await {
                break;
            }

            if let Some(limiter) = &self.rate_limiter {
                if limiter.wait(cancel).await.is_err() {
                    break;
                }
            }

            let max_messages = self
                .strategy
                .available_workers()
                .min(self.settings.max_batch_size as usize)
                .max(1) as u32;

            let started = Instant::now();
            let received = tokio::select! {
                biased;
                _ = cancel.cancelled() => break,
                received = source.receive_messages(max_messages, cancel) => received,
            };
            let elapsed = started.elapsed();
            self.monitor.handle_receive_message_time(&queue, elapsed);

            let messages = match received {
                Ok(messages) => messages,
                Err(e) => {
                    warn!(
                        group = %self.name,
                        queue = %queue,
                        error = %e,
                        transient = e.is_transient(),
                        "Failed to receive messages"
                    );
                    self.monitor.handle_transport_error(&queue, "receive", &e);
                    pause(self.settings.receive_error_backoff, cancel).await;
                    continue;
                }
            };

            if messages.is_empty() {
                pause(self.settings.empty_receive_delay, cancel).await;
                continue;
            }

            debug!(
                queue = %queue,
                count = messages.len(),
                "Received message batch"
            );
            for received in messages {
                self.start_message(&source, received, cancel);
            }
        }

        debug!(group = %self.name, queue = %queue, "Receive loop stopped");
    }

    fn start_message(
        &self,
        source: &Arc<dyn MessageSource>,
        received: ReceivedMessage,
        cancel: &CancellationToken,
    ) {
        let queue = source.queue_name();
        let message_type = &received.message.message_type;

        let Some(pipeline) = self.registry.get(queue, message_type).cloned() else {
            warn!(
                queue = %queue,
                message_id = %received.message.id,
                message_type = %message_type,
                "No handler registered for message type; leaving message for redelivery"
            );
            return;
        };

        let source = Arc::clone(source);
        let monitor = Arc::clone(&self.monitor);
        let cancel = cancel.clone();
        self.strategy.start_worker(
            async move { handle_message(pipeline, source, received, monitor, cancel).await }
                .boxed(),
        );
    }
}

impl std::fmt::Debug for SubscriptionGroup {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionGroup")
            .field("name", &self.name)
            .field("queues", &self.queues().collect::<Vec<_>>())
            .field("settings", &self.settings)
            .finish()
    }
}

/// Run one message through its pipeline and acknowledge it on success
async fn handle_message(
    pipeline: HandlerPipeline,
    source: Arc<dyn MessageSource>,
    received: ReceivedMessage,
    monitor: Arc<dyn MessageMonitor>,
    cancel: CancellationToken,
) {
    let receipt = received.receipt.clone();
    let mut context = HandleMessageContext::new(received, Arc::clone(&source));

    let handled = match pipeline.run(&mut context, &cancel).await {
        Ok(handled) => handled,
        Err(e) => {
            // Only reachable when the pipeline has no error boundary
            error!(
                queue = %context.queue_name(),
                message_id = %context.message().id,
                handler = %pipeline.handler_name(),
                error = %e,
                "Pipeline returned an error"
            );
            monitor.handle_exception(context.message_type(), &e);
            false
        }
    };

    if !handled {
        debug!(
            queue = %context.queue_name(),
            message_id = %context.message().id,
            "Message not handled; leaving for redelivery"
        );
        return;
    }

    if let Err(e) = source.delete_message(&receipt).await {
        warn!(
            queue = %context.queue_name(),
            message_id = %context.message().id,
            error = %e,
            "Failed to delete handled message"
        );
        monitor.handle_transport_error(context.queue_name(), "delete", &e);
    }
}

/// Sleep for `duration` unless `cancel` fires first
async fn pause(duration: Duration, cancel: &CancellationToken) {
    tokio::select! {
        _ = cancel.cancelled() => {}
        _ = tokio::time::sleep(duration) => {}
    }
}

// ============================================================================
// Builder
// ============================================================================

/// Builder for [`SubscriptionGroup`].
///
/// # Examples
///
/// ```rust
/// use queue_dispatch::config::SubscriptionConfig;
/// use queue_dispatch::dispatch::SubscriptionGroup;
/// use queue_dispatch::message::QueueName;
/// use queue_dispatch::providers::InMemoryMessageSource;
/// use queue_dispatch::registry::HandlerRegistry;
/// use std::sync::Arc;
///
/// let source = InMemoryMessageSource::new(QueueName::new("orders".to_string()).unwrap());
/// let group = SubscriptionGroup::builder("orders", Arc::new(HandlerRegistry::new()))
///     .with_source(Arc::new(source))
///     .with_settings(SubscriptionConfig::default())
///     .build()
///     .unwrap();
/// assert_eq!(group.queues().count(), 1);
/// ```
pub struct SubscriptionGroupBuilder {
    name: String,
    registry: Arc<HandlerRegistry>,
    sources: Vec<Arc<dyn MessageSource>>,
    monitor: Arc<dyn MessageMonitor>,
    strategy: Option<Arc<dyn MessageProcessingStrategy>>,
    settings: SubscriptionConfig,
}

impl SubscriptionGroupBuilder {
    pub fn new(name: impl Into<String>, registry: Arc<HandlerRegistry>) -> Self {
        Self {
            name: name.into(),
            registry,
            sources: Vec::new(),
            monitor: Arc::new(NoOpMessageMonitor),
            strategy: None,
            settings: SubscriptionConfig::default(),
        }
    }

    pub fn with_source(mut self, source: Arc<dyn MessageSource>) -> Self {
        self.sources.push(source);
        self
    }

    pub fn with_monitor(mut self, monitor: Arc<dyn MessageMonitor>) -> Self {
        self.monitor = monitor;
        self
    }

    pub fn with_settings(mut self, settings: SubscriptionConfig) -> Self {
        self.settings = settings;
        self
    }

    /// Replace the default [`Throttled`] gate
    pub fn with_processing_strategy(
        mut self,
        strategy: Arc<dyn MessageProcessingStrategy>,
    ) -> Self {
        self.strategy = Some(strategy);
        self
    }

    /// Validate settings and assemble the group.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError::Validation` for invalid settings
    /// - `ConfigurationError::Missing` when no source was added
    /// - `ConfigurationError::Invalid` when a receive rate limit is set
    ///   outside a tokio runtime
    pub fn build(self) -> Result<SubscriptionGroup, ConfigurationError> {
        self.settings.validate()?;

        if self.sources.is_empty() {
            return Err(ConfigurationError::Missing {
                key: format!("sources for subscription group '{}'", self.name),
            });
        }

        for source in &self.sources {
            let mut message_types = self.registry.message_types(source.queue_name());
            if message_types.next().is_none() {
                warn!(
                    group = %self.name,
                    queue = %source.queue_name(),
                    "No handlers registered for queue; all messages will be left for redelivery"
                );
            }
        }

        let strategy = self.strategy.unwrap_or_else(|| {
            Arc::new(Throttled::new(
                self.settings.max_concurrency,
                self.settings.max_batch_size as usize,
                Arc::clone(&self.monitor),
            ))
        });

        let rate_limiter = self
            .settings
            .max_receives_per_second
            .map(RateLimiter::new)
            .transpose()?;

        Ok(SubscriptionGroup {
            name: self.name,
            sources: self.sources,
            registry: self.registry,
            strategy,
            monitor: self.monitor,
            settings: self.settings,
            rate_limiter,
        })
    }
}

// ============================================================================
// Dispatcher
// ============================================================================

/// Runs any number of subscription groups until shutdown.
#[derive(Debug, Default)]
pub struct MessageDispatcher {
    groups: Vec<SubscriptionGroup>,
}

impl MessageDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_group(mut self, group: SubscriptionGroup) -> Self {
        self.groups.push(group);
        self
    }

    pub fn groups(&self) -> &[SubscriptionGroup] {
        &self.groups
    }

    /// Run every group until `cancel` fires and all admitted work is done
    pub async fn run(&self, cancel: &CancellationToken) {
        info!(groups = self.groups.len(), "Message dispatcher starting");
        join_all(self.groups.iter().map(|group| group.run(cancel))).await;
        info!("Message dispatcher stopped");
    }
}
