//! # Queue Dispatch
//!
//! Transport-agnostic runtime for consuming messages from queues and running
//! them through a pipeline of handler middleware.
//!
//! This library provides:
//! - A middleware pipeline around every handler: error boundary, logging,
//!   timing, redelivery backoff and exactly-once locking
//! - A throttled processing strategy bounding concurrent handler invocations
//! - A token bucket rate limiter
//! - Subscription groups that receive batches from one or more sources and
//!   acknowledge handled messages
//! - In-memory source and lock store implementations
//!
//! ## Module Organization
//!
//! - [`message`] - Messages, queue names and message types
//! - [`source`] / [`lock`] - Transport and lock store interfaces
//! - [`handler`] / [`middleware`] - Handlers and the pipeline around them
//! - [`processing`] / [`rate_limit`] - Concurrency and rate control
//! - [`registry`] / [`dispatch`] - Routing and the receive loops
//! - [`config`] / [`telemetry`] - Configuration loading and tracing setup
//!
//! ## Example
//!
//! ```rust
//! use queue_dispatch::{
//!     handler_fn, HandlerRegistry, InMemoryMessageSource, MessageType, NoOpMessageMonitor,
//!     PipelineBuilder, QueueName, SubscriptionGroup,
//! };
//! use std::sync::Arc;
//!
//! let queue = QueueName::new("orders".to_string()).unwrap();
//! let handler = handler_fn("place-order", |message, _cancel| async move {
//!     tracing::info!(message_id = %message.id, "Placing order");
//!     Ok(true)
//! });
//! let pipeline = PipelineBuilder::new()
//!     .use_defaults(Arc::new(NoOpMessageMonitor), None)
//!     .build(Arc::new(handler))
//!     .unwrap();
//!
//! let mut registry = HandlerRegistry::new();
//! registry
//!     .register(queue.clone(), MessageType::new("OrderPlaced").unwrap(), pipeline)
//!     .unwrap();
//!
//! let group = SubscriptionGroup::builder("orders", Arc::new(registry))
//!     .with_source(Arc::new(InMemoryMessageSource::new(queue)))
//!     .build()
//!     .unwrap();
//! assert_eq!(group.name(), "orders");
//! ```

pub mod backoff;
pub mod config;
pub mod context;
pub mod dispatch;
pub mod error;
pub mod handler;
pub mod lock;
pub mod message;
pub mod middleware;
pub mod monitoring;
pub mod processing;
pub mod providers;
pub mod rate_limit;
pub mod registry;
pub mod source;
pub mod telemetry;

#[cfg(test)]
mod test_support;

// Re-export commonly used types at crate root for convenience
pub use backoff::{BackoffStrategy, ExponentialBackoff};
pub use config::{BackoffConfig, DispatchConfig, SubscriptionConfig};
pub use context::HandleMessageContext;
pub use dispatch::{MessageDispatcher, SubscriptionGroup, SubscriptionGroupBuilder};
pub use error::{
    ConfigurationError, HandlerError, LockError, RateLimitError, TransportError, ValidationError,
};
pub use handler::{handler_fn, MessageHandler};
pub use lock::{LockResponse, MessageLockStore};
pub use message::{Message, MessageId, MessageType, QueueName, Timestamp};
pub use middleware::{HandlerPipeline, Middleware, Next, PipelineBuilder};
pub use monitoring::{MessageMonitor, NoOpMessageMonitor, TracingMessageMonitor};
pub use processing::{MessageProcessingStrategy, Throttled};
pub use providers::{InMemoryLockStore, InMemoryMessageSource};
pub use rate_limit::RateLimiter;
pub use registry::HandlerRegistry;
pub use source::{MessageSource, ReceiptHandle, ReceivedMessage};
pub use telemetry::{init_tracing, TelemetryConfig};
