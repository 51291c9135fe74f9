//! Transport boundary: where messages come from and how they are acknowledged.
//!
//! Transports (SQS, Service Bus, in-memory) implement [`MessageSource`]. The
//! dispatcher only relies on batch receipt, deletion after successful handling,
//! and changing a message's visibility window.

use crate::error::TransportError;
use crate::message::{Message, QueueName};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "source_tests.rs"]
mod tests;

/// Attribute carrying the transport's approximate delivery count.
pub const APPROXIMATE_RECEIVE_COUNT: &str = "ApproximateReceiveCount";

/// Opaque token for acknowledging or re-timing a received message
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReceiptHandle(String);

impl ReceiptHandle {
    /// Create new receipt handle
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Get handle string
    pub fn handle(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ReceiptHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message received from a source together with its raw transport envelope
#[derive(Debug, Clone)]
pub struct ReceivedMessage {
    pub message: Message,
    pub receipt: ReceiptHandle,
    pub attributes: HashMap<String, String>,
}

impl ReceivedMessage {
    /// Create a received message with no transport attributes
    pub fn new(message: Message, receipt: ReceiptHandle) -> Self {
        Self {
            message,
            receipt,
            attributes: HashMap::new(),
        }
    }

    /// Add a transport attribute
    pub fn with_attribute(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.attributes.insert(key.into(), value.into());
        self
    }

    /// Approximate number of times the transport has delivered this message.
    ///
    /// `None` when the attribute is missing or is not a valid integer.
    pub fn approximate_receive_count(&self) -> Option<u32> {
        self.attributes
            .get(APPROXIMATE_RECEIVE_COUNT)
            .and_then(|value| value.trim().parse::<u32>().ok())
    }
}

/// Interface implemented by queue transports
#[async_trait]
pub trait MessageSource: Send + Sync {
    /// Name of the queue this source reads from
    fn queue_name(&self) -> &QueueName;

    /// Receive up to `max_messages` messages.
    ///
    /// Implementations may long-poll but should return early when `cancel`
    /// fires. An empty batch is not an error.
    async fn receive_messages(
        &self,
        max_messages: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReceivedMessage>, TransportError>;

    /// Remove a successfully handled message from the queue
    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), TransportError>;

    /// Hide the message from other consumers for `visibility_timeout` from now
    async fn change_visibility(
        &self,
        receipt: &ReceiptHandle,
        visibility_timeout: Duration,
    ) -> Result<(), TransportError>;
}
