//! Per-invocation handling context.

use crate::error::{HandlerError, TransportError};
use crate::message::{Message, MessageType, QueueName};
use crate::source::{MessageSource, ReceiptHandle, ReceivedMessage};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

#[cfg(test)]
#[path = "context_tests.rs"]
mod tests;

/// State owned by a single pipeline execution.
///
/// A context is created for every message the dispatcher hands to a pipeline
/// and is never shared between concurrent invocations.
pub struct HandleMessageContext {
    queue_name: QueueName,
    message_type: MessageType,
    received: ReceivedMessage,
    source: Arc<dyn MessageSource>,
    last_error: Option<HandlerError>,
}

impl HandleMessageContext {
    /// Create a context for a message received from `source`
    pub fn new(received: ReceivedMessage, source: Arc<dyn MessageSource>) -> Self {
        Self {
            queue_name: source.queue_name().clone(),
            message_type: received.message.message_type.clone(),
            received,
            source,
            last_error: None,
        }
    }

    /// The message being handled
    pub fn message(&self) -> &Message {
        &self.received.message
    }

    /// Declared type the message was routed by
    pub fn message_type(&self) -> &MessageType {
        &self.message_type
    }

    /// Queue the message was received from
    pub fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    /// Raw transport attributes
    pub fn attributes(&self) -> &HashMap<String, String> {
        &self.received.attributes
    }

    pub fn receipt(&self) -> &ReceiptHandle {
        &self.received.receipt
    }

    /// See [`ReceivedMessage::approximate_receive_count`]
    pub fn approximate_receive_count(&self) -> Option<u32> {
        self.received.approximate_receive_count()
    }

    /// Last error recorded by a middleware stage, if any
    pub fn last_error(&self) -> Option<&HandlerError> {
        self.last_error.as_ref()
    }

    pub fn set_last_error(&mut self, error: HandlerError) {
        self.last_error = Some(error);
    }

    pub fn take_last_error(&mut self) -> Option<HandlerError> {
        self.last_error.take()
    }

    /// Ask the transport to keep the message hidden for `timeout` from now
    pub async fn update_visibility(&self, timeout: Duration) -> Result<(), TransportError> {
        self.source
            .change_visibility(&self.received.receipt, timeout)
            .await
    }
}

impl std::fmt::Debug for HandleMessageContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandleMessageContext")
            .field("queue_name", &self.queue_name)
            .field("message_type", &self.message_type)
            .field("message_id", &self.received.message.id)
            .field("receipt", &self.received.receipt)
            .field("last_error", &self.last_error)
            .finish()
    }
}
