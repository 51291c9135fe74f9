//! Shared mocks and fixtures for unit tests.

use crate::context::HandleMessageContext;
use crate::error::{HandlerError, TransportError};
use crate::message::{Message, MessageType, QueueName};
use crate::monitoring::MessageMonitor;
use crate::providers::InMemoryMessageSource;
use crate::source::{MessageSource, ReceiptHandle, ReceivedMessage, APPROXIMATE_RECEIVE_COUNT};
use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

pub fn queue() -> QueueName {
    QueueName::new("orders".to_string()).unwrap()
}

pub fn order_placed() -> MessageType {
    MessageType::new("OrderPlaced").unwrap()
}

pub fn message() -> Message {
    Message::new(order_placed(), Bytes::from("{}"))
}

// ============================================================================
// Recording Monitor
// ============================================================================

/// Monitor that counts every event it receives
#[derive(Default)]
pub struct RecordingMonitor {
    pub handled: AtomicUsize,
    pub exceptions: Mutex<Vec<String>>,
    pub executions: Mutex<Vec<(String, String, Duration)>>,
    pub throttled: AtomicUsize,
    pub throttling_times: Mutex<Vec<Duration>>,
    pub receive_times: AtomicUsize,
    pub transport_errors: Mutex<Vec<String>>,
}

impl RecordingMonitor {
    pub fn handled_count(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }

    pub fn exception_count(&self) -> usize {
        self.exceptions.lock().len()
    }

    pub fn throttled_count(&self) -> usize {
        self.throttled.load(Ordering::SeqCst)
    }
}

impl MessageMonitor for RecordingMonitor {
    fn handled(&self, _message: &Message) {
        self.handled.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_exception(&self, message_type: &MessageType, error: &HandlerError) {
        self.exceptions
            .lock()
            .push(format!("{}: {}", message_type, error));
    }

    fn handler_executed(&self, handler_type: &str, message_type: &MessageType, duration: Duration) {
        self.executions.lock().push((
            handler_type.to_string(),
            message_type.to_string(),
            duration,
        ));
    }

    fn increment_throttling_statistic(&self) {
        self.throttled.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_throttling_time(&self, duration: Duration) {
        self.throttling_times.lock().push(duration);
    }

    fn handle_receive_message_time(&self, _queue: &QueueName, _duration: Duration) {
        self.receive_times.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_transport_error(&self, _queue: &QueueName, operation: &str, _error: &TransportError) {
        self.transport_errors.lock().push(operation.to_string());
    }
}

// ============================================================================
// Recording Source
// ============================================================================

/// Source that records visibility changes and can be told to fail them
pub struct RecordingSource {
    inner: InMemoryMessageSource,
    pub visibility_changes: Mutex<Vec<(ReceiptHandle, Duration)>>,
    pub fail_visibility: AtomicBool,
}

impl RecordingSource {
    pub fn new() -> Self {
        Self {
            inner: InMemoryMessageSource::new(queue()),
            visibility_changes: Mutex::new(Vec::new()),
            fail_visibility: AtomicBool::new(false),
        }
    }

    pub fn visibility_change_count(&self) -> usize {
        self.visibility_changes.lock().len()
    }
}

#[async_trait]
impl MessageSource for RecordingSource {
    fn queue_name(&self) -> &QueueName {
        self.inner.queue_name()
    }

    async fn receive_messages(
        &self,
        max_messages: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReceivedMessage>, TransportError> {
        self.inner.receive_messages(max_messages, cancel).await
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), TransportError> {
        self.inner.delete_message(receipt).await
    }

    async fn change_visibility(
        &self,
        receipt: &ReceiptHandle,
        visibility_timeout: Duration,
    ) -> Result<(), TransportError> {
        self.visibility_changes
            .lock()
            .push((receipt.clone(), visibility_timeout));

        if self.fail_visibility.load(Ordering::SeqCst) {
            return Err(TransportError::ProviderError {
                provider: "test".to_string(),
                code: "InvalidReceipt".to_string(),
                message: "receipt handle expired".to_string(),
            });
        }
        Ok(())
    }
}

/// Build a context for `message` as if received from `source`
pub fn context_with(
    source: Arc<dyn MessageSource>,
    message: Message,
    receive_count: Option<&str>,
) -> HandleMessageContext {
    let mut received = ReceivedMessage::new(message, ReceiptHandle::new("receipt-1"));
    if let Some(count) = receive_count {
        received = received.with_attribute(APPROXIMATE_RECEIVE_COUNT, count);
    }
    HandleMessageContext::new(received, source)
}

/// Build a context for a fresh message with receive count 1
pub fn context() -> HandleMessageContext {
    context_with(Arc::new(RecordingSource::new()), message(), Some("1"))
}
