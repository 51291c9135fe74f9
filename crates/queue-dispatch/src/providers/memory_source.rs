//! In-memory message source for testing and development.
//!
//! This provider behaves like a visibility-timeout queue:
//! - received messages are hidden until deleted or their visibility expires
//! - every receipt increments the message's delivery count, exposed through
//!   the [`APPROXIMATE_RECEIVE_COUNT`] attribute
//! - visibility can be changed per receipt, as a backoff guard would do

use crate::error::TransportError;
use crate::message::{Message, MessageId, QueueName};
use crate::source::{MessageSource, ReceiptHandle, ReceivedMessage, APPROXIMATE_RECEIVE_COUNT};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::time::Duration;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

#[cfg(test)]
#[path = "memory_source_tests.rs"]
mod tests;

/// Default time a received message stays hidden
pub const DEFAULT_VISIBILITY_TIMEOUT: Duration = Duration::from_secs(30);

// ============================================================================
// Internal Storage Structures
// ============================================================================

/// A message stored in the queue with delivery metadata
#[derive(Clone)]
struct StoredMessage {
    message: Message,
    attributes: HashMap<String, String>,
    delivery_count: u32,
    available_at: Instant,
}

/// A message currently hidden from consumers
struct InFlightMessage {
    stored: StoredMessage,
    visible_at: Instant,
}

#[derive(Default)]
struct QueueState {
    /// Messages waiting to be received (FIFO order)
    messages: VecDeque<StoredMessage>,
    /// Received messages keyed by receipt handle
    in_flight: HashMap<String, InFlightMessage>,
    deleted: usize,
}

impl QueueState {
    /// Return messages whose visibility window expired to the queue
    fn requeue_expired(&mut self, now: Instant) {
        let expired: Vec<String> = self
            .in_flight
            .iter()
            .filter(|(_, in_flight)| in_flight.visible_at <= now)
            .map(|(receipt, _)| receipt.clone())
            .collect();

        for receipt in expired {
            if let Some(in_flight) = self.in_flight.remove(&receipt) {
                let mut stored = in_flight.stored;
                stored.available_at = now;
                self.messages.push_back(stored);
            }
        }
    }
}

// ============================================================================
// InMemoryMessageSource
// ============================================================================

/// In-memory message source
pub struct InMemoryMessageSource {
    queue_name: QueueName,
    visibility_timeout: Duration,
    state: Mutex<QueueState>,
}

impl InMemoryMessageSource {
    /// Create an empty source using the default visibility timeout
    pub fn new(queue_name: QueueName) -> Self {
        Self::with_visibility_timeout(queue_name, DEFAULT_VISIBILITY_TIMEOUT)
    }

    /// Create an empty source with a custom visibility timeout
    pub fn with_visibility_timeout(queue_name: QueueName, visibility_timeout: Duration) -> Self {
        Self {
            queue_name,
            visibility_timeout,
            state: Mutex::new(QueueState::default()),
        }
    }

    /// Enqueue a message for delivery
    pub fn send(&self, message: Message) -> MessageId {
        self.send_with_attributes(message, HashMap::new())
    }

    /// Enqueue a message with extra transport attributes
    pub fn send_with_attributes(
        &self,
        message: Message,
        attributes: HashMap<String, String>,
    ) -> MessageId {
        let message_id = message.id.clone();
        self.state.lock().messages.push_back(StoredMessage {
            message,
            attributes,
            delivery_count: 0,
            available_at: Instant::now(),
        });
        message_id
    }

    /// Messages waiting to be received, including those whose visibility expired
    pub fn pending_count(&self) -> usize {
        let mut state = self.state.lock();
        state.requeue_expired(Instant::now());
        state.messages.len()
    }

    /// Messages received but not yet deleted or made visible again
    pub fn in_flight_count(&self) -> usize {
        let mut state = self.state.lock();
        state.requeue_expired(Instant::now());
        state.in_flight.len()
    }

    /// Messages deleted since the source was created
    pub fn deleted_count(&self) -> usize {
        self.state.lock().deleted
    }
}

#[async_trait]
impl MessageSource for InMemoryMessageSource {
    fn queue_name(&self) -> &QueueName {
        &self.queue_name
    }

    async fn receive_messages(
        &self,
        max_messages: u32,
        cancel: &CancellationToken,
    ) -> Result<Vec<ReceivedMessage>, TransportError> {
        if cancel.is_cancelled() {
            return Ok(Vec::new());
        }

        let now = Instant::now();
        let max_messages = max_messages as usize;
        let mut state = self.state.lock();
        state.requeue_expired(now);

        let mut batch = Vec::new();
        let mut remaining = VecDeque::with_capacity(state.messages.len());
        while let Some(stored) = state.messages.pop_front() {
            if batch.len() < max_messages && stored.available_at <= now {
                batch.push(stored);
            } else {
                remaining.push_back(stored);
            }
        }
        state.messages = remaining;

        let mut received = Vec::with_capacity(batch.len());
        for mut stored in batch {
            stored.delivery_count += 1;
            let receipt = ReceiptHandle::new(uuid::Uuid::new_v4().to_string());

            let mut attributes = stored.attributes.clone();
            attributes.insert(
                APPROXIMATE_RECEIVE_COUNT.to_string(),
                stored.delivery_count.to_string(),
            );

            received.push(ReceivedMessage {
                message: stored.message.clone(),
                receipt: receipt.clone(),
                attributes,
            });

            state.in_flight.insert(
                receipt.handle().to_string(),
                InFlightMessage {
                    stored,
                    visible_at: now + self.visibility_timeout,
                },
            );
        }

        Ok(received)
    }

    async fn delete_message(&self, receipt: &ReceiptHandle) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        match state.in_flight.remove(receipt.handle()) {
            Some(_) => {
                state.deleted += 1;
                Ok(())
            }
            None => Err(TransportError::MessageNotFound {
                receipt: receipt.to_string(),
            }),
        }
    }

    async fn change_visibility(
        &self,
        receipt: &ReceiptHandle,
        visibility_timeout: Duration,
    ) -> Result<(), TransportError> {
        let mut state = self.state.lock();
        match state.in_flight.get_mut(receipt.handle()) {
            Some(in_flight) => {
                in_flight.visible_at = Instant::now() + visibility_timeout;
                Ok(())
            }
            None => Err(TransportError::MessageNotFound {
                receipt: receipt.to_string(),
            }),
        }
    }
}
