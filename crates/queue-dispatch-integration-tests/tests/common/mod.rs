//! Common test utilities for queue-dispatch integration tests
//!
//! This module provides:
//! - A monitor that records every event it receives
//! - Message and queue fixtures
//! - Helpers for running subscription groups in the background

use bytes::Bytes;
use parking_lot::Mutex;
use queue_dispatch::{
    HandlerError, Message, MessageMonitor, MessageType, QueueName, SubscriptionConfig,
    SubscriptionGroup, TransportError,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

// ============================================================================
// Fixtures
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OrderPlaced {
    pub order_id: u32,
    pub customer: String,
}

#[allow(dead_code)]
pub fn queue(name: &str) -> QueueName {
    QueueName::new(name.to_string()).unwrap()
}

#[allow(dead_code)]
pub fn order_placed_type() -> MessageType {
    MessageType::new("OrderPlaced").unwrap()
}

/// An `OrderPlaced` message with a JSON body
#[allow(dead_code)]
pub fn order_message(order_id: u32) -> Message {
    let body = serde_json::to_vec(&OrderPlaced {
        order_id,
        customer: format!("customer-{}", order_id),
    })
    .unwrap();
    Message::new(order_placed_type(), Bytes::from(body)).with_raising_component("checkout")
}

#[allow(dead_code)]
pub fn decode_order(message: &Message) -> Result<OrderPlaced, HandlerError> {
    serde_json::from_slice(&message.body).map_err(HandlerError::from_error)
}

/// Settings with short idle delays so paused-time tests advance quickly
#[allow(dead_code)]
pub fn quick_settings() -> SubscriptionConfig {
    SubscriptionConfig {
        max_concurrency: 4,
        max_batch_size: 4,
        empty_receive_delay: Duration::from_millis(10),
        receive_error_backoff: Duration::from_millis(10),
        ..SubscriptionConfig::default()
    }
}

// ============================================================================
// Recording Monitor
// ============================================================================

/// Monitor that counts every event it receives
#[derive(Default)]
pub struct RecordingMonitor {
    handled: AtomicUsize,
    exceptions: Mutex<Vec<String>>,
    executions: Mutex<Vec<(String, String)>>,
    throttled: AtomicUsize,
    transport_errors: Mutex<Vec<String>>,
}

#[allow(dead_code)]
impl RecordingMonitor {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn handled_count(&self) -> usize {
        self.handled.load(Ordering::SeqCst)
    }

    pub fn exceptions(&self) -> Vec<String> {
        self.exceptions.lock().clone()
    }

    pub fn executions(&self) -> Vec<(String, String)> {
        self.executions.lock().clone()
    }

    pub fn throttled_count(&self) -> usize {
        self.throttled.load(Ordering::SeqCst)
    }

    pub fn transport_errors(&self) -> Vec<String> {
        self.transport_errors.lock().clone()
    }
}

impl MessageMonitor for RecordingMonitor {
    fn handled(&self, _message: &Message) {
        self.handled.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_exception(&self, _message_type: &MessageType, error: &HandlerError) {
        self.exceptions.lock().push(error.to_string());
    }

    fn handler_executed(
        &self,
        handler_type: &str,
        message_type: &MessageType,
        _duration: Duration,
    ) {
        self.executions
            .lock()
            .push((handler_type.to_string(), message_type.to_string()));
    }

    fn increment_throttling_statistic(&self) {
        self.throttled.fetch_add(1, Ordering::SeqCst);
    }

    fn handle_throttling_time(&self, _duration: Duration) {}

    fn handle_receive_message_time(&self, _queue: &QueueName, _duration: Duration) {}

    fn handle_transport_error(&self, _queue: &QueueName, operation: &str, _error: &TransportError) {
        self.transport_errors.lock().push(operation.to_string());
    }
}

// ============================================================================
// Runners
// ============================================================================

/// Run a group on a background task until `cancel` fires
#[allow(dead_code)]
pub fn spawn_group(group: SubscriptionGroup, cancel: &CancellationToken) -> JoinHandle<()> {
    let cancel = cancel.clone();
    tokio::spawn(async move { group.run(&cancel).await })
}

/// Poll `condition` until it holds.
///
/// The timeout is generous because paused-time tests jump the clock forward
/// whenever every task is idle.
#[allow(dead_code)]
pub async fn wait_until(mut condition: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(3600), async {
        while !condition() {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("condition not reached in time");
}

/// Cancel and wait for the runner to drain
#[allow(dead_code)]
pub async fn shutdown(runner: JoinHandle<()>, cancel: &CancellationToken) {
    cancel.cancel();
    runner.await.unwrap();
}
