//! Tests for the handler registry.

use super::*;
use crate::handler::handler_fn;
use crate::middleware::PipelineBuilder;
use crate::test_support::{order_placed, queue};
use std::sync::Arc;

fn pipeline(name: &'static str) -> HandlerPipeline {
    PipelineBuilder::new()
        .build(Arc::new(handler_fn(name, |_m, _c| async { Ok(true) })))
        .unwrap()
}

#[test]
fn test_registered_pipeline_is_found() {
    let mut registry = HandlerRegistry::new();
    registry
        .register(queue(), order_placed(), pipeline("orders"))
        .unwrap();

    let found = registry.get(&queue(), &order_placed()).unwrap();

    assert_eq!(found.handler_name(), "orders");
    assert!(registry.contains(&queue(), &order_placed()));
    assert_eq!(registry.len(), 1);
}

#[test]
fn test_unknown_pair_is_not_found() {
    let mut registry = HandlerRegistry::new();
    registry
        .register(queue(), order_placed(), pipeline("orders"))
        .unwrap();
    let other_queue = QueueName::new("invoices".to_string()).unwrap();
    let other_type = MessageType::new("OrderCancelled").unwrap();

    assert!(registry.get(&other_queue, &order_placed()).is_none());
    assert!(registry.get(&queue(), &other_type).is_none());
}

/// Verify that a second registration for the same pair is rejected and the
/// first one is kept.
#[test]
fn test_duplicate_registration_is_rejected() {
    let mut registry = HandlerRegistry::new();
    registry
        .register(queue(), order_placed(), pipeline("first"))
        .unwrap();

    let result = registry.register(queue(), order_placed(), pipeline("second"));

    match result {
        Err(ConfigurationError::DuplicateHandler {
            queue,
            message_type,
        }) => {
            assert_eq!(queue, "orders");
            assert_eq!(message_type, "OrderPlaced");
        }
        other => panic!("expected duplicate handler error, got {:?}", other),
    }
    assert_eq!(
        registry
            .get(&queue(), &order_placed())
            .unwrap()
            .handler_name(),
        "first"
    );
}

#[test]
fn test_same_type_on_different_queues_is_allowed() {
    let mut registry = HandlerRegistry::new();
    let other_queue = QueueName::new("orders-replay".to_string()).unwrap();

    registry
        .register(queue(), order_placed(), pipeline("live"))
        .unwrap();
    registry
        .register(other_queue.clone(), order_placed(), pipeline("replay"))
        .unwrap();

    assert_eq!(registry.len(), 2);
    assert_eq!(registry.message_types(&other_queue).count(), 1);
}
