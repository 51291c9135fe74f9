//! Tests for the transport boundary types.

use super::*;
use crate::message::MessageType;
use bytes::Bytes;

fn received() -> ReceivedMessage {
    let message = Message::new(MessageType::new("OrderPlaced").unwrap(), Bytes::new());
    ReceivedMessage::new(message, ReceiptHandle::new("receipt-1"))
}

#[test]
fn test_receive_count_parsed_from_attribute() {
    let message = received().with_attribute(APPROXIMATE_RECEIVE_COUNT, "3");
    assert_eq!(message.approximate_receive_count(), Some(3));
}

#[test]
fn test_receive_count_missing() {
    assert_eq!(received().approximate_receive_count(), None);
}

/// Verify that an unparseable count is treated the same as a missing one.
#[test]
fn test_receive_count_unparseable() {
    let message = received().with_attribute(APPROXIMATE_RECEIVE_COUNT, "many");
    assert_eq!(message.approximate_receive_count(), None);

    let negative = received().with_attribute(APPROXIMATE_RECEIVE_COUNT, "-1");
    assert_eq!(negative.approximate_receive_count(), None);
}

#[test]
fn test_receipt_handle_display() {
    let receipt = ReceiptHandle::new("abc");
    assert_eq!(receipt.handle(), "abc");
    assert_eq!(receipt.to_string(), "abc");
}
