//! Handler registry: routes `(queue, message type)` to a pipeline.

use crate::error::ConfigurationError;
use crate::message::{MessageType, QueueName};
use crate::middleware::HandlerPipeline;
use std::collections::HashMap;

#[cfg(test)]
#[path = "registry_tests.rs"]
mod tests;

/// Explicitly constructed routing table.
///
/// Built once at startup and shared read-only with the dispatcher. Each
/// queue and message type pair has at most one pipeline.
#[derive(Debug, Default)]
pub struct HandlerRegistry {
    pipelines: HashMap<(QueueName, MessageType), HandlerPipeline>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Route messages of `message_type` arriving on `queue` to `pipeline`.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::DuplicateHandler` if the pair is already
    /// registered. The existing registration is kept.
    pub fn register(
        &mut self,
        queue: QueueName,
        message_type: MessageType,
        pipeline: HandlerPipeline,
    ) -> Result<(), ConfigurationError> {
        let key = (queue, message_type);
        if self.pipelines.contains_key(&key) {
            let (queue, message_type) = key;
            return Err(ConfigurationError::DuplicateHandler {
                queue: queue.to_string(),
                message_type: message_type.to_string(),
            });
        }

        self.pipelines.insert(key, pipeline);
        Ok(())
    }

    /// Pipeline for `message_type` on `queue`, if one is registered
    pub fn get(&self, queue: &QueueName, message_type: &MessageType) -> Option<&HandlerPipeline> {
        // Tuple keys cannot borrow, so build an owned key for the lookup
        self.pipelines.get(&(queue.clone(), message_type.clone()))
    }

    pub fn contains(&self, queue: &QueueName, message_type: &MessageType) -> bool {
        self.get(queue, message_type).is_some()
    }

    /// Message types with a pipeline on `queue`
    pub fn message_types<'a>(
        &'a self,
        queue: &'a QueueName,
    ) -> impl Iterator<Item = &'a MessageType> + 'a {
        self.pipelines
            .keys()
            .filter(move |(q, _)| q == queue)
            .map(|(_, message_type)| message_type)
    }

    pub fn len(&self) -> usize {
        self.pipelines.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pipelines.is_empty()
    }
}
