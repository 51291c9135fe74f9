//! Client protocol for the external message lock store.
//!
//! The lock store provides the atomic "acquire if absent" primitive behind
//! exactly-once handling. Locks are either temporary (expire after a timeout
//! and may be re-acquired) or permanent (the message has been handled and
//! must never be handled again by the same handler).

use crate::error::LockError;
use async_trait::async_trait;
use std::time::Duration;

/// Result of a lock acquisition attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockResponse {
    /// The caller holds the lock exclusively
    pub exclusive: bool,
    /// The message has already been handled successfully
    pub permanent: bool,
}

impl LockResponse {
    /// Lock acquired by the caller
    pub fn acquired() -> Self {
        Self {
            exclusive: true,
            permanent: false,
        }
    }

    /// Lock temporarily held by someone else
    pub fn held_elsewhere() -> Self {
        Self {
            exclusive: false,
            permanent: false,
        }
    }

    /// Message already handled; the permanent lock is held by someone else
    pub fn permanently_held() -> Self {
        Self {
            exclusive: false,
            permanent: true,
        }
    }
}

/// Store for exactly-once message locks.
///
/// Implementations must be safe under concurrent access from multiple
/// process instances.
#[async_trait]
pub trait MessageLockStore: Send + Sync {
    /// Try to take a temporary lock on `key` that expires after `timeout`
    async fn try_acquire_lock(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<LockResponse, LockError>;

    /// Take or promote the lock on `key` to a permanent lock
    async fn try_acquire_lock_permanently(&self, key: &str) -> Result<LockResponse, LockError>;

    /// Release a lock on `key` so it can be acquired again
    async fn release_lock(&self, key: &str) -> Result<(), LockError>;
}
