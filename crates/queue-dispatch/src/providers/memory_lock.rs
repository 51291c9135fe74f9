//! In-memory message lock store for testing and single-process deployments.

use crate::error::LockError;
use crate::lock::{LockResponse, MessageLockStore};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[cfg(test)]
#[path = "memory_lock_tests.rs"]
mod tests;

#[derive(Debug, Clone, Copy)]
enum LockEntry {
    Temporary { expires_at: Instant },
    Permanent,
}

impl LockEntry {
    fn is_live(&self, now: Instant) -> bool {
        match self {
            Self::Temporary { expires_at } => now < *expires_at,
            Self::Permanent => true,
        }
    }
}

/// Lock store keeping all locks in process memory.
///
/// Expired temporary locks are treated as absent and overwritten on the next
/// acquisition attempt.
#[derive(Debug, Default)]
pub struct InMemoryLockStore {
    locks: Mutex<HashMap<String, LockEntry>>,
}

impl InMemoryLockStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of locks currently held, temporary or permanent
    pub fn held_count(&self) -> usize {
        let now = Instant::now();
        self.locks
            .lock()
            .values()
            .filter(|entry| entry.is_live(now))
            .count()
    }

    /// Check whether `key` is permanently locked
    pub fn is_permanently_locked(&self, key: &str) -> bool {
        matches!(self.locks.lock().get(key), Some(LockEntry::Permanent))
    }
}

fn validate_key(key: &str) -> Result<(), LockError> {
    if key.is_empty() {
        return Err(LockError::InvalidKey {
            key: key.to_string(),
            message: "lock key must not be empty".to_string(),
        });
    }
    Ok(())
}

#[async_trait]
impl MessageLockStore for InMemoryLockStore {
    async fn try_acquire_lock(
        &self,
        key: &str,
        timeout: Duration,
    ) -> Result<LockResponse, LockError> {
        validate_key(key)?;

        let now = Instant::now();
        let mut locks = self.locks.lock();
        match locks.get(key) {
            Some(LockEntry::Permanent) => Ok(LockResponse::permanently_held()),
            Some(entry) if entry.is_live(now) => Ok(LockResponse::held_elsewhere()),
            _ => {
                locks.insert(
                    key.to_string(),
                    LockEntry::Temporary {
                        expires_at: now + timeout,
                    },
                );
                Ok(LockResponse::acquired())
            }
        }
    }

    async fn try_acquire_lock_permanently(&self, key: &str) -> Result<LockResponse, LockError> {
        validate_key(key)?;

        let mut locks = self.locks.lock();
        locks.insert(key.to_string(), LockEntry::Permanent);
        Ok(LockResponse {
            exclusive: true,
            permanent: true,
        })
    }

    async fn release_lock(&self, key: &str) -> Result<(), LockError> {
        validate_key(key)?;

        let mut locks = self.locks.lock();
        // A permanent lock records a completed handling and is never released.
        if let Some(LockEntry::Temporary { .. }) = locks.get(key) {
            locks.remove(key);
        }
        Ok(())
    }
}
