//! Token bucket rate limiter.
//!
//! The bucket starts full and is reset to its capacity once per second by a
//! background task. Unused tokens are not banked beyond the capacity.

use crate::error::{ConfigurationError, RateLimitError};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::debug;

#[cfg(test)]
#[path = "rate_limit_tests.rs"]
mod tests;

/// Interval at which the bucket is refilled
pub const REFILL_INTERVAL: Duration = Duration::from_secs(1);

struct Bucket {
    tokens: Mutex<u32>,
    refilled: Notify,
    disposed: CancellationToken,
}

/// Limits an operation to `max_per_second` calls per second.
///
/// Callers invoke [`RateLimiter::wait`] before each guarded operation.
/// Dropping the limiter disposes it.
pub struct RateLimiter {
    max_per_second: u32,
    bucket: Arc<Bucket>,
    refill_task: Mutex<Option<JoinHandle<()>>>,
}

impl RateLimiter {
    /// Create a limiter and start its refill task on the current runtime.
    ///
    /// # Errors
    ///
    /// Returns `ConfigurationError::Invalid` if `max_per_second` is zero or no
    /// tokio runtime is running.
    pub fn new(max_per_second: u32) -> Result<Self, ConfigurationError> {
        if max_per_second == 0 {
            return Err(ConfigurationError::Invalid {
                message: "rate limit must allow at least one operation per second".to_string(),
            });
        }

        let runtime = Handle::try_current().map_err(|e| ConfigurationError::Invalid {
            message: format!("rate limiter requires a tokio runtime: {}", e),
        })?;

        let bucket = Arc::new(Bucket {
            tokens: Mutex::new(max_per_second),
            refilled: Notify::new(),
            disposed: CancellationToken::new(),
        });

        let refill_task = runtime.spawn(refill(Arc::clone(&bucket), max_per_second));

        Ok(Self {
            max_per_second,
            bucket,
            refill_task: Mutex::new(Some(refill_task)),
        })
    }

    /// Take one token, waiting for the next refill if the bucket is empty.
    ///
    /// A token is never consumed when `cancel` has already fired.
    ///
    /// # Errors
    ///
    /// - `RateLimitError::Disposed` once the limiter has been disposed
    /// - `RateLimitError::Cancelled` if `cancel` fires first
    pub async fn wait(&self, cancel: &CancellationToken) -> Result<(), RateLimitError> {
        loop {
            if self.bucket.disposed.is_cancelled() {
                return Err(RateLimitError::Disposed);
            }
            if cancel.is_cancelled() {
                return Err(RateLimitError::Cancelled);
            }

            let refilled = self.bucket.refilled.notified();
            tokio::pin!(refilled);
            refilled.as_mut().enable();

            {
                let mut tokens = self.bucket.tokens.lock();
                if *tokens > 0 {
                    *tokens -= 1;
                    return Ok(());
                }
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(RateLimitError::Cancelled),
                _ = self.bucket.disposed.cancelled() => return Err(RateLimitError::Disposed),
                _ = &mut refilled => {}
            }
        }
    }

    /// Tokens left until the next refill
    pub fn available_tokens(&self) -> u32 {
        *self.bucket.tokens.lock()
    }

    pub fn max_per_second(&self) -> u32 {
        self.max_per_second
    }

    /// Stop the refill task and fail all current and future waits.
    /// Calling this more than once has no further effect.
    pub fn dispose(&self) {
        self.bucket.disposed.cancel();
        if let Some(task) = self.refill_task.lock().take() {
            task.abort();
            debug!(
            max_per_second = self.max_per_second,
            "Rate limiter disposed"
        );
        }
    }

    pub fn is_disposed(&self) -> bool {
        self.bucket.disposed.is_cancelled()
    }
}

impl Drop for RateLimiter {
    fn drop(&mut self) {
        self.dispose();
    }
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("max_per_second", &self.max_per_second)
            .field("available_tokens", &self.available_tokens())
            .field("disposed", &self.is_disposed())
            .finish()
    }
}

async fn refill(bucket: Arc<Bucket>, max_per_second: u32) {
    let mut interval = tokio::time::interval(REFILL_INTERVAL);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    // The first tick completes immediately and the bucket starts full
    interval.tick().await;

    loop {
        tokio::select! {
            _ = bucket.disposed.cancelled() => break,
            _ = interval.tick() => {
                *bucket.tokens.lock() = max_per_second;
                bucket.refilled.notify_waiters();
            }
        }
    }
}
