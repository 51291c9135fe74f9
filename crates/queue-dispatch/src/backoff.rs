//! # Backoff Strategies
//!
//! A backoff strategy decides how long a failed message stays hidden before
//! the transport redelivers it. [`ExponentialBackoff`] is the default; any
//! `Fn(&Message, u32, Option<&HandlerError>) -> Duration` can be used instead.

use crate::error::HandlerError;
use crate::message::Message;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Computes the redelivery delay for a message whose handling failed.
///
/// Implementations should be pure functions of their inputs.
pub trait BackoffStrategy: Send + Sync {
    /// # Arguments
    ///
    /// * `message` - The message that failed
    /// * `delivery_count` - How many times the transport has delivered it (1-based)
    /// * `last_error` - The error raised while handling it, if any
    fn backoff_duration(
        &self,
        message: &Message,
        delivery_count: u32,
        last_error: Option<&HandlerError>,
    ) -> Duration;
}

impl<F> BackoffStrategy for F
where
    F: Fn(&Message, u32, Option<&HandlerError>) -> Duration + Send + Sync,
{
    fn backoff_duration(
        &self,
        message: &Message,
        delivery_count: u32,
        last_error: Option<&HandlerError>,
    ) -> Duration {
        self(message, delivery_count, last_error)
    }
}

/// Exponential backoff keyed on the delivery count
///
/// # Examples
///
/// ```rust
/// use queue_dispatch::backoff::ExponentialBackoff;
/// use std::time::Duration;
///
/// // Default policy: 1s initial, 15 minute cap, 2.0x multiplier, ±25% jitter
/// let backoff = ExponentialBackoff::default();
///
/// // Deterministic policy
/// let backoff = ExponentialBackoff::new(Duration::from_secs(2), Duration::from_secs(60), 3.0)
///     .without_jitter();
/// assert_eq!(backoff.calculate_delay(0), Duration::from_secs(2));
/// assert_eq!(backoff.calculate_delay(1), Duration::from_secs(6));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExponentialBackoff {
    /// Delay after the first failed delivery
    #[serde(with = "duration_millis", rename = "initial_delay_ms")]
    pub initial_delay: Duration,

    /// Maximum delay
    #[serde(with = "duration_millis", rename = "max_delay_ms")]
    pub max_delay: Duration,

    /// Exponential backoff multiplier (typically 2.0)
    pub backoff_multiplier: f64,

    /// Whether to add jitter to delays
    pub use_jitter: bool,

    /// Jitter range as a fraction (default 0.25 = ±25%)
    pub jitter_percent: f64,
}

impl Default for ExponentialBackoff {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(15 * 60),
            backoff_multiplier: 2.0,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }
}

impl ExponentialBackoff {
    /// Create a new backoff policy with the default jitter
    pub fn new(initial_delay: Duration, max_delay: Duration, backoff_multiplier: f64) -> Self {
        Self {
            initial_delay,
            max_delay,
            backoff_multiplier,
            use_jitter: true,
            jitter_percent: 0.25,
        }
    }

    /// Disable jitter (useful for tests)
    pub fn without_jitter(mut self) -> Self {
        self.use_jitter = false;
        self
    }

    /// Set custom jitter percentage (0.0 to 1.0)
    pub fn with_jitter_percent(mut self, percent: f64) -> Self {
        self.jitter_percent = percent.clamp(0.0, 1.0);
        self
    }

    /// Calculate delay for a 0-based failed attempt
    ///
    /// Uses `delay = initial * multiplier^attempt`, capped at `max_delay`,
    /// with jitter applied after the cap.
    pub fn calculate_delay(&self, attempt: u32) -> Duration {
        let exponent = attempt.min(i32::MAX as u32) as i32;
        let base_delay_secs =
            self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);

        let capped_delay_secs = if base_delay_secs.is_finite() {
            base_delay_secs.min(self.max_delay.as_secs_f64())
        } else {
            self.max_delay.as_secs_f64()
        };

        let final_delay_secs = if self.use_jitter {
            Self::add_jitter(capped_delay_secs, self.jitter_percent)
        } else {
            capped_delay_secs
        };

        Duration::from_secs_f64(final_delay_secs.max(0.0))
    }

    /// Applies random variation in range [delay * (1-jitter), delay * (1+jitter)]
    fn add_jitter(delay_secs: f64, jitter_percent: f64) -> f64 {
        let jitter_range = delay_secs * jitter_percent.clamp(0.0, 1.0);
        if jitter_range <= 0.0 {
            return delay_secs;
        }

        let jitter = rand::rng().random_range(-jitter_range..=jitter_range);
        (delay_secs + jitter).max(0.0)
    }
}

impl BackoffStrategy for ExponentialBackoff {
    fn backoff_duration(
        &self,
        _message: &Message,
        delivery_count: u32,
        _last_error: Option<&HandlerError>,
    ) -> Duration {
        self.calculate_delay(delivery_count.saturating_sub(1))
    }
}

/// Serde helper storing durations as whole milliseconds
pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S>(duration: &Duration, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_u64(duration.as_millis() as u64)
    }

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Duration, D::Error>
    where
        D: Deserializer<'de>,
    {
        let millis = u64::deserialize(deserializer)?;
        Ok(Duration::from_millis(millis))
    }
}

#[cfg(test)]
#[path = "backoff_tests.rs"]
mod tests;
