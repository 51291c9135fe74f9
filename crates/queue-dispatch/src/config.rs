//! # Dispatch Configuration
//!
//! Settings for subscription groups, redelivery backoff and logging.
//!
//! Sources are applied in order, later ones overriding earlier ones:
//!
//! 1. Built-in defaults (every field has one)
//! 2. An optional YAML or TOML file, format chosen by extension
//! 3. Environment variables prefixed `QD__`, with `__` separating nested
//!    keys, e.g. `QD__SUBSCRIPTION__MAX_CONCURRENCY=32`
//!
//! A file or variable that cannot be coerced to the right type is an error,
//! as is a configuration that fails [`DispatchConfig::validate`].

use crate::backoff::{duration_millis, ExponentialBackoff};
use crate::error::{ConfigurationError, ValidationError};
use crate::telemetry::TelemetryConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::info;

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;

/// Prefix for environment variable overrides
pub const ENV_PREFIX: &str = "QD";

/// Root configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct DispatchConfig {
    pub subscription: SubscriptionConfig,
    pub backoff: BackoffConfig,
    pub telemetry: TelemetryConfig,
}

/// Receive loop and worker settings shared by a subscription group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SubscriptionConfig {
    /// Maximum handler invocations running at once
    pub max_concurrency: usize,

    /// Maximum messages requested per receive call
    pub max_batch_size: u32,

    /// Pause after a receive returns no messages
    #[serde(with = "duration_millis", rename = "empty_receive_delay_ms")]
    pub empty_receive_delay: Duration,

    /// Pause after a receive fails
    #[serde(with = "duration_millis", rename = "receive_error_backoff_ms")]
    pub receive_error_backoff: Duration,

    /// Lifetime of the temporary exactly-once lock
    #[serde(with = "duration_millis", rename = "lock_timeout_ms")]
    pub lock_timeout: Duration,

    /// Upper bound on receive calls per second per group, if any
    pub max_receives_per_second: Option<u32>,
}

impl Default for SubscriptionConfig {
    fn default() -> Self {
        Self {
            max_concurrency: 20,
            max_batch_size: 10,
            empty_receive_delay: Duration::from_millis(100),
            receive_error_backoff: Duration::from_secs(5),
            lock_timeout: Duration::from_secs(30),
            max_receives_per_second: None,
        }
    }
}

impl SubscriptionConfig {
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.max_concurrency == 0 {
            return Err(ValidationError::OutOfRange {
                field: "subscription.max_concurrency".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.max_batch_size == 0 {
            return Err(ValidationError::OutOfRange {
                field: "subscription.max_batch_size".to_string(),
                message: "must be at least 1".to_string(),
            });
        }

        if self.lock_timeout.is_zero() {
            return Err(ValidationError::OutOfRange {
                field: "subscription.lock_timeout_ms".to_string(),
                message: "must be greater than zero".to_string(),
            });
        }

        if self.max_receives_per_second == Some(0) {
            return Err(ValidationError::OutOfRange {
                field: "subscription.max_receives_per_second".to_string(),
                message: "must be at least 1 when set".to_string(),
            });
        }

        Ok(())
    }
}

/// Redelivery backoff settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BackoffConfig {
    /// Extend the visibility of failed messages. When disabled the
    /// transport's default redelivery timing applies.
    pub enabled: bool,

    pub exponential: ExponentialBackoff,
}

impl Default for BackoffConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            exponential: ExponentialBackoff::default(),
        }
    }
}

impl BackoffConfig {
    /// The configured strategy, or `None` when backoff is disabled
    pub fn strategy(&self) -> Option<ExponentialBackoff> {
        self.enabled.then(|| self.exponential.clone())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        let policy = &self.exponential;

        if policy.initial_delay > policy.max_delay {
            return Err(ValidationError::OutOfRange {
                field: "backoff.exponential.initial_delay_ms".to_string(),
                message: "must not exceed max_delay_ms".to_string(),
            });
        }

        if !policy.backoff_multiplier.is_finite() || policy.backoff_multiplier < 1.0 {
            return Err(ValidationError::OutOfRange {
                field: "backoff.exponential.backoff_multiplier".to_string(),
                message: format!("must be at least 1.0, got {}", policy.backoff_multiplier),
            });
        }

        if !(0.0..=1.0).contains(&policy.jitter_percent) {
            return Err(ValidationError::OutOfRange {
                field: "backoff.exponential.jitter_percent".to_string(),
                message: format!("must be between 0.0 and 1.0, got {}", policy.jitter_percent),
            });
        }

        Ok(())
    }
}

impl DispatchConfig {
    /// Load configuration from defaults, an optional file and `QD__`
    /// environment variables, then validate it.
    ///
    /// # Errors
    ///
    /// - `ConfigurationError::Parsing` if a source cannot be read or coerced
    /// - `ConfigurationError::Validation` if the result is invalid
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigurationError> {
        Self::load_with_environment(
            path,
            config::Environment::with_prefix(ENV_PREFIX).separator("__"),
        )
    }

    /// [`DispatchConfig::load`] with an explicit environment source
    pub fn load_with_environment(
        path: Option<&Path>,
        environment: config::Environment,
    ) -> Result<Self, ConfigurationError> {
        let mut builder = config::Config::builder();

        if let Some(path) = path {
            info!(path = %path.display(), "Loading dispatch configuration file");
            builder = builder.add_source(config::File::from(path).required(true));
        }

        let loaded: DispatchConfig = builder
            .add_source(environment.try_parsing(true))
            .build()
            .and_then(|config| config.try_deserialize())
            .map_err(|e| ConfigurationError::Parsing {
                message: e.to_string(),
            })?;

        loaded.validate()?;
        Ok(loaded)
    }

    /// Check every section
    pub fn validate(&self) -> Result<(), ConfigurationError> {
        self.subscription.validate()?;
        self.backoff.validate()?;
        self.telemetry.validate()?;
        Ok(())
    }
}
