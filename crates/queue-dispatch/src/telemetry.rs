//! Tracing subscriber setup.

use crate::error::{ConfigurationError, ValidationError};
use serde::{Deserialize, Serialize};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[cfg(test)]
#[path = "telemetry_tests.rs"]
mod tests;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Service name attached to log output
    pub service_name: String,

    /// Filter used when `RUST_LOG` is not set, e.g. `info` or
    /// `queue_dispatch=debug,info`
    pub log_level: String,

    /// Emit JSON lines instead of human-readable output
    pub json_logging: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            service_name: "queue-dispatch".to_string(),
            log_level: "info".to_string(),
            json_logging: false,
        }
    }
}

impl TelemetryConfig {
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set a plain log level
    pub fn set_log_level(&mut self, level: &str) -> Result<(), ValidationError> {
        let normalized = level.to_lowercase();
        if !LOG_LEVELS.contains(&normalized.as_str()) {
            return Err(ValidationError::InvalidFormat {
                field: "telemetry.log_level".to_string(),
                message: format!("unknown log level '{}'", level),
            });
        }
        self.log_level = normalized;
        Ok(())
    }

    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.service_name.trim().is_empty() {
            return Err(ValidationError::Required {
                field: "telemetry.service_name".to_string(),
            });
        }

        EnvFilter::try_new(&self.log_level).map_err(|e| ValidationError::InvalidFormat {
            field: "telemetry.log_level".to_string(),
            message: e.to_string(),
        })?;

        Ok(())
    }
}

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over the configured level.
///
/// # Errors
///
/// Returns `ConfigurationError::Invalid` if the configured filter cannot be
/// parsed or a global subscriber is already installed.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigurationError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => EnvFilter::try_new(&config.log_level).map_err(|e| {
            ConfigurationError::Invalid {
                message: format!("invalid log filter '{}': {}", config.log_level, e),
            }
        })?,
    };

    let (json_layer, text_layer) = if config.json_logging {
        (Some(fmt::layer().json()), None)
    } else {
        (None, Some(fmt::layer()))
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(json_layer)
        .with(text_layer)
        .try_init()
        .map_err(|e| ConfigurationError::Invalid {
            message: format!("failed to install tracing subscriber: {}", e),
        })?;

    tracing::info!(
        service = %config.service_name,
        json = config.json_logging,
        "Tracing initialised"
    );
    Ok(())
}
