//! Tests for configuration loading and validation.

use super::*;
use std::collections::HashMap;
use std::io::Write;

fn environment(vars: &[(&str, &str)]) -> config::Environment {
    let source: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .source(Some(source))
}

fn write_config(suffix: &str, contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(suffix).tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

mod defaults {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        let config = DispatchConfig::default();

        assert!(config.validate().is_ok());
        assert_eq!(config.subscription.max_concurrency, 20);
        assert_eq!(config.subscription.max_batch_size, 10);
        assert!(config.backoff.strategy().is_some());
    }

    #[test]
    fn test_load_without_sources_yields_defaults() {
        let config = DispatchConfig::load_with_environment(None, environment(&[])).unwrap();

        assert_eq!(config, DispatchConfig::default());
    }

    #[test]
    fn test_disabled_backoff_has_no_strategy() {
        let config = BackoffConfig {
            enabled: false,
            ..BackoffConfig::default()
        };

        assert!(config.strategy().is_none());
    }
}

mod loading {
    use super::*;

    /// Verify that a YAML file overrides defaults and leaves unset fields alone.
    #[test]
    fn test_yaml_file_overrides_defaults() {
        let file = write_config(
            ".yaml",
            r#"
subscription:
  max_concurrency: 8
  empty_receive_delay_ms: 250
backoff:
  exponential:
    initial_delay_ms: 500
    use_jitter: false
telemetry:
  json_logging: true
"#,
        );

        let config =
            DispatchConfig::load_with_environment(Some(file.path()), environment(&[])).unwrap();

        assert_eq!(config.subscription.max_concurrency, 8);
        assert_eq!(
            config.subscription.empty_receive_delay,
            Duration::from_millis(250)
        );
        assert_eq!(config.subscription.max_batch_size, 10);
        assert_eq!(
            config.backoff.exponential.initial_delay,
            Duration::from_millis(500)
        );
        assert!(!config.backoff.exponential.use_jitter);
        assert!(config.telemetry.json_logging);
    }

    #[test]
    fn test_toml_file_is_supported() {
        let file = write_config(
            ".toml",
            r#"
[subscription]
max_batch_size = 5
lock_timeout_ms = 60000
"#,
        );

        let config =
            DispatchConfig::load_with_environment(Some(file.path()), environment(&[])).unwrap();

        assert_eq!(config.subscription.max_batch_size, 5);
        assert_eq!(config.subscription.lock_timeout, Duration::from_secs(60));
    }

    /// Verify that environment variables take precedence over the file.
    #[test]
    fn test_environment_overrides_file() {
        let file = write_config(".yaml", "subscription:\n  max_concurrency: 8\n");
        let env = environment(&[
            ("QD__SUBSCRIPTION__MAX_CONCURRENCY", "32"),
            ("QD__SUBSCRIPTION__MAX_RECEIVES_PER_SECOND", "4"),
            ("QD__BACKOFF__ENABLED", "false"),
        ]);

        let config = DispatchConfig::load_with_environment(Some(file.path()), env).unwrap();

        assert_eq!(config.subscription.max_concurrency, 32);
        assert_eq!(config.subscription.max_receives_per_second, Some(4));
        assert!(!config.backoff.enabled);
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let path = std::path::PathBuf::from("/nonexistent/dispatch.yaml");

        let result = DispatchConfig::load_with_environment(Some(&path), environment(&[]));

        assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
    }

    #[test]
    fn test_uncoercible_value_is_an_error() {
        let env = environment(&[("QD__SUBSCRIPTION__MAX_CONCURRENCY", "lots")]);

        let result = DispatchConfig::load_with_environment(None, env);

        assert!(matches!(result, Err(ConfigurationError::Parsing { .. })));
    }

    /// Verify that loaded configuration is validated before it is returned.
    #[test]
    fn test_invalid_loaded_config_is_rejected() {
        let env = environment(&[("QD__SUBSCRIPTION__MAX_BATCH_SIZE", "0")]);

        let result = DispatchConfig::load_with_environment(None, env);

        assert!(matches!(
            result,
            Err(ConfigurationError::Validation(ValidationError::OutOfRange { .. }))
        ));
    }
}

mod validation {
    use super::*;

    #[test]
    fn test_zero_concurrency_is_rejected() {
        let config = SubscriptionConfig {
            max_concurrency: 0,
            ..SubscriptionConfig::default()
        };

        let Err(ValidationError::OutOfRange { field, .. }) = config.validate() else {
            panic!("expected an out of range error");
        };
        assert_eq!(field, "subscription.max_concurrency");
    }

    #[test]
    fn test_zero_batch_size_is_rejected() {
        let config = SubscriptionConfig {
            max_batch_size: 0,
            ..SubscriptionConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_zero_rate_limit_is_rejected() {
        let config = SubscriptionConfig {
            max_receives_per_second: Some(0),
            ..SubscriptionConfig::default()
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_initial_delay_above_max_is_rejected() {
        let config = BackoffConfig {
            enabled: true,
            exponential: ExponentialBackoff::new(
                Duration::from_secs(60),
                Duration::from_secs(10),
                2.0,
            ),
        };

        assert!(config.validate().is_err());
    }

    #[test]
    fn test_shrinking_multiplier_is_rejected() {
        let config = BackoffConfig {
            enabled: true,
            exponential: ExponentialBackoff::new(
                Duration::from_secs(1),
                Duration::from_secs(10),
                0.5,
            ),
        };

        assert!(config.validate().is_err());
    }
}
