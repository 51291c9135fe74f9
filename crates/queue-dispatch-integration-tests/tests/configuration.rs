//! Integration tests for building a running dispatcher from configuration

mod common;

use common::{
    decode_order, order_message, order_placed_type, queue, shutdown, spawn_group, wait_until,
    RecordingMonitor,
};
use queue_dispatch::config::ENV_PREFIX;
use queue_dispatch::{
    handler_fn, ConfigurationError, DispatchConfig, HandlerRegistry, InMemoryLockStore,
    InMemoryMessageSource, MessageLockStore, MessageMonitor, PipelineBuilder, SubscriptionGroup,
};
use std::collections::HashMap;
use std::io::Write;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

fn environment(vars: &[(&str, &str)]) -> config::Environment {
    let source: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    config::Environment::with_prefix(ENV_PREFIX)
        .separator("__")
        .source(Some(source))
}

fn write_yaml(contents: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".yaml").tempfile().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

const DISPATCH_YAML: &str = r#"
subscription:
  max_concurrency: 2
  max_batch_size: 2
  empty_receive_delay_ms: 10
  lock_timeout_ms: 2000
backoff:
  enabled: true
  exponential:
    initial_delay_ms: 3000
    max_delay_ms: 60000
    backoff_multiplier: 2.0
    use_jitter: false
telemetry:
  service_name: "order-fulfilment"
  log_level: "debug"
"#;

/// Verify that a file plus environment overrides produce the expected
/// settings.
#[test]
fn test_file_and_environment_are_layered() {
    let file = write_yaml(DISPATCH_YAML);
    let env = environment(&[("QD__SUBSCRIPTION__MAX_CONCURRENCY", "6")]);

    let config = DispatchConfig::load_with_environment(Some(file.path()), env).unwrap();

    assert_eq!(config.subscription.max_concurrency, 6);
    assert_eq!(config.subscription.max_batch_size, 2);
    assert_eq!(config.subscription.lock_timeout, Duration::from_secs(2));
    assert_eq!(config.telemetry.service_name, "order-fulfilment");
    assert_eq!(config.telemetry.log_level, "debug");

    let backoff = config.backoff.strategy().unwrap();
    assert_eq!(backoff.initial_delay, Duration::from_secs(3));
    assert!(!backoff.use_jitter);
}

#[test]
fn test_invalid_backoff_policy_is_rejected_on_load() {
    let file = write_yaml(
        "backoff:\n  exponential:\n    initial_delay_ms: 120000\n    max_delay_ms: 1000\n",
    );

    let result = DispatchConfig::load_with_environment(Some(file.path()), environment(&[]));

    assert!(matches!(result, Err(ConfigurationError::Validation(_))));
}

#[test]
fn test_blank_service_name_is_rejected_on_load() {
    let env = environment(&[("QD__TELEMETRY__SERVICE_NAME", "  ")]);

    let result = DispatchConfig::load_with_environment(None, env);

    assert!(matches!(result, Err(ConfigurationError::Validation(_))));
}

/// Verify that a group assembled purely from loaded configuration handles
/// messages, applying the configured backoff to a failed first delivery.
#[tokio::test(start_paused = true)]
async fn test_group_built_from_configuration_processes_messages() {
    let file = write_yaml(DISPATCH_YAML);
    let config =
        DispatchConfig::load_with_environment(Some(file.path()), environment(&[])).unwrap();

    let monitor = RecordingMonitor::new();
    let calls = Arc::new(AtomicUsize::new(0));
    let declined = Arc::new(AtomicBool::new(false));
    let counter = Arc::clone(&calls);
    let handler = handler_fn("fulfil-order", move |message, _cancel| {
        let calls = Arc::clone(&counter);
        let declined = Arc::clone(&declined);
        async move {
            let order = decode_order(&message)?;
            calls.fetch_add(1, Ordering::SeqCst);
            // Order 0 is declined on its first delivery only
            Ok(order.order_id != 0 || declined.swap(true, Ordering::SeqCst))
        }
    });

    let shared: Arc<dyn MessageMonitor> = monitor.clone();
    let lock_store: Arc<dyn MessageLockStore> = Arc::new(InMemoryLockStore::new());
    let pipeline = PipelineBuilder::new()
        .use_configured(&config, shared, Some(lock_store))
        .build(Arc::new(handler))
        .unwrap();
    assert_eq!(pipeline.len(), 5);
    let mut registry = HandlerRegistry::new();
    registry
        .register(queue("orders"), order_placed_type(), pipeline)
        .unwrap();

    let source = Arc::new(InMemoryMessageSource::with_visibility_timeout(
        queue("orders"),
        Duration::from_secs(600),
    ));
    source.send(order_message(0));
    source.send(order_message(1));
    source.send(order_message(2));

    let group = SubscriptionGroup::builder("orders", Arc::new(registry))
        .with_source(source.clone())
        .with_monitor(monitor.clone())
        .with_settings(config.subscription.clone())
        .build()
        .unwrap();

    let cancel = CancellationToken::new();
    let started = tokio::time::Instant::now();
    let runner = spawn_group(group, &cancel);

    wait_until(|| source.deleted_count() == 3).await;
    shutdown(runner, &cancel).await;

    assert_eq!(calls.load(Ordering::SeqCst), 4);
    // Redelivered after the 3s backoff rather than the 600s visibility timeout
    let elapsed = started.elapsed();
    assert!(elapsed >= Duration::from_secs(3), "elapsed {:?}", elapsed);
    assert!(elapsed < Duration::from_secs(600), "elapsed {:?}", elapsed);
}
