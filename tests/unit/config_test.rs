//! Tests for configuration validation and live properties

use pending_limiter::config::{DynamicProperty, LimiterConfig};
use pending_limiter::core::ConfigError;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn config(max_pending: u64, threshold: Option<u64>, operation_timeout_ms: u64) -> LimiterConfig {
    LimiterConfig {
        max_pending,
        threshold,
        operation_timeout_ms,
    }
}

#[test]
fn test_limiter_config_validation() {
    assert!(config(100, Some(30), 60_000).validate().is_ok());
    assert!(config(100, None, 60_000).validate().is_ok());
    assert!(config(100, Some(100), 60_000).validate().is_ok());
}

#[test]
fn test_limiter_config_invalid_max_pending() {
    assert!(config(0, None, 60_000).validate().is_err());
}

#[test]
fn test_limiter_config_invalid_threshold() {
    assert!(config(10, Some(0), 60_000).validate().is_err());
    let err = config(10, Some(11), 60_000).validate().unwrap_err();
    assert_eq!(
        err,
        ConfigError::Invalid("threshold 11 exceeds max_pending 10".into())
    );
}

#[test]
fn test_limiter_config_invalid_timeout() {
    assert!(config(10, None, 0).validate().is_err());
}

#[test]
fn test_limiter_config_from_json() {
    let cfg = LimiterConfig::from_json_str(
        r#"{ "max_pending": 100, "threshold": 30, "operation_timeout_ms": 60000 }"#,
    )
    .unwrap();
    assert_eq!(cfg, config(100, Some(30), 60_000));

    let limits = cfg.to_limits();
    assert_eq!(limits.threshold.get(), 30);
    assert_eq!(limits.max_capacity.get(), 100);
    assert_eq!(limits.operation_timeout.get(), Duration::from_secs(60));
}

#[test]
fn test_limiter_config_from_json_errors() {
    assert!(matches!(
        LimiterConfig::from_json_str("{ not json"),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        LimiterConfig::from_json_str(r#"{ "max_pending": 5 }"#),
        Err(ConfigError::Parse(_))
    ));
    assert!(matches!(
        LimiterConfig::from_json_str(
            r#"{ "max_pending": 5, "threshold": 9, "operation_timeout_ms": 1 }"#
        ),
        Err(ConfigError::Invalid(_))
    ));
}

#[test]
fn test_limiter_config_serde_roundtrip() {
    let cfg = config(8, None, 250);
    let json = serde_json::to_string(&cfg).unwrap();
    let back = LimiterConfig::from_json_str(&json).unwrap();
    assert_eq!(back, cfg);
}

#[test]
fn test_limiter_config_from_env_missing_prefix() {
    let err = LimiterConfig::from_env_with_prefix("PENDING_LIMITER_UNSET_TEST").unwrap_err();
    assert_eq!(
        err,
        ConfigError::MissingVar("PENDING_LIMITER_UNSET_TEST_MAX_PENDING".into())
    );
}

#[test]
fn test_dynamic_property_shared_between_clones() {
    let property = DynamicProperty::new(3_u64);
    let observed = Arc::new(AtomicU64::new(0));
    let observed_clone = Arc::clone(&observed);
    let _sub = property.subscribe(move |_old, new| {
        observed_clone.store(*new, Ordering::SeqCst);
    });

    let alias = property.clone();
    alias.set(9);
    assert_eq!(property.get(), 9);
    assert_eq!(observed.load(Ordering::SeqCst), 9);
}
