//! Tests for error types

use pending_limiter::config::LimiterConfig;
use pending_limiter::core::{
    AdmissionError, AppResult, CleanupError, ConfigError, OperationError,
};

#[test]
fn test_interrupted_error() {
    let err = AdmissionError::Interrupted;
    assert_eq!(format!("{}", err), "admission interrupted");
}

#[test]
fn test_closed_error() {
    let err = AdmissionError::Closed;
    assert_eq!(format!("{}", err), "limiter closed");
}

#[test]
fn test_runtime_error() {
    let err = AdmissionError::Runtime("task cancelled".to_string());
    assert_eq!(format!("{}", err), "runtime error: task cancelled");
}

#[test]
fn test_abandoned_error() {
    let err = OperationError::Abandoned;
    assert_eq!(format!("{}", err), "operation abandoned before completion");
}

#[test]
fn test_action_panicked_error() {
    let err = CleanupError::ActionPanicked {
        watch: "w-1".to_string(),
        message: "boom".to_string(),
    };
    assert_eq!(format!("{}", err), "cleanup action for watch w-1 panicked: boom");
}

#[test]
fn test_config_errors() {
    assert_eq!(
        format!("{}", ConfigError::Invalid("threshold".into())),
        "invalid config: threshold"
    );
    assert_eq!(
        format!("{}", ConfigError::MissingVar("X_MAX_PENDING".into())),
        "missing environment variable `X_MAX_PENDING`"
    );
}

fn load(input: &str) -> AppResult<u64> {
    let cfg = LimiterConfig::from_json_str(input)?;
    Ok(cfg.effective_threshold())
}

#[test]
fn test_app_result_wraps_config_error() {
    assert_eq!(
        load(r#"{"max_pending": 4, "operation_timeout_ms": 10}"#).unwrap(),
        4
    );

    let err = load(r#"{"max_pending": 0, "operation_timeout_ms": 10}"#).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ConfigError>(),
        Some(ConfigError::Invalid(_))
    ));
}
