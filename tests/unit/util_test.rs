//! Tests for telemetry helpers

use pending_limiter::config::LimiterLimits;
use pending_limiter::core::{PendingLimiter, TracingObserver};
use pending_limiter::runtime::TokioSpawner;
use pending_limiter::util::{init_test_tracing, init_tracing, DEFAULT_FILTER};
use std::sync::Arc;
use std::time::Duration;

#[test]
fn test_default_filter_targets_crate() {
    assert!(DEFAULT_FILTER.starts_with("pending_limiter"));
}

#[test]
fn test_init_tracing_is_idempotent() {
    init_test_tracing();
    init_tracing();
    init_test_tracing();
}

#[test]
fn test_tracing_observer_on_live_limiter() {
    init_test_tracing();
    let spawner = TokioSpawner::with_worker_threads(1).expect("runtime");
    let limiter = PendingLimiter::new(
        LimiterLimits::new(2, 4, Duration::from_millis(20)),
        spawner,
    )
    .with_observer(Arc::new(TracingObserver::new("util-test")));

    let done = limiter.enqueue(async { 1 }, true).unwrap();
    assert_eq!(done.blocking_wait().unwrap(), 1);

    let stuck = limiter
        .enqueue(std::future::pending::<()>(), false)
        .unwrap();
    assert!(limiter.wait_all(Duration::from_secs(5)));
    drop(stuck);
}
