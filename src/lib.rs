//! # Pending Limiter
//!
//! Two independent concurrency primitives that keep asynchronous workloads
//! bounded and resources reclaimed promptly.
//!
//! ## PendingLimiter - Bounded Admission
//!
//! [`core::PendingLimiter`] counts asynchronous operations that were admitted
//! but have not completed. A producer may admit without limit or park until
//! the pending count drops below a live-updatable threshold. Every admitted
//! operation gives its slot back exactly once: on completion, on panic, or
//! when it outlives the operation timeout.
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use pending_limiter::config::LimiterConfig;
//! use pending_limiter::core::{Interrupt, PendingLimiter};
//! use pending_limiter::runtime::TokioSpawner;
//!
//! let config = LimiterConfig::from_json_str(
//!     r#"{ "max_pending": 100, "threshold": 30, "operation_timeout_ms": 60000 }"#,
//! )?;
//! let limits = config.to_limits();
//! let limiter = PendingLimiter::new(limits.clone(), TokioSpawner::current());
//!
//! // Blocks this thread while 30 operations are pending.
//! let op = limiter.enqueue_blocking(async { send_request().await }, &Interrupt::new())?;
//!
//! // Reconfigure without restarting.
//! limits.threshold.set(50);
//! ```
//!
//! ## ReferenceCleaner - Deferred Cleanup
//!
//! [`core::ReferenceCleaner`] runs an action once a watched
//! [`core::Tracked`] value becomes unreachable, on a single worker thread
//! that exists only while there is something to watch.
//!
//! ```rust,ignore
//! use pending_limiter::core::{ReferenceCleaner, Tracked};
//!
//! let cleaner = ReferenceCleaner::new();
//! let buffer = Tracked::new(vec![0_u8; 4096]);
//! let watch = cleaner.register(&buffer, "buffer-17", |name| {
//!     tracing::info!(name, "buffer reclaimed");
//! });
//! ```

#![deny(warnings)]
#![deny(missing_docs)]
#![deny(unsafe_code)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]

/// Admission control, deferred cleanup, errors and observation hooks.
pub mod core;
/// Configuration models and live-updatable values.
pub mod config;
/// Runtime adapters that drive admitted operations.
#[cfg(feature = "tokio-runtime")]
pub mod runtime;
/// Shared utilities.
pub mod util;
