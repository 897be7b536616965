//! Configuration models for the limiter and live-updatable values.

pub mod dynamic;
pub mod limiter;

pub use dynamic::{DynamicProperty, Subscription};
pub use limiter::{LimiterConfig, LimiterLimits};
