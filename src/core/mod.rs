//! Admission control and deferred cleanup primitives.

pub mod cleaner;
pub mod error;
pub mod interrupt;
#[cfg(feature = "tokio-runtime")]
pub mod limiter;
pub mod observer;
pub mod spawn;

pub use cleaner::{ReferenceCleaner, Tracked, Watch, WatchId};
pub use error::{AdmissionError, AppResult, CleanupError, ConfigError, OperationError};
pub use interrupt::Interrupt;
#[cfg(feature = "tokio-runtime")]
pub use limiter::{LimiterSnapshot, PendingLimiter, PendingOperation};
pub use observer::{AdmissionObserver, Completion, OperationId, TracingObserver};
pub use spawn::Spawn;
