//! Error types for admission, cleanup, and configuration.

use thiserror::Error;

/// Errors returned to callers of the admission controller.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AdmissionError {
    /// A blocking enqueue was interrupted before the operation was admitted.
    /// The operation was not submitted and the pending count is unchanged.
    #[error("admission interrupted")]
    Interrupted,
    /// The limiter was closed; no new operations are admitted.
    #[error("limiter closed")]
    Closed,
    /// The runtime failed while running the admission wait.
    #[error("runtime error: {0}")]
    Runtime(String),
}

/// Errors observed when awaiting the result of an admitted operation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OperationError {
    /// The task driving the operation was dropped before producing a result,
    /// typically because it panicked or its runtime shut down.
    #[error("operation abandoned before completion")]
    Abandoned,
}

/// Failures inside the cleanup worker. These are logged, never propagated.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CleanupError {
    /// A cleanup action panicked. The watch still counts as fired.
    #[error("cleanup action for watch {watch} panicked: {message}")]
    ActionPanicked {
        /// Identifier of the watch whose action failed.
        watch: String,
        /// Panic payload rendered as text.
        message: String,
    },
}

/// Configuration validation and parsing errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A field failed validation.
    #[error("invalid config: {0}")]
    Invalid(String),
    /// Input could not be parsed.
    #[error("parse error: {0}")]
    Parse(String),
    /// A required environment variable is not set.
    #[error("missing environment variable `{0}`")]
    MissingVar(String),
}

/// Application-facing result using anyhow for higher-level contexts.
pub type AppResult<T> = Result<T, anyhow::Error>;
