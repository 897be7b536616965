//! Observation hook around admitted operations.
//!
//! Instrumentation layers (indicator export, profiling of operation lifetime)
//! attach here. Observers only see events; they cannot veto or delay an
//! admission.

use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Identifier of one admitted operation, unique per limiter.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct OperationId(pub u64);

impl fmt::Display for OperationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "op-{}", self.0)
    }
}

/// How an admitted operation gave back its slot.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Completion {
    /// The operation produced its output.
    Finished,
    /// The operation outlived the operation timeout. It keeps running, but no
    /// longer counts as pending.
    TimedOut,
    /// The operation was dropped without finishing (panic, runtime shutdown,
    /// or an admission nobody launched).
    Abandoned,
}

/// Receives admission lifecycle events.
///
/// Both methods default to no-ops. They are called on the thread that caused
/// the transition and must not block.
pub trait AdmissionObserver: Send + Sync {
    /// An operation was admitted; `pending` includes it.
    fn on_admitted(&self, id: OperationId, pending: u64) {
        let _ = (id, pending);
    }

    /// An operation released its slot after `lifetime`; `pending` excludes it.
    fn on_completed(&self, id: OperationId, completion: Completion, lifetime: Duration, pending: u64) {
        let _ = (id, completion, lifetime, pending);
    }
}

/// Observer that emits `tracing` events.
#[derive(Debug, Clone)]
pub struct TracingObserver {
    name: String,
}

impl TracingObserver {
    /// Create an observer tagging its events with `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

impl AdmissionObserver for TracingObserver {
    fn on_admitted(&self, id: OperationId, pending: u64) {
        tracing::debug!(limiter = %self.name, operation = %id, pending, "operation admitted");
    }

    fn on_completed(&self, id: OperationId, completion: Completion, lifetime: Duration, pending: u64) {
        match completion {
            Completion::Finished => tracing::debug!(
                limiter = %self.name,
                operation = %id,
                ?lifetime,
                pending,
                "operation completed"
            ),
            Completion::TimedOut | Completion::Abandoned => tracing::warn!(
                limiter = %self.name,
                operation = %id,
                ?completion,
                ?lifetime,
                pending,
                "operation released without completing"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_operation_id_display() {
        assert_eq!(OperationId(42).to_string(), "op-42");
    }

    #[test]
    fn test_completion_serializes_snake_case() {
        let json = serde_json::to_string(&Completion::TimedOut).unwrap();
        assert_eq!(json, "\"timed_out\"");
    }
}
