//! Error types at the crate boundary and inside the scheduler.
//!
//! Shaped the same way as `clawd::agents::orchestrator::OrchestratorError` —
//! a flat `thiserror` enum per fallible surface, never a panic.

use thiserror::Error;

/// Errors returned by [`crate::registry::Registry`] and
/// [`crate::spec::CheckSpecification::commit`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum HealthError {
    #[error("a check named {name:?} is already registered")]
    Duplicate { name: String },

    #[error("no check named {name:?} is registered")]
    NoSuchCheck { name: String },

    #[error("the registry has not been started yet")]
    NotRunning,

    #[error("the registry has been shut down and cannot be restarted")]
    AlreadyShutdown,

    #[error("invalid check specification: {reason}")]
    InvalidSpecification { reason: String },
}

/// Errors surfaced on a refresh promise (§7 tier 2) or from
/// `updateStatusAndWait`.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RunnerError {
    #[error("health check execution failed: {0}")]
    ExecutionFailure(String),

    #[error("the check runner was stopped before this refresh completed")]
    Stopped,

    #[error("timed out waiting for the check to refresh")]
    Timeout,
}
