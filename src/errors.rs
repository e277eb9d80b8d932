//! Error types for the taskweave engine.
//!
//! Every variant carries the stable, user-visible message string surfaced to
//! callers of the engine; downstream surfaces match on these messages.

use thiserror::Error;

/// The main error type for engine operations.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    /// A named backend was requested but never registered.
    #[error("Backend \"{name}\" not registered")]
    BackendNotRegistered {
        /// The requested backend name.
        name: String,
    },

    /// A named backend was found but reported itself unhealthy.
    #[error("Backend \"{name}\" is not healthy")]
    BackendUnhealthy {
        /// The unhealthy backend name.
        name: String,
    },

    /// Automatic selection found no healthy backend at all.
    #[error("No healthy backend available")]
    NoHealthyBackend,

    /// The scheduler found steps that can never become runnable.
    #[error(
        "Pipeline deadlock: cannot run remaining steps [{}]. \
         Check for circular dependencies or missing dependency IDs.",
        .tasks.join(", ")
    )]
    PipelineDeadlock {
        /// Task types of the unresolved steps.
        tasks: Vec<String>,
    },

    /// A step (or forEach item) exceeded its timeout.
    #[error("\"{label}\" timed out after {ms}ms")]
    StepTimeout {
        /// The step id or index label.
        label: String,
        /// The timeout in milliseconds.
        ms: u64,
    },

    /// A `forEach` template resolved to something other than an array.
    #[error("forEach template \"{expr}\" did not resolve to array, got: {got}")]
    ForEachNotArray {
        /// The original template expression.
        expr: String,
        /// The type name of the resolved value.
        got: String,
    },

    /// A backend raised during execution.
    #[error("{0}")]
    Execution(String),
}

impl EngineError {
    /// Creates a backend-not-registered error.
    #[must_use]
    pub fn not_registered(name: impl Into<String>) -> Self {
        Self::BackendNotRegistered { name: name.into() }
    }

    /// Creates a backend-unhealthy error.
    #[must_use]
    pub fn unhealthy(name: impl Into<String>) -> Self {
        Self::BackendUnhealthy { name: name.into() }
    }

    /// Creates a deadlock error from the unresolved steps' task types.
    #[must_use]
    pub fn deadlock(tasks: Vec<String>) -> Self {
        Self::PipelineDeadlock { tasks }
    }

    /// Creates a timeout error for the given label.
    #[must_use]
    pub fn timeout(label: impl Into<String>, ms: u64) -> Self {
        Self::StepTimeout {
            label: label.into(),
            ms,
        }
    }

    /// Creates an execution error from a backend failure.
    #[must_use]
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Returns true for errors produced by the backend-selection policy.
    #[must_use]
    pub fn is_selection_error(&self) -> bool {
        matches!(
            self,
            Self::BackendNotRegistered { .. }
                | Self::BackendUnhealthy { .. }
                | Self::NoHealthyBackend
        )
    }

    /// Returns true if the error is a step timeout.
    #[must_use]
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::StepTimeout { .. })
    }
}
