//! Execution backend abstraction.
//!
//! A backend is a named adapter capable of executing a task type
//! out-of-process (a remote compute service, a local worker pool, a mock).
//! The engine wraps `execute` with retry and timeout; it never cancels work
//! on its own.

mod registry;

pub use registry::{
    all_backends, clear_backends, get_backend, register_backend, select_backend,
    unregister_backend,
};

use crate::core::{ResourcePool, Task};
use crate::errors::EngineError;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;

/// The lifecycle state of a job on a backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    /// Accepted but not started.
    Queued,
    /// Currently executing.
    Running,
    /// Finished successfully.
    Completed,
    /// Finished with an error.
    Failed,
}

/// Status of a job previously submitted to a backend.
///
/// Consumed by the surrounding HTTP surface, not by the engine itself.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobStatus {
    /// The job id.
    pub id: String,
    /// Current state.
    pub status: JobState,
    /// Result value, when completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error text, when failed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Progress percentage, when reported.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub progress: Option<u8>,
}

/// A pluggable execution backend.
#[async_trait]
pub trait Backend: Send + Sync + Debug {
    /// The backend's registry name.
    fn name(&self) -> &str;

    /// Executes a task and returns its result value.
    async fn execute(&self, task: &Task) -> Result<Value, EngineError>;

    /// Fetches the status of a previously submitted job.
    async fn get_status(&self, id: &str) -> Result<JobStatus, EngineError>;

    /// Health probe. A failing probe is treated as unhealthy by selection.
    async fn is_healthy(&self) -> Result<bool, EngineError>;

    /// Requests cancellation of a job. Backends without cancellation keep
    /// the default and report `false`.
    async fn cancel(&self, _id: &str) -> Result<bool, EngineError> {
        Ok(false)
    }

    /// Reports the backend's resource pool, when it tracks one.
    fn get_resources(&self) -> Option<ResourcePool> {
        None
    }
}
