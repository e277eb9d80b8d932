//! Step status lifecycle types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// The execution state of a step.
///
/// `pending -> running -> (completed | failed | skipped)`; terminal states
/// are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    /// Waiting on dependencies or a scheduling slot.
    Pending,
    /// Dispatched to a backend.
    Running,
    /// Finished successfully.
    Completed,
    /// Failed and aborted the pipeline.
    Failed,
    /// Skipped (condition false, on-demand, or optional failure).
    Skipped,
}

impl Default for StepState {
    fn default() -> Self {
        Self::Pending
    }
}

impl fmt::Display for StepState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Pending => write!(f, "pending"),
            Self::Running => write!(f, "running"),
            Self::Completed => write!(f, "completed"),
            Self::Failed => write!(f, "failed"),
            Self::Skipped => write!(f, "skipped"),
        }
    }
}

impl StepState {
    /// Returns true if the state is final.
    #[must_use]
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Skipped)
    }
}

/// Per-step status record exposed in [`PipelineResult`].
///
/// [`PipelineResult`]: crate::core::PipelineResult
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepStatus {
    /// The step id after defaulting.
    pub id: String,

    /// The step's task type.
    pub task: String,

    /// Current state.
    pub status: StepState,

    /// When the step was dispatched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,

    /// When the step reached a terminal state.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,

    /// Wall-clock duration in milliseconds.
    #[serde(rename = "duration", default, skip_serializing_if = "Option::is_none")]
    pub duration_ms: Option<u64>,

    /// Error text for failed or optional-skipped steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    /// The step's result value, when terminal and successful.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,

    /// The attempt number last reported by the retry loop.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_attempt: Option<u32>,
}

impl StepStatus {
    /// Creates a pending status for the given step.
    #[must_use]
    pub fn pending(id: impl Into<String>, task: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            task: task.into(),
            status: StepState::Pending,
            started_at: None,
            completed_at: None,
            duration_ms: None,
            error: None,
            result: None,
            retry_attempt: None,
        }
    }

    /// Marks the step running and stamps `started_at`.
    pub fn mark_running(&mut self) {
        self.status = StepState::Running;
        self.started_at = Some(Utc::now());
    }

    /// Marks the step completed with its result.
    pub fn mark_completed(&mut self, result: Value) {
        self.status = StepState::Completed;
        self.result = Some(result);
        self.finish();
    }

    /// Marks the step skipped, optionally recording the error that caused it.
    pub fn mark_skipped(&mut self, error: Option<String>) {
        self.status = StepState::Skipped;
        self.error = error;
        self.finish();
    }

    /// Marks the step failed with the error text.
    pub fn mark_failed(&mut self, error: impl Into<String>) {
        self.status = StepState::Failed;
        self.error = Some(error.into());
        self.finish();
    }

    fn finish(&mut self) {
        let now = Utc::now();
        self.completed_at = Some(now);
        if let Some(started) = self.started_at {
            let elapsed = (now - started).num_milliseconds().max(0);
            self.duration_ms = Some(elapsed as u64);
        }
    }
}
