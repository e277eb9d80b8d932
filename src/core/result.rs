//! Pipeline result and skip-marker values.

use super::status::StepStatus;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// Structured outcome of a pipeline execution.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineResult {
    /// Results ordered by declared step index. Slots hold the step's result,
    /// a skip marker, or an error marker for optional failures.
    pub steps: Vec<Value>,

    /// Results keyed by step id.
    pub step_results: Map<String, Value>,

    /// Status records ordered by declared step index.
    pub step_status: Vec<StepStatus>,

    /// The last declared step's result.
    pub final_result: Value,

    /// Total wall-clock duration in milliseconds.
    pub total_duration: u64,

    /// Step ids dispatched together in one scheduling tick (groups of 2+).
    pub parallel_groups: Vec<Vec<String>>,
}

impl PipelineResult {
    /// Looks up a step result by id.
    #[must_use]
    pub fn result_of(&self, id: &str) -> Option<&Value> {
        self.step_results.get(id)
    }

    /// Returns the status record for a step id.
    #[must_use]
    pub fn status_of(&self, id: &str) -> Option<&StepStatus> {
        self.step_status.iter().find(|s| s.id == id)
    }
}

/// Marker recorded for a step skipped by its `runWhen` condition or an
/// `on-demand` gate.
#[must_use]
pub fn skip_marker(reason: &str) -> Value {
    json!({ "skipped": true, "reason": reason })
}

/// Marker for a step whose condition template resolved falsy; keeps the
/// original condition string for debugging.
#[must_use]
pub fn condition_skip_marker(condition: &str) -> Value {
    json!({ "skipped": true, "reason": "condition-false", "condition": condition })
}

/// Marker for an optional step whose execution failed.
#[must_use]
pub fn error_skip_marker(error: &str) -> Value {
    json!({ "error": error, "skipped": true })
}

/// Returns true if the value is any of the skip markers.
#[must_use]
pub fn is_skip_marker(value: &Value) -> bool {
    value.get("skipped").and_then(Value::as_bool) == Some(true)
}
