//! Chunked execution of long-running tasks.
//!
//! A chunkable task is split into time windows over its input field; each
//! window becomes a plain sub-task and results are re-assembled with the
//! configured merge strategy. The engine treats each chunk as a single task.

use crate::core::{ChunkConfig, MergeStrategy, Task};
use serde_json::{json, Value};

/// Whether the task should be chunked: the payload must carry the configured
/// input field and a numeric `duration` (seconds) exceeding the chunk size.
#[must_use]
pub fn should_chunk(task: &Task, config: &ChunkConfig) -> bool {
    let Some(size) = config.size_seconds() else {
        return false;
    };
    if size <= 0.0 || !task.payload.contains_key(&config.input_field) {
        return false;
    }
    task.payload
        .get("duration")
        .and_then(Value::as_f64)
        .is_some_and(|duration| duration > size)
}

/// Splits the task into window sub-tasks with `start`/`end` payload fields.
///
/// Windows overlap by the configured amount; the final window is clamped to
/// the total duration.
#[must_use]
pub fn plan_chunks(task: &Task, config: &ChunkConfig) -> Vec<Task> {
    let Some(size) = config.size_seconds() else {
        return Vec::new();
    };
    let Some(duration) = task.payload.get("duration").and_then(Value::as_f64) else {
        return Vec::new();
    };

    let overlap = config.overlap_seconds();
    let stride = if overlap < size { size - overlap } else { size };

    let mut chunks = Vec::new();
    let mut start = 0.0;
    while start < duration {
        let end = (start + size).min(duration);
        let mut payload = task.payload.clone();
        payload.insert("start".to_string(), json!(start));
        payload.insert("end".to_string(), json!(end));

        chunks.push(Task {
            task_type: task.task_type.clone(),
            backend: task.backend.clone(),
            payload,
            resources: task.resources.clone(),
            retry: task.retry.clone(),
            ..Task::default()
        });

        start += stride;
    }
    chunks
}

/// Re-assembles chunk results in input order.
#[must_use]
pub fn merge_results(results: Vec<Value>, strategy: MergeStrategy) -> Value {
    match strategy {
        MergeStrategy::Concat => Value::Array(
            results
                .into_iter()
                .flat_map(|value| match value {
                    Value::Array(items) => items,
                    other => vec![other],
                })
                .collect(),
        ),
        MergeStrategy::ConcatSegments => {
            let segments: Vec<Value> = results
                .into_iter()
                .flat_map(|value| match value.get("segments") {
                    Some(Value::Array(items)) => items.clone(),
                    _ => Vec::new(),
                })
                .collect();
            json!({ "segments": segments })
        }
        MergeStrategy::Aggregate => Value::Array(results),
    }
}
