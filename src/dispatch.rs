//! Task dispatch entry point.
//!
//! Routes a submitted task to the DAG runner, the sequential runner, chunked
//! execution, or a single backend call. Lifecycle effect lists on the task
//! are not interpreted here; the enclosing task runner fires them.

use crate::backend::select_backend;
use crate::core::{ChunkConfig, PipelineResult, RetryPolicy, Task};
use crate::errors::EngineError;
use crate::events::ExecutionHooks;
use crate::pipeline::{chunk, run_dag, run_sequential, with_retry};
use serde_json::Value;
use tracing::debug;

/// The outcome of processing a task.
#[derive(Debug, Clone)]
pub enum TaskOutcome {
    /// Result of a single (or chunked) backend execution.
    Single(Value),
    /// Structured result of a pipeline execution.
    Pipeline(Box<PipelineResult>),
}

impl TaskOutcome {
    /// The pipeline result, when the task was a pipeline.
    #[must_use]
    pub fn as_pipeline(&self) -> Option<&PipelineResult> {
        match self {
            Self::Pipeline(result) => Some(result),
            Self::Single(_) => None,
        }
    }

    /// The raw result value, when the task was a single execution.
    #[must_use]
    pub fn as_single(&self) -> Option<&Value> {
        match self {
            Self::Single(value) => Some(value),
            Self::Pipeline(_) => None,
        }
    }

    /// Collapses the outcome into a JSON value (pipelines serialize to
    /// their structured form).
    #[must_use]
    pub fn into_value(self) -> Value {
        match self {
            Self::Single(value) => value,
            Self::Pipeline(result) => {
                serde_json::to_value(*result).unwrap_or(Value::Null)
            }
        }
    }
}

/// Processes a task to completion.
///
/// Pipelines route to the DAG runner when any step declares an `id` or a
/// dependency, and to the sequential runner otherwise. Non-pipeline tasks
/// run once on a selected backend under the task's retry policy, after an
/// optional chunked fan-out.
pub async fn process_task(
    task: &Task,
    hooks: &ExecutionHooks,
    chunk_config: Option<&ChunkConfig>,
) -> Result<TaskOutcome, EngineError> {
    if task.is_pipeline() {
        let result = if task.has_dag_semantics() {
            debug!(task = %task.task_type, steps = task.steps.len(), "dispatching to DAG runner");
            run_dag(task, hooks).await?
        } else {
            debug!(task = %task.task_type, steps = task.steps.len(), "dispatching sequentially");
            run_sequential(task, hooks).await?
        };
        return Ok(TaskOutcome::Pipeline(Box::new(result)));
    }

    if let Some(config) = chunk_config {
        if chunk::should_chunk(task, config) {
            return run_chunked(task, config).await.map(TaskOutcome::Single);
        }
    }

    execute_once(task).await.map(TaskOutcome::Single)
}

/// Executes a plain task on a selected backend under its retry policy.
async fn execute_once(task: &Task) -> Result<Value, EngineError> {
    let backend = select_backend(task).await?;
    let policy = task.retry.clone().unwrap_or_else(RetryPolicy::none);
    with_retry(&policy, None, || backend.execute(task)).await
}

/// Splits a chunkable task into windows, executes them in input order, and
/// merges the results.
async fn run_chunked(task: &Task, config: &ChunkConfig) -> Result<Value, EngineError> {
    let chunks = chunk::plan_chunks(task, config);
    debug!(
        task = %task.task_type,
        chunks = chunks.len(),
        strategy = ?config.merge_strategy,
        "executing chunked task"
    );

    let mut results = Vec::with_capacity(chunks.len());
    for sub in &chunks {
        results.push(execute_once(sub).await?);
    }
    Ok(chunk::merge_results(results, config.merge_strategy))
}
