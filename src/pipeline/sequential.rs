//! Legacy sequential pipeline runner.
//!
//! Executes steps one at a time in declared order. Unlike the DAG runner,
//! the template context exposes `steps` as an *array* of prior results, so
//! index templates like `{{steps.0.path}}` keep working for pipelines that
//! predate step ids.

use super::step_exec::{build_sub_task, dispatch_sub_task, effective_timeout};
use crate::core::{
    condition_skip_marker, error_skip_marker, skip_marker, PipelineResult, RunWhen, StepStatus,
    Task,
};
use crate::errors::EngineError;
use crate::events::ExecutionHooks;
use crate::template;
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Instant;
use tracing::{debug, warn};

/// Runs a pipeline's steps strictly in declaration order.
pub async fn run_sequential(
    task: &Task,
    hooks: &ExecutionHooks,
) -> Result<PipelineResult, EngineError> {
    let started = Instant::now();
    let total = task.steps.len();

    let mut ordered: Vec<Value> = Vec::with_capacity(total);
    let mut by_id: Map<String, Value> = Map::new();
    let mut statuses: Vec<StepStatus> = task
        .steps
        .iter()
        .enumerate()
        .map(|(i, step)| StepStatus::pending(step.effective_id(i), &step.task))
        .collect();

    for (index, step) in task.steps.iter().enumerate() {
        let id = step.effective_id(index);
        let status = &mut statuses[index];
        status.mark_running();

        let context = json!({ "payload": task.payload, "steps": ordered });

        match &step.run_when {
            RunWhen::Always => {}
            RunWhen::OnDemand => {
                debug!(step = %id, "skipping on-demand step");
                status.mark_skipped(None);
                let marker = skip_marker("on-demand");
                by_id.insert(id, marker.clone());
                ordered.push(marker);
                hooks.report_progress(percent(index + 1, total));
                continue;
            }
            RunWhen::Condition(condition) => {
                let resolved = template::resolve_value(condition, &context);
                if !template::is_truthy(resolved.as_ref()) {
                    debug!(step = %id, condition = %condition, "condition resolved falsy");
                    status.mark_skipped(None);
                    let marker = condition_skip_marker(condition);
                    by_id.insert(id, marker.clone());
                    ordered.push(marker);
                    hooks.report_progress(percent(index + 1, total));
                    continue;
                }
            }
        }

        let payload = template::resolve_inputs(&step.input, &context);
        let sub = build_sub_task(task, step, payload);
        let timeout = effective_timeout(task, step);

        let attempt_seen = AtomicU32::new(0);
        let observer = |attempt: u32| attempt_seen.store(attempt, Ordering::SeqCst);
        let outcome = dispatch_sub_task(&sub, &id, timeout, Some(&observer)).await;
        let attempts = attempt_seen.load(Ordering::SeqCst);
        if attempts > 0 {
            status.retry_attempt = Some(attempts);
        }

        match outcome {
            Ok(result) => {
                status.mark_completed(result.clone());
                by_id.insert(id, result.clone());
                ordered.push(result);
            }
            Err(error) if step.optional => {
                let text = error.to_string();
                warn!(step = %id, error = %text, "optional step failed, skipping");
                status.mark_skipped(Some(text.clone()));
                let marker = error_skip_marker(&text);
                by_id.insert(id, marker.clone());
                ordered.push(marker);
            }
            Err(error) => {
                status.mark_failed(error.to_string());
                return Err(error);
            }
        }

        hooks.report_progress(percent(index + 1, total));
    }

    let final_result = ordered.last().cloned().unwrap_or(Value::Null);
    Ok(PipelineResult {
        steps: ordered,
        step_results: by_id,
        step_status: statuses,
        final_result,
        total_duration: started.elapsed().as_millis() as u64,
        parallel_groups: Vec::new(),
    })
}

fn percent(done: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (100.0 * done as f64 / total as f64).round() as u8
}
