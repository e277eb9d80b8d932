//! DAG pipeline runner.
//!
//! The scheduler keeps four membership sets over step ids: pending
//! (implicit), running, completed, and failed. Each tick dispatches every
//! runnable step concurrently, awaits the batch, and re-derives readiness
//! from the completed set. Optional-step failures are recorded as completed
//! with a skip marker so dependents still run.
//!
//! All bookkeeping lives behind a single mutex owned by one logical
//! executor; guards are dropped before every await.

use super::step_exec::{build_sub_task, dispatch_sub_task, effective_timeout};
use crate::core::{
    condition_skip_marker, error_skip_marker, skip_marker, PipelineResult, RunWhen, Step,
    StepStatus, Task,
};
use crate::errors::EngineError;
use crate::events::{EventKind, ExecutionHooks, PipelineEvent};
use crate::template;
use futures::future::join_all;
use parking_lot::Mutex;
use serde_json::{json, Map, Value};
use std::collections::{HashMap, HashSet};
use std::time::{Duration, Instant};
use tracing::{debug, warn};
use uuid::Uuid;

/// How long the scheduler sleeps when every pending step is blocked on
/// in-flight work.
const TICK_WAIT: Duration = Duration::from_millis(10);

/// Runs a pipeline through the DAG scheduler.
pub async fn run_dag(task: &Task, hooks: &ExecutionHooks) -> Result<PipelineResult, EngineError> {
    DagRunner::new(task, hooks).run().await
}

#[derive(Default)]
struct DagState {
    running: HashSet<String>,
    completed: HashSet<String>,
    failed: HashSet<String>,
    results: Map<String, Value>,
    statuses: HashMap<String, StepStatus>,
    parallel_groups: Vec<Vec<String>>,
}

enum Tick {
    Done,
    Dispatch(Vec<String>),
    Wait,
    Deadlock(Vec<String>),
}

struct DagRunner<'a> {
    task: &'a Task,
    hooks: &'a ExecutionHooks,
    /// (effective id, step) in declared order.
    steps: Vec<(String, &'a Step)>,
    state: Mutex<DagState>,
}

impl<'a> DagRunner<'a> {
    fn new(task: &'a Task, hooks: &'a ExecutionHooks) -> Self {
        let steps: Vec<(String, &Step)> = task
            .steps
            .iter()
            .enumerate()
            .map(|(i, step)| (step.effective_id(i), step))
            .collect();

        let mut state = DagState::default();
        for (id, step) in &steps {
            state
                .statuses
                .insert(id.clone(), StepStatus::pending(id.clone(), &step.task));
        }

        Self {
            task,
            hooks,
            steps,
            state: Mutex::new(state),
        }
    }

    async fn run(self) -> Result<PipelineResult, EngineError> {
        let started = Instant::now();
        let run_id = Uuid::new_v4();
        let total = self.steps.len();
        debug!(
            run_id = %run_id,
            task = %self.task.task_type,
            steps = total,
            "starting pipeline"
        );

        loop {
            let tick = {
                let state = self.state.lock();
                if state.completed.len() == total {
                    Tick::Done
                } else {
                    let runnable = self.runnable_ids(&state);
                    if !runnable.is_empty() {
                        Tick::Dispatch(runnable)
                    } else if !state.running.is_empty() {
                        Tick::Wait
                    } else {
                        Tick::Deadlock(
                            self.steps
                                .iter()
                                .filter(|(id, _)| !state.completed.contains(id))
                                .map(|(_, step)| step.task.clone())
                                .collect(),
                        )
                    }
                }
            };

            match tick {
                Tick::Done => break,
                Tick::Wait => tokio::time::sleep(TICK_WAIT).await,
                Tick::Deadlock(tasks) => {
                    warn!(run_id = %run_id, ?tasks, "pipeline deadlocked");
                    return Err(EngineError::deadlock(tasks));
                }
                Tick::Dispatch(runnable) => {
                    if runnable.len() > 1 {
                        self.state.lock().parallel_groups.push(runnable.clone());
                    }
                    let outcomes =
                        join_all(runnable.iter().map(|id| self.execute_step(id))).await;
                    for outcome in outcomes {
                        outcome?;
                    }
                    let percent = {
                        let state = self.state.lock();
                        progress_percent(state.completed.len(), total)
                    };
                    self.hooks.report_progress(percent);
                }
            }
        }

        let total_duration = started.elapsed().as_millis() as u64;
        self.emit(
            EventKind::PipelineComplete,
            None,
            None,
            json!({ "totalDuration": total_duration }),
        );
        debug!(run_id = %run_id, total_duration, "pipeline complete");

        Ok(self.into_result(total_duration))
    }

    /// A step is runnable iff it is not in flight or terminal and every
    /// dependency is in the completed set.
    fn runnable_ids(&self, state: &DagState) -> Vec<String> {
        self.steps
            .iter()
            .filter(|(id, _)| {
                !state.running.contains(id)
                    && !state.completed.contains(id)
                    && !state.failed.contains(id)
            })
            .filter(|(_, step)| {
                step.depends_on
                    .iter()
                    .all(|dep| state.completed.contains(dep))
            })
            .map(|(id, _)| id.clone())
            .collect()
    }

    async fn execute_step(&self, id: &str) -> Result<(), EngineError> {
        let Some((_, step)) = self.steps.iter().find(|(sid, _)| sid == id) else {
            return Err(EngineError::execution(format!("unknown step id \"{id}\"")));
        };

        {
            let mut state = self.state.lock();
            state.running.insert(id.to_string());
            if let Some(status) = state.statuses.get_mut(id) {
                status.mark_running();
            }
        }
        self.emit(
            EventKind::StepStart,
            Some(id),
            Some(&step.task),
            json!({}),
        );

        match &step.run_when {
            RunWhen::Always => {}
            RunWhen::OnDemand => {
                let marker = skip_marker("on-demand");
                self.record_skip(id, marker.clone(), None);
                self.emit(EventKind::StepComplete, Some(id), Some(&step.task), marker);
                return Ok(());
            }
            RunWhen::Condition(condition) => {
                let context = self.context();
                let resolved = template::resolve_value(condition, &context);
                if !template::is_truthy(resolved.as_ref()) {
                    debug!(step = %id, condition = %condition, "condition resolved falsy");
                    let marker = condition_skip_marker(condition);
                    self.record_skip(id, marker.clone(), None);
                    self.emit(EventKind::StepComplete, Some(id), Some(&step.task), marker);
                    return Ok(());
                }
            }
        }

        let outcome = match &step.for_each {
            Some(expr) => self.execute_fan_out(id, step, expr).await,
            None => self.execute_single(id, step).await,
        };

        match outcome {
            Ok(result) => {
                {
                    let mut state = self.state.lock();
                    state.running.remove(id);
                    state.completed.insert(id.to_string());
                    state.results.insert(id.to_string(), result.clone());
                    if let Some(status) = state.statuses.get_mut(id) {
                        status.mark_completed(result.clone());
                    }
                }
                self.emit(
                    EventKind::StepComplete,
                    Some(id),
                    Some(&step.task),
                    json!({ "result": result }),
                );
                Ok(())
            }
            Err(error) if step.optional => {
                let text = error.to_string();
                warn!(step = %id, error = %text, "optional step failed, skipping");
                self.record_skip(id, error_skip_marker(&text), Some(text.clone()));
                self.emit(
                    EventKind::StepError,
                    Some(id),
                    Some(&step.task),
                    json!({ "error": text, "optional": true }),
                );
                Ok(())
            }
            Err(error) => {
                let text = error.to_string();
                {
                    let mut state = self.state.lock();
                    state.running.remove(id);
                    state.failed.insert(id.to_string());
                    if let Some(status) = state.statuses.get_mut(id) {
                        status.mark_failed(text.clone());
                    }
                }
                self.emit(
                    EventKind::StepError,
                    Some(id),
                    Some(&step.task),
                    json!({ "error": text, "optional": false }),
                );
                Err(error)
            }
        }
    }

    async fn execute_single(&self, id: &str, step: &Step) -> Result<Value, EngineError> {
        let context = self.context();
        let payload = template::resolve_inputs(&step.input, &context);
        let sub = build_sub_task(self.task, step, payload);
        let timeout = effective_timeout(self.task, step);

        let observer = |attempt: u32| {
            let mut state = self.state.lock();
            if let Some(status) = state.statuses.get_mut(id) {
                status.retry_attempt = Some(attempt);
            }
        };
        dispatch_sub_task(&sub, id, timeout, Some(&observer)).await
    }

    /// Fans a step out over the items of its resolved array, in sequential
    /// batches bounded by `forEachConcurrency`. Item results keep input
    /// order; any item failure fails the step.
    async fn execute_fan_out(
        &self,
        id: &str,
        step: &Step,
        expr: &str,
    ) -> Result<Value, EngineError> {
        let context = self.context();
        let items = match template::resolve_value(expr, &context) {
            Some(Value::Array(items)) => items,
            Some(other) => {
                return Err(EngineError::ForEachNotArray {
                    expr: expr.to_string(),
                    got: template::type_name(&other).to_string(),
                })
            }
            None => {
                return Err(EngineError::ForEachNotArray {
                    expr: expr.to_string(),
                    got: "undefined".to_string(),
                })
            }
        };

        if items.is_empty() {
            return Ok(Value::Array(Vec::new()));
        }

        let batch_size = step
            .for_each_concurrency
            .unwrap_or(items.len())
            .clamp(1, items.len());
        let timeout = effective_timeout(self.task, step);

        let mut results = Vec::with_capacity(items.len());
        for (batch_index, batch) in items.chunks(batch_size).enumerate() {
            let outcomes = join_all(batch.iter().enumerate().map(|(offset, item)| {
                let index = batch_index * batch_size + offset;
                self.execute_item(id, step, &context, item, index, timeout)
            }))
            .await;
            for outcome in outcomes {
                results.push(outcome?);
            }
        }

        Ok(Value::Array(results))
    }

    async fn execute_item(
        &self,
        id: &str,
        step: &Step,
        base_context: &Value,
        item: &Value,
        index: usize,
        timeout: Option<f64>,
    ) -> Result<Value, EngineError> {
        let mut context = base_context.clone();
        if let Value::Object(map) = &mut context {
            map.insert("item".to_string(), item.clone());
            map.insert("index".to_string(), json!(index));
        }

        let payload = template::resolve_inputs(&step.input, &context);
        let sub = build_sub_task(self.task, step, payload);
        let label = format!("{id}[{index}]");

        let observer = |attempt: u32| {
            let mut state = self.state.lock();
            if let Some(status) = state.statuses.get_mut(id) {
                status.retry_attempt = Some(attempt);
            }
        };
        dispatch_sub_task(&sub, &label, timeout, Some(&observer)).await
    }

    /// Records a skip outcome as completed so dependents unblock.
    fn record_skip(&self, id: &str, marker: Value, error: Option<String>) {
        let mut state = self.state.lock();
        state.running.remove(id);
        state.completed.insert(id.to_string());
        state.results.insert(id.to_string(), marker);
        if let Some(status) = state.statuses.get_mut(id) {
            status.mark_skipped(error);
        }
    }

    /// The template context: `payload` plus step results keyed by id.
    fn context(&self) -> Value {
        let state = self.state.lock();
        json!({ "payload": self.task.payload, "steps": state.results })
    }

    fn emit(&self, kind: EventKind, step: Option<&str>, task: Option<&str>, data: Value) {
        self.hooks.emit(PipelineEvent::new(
            kind,
            step.map(str::to_string),
            task.map(str::to_string),
            data,
        ));
    }

    fn into_result(self, total_duration: u64) -> PipelineResult {
        let state = self.state.into_inner();

        let ordered: Vec<Value> = self
            .steps
            .iter()
            .map(|(id, _)| state.results.get(id).cloned().unwrap_or(Value::Null))
            .collect();
        let final_result = ordered.last().cloned().unwrap_or(Value::Null);

        let step_status: Vec<StepStatus> = self
            .steps
            .iter()
            .filter_map(|(id, _)| state.statuses.get(id).cloned())
            .collect();

        PipelineResult {
            steps: ordered,
            step_results: state.results,
            step_status,
            final_result,
            total_duration,
            parallel_groups: state.parallel_groups,
        }
    }
}

fn progress_percent(completed: usize, total: usize) -> u8 {
    if total == 0 {
        return 100;
    }
    (100.0 * completed as f64 / total as f64).round() as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::{clear_backends, register_backend};
    use crate::testing::mocks::{registry_lock, MockBackend};
    use std::sync::Arc;

    fn echo_backend(name: &str) -> Arc<MockBackend> {
        Arc::new(MockBackend::new(name).with_handler(|task| {
            Ok(json!({ "echo": task.payload, "task": task.task_type }))
        }))
    }

    #[tokio::test]
    async fn test_results_keyed_by_id_context() {
        let _guard = registry_lock();
        clear_backends();
        register_backend(echo_backend("echo"));

        let task = Task::new("pipeline")
            .with_payload("url", "https://example.com/a.mp3")
            .with_step(
                Step::new("media.download")
                    .with_id("fetch")
                    .with_input("url", "{{payload.url}}"),
            )
            .with_step(
                Step::new("audio.transcribe")
                    .with_id("transcribe")
                    .after("fetch")
                    .with_input("source", "{{steps.fetch.echo.url}}"),
            );

        let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();

        assert_eq!(result.steps.len(), 2);
        assert_eq!(
            result.step_results["transcribe"]["echo"]["source"],
            json!("https://example.com/a.mp3")
        );
        assert_eq!(result.final_result, result.step_results["transcribe"]);
    }

    #[tokio::test]
    async fn test_default_ids_by_index() {
        let _guard = registry_lock();
        clear_backends();
        register_backend(echo_backend("echo"));

        // One explicit id routes the whole pipeline through the DAG runner;
        // the other step still gets an index-derived id.
        let task = Task::new("pipeline")
            .with_step(Step::new("a").with_id("first"))
            .with_step(Step::new("b"));

        let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();
        assert!(result.step_results.contains_key("first"));
        assert!(result.step_results.contains_key("step_1"));
    }

    #[tokio::test]
    async fn test_empty_for_each_completes_immediately() {
        let _guard = registry_lock();
        clear_backends();
        register_backend(echo_backend("echo"));

        let task = Task::new("pipeline")
            .with_payload("items", json!([]))
            .with_step(
                Step::new("noop")
                    .with_id("fanout")
                    .for_each("{{payload.items}}"),
            );

        let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();
        assert_eq!(result.step_results["fanout"], json!([]));
        assert_eq!(result.status_of("fanout").unwrap().status.to_string(), "completed");
    }

    #[tokio::test]
    async fn test_for_each_type_mismatch_fails_step() {
        let _guard = registry_lock();
        clear_backends();
        register_backend(echo_backend("echo"));

        let task = Task::new("pipeline").with_payload("items", "not-an-array").with_step(
            Step::new("noop")
                .with_id("fanout")
                .for_each("{{payload.items}}"),
        );

        let err = run_dag(&task, &ExecutionHooks::new()).await.unwrap_err();
        assert_eq!(
            err.to_string(),
            "forEach template \"{{payload.items}}\" did not resolve to array, got: string"
        );
    }

    #[tokio::test]
    async fn test_on_demand_skips_and_unblocks() {
        let _guard = registry_lock();
        clear_backends();
        register_backend(echo_backend("echo"));

        let task = Task::new("pipeline")
            .with_step(Step::new("lazy").with_id("lazy").run_when("on-demand"))
            .with_step(Step::new("after").with_id("after").after("lazy"));

        let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();
        assert_eq!(result.step_results["lazy"]["reason"], json!("on-demand"));
        assert_eq!(result.status_of("lazy").unwrap().status.to_string(), "skipped");
        assert_eq!(result.status_of("after").unwrap().status.to_string(), "completed");
    }

    #[tokio::test]
    async fn test_progress_is_monotonic() {
        let _guard = registry_lock();
        clear_backends();
        register_backend(echo_backend("echo"));

        let seen = Arc::new(parking_lot::Mutex::new(Vec::new()));
        let seen_cb = seen.clone();
        let hooks = ExecutionHooks::new().with_progress(move |p| seen_cb.lock().push(p));

        let task = Task::new("pipeline")
            .with_step(Step::new("a").with_id("a"))
            .with_step(Step::new("b").with_id("b").after("a"))
            .with_step(Step::new("c").with_id("c").after("b"));
        run_dag(&task, &hooks).await.unwrap();

        let seen = seen.lock().clone();
        assert!(!seen.is_empty());
        assert!(seen.windows(2).all(|w| w[0] <= w[1]));
        assert_eq!(*seen.last().unwrap(), 100);
    }
}
