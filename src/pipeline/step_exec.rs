//! Per-step dispatch shared by the sequential and DAG runners.

use super::retry::{with_retry, AttemptObserver};
use super::timeout::{timeout_from_secs, with_step_timeout};
use crate::backend::select_backend;
use crate::core::{RetryPolicy, Step, Task};
use crate::errors::EngineError;
use serde_json::{Map, Value};

/// Builds the sub-task submitted to a backend for one step (or one forEach
/// item). Step-level `resources`/`retry` override the task level.
pub(crate) fn build_sub_task(parent: &Task, step: &Step, payload: Map<String, Value>) -> Task {
    Task {
        task_type: step.task.clone(),
        backend: parent.backend.clone(),
        payload,
        resources: step.resources.clone().or_else(|| parent.resources.clone()),
        retry: step.retry.clone().or_else(|| parent.retry.clone()),
        ..Task::default()
    }
}

/// The timeout applied to a step, in seconds. Step timeout wins over the
/// task-level resource hint.
pub(crate) fn effective_timeout(parent: &Task, step: &Step) -> Option<f64> {
    step.timeout
        .or_else(|| parent.resources.as_ref().and_then(|r| r.timeout))
}

/// Selects a backend and executes the sub-task under retry and timeout.
pub(crate) async fn dispatch_sub_task(
    sub: &Task,
    label: &str,
    timeout_secs: Option<f64>,
    observer: Option<AttemptObserver<'_>>,
) -> Result<Value, EngineError> {
    let backend = select_backend(sub).await?;
    let policy = sub.retry.clone().unwrap_or_else(RetryPolicy::none);
    let duration = timeout_from_secs(timeout_secs);

    with_step_timeout(
        label,
        duration,
        with_retry(&policy, observer, || backend.execute(sub)),
    )
    .await
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{Backoff, ResourceRequirements};
    use serde_json::json;

    #[test]
    fn test_sub_task_inherits_and_overrides() {
        let parent = Task::new("pipeline")
            .with_backend("modal")
            .with_retry(RetryPolicy::none().with_attempts(2))
            .with_resources(ResourceRequirements::new().with_gpu("T4"));

        let plain = Step::new("llm.chat");
        let mut payload = Map::new();
        payload.insert("prompt".to_string(), json!("hi"));
        let sub = build_sub_task(&parent, &plain, payload.clone());
        assert_eq!(sub.task_type, "llm.chat");
        assert_eq!(sub.backend.as_deref(), Some("modal"));
        assert_eq!(sub.retry.as_ref().unwrap().attempts, 2);
        assert_eq!(sub.resources.as_ref().unwrap().gpu.as_deref(), Some("T4"));

        let overriding = Step::new("llm.chat")
            .with_retry(RetryPolicy::none().with_attempts(5).with_backoff(Backoff::Fixed))
            .with_resources(ResourceRequirements::new().with_gpu("A100"));
        let sub = build_sub_task(&parent, &overriding, payload);
        assert_eq!(sub.retry.as_ref().unwrap().attempts, 5);
        assert_eq!(sub.resources.as_ref().unwrap().gpu.as_deref(), Some("A100"));
    }

    #[test]
    fn test_effective_timeout_prefers_step() {
        let parent =
            Task::new("t").with_resources(ResourceRequirements::new().with_timeout(300.0));
        let step = Step::new("s");
        assert_eq!(effective_timeout(&parent, &step), Some(300.0));

        let step = Step::new("s").with_timeout(30.0);
        assert_eq!(effective_timeout(&parent, &step), Some(30.0));

        let bare = Task::new("t");
        let step = Step::new("s");
        assert_eq!(effective_timeout(&bare, &step), None);
    }
}
