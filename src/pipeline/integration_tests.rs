//! End-to-end pipeline execution tests.

use crate::backend::{clear_backends, register_backend};
use crate::core::{Backoff, RetryPolicy, Step, StepState, Task};
use crate::dispatch::process_task;
use crate::events::{CollectingEventSink, ExecutionHooks};
use crate::pipeline::run_dag;
use crate::testing::mocks::{doubling_backend, registry_lock, FlakyBackend, MockBackend};
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

fn echo_backend(name: &str) -> Arc<MockBackend> {
    Arc::new(MockBackend::new(name).with_handler(|task| {
        Ok(json!({ "echo": task.payload, "task": task.task_type }))
    }))
}

#[tokio::test]
async fn test_independent_steps_run_in_parallel() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(
        MockBackend::new("slow").with_delay(Duration::from_millis(50)),
    ));

    let task = Task::new("p")
        .with_step(Step::new("sleep.a").with_id("a"))
        .with_step(Step::new("sleep.b").with_id("b"));

    let started = Instant::now();
    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(150), "took {elapsed:?}");

    let a = result.status_of("a").unwrap().started_at.unwrap();
    let b = result.status_of("b").unwrap().started_at.unwrap();
    let spread = (a - b).num_milliseconds().abs();
    assert!(spread < 20, "start spread was {spread}ms");
}

#[tokio::test]
async fn test_linear_dependency_ordering() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(
        MockBackend::new("mock").with_delay(Duration::from_millis(10)),
    ));

    let task = Task::new("p")
        .with_step(Step::new("first").with_id("a"))
        .with_step(Step::new("second").with_id("b").after("a"));

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();

    let a_completed = result.status_of("a").unwrap().completed_at.unwrap();
    let b_started = result.status_of("b").unwrap().started_at.unwrap();
    assert!(b_started >= a_completed);
    assert!(result.parallel_groups.is_empty());
}

#[tokio::test]
async fn test_diamond_topology() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(echo_backend("echo"));

    let task = Task::new("p")
        .with_step(Step::new("source").with_id("a"))
        .with_step(Step::new("left").with_id("b").after("a"))
        .with_step(Step::new("right").with_id("c").after("a"))
        .with_step(Step::new("join").with_id("d").after("b").after("c"));

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();

    assert_eq!(result.steps.len(), 4);
    for id in ["a", "b", "c", "d"] {
        assert_eq!(result.status_of(id).unwrap().status, StepState::Completed);
    }

    let middle = result
        .parallel_groups
        .iter()
        .find(|group| group.contains(&"b".to_string()))
        .expect("b and c should form a parallel group");
    assert!(middle.contains(&"c".to_string()));

    let d_started = result.status_of("d").unwrap().started_at.unwrap();
    for id in ["b", "c"] {
        let completed = result.status_of(id).unwrap().completed_at.unwrap();
        assert!(completed <= d_started);
    }
}

#[tokio::test]
async fn test_for_each_doubles_each_item() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(doubling_backend("double")));

    let task = Task::new("p")
        .with_payload("numbers", json!([1, 2, 3, 4, 5]))
        .with_step(
            Step::new("math.double")
                .with_id("process")
                .for_each("{{payload.numbers}}")
                .with_input("value", "{{item}}"),
        );

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();

    let items = result.step_results["process"].as_array().unwrap();
    assert_eq!(items.len(), 5);
    assert_eq!(items[0], json!({"processed": 1, "doubled": 2}));
    assert_eq!(items[4], json!({"processed": 5, "doubled": 10}));
}

#[tokio::test]
async fn test_for_each_concurrency_cap_serialises() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(
        doubling_backend("double").with_delay(Duration::from_millis(20)),
    ));

    let task = Task::new("p")
        .with_payload("numbers", json!([1, 2, 3]))
        .with_step(
            Step::new("math.double")
                .with_id("process")
                .for_each("{{payload.numbers}}")
                .with_concurrency(1)
                .with_input("value", "{{item}}"),
        );

    let started = Instant::now();
    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();
    let elapsed = started.elapsed();

    // Three serial batches of one item each.
    assert!(elapsed >= Duration::from_millis(60), "took {elapsed:?}");
    let items = result.step_results["process"].as_array().unwrap();
    assert_eq!(items[2]["doubled"], json!(6));
}

#[tokio::test]
async fn test_circular_dependency_deadlocks() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(echo_backend("echo"));

    let task = Task::new("p")
        .with_step(Step::new("task.a").with_id("a").after("b"))
        .with_step(Step::new("task.b").with_id("b").after("a"));

    let err = run_dag(&task, &ExecutionHooks::new()).await.unwrap_err();
    assert!(err.to_string().contains("deadlock"), "{err}");
    assert!(err.to_string().contains("task.a"));
}

#[tokio::test]
async fn test_missing_dependency_deadlocks() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(echo_backend("echo"));

    let task = Task::new("p").with_step(Step::new("task.a").with_id("a").after("ghost"));

    let err = run_dag(&task, &ExecutionHooks::new()).await.unwrap_err();
    assert!(err.to_string().contains("deadlock"));
}

#[tokio::test]
async fn test_optional_middle_failure_skips_and_continues() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(MockBackend::new("mock").with_handler(|task| {
        if task.task_type == "explode" {
            Err(crate::errors::EngineError::execution("kaboom"))
        } else {
            Ok(json!({"ok": true}))
        }
    })));

    let task = Task::new("p")
        .with_step(Step::new("first").with_id("first"))
        .with_step(
            Step::new("explode")
                .with_id("optional")
                .after("first")
                .optional(),
        )
        .with_step(Step::new("last").with_id("last").after("optional"));

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();

    assert_eq!(result.step_results["optional"]["skipped"], json!(true));
    assert_eq!(result.step_results["optional"]["error"], json!("kaboom"));
    assert_eq!(
        result.status_of("optional").unwrap().status,
        StepState::Skipped
    );
    assert_eq!(result.status_of("last").unwrap().status, StepState::Completed);
}

#[tokio::test]
async fn test_retry_recovers_flaky_step() {
    let _guard = registry_lock();
    clear_backends();
    let backend = Arc::new(FlakyBackend::new("flaky", 2));
    register_backend(backend.clone());

    let task = Task::new("p").with_step(
        Step::new("flaky.op").with_id("flaky").with_retry(
            RetryPolicy::none()
                .with_attempts(3)
                .with_backoff(Backoff::Fixed)
                .with_delay(10),
        ),
    );

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();

    let status = result.status_of("flaky").unwrap();
    assert_eq!(status.status, StepState::Completed);
    assert_eq!(status.retry_attempt, Some(3));
    assert_eq!(backend.attempts(), 3);
    assert_eq!(result.step_results["flaky"], json!({"recovered": true}));
}

#[tokio::test]
async fn test_step_timeout_aborts_pipeline() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(
        MockBackend::new("slow").with_delay(Duration::from_millis(100)),
    ));

    let task = Task::new("p").with_step(Step::new("slow.op").with_id("slow").with_timeout(0.01));

    let err = run_dag(&task, &ExecutionHooks::new()).await.unwrap_err();
    assert_eq!(err.to_string(), "\"slow\" timed out after 10ms");
}

#[tokio::test]
async fn test_optional_timeout_becomes_skip() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(
        MockBackend::new("slow").with_delay(Duration::from_millis(100)),
    ));

    let task = Task::new("p")
        .with_step(
            Step::new("slow.op")
                .with_id("slow")
                .with_timeout(0.01)
                .optional(),
        )
        .with_step(Step::new("after").with_id("after").after("slow"));

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();
    let status = result.status_of("slow").unwrap();
    assert_eq!(status.status, StepState::Skipped);
    assert!(status.error.as_deref().unwrap().contains("timed out"));
    assert_eq!(result.status_of("after").unwrap().status, StepState::Completed);
}

#[tokio::test]
async fn test_event_stream_ordering() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(echo_backend("echo"));

    let sink = Arc::new(CollectingEventSink::new());
    let hooks = ExecutionHooks::new().with_sink(sink.clone());

    let task = Task::new("p")
        .with_step(Step::new("first").with_id("a"))
        .with_step(Step::new("second").with_id("b").after("a"));

    run_dag(&task, &hooks).await.unwrap();

    let events = sink.events();
    let kinds: Vec<&str> = events.iter().map(|e| e.kind.as_str()).collect();
    assert_eq!(
        kinds,
        vec![
            "step:start",
            "step:complete",
            "step:start",
            "step:complete",
            "pipeline:complete",
        ]
    );
    assert_eq!(events[0].step.as_deref(), Some("a"));
    assert_eq!(events[2].step.as_deref(), Some("b"));
    assert!(events.last().unwrap().step.is_none());
}

#[tokio::test]
async fn test_status_ids_match_declared_steps() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(echo_backend("echo"));

    let task = Task::new("p")
        .with_step(Step::new("x").with_id("named"))
        .with_step(Step::new("y"))
        .with_step(Step::new("z").with_id("gated").run_when("on-demand"));

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();

    let ids: Vec<&str> = result.step_status.iter().map(|s| s.id.as_str()).collect();
    assert_eq!(ids, vec!["named", "step_1", "gated"]);
    assert_eq!(result.steps.len(), 3);

    for status in &result.step_status {
        if let (Some(started), Some(completed)) = (status.started_at, status.completed_at) {
            assert!(completed >= started);
            assert!(status.duration_ms.is_some());
        }
    }
}

#[tokio::test]
async fn test_dispatch_is_repeatable() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(doubling_backend("double")));

    let task = Task::new("p")
        .with_payload("numbers", json!([1, 2]))
        .with_step(
            Step::new("math.double")
                .with_id("process")
                .for_each("{{payload.numbers}}")
                .with_input("value", "{{item}}"),
        );

    let first = process_task(&task, &ExecutionHooks::new(), None).await.unwrap();
    let second = process_task(&task, &ExecutionHooks::new(), None).await.unwrap();

    let first = first.as_pipeline().unwrap();
    let second = second.as_pipeline().unwrap();
    assert_eq!(first.steps, second.steps);
    assert_eq!(first.final_result, second.final_result);
}

#[tokio::test]
async fn test_dependent_of_optional_failure_still_runs() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(Arc::new(MockBackend::new("mock").with_handler(|task| {
        if task.task_type == "explode" {
            Err(crate::errors::EngineError::execution("kaboom"))
        } else {
            Ok(json!({"ok": true}))
        }
    })));

    let task = Task::new("p")
        .with_step(Step::new("explode").with_id("shaky").optional())
        .with_step(Step::new("downstream").with_id("next").after("shaky"));

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();
    assert_eq!(result.status_of("next").unwrap().status, StepState::Completed);
}

#[tokio::test]
async fn test_missing_template_path_flows_as_null() {
    let _guard = registry_lock();
    clear_backends();
    register_backend(echo_backend("echo"));

    let task = Task::new("p").with_step(
        Step::new("consume")
            .with_id("c")
            .with_input("value", "{{payload.not.there}}"),
    );

    let result = run_dag(&task, &ExecutionHooks::new()).await.unwrap();
    assert_eq!(result.step_results["c"]["echo"]["value"], json!(null));
}
