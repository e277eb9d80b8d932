//! Mock backends for tests.

use crate::backend::{Backend, JobState, JobStatus};
use crate::core::{ResourcePool, Task};
use crate::errors::EngineError;
use async_trait::async_trait;
use parking_lot::{Mutex, MutexGuard};
use serde_json::{json, Value};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

static REGISTRY_TEST_LOCK: Mutex<()> = Mutex::new(());

/// Serialises tests that touch the process-wide backend registry.
#[must_use]
pub fn registry_lock() -> MutexGuard<'static, ()> {
    REGISTRY_TEST_LOCK.lock()
}

type Handler = Arc<dyn Fn(&Task) -> Result<Value, EngineError> + Send + Sync>;

/// A backend that records calls and returns a configurable result.
pub struct MockBackend {
    name: String,
    result: Mutex<Value>,
    handler: Option<Handler>,
    delay: Option<Duration>,
    resources: Option<ResourcePool>,
    calls: Mutex<Vec<Task>>,
}

impl fmt::Debug for MockBackend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MockBackend")
            .field("name", &self.name)
            .field("delay", &self.delay)
            .field("calls", &self.calls.lock().len())
            .finish()
    }
}

impl MockBackend {
    /// Creates a healthy mock returning `{"ok": true}`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            result: Mutex::new(json!({"ok": true})),
            handler: None,
            delay: None,
            resources: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Sets the fixed result value.
    #[must_use]
    pub fn with_result(self, result: Value) -> Self {
        *self.result.lock() = result;
        self
    }

    /// Sets a handler computing the result from the executed task.
    #[must_use]
    pub fn with_handler(
        mut self,
        handler: impl Fn(&Task) -> Result<Value, EngineError> + Send + Sync + 'static,
    ) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sleeps for the given duration before each execution.
    #[must_use]
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reports the given resource pool from `get_resources`.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourcePool) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Number of executions so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }

    /// The tasks passed to `execute`, in order.
    #[must_use]
    pub fn calls(&self) -> Vec<Task> {
        self.calls.lock().clone()
    }
}

#[async_trait]
impl Backend for MockBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, task: &Task) -> Result<Value, EngineError> {
        self.calls.lock().push(task.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        match &self.handler {
            Some(handler) => handler(task),
            None => Ok(self.result.lock().clone()),
        }
    }

    async fn get_status(&self, id: &str) -> Result<JobStatus, EngineError> {
        Ok(JobStatus {
            id: id.to_string(),
            status: JobState::Completed,
            result: Some(self.result.lock().clone()),
            error: None,
            progress: Some(100),
        })
    }

    async fn is_healthy(&self) -> Result<bool, EngineError> {
        Ok(true)
    }

    fn get_resources(&self) -> Option<ResourcePool> {
        self.resources.clone()
    }
}

/// A backend that fails a fixed number of times before succeeding.
#[derive(Debug)]
pub struct FlakyBackend {
    name: String,
    failures: u32,
    attempts: AtomicU32,
    result: Value,
}

impl FlakyBackend {
    /// Fails `failures` times, then succeeds with `{"recovered": true}`.
    #[must_use]
    pub fn new(name: impl Into<String>, failures: u32) -> Self {
        Self {
            name: name.into(),
            failures,
            attempts: AtomicU32::new(0),
            result: json!({"recovered": true}),
        }
    }

    /// Total executions so far.
    #[must_use]
    pub fn attempts(&self) -> u32 {
        self.attempts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Backend for FlakyBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _task: &Task) -> Result<Value, EngineError> {
        let attempt = self.attempts.fetch_add(1, Ordering::SeqCst) + 1;
        if attempt <= self.failures {
            Err(EngineError::execution(format!(
                "transient failure on attempt {attempt}"
            )))
        } else {
            Ok(self.result.clone())
        }
    }

    async fn get_status(&self, id: &str) -> Result<JobStatus, EngineError> {
        Ok(JobStatus {
            id: id.to_string(),
            status: JobState::Running,
            result: None,
            error: None,
            progress: None,
        })
    }

    async fn is_healthy(&self) -> Result<bool, EngineError> {
        Ok(true)
    }
}

/// A backend that reports itself unhealthy, or whose health probe errors.
#[derive(Debug)]
pub struct UnhealthyBackend {
    name: String,
    probe_errors: bool,
}

impl UnhealthyBackend {
    /// Probe returns `Ok(false)`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probe_errors: false,
        }
    }

    /// Probe itself fails; selection must treat this as unhealthy.
    #[must_use]
    pub fn erroring(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            probe_errors: true,
        }
    }
}

#[async_trait]
impl Backend for UnhealthyBackend {
    fn name(&self) -> &str {
        &self.name
    }

    async fn execute(&self, _task: &Task) -> Result<Value, EngineError> {
        Err(EngineError::execution("backend is down"))
    }

    async fn get_status(&self, id: &str) -> Result<JobStatus, EngineError> {
        Ok(JobStatus {
            id: id.to_string(),
            status: JobState::Failed,
            result: None,
            error: Some("backend is down".to_string()),
            progress: None,
        })
    }

    async fn is_healthy(&self) -> Result<bool, EngineError> {
        if self.probe_errors {
            Err(EngineError::execution("health probe exploded"))
        } else {
            Ok(false)
        }
    }
}

/// A mock that doubles `payload.value`, for fan-out tests.
#[must_use]
pub fn doubling_backend(name: impl Into<String>) -> MockBackend {
    MockBackend::new(name).with_handler(|task| {
        let value = task
            .payload
            .get("value")
            .and_then(Value::as_i64)
            .ok_or_else(|| EngineError::execution("payload.value must be a number"))?;
        Ok(json!({"processed": value, "doubled": value * 2}))
    })
}
