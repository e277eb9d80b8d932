//! The declarative task and step model.
//!
//! Tasks arrive as JSON in camelCase (`dependsOn`, `forEach`, `runWhen`) and
//! round-trip through serde unchanged. The engine never mutates a submitted
//! task; all derived state lives in the runners.

use super::resources::ResourceRequirements;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Backoff strategy for retried executions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backoff {
    /// delay = base
    Fixed,
    /// delay = base * 2^(attempt - 1)
    #[default]
    Exponential,
}

/// Retry policy for a task, step, or forEach item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RetryPolicy {
    /// Maximum attempts including the first (1 means no retry).
    #[serde(default = "default_attempts")]
    pub attempts: u32,

    /// Backoff strategy between attempts.
    #[serde(default)]
    pub backoff: Backoff,

    /// Base delay between attempts in milliseconds.
    #[serde(default = "default_delay")]
    pub delay: u64,
}

fn default_attempts() -> u32 {
    3
}

fn default_delay() -> u64 {
    1000
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: default_attempts(),
            backoff: Backoff::default(),
            delay: default_delay(),
        }
    }
}

impl RetryPolicy {
    /// Creates the default policy (3 attempts, exponential backoff).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A policy that executes exactly once.
    #[must_use]
    pub fn none() -> Self {
        Self {
            attempts: 1,
            backoff: Backoff::Fixed,
            delay: 0,
        }
    }

    /// Sets the attempt count.
    #[must_use]
    pub fn with_attempts(mut self, attempts: u32) -> Self {
        self.attempts = attempts;
        self
    }

    /// Sets the backoff strategy.
    #[must_use]
    pub fn with_backoff(mut self, backoff: Backoff) -> Self {
        self.backoff = backoff;
        self
    }

    /// Sets the base delay in milliseconds.
    #[must_use]
    pub fn with_delay(mut self, delay_ms: u64) -> Self {
        self.delay = delay_ms;
        self
    }
}

/// Condition gating a step's execution.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum RunWhen {
    /// Run unconditionally (the default).
    Always,
    /// Skip eagerly; reserved for demand-driven producers.
    OnDemand,
    /// Run only when the template resolves to a truthy value.
    Condition(String),
}

impl Default for RunWhen {
    fn default() -> Self {
        Self::Always
    }
}

impl From<String> for RunWhen {
    fn from(s: String) -> Self {
        match s.as_str() {
            "always" => Self::Always,
            "on-demand" => Self::OnDemand,
            _ => Self::Condition(s),
        }
    }
}

impl From<RunWhen> for String {
    fn from(r: RunWhen) -> Self {
        match r {
            RunWhen::Always => "always".to_string(),
            RunWhen::OnDemand => "on-demand".to_string(),
            RunWhen::Condition(s) => s,
        }
    }
}

/// The kind of a declarative lifecycle effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EffectKind {
    /// Show a toast in the dashboard.
    Toast,
    /// Call a webhook.
    Webhook,
    /// Send a notification.
    Notify,
    /// Enqueue a follow-up task.
    Enqueue,
    /// Invalidate a client cache.
    Invalidate,
    /// Emit a custom event.
    Emit,
}

/// A declarative side effect attached to a task lifecycle phase.
///
/// The engine carries these through untouched; the surrounding task runner
/// fires them.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SideEffect {
    /// The effect discriminator.
    #[serde(rename = "$event")]
    pub event: EffectKind,

    /// Effect-specific parameters, passed through opaquely.
    #[serde(flatten)]
    pub params: Map<String, Value>,
}

/// A declarative unit inside a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step {
    /// Step id; defaults to `step_<index>` when absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,

    /// Task type string routed by the backend.
    pub task: String,

    /// Template inputs resolved against the pipeline context.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub input: Map<String, Value>,

    /// Ids of steps that must complete first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub depends_on: Vec<String>,

    /// Template resolving to an array to fan out over.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each: Option<String>,

    /// Concurrency cap for forEach batches.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub for_each_concurrency: Option<usize>,

    /// Execution condition.
    #[serde(default, skip_serializing_if = "is_always")]
    pub run_when: RunWhen,

    /// Step timeout in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<f64>,

    /// Whether a failure is downgraded to a skip.
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    pub optional: bool,

    /// Per-step resource override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Per-step retry override.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,
}

fn is_always(r: &RunWhen) -> bool {
    *r == RunWhen::Always
}

impl Step {
    /// Creates a step for the given task type.
    #[must_use]
    pub fn new(task: impl Into<String>) -> Self {
        Self {
            id: None,
            task: task.into(),
            input: Map::new(),
            depends_on: Vec::new(),
            for_each: None,
            for_each_concurrency: None,
            run_when: RunWhen::Always,
            timeout: None,
            optional: false,
            resources: None,
            retry: None,
        }
    }

    /// Sets the step id.
    #[must_use]
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    /// Adds an input entry (usually a template string).
    #[must_use]
    pub fn with_input(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.input.insert(key.into(), value.into());
        self
    }

    /// Adds a dependency on another step id.
    #[must_use]
    pub fn after(mut self, dep: impl Into<String>) -> Self {
        self.depends_on.push(dep.into());
        self
    }

    /// Sets the forEach template.
    #[must_use]
    pub fn for_each(mut self, template: impl Into<String>) -> Self {
        self.for_each = Some(template.into());
        self
    }

    /// Caps forEach concurrency.
    #[must_use]
    pub fn with_concurrency(mut self, cap: usize) -> Self {
        self.for_each_concurrency = Some(cap);
        self
    }

    /// Sets the execution condition.
    #[must_use]
    pub fn run_when(mut self, condition: impl Into<String>) -> Self {
        self.run_when = RunWhen::from(condition.into());
        self
    }

    /// Sets the timeout in seconds.
    #[must_use]
    pub fn with_timeout(mut self, seconds: f64) -> Self {
        self.timeout = Some(seconds);
        self
    }

    /// Marks the step optional.
    #[must_use]
    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Sets the retry override.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the resource override.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceRequirements) -> Self {
        self.resources = Some(resources);
        self
    }

    /// The step id after defaulting by declared index.
    #[must_use]
    pub fn effective_id(&self, index: usize) -> String {
        self.id
            .clone()
            .unwrap_or_else(|| format!("step_{index}"))
    }
}

/// A declarative unit of work: a single task or a pipeline of steps.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    /// Task type string (e.g. "llm.chat", "image.detect").
    #[serde(rename = "type")]
    pub task_type: String,

    /// Backend hint: "auto", a named backend, or absent.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub backend: Option<String>,

    /// Queue routing hint, forwarded untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub queue: Option<String>,

    /// Priority hint, forwarded untouched.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub priority: Option<i64>,

    /// Task payload.
    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub payload: Map<String, Value>,

    /// Pipeline steps; presence converts the task into a pipeline.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub steps: Vec<Step>,

    /// Declared resource requirements.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resources: Option<ResourceRequirements>,

    /// Retry policy for the task and its steps.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry: Option<RetryPolicy>,

    /// Deferred-submission delay in seconds; the queue interprets this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub delay: Option<f64>,

    /// Cron expression for recurring submission; the queue interprets this.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cron: Option<String>,

    /// Effects fired when the task is queued.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_pending: Vec<SideEffect>,

    /// Effects fired on progress updates.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_progress: Vec<SideEffect>,

    /// Effects fired on success.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_success: Vec<SideEffect>,

    /// Effects fired on failure.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub on_error: Vec<SideEffect>,
}

impl Task {
    /// Creates a task of the given type.
    #[must_use]
    pub fn new(task_type: impl Into<String>) -> Self {
        Self {
            task_type: task_type.into(),
            ..Self::default()
        }
    }

    /// Sets the backend hint.
    #[must_use]
    pub fn with_backend(mut self, backend: impl Into<String>) -> Self {
        self.backend = Some(backend.into());
        self
    }

    /// Adds a payload entry.
    #[must_use]
    pub fn with_payload(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.payload.insert(key.into(), value.into());
        self
    }

    /// Appends a pipeline step.
    #[must_use]
    pub fn with_step(mut self, step: Step) -> Self {
        self.steps.push(step);
        self
    }

    /// Sets the retry policy.
    #[must_use]
    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = Some(retry);
        self
    }

    /// Sets the resource requirements.
    #[must_use]
    pub fn with_resources(mut self, resources: ResourceRequirements) -> Self {
        self.resources = Some(resources);
        self
    }

    /// Returns true when the task carries pipeline steps.
    #[must_use]
    pub fn is_pipeline(&self) -> bool {
        !self.steps.is_empty()
    }

    /// Returns true when any step opts into DAG semantics (an explicit id or
    /// a dependency).
    #[must_use]
    pub fn has_dag_semantics(&self) -> bool {
        self.steps
            .iter()
            .any(|s| s.id.is_some() || !s.depends_on.is_empty())
    }

    /// Returns true when backend selection should scan all backends.
    #[must_use]
    pub fn wants_auto_backend(&self) -> bool {
        match self.backend.as_deref() {
            None | Some("auto") => true,
            Some(_) => false,
        }
    }

    /// Returns true when the task declares a GPU requirement.
    #[must_use]
    pub fn needs_gpu(&self) -> bool {
        self.resources.as_ref().is_some_and(ResourceRequirements::needs_gpu)
    }
}
