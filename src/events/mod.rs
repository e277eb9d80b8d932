//! Pipeline event stream and observer hooks.
//!
//! Runners emit a flat stream of events through an [`EventSink`]; sinks must
//! never fail the pipeline. Progress is reported separately as an integer
//! percentage.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::sync::Arc;
use tracing::info;

/// The kind of a pipeline event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EventKind {
    /// A step was dispatched.
    #[serde(rename = "step:start")]
    StepStart,
    /// A step reached a successful terminal state (including skips).
    #[serde(rename = "step:complete")]
    StepComplete,
    /// A step failed (optional or not).
    #[serde(rename = "step:error")]
    StepError,
    /// The pipeline finished successfully; always the last event.
    #[serde(rename = "pipeline:complete")]
    PipelineComplete,
}

impl EventKind {
    /// The wire name of the event kind.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::StepStart => "step:start",
            Self::StepComplete => "step:complete",
            Self::StepError => "step:error",
            Self::PipelineComplete => "pipeline:complete",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single event in the pipeline stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PipelineEvent {
    /// Event kind.
    pub kind: EventKind,
    /// Step id, or `None` for pipeline-level events.
    pub step: Option<String>,
    /// The step's task type, when applicable.
    pub task: Option<String>,
    /// When the event was emitted.
    pub timestamp: DateTime<Utc>,
    /// Opaque event payload.
    pub data: Value,
}

impl PipelineEvent {
    /// Creates an event stamped with the current time.
    #[must_use]
    pub fn new(
        kind: EventKind,
        step: Option<String>,
        task: Option<String>,
        data: Value,
    ) -> Self {
        Self {
            kind,
            step,
            task,
            timestamp: Utc::now(),
            data,
        }
    }
}

/// Trait for event sinks receiving the pipeline event stream.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Delivers an event asynchronously.
    async fn emit(&self, event: PipelineEvent);

    /// Delivers an event without blocking. Must never fail; errors are
    /// swallowed by the sink.
    fn try_emit(&self, event: PipelineEvent);
}

/// A sink that discards all events.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpEventSink;

#[async_trait]
impl EventSink for NoOpEventSink {
    async fn emit(&self, _event: PipelineEvent) {}

    fn try_emit(&self, _event: PipelineEvent) {}
}

/// A sink that forwards events to the `tracing` framework.
#[derive(Debug, Clone, Copy, Default)]
pub struct LoggingEventSink;

impl LoggingEventSink {
    fn log(event: &PipelineEvent) {
        info!(
            kind = event.kind.as_str(),
            step = event.step.as_deref(),
            task = event.task.as_deref(),
            data = %event.data,
            "pipeline event"
        );
    }
}

#[async_trait]
impl EventSink for LoggingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        Self::log(&event);
    }

    fn try_emit(&self, event: PipelineEvent) {
        Self::log(&event);
    }
}

/// A sink that records events in memory, for assertions in tests.
#[derive(Debug, Default)]
pub struct CollectingEventSink {
    events: parking_lot::RwLock<Vec<PipelineEvent>>,
}

impl CollectingEventSink {
    /// Creates an empty collecting sink.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns all collected events.
    #[must_use]
    pub fn events(&self) -> Vec<PipelineEvent> {
        self.events.read().clone()
    }

    /// Returns the collected events of one kind.
    #[must_use]
    pub fn events_of(&self, kind: EventKind) -> Vec<PipelineEvent> {
        self.events
            .read()
            .iter()
            .filter(|e| e.kind == kind)
            .cloned()
            .collect()
    }

    /// Clears the collected events.
    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl EventSink for CollectingEventSink {
    async fn emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }

    fn try_emit(&self, event: PipelineEvent) {
        self.events.write().push(event);
    }
}

/// Progress callback invoked with a percentage in `0..=100`.
pub type ProgressFn = Arc<dyn Fn(u8) + Send + Sync>;

/// Observer hooks threaded through a task execution.
#[derive(Clone, Default)]
pub struct ExecutionHooks {
    sink: Option<Arc<dyn EventSink>>,
    progress: Option<ProgressFn>,
}

impl fmt::Debug for ExecutionHooks {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExecutionHooks")
            .field("sink", &self.sink.is_some())
            .field("progress", &self.progress.is_some())
            .finish()
    }
}

impl ExecutionHooks {
    /// Creates hooks with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Attaches an event sink.
    #[must_use]
    pub fn with_sink(mut self, sink: Arc<dyn EventSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Attaches a progress callback.
    #[must_use]
    pub fn with_progress(mut self, progress: impl Fn(u8) + Send + Sync + 'static) -> Self {
        self.progress = Some(Arc::new(progress));
        self
    }

    /// Emits an event to the attached sink, if any.
    pub fn emit(&self, event: PipelineEvent) {
        if let Some(sink) = &self.sink {
            sink.try_emit(event);
        }
    }

    /// Reports a progress percentage to the attached callback, if any.
    pub fn report_progress(&self, percent: u8) {
        if let Some(progress) = &self.progress {
            progress(percent);
        }
    }
}
