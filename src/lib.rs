//! # Taskweave
//!
//! A declarative task pipeline engine with pluggable execution backends.
//!
//! Taskweave accepts declarative task descriptions, either a single unit of
//! work or a multi-step pipeline, and executes them by routing each unit to
//! a registered [`Backend`](backend::Backend). Pipelines are interpreted as
//! dependency graphs:
//!
//! - **DAG scheduling**: all runnable steps dispatch concurrently per tick
//! - **Template plumbing**: `{{dotted.path}}` references between steps
//! - **Fan-out**: `forEach` over arrays with a concurrency cap
//! - **Partial failure**: optional steps skip instead of aborting
//! - **Retries and timeouts**: per step and per fan-out item
//!
//! ## Quick start
//!
//! ```rust,ignore
//! use taskweave::prelude::*;
//!
//! register_backend(Arc::new(MyBackend::new()));
//!
//! let task = Task::new("media.pipeline")
//!     .with_payload("url", "https://example.com/a.mp3")
//!     .with_step(Step::new("media.download").with_id("fetch")
//!         .with_input("url", "{{payload.url}}"))
//!     .with_step(Step::new("audio.transcribe").with_id("transcribe")
//!         .after("fetch")
//!         .with_input("path", "{{steps.fetch.path}}"));
//!
//! let outcome = process_task(&task, &ExecutionHooks::new(), None).await?;
//! ```

#![forbid(unsafe_code)]
#![warn(
    clippy::all,
    clippy::pedantic,
    missing_docs,
    rust_2018_idioms
)]
#![allow(
    clippy::module_name_repetitions,
    clippy::must_use_candidate,
    clippy::missing_errors_doc,
    clippy::missing_panics_doc
)]

pub mod backend;
pub mod core;
pub mod dispatch;
pub mod errors;
pub mod events;
pub mod pipeline;
pub mod template;
pub mod testing;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::backend::{
        clear_backends, get_backend, register_backend, select_backend, unregister_backend,
        Backend, JobState, JobStatus,
    };
    pub use crate::core::{
        Backoff, ChunkConfig, GpuInfo, MergeStrategy, PipelineResult, ResourcePool,
        ResourceRequirements, RetryPolicy, RunWhen, SideEffect, Step, StepState, StepStatus,
        Task,
    };
    pub use crate::dispatch::{process_task, TaskOutcome};
    pub use crate::errors::EngineError;
    pub use crate::events::{
        CollectingEventSink, EventKind, EventSink, ExecutionHooks, LoggingEventSink,
        NoOpEventSink, PipelineEvent,
    };
    pub use crate::pipeline::{run_dag, run_sequential, with_retry, with_step_timeout};
}
