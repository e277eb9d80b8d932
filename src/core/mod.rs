//! Core domain model for the engine.
//!
//! This module contains the declarative task/step model, the step status
//! lifecycle, pipeline results, and advisory resource structures.

mod resources;
mod result;
mod status;
mod task;

pub use resources::{
    parse_duration_secs, ChunkConfig, GpuInfo, MemoryPool, MergeStrategy, ResourcePool,
    ResourceRequirements,
};
pub use result::{
    condition_skip_marker, error_skip_marker, is_skip_marker, skip_marker, PipelineResult,
};
pub use status::{StepState, StepStatus};
pub use task::{Backoff, EffectKind, RetryPolicy, RunWhen, SideEffect, Step, Task};
