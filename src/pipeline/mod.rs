//! Pipeline execution: retry/timeout helpers, the sequential and DAG
//! runners, and chunked execution.

pub mod chunk;
mod dag;
mod retry;
mod sequential;
pub(crate) mod step_exec;
mod timeout;

#[cfg(test)]
mod integration_tests;

pub use dag::run_dag;
pub use retry::{backoff_delay, with_retry, AttemptObserver};
pub use sequential::run_sequential;
pub use timeout::{timeout_from_secs, with_step_timeout};
