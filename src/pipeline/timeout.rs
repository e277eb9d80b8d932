//! Timeout wrapping for pending step executions.
//!
//! The timer races the operation; on expiry the awaiting side fails with a
//! labelled [`EngineError::StepTimeout`]. The underlying backend work is not
//! cancelled (backends that support cancellation expose `Backend::cancel`).

use crate::errors::EngineError;
use std::time::Duration;

/// Converts an optional seconds value into a `Duration`.
#[must_use]
pub fn timeout_from_secs(seconds: Option<f64>) -> Option<Duration> {
    seconds
        .filter(|s| s.is_finite() && *s >= 0.0)
        .map(Duration::from_secs_f64)
}

/// Races an operation against a timer.
///
/// With no duration the operation runs unbounded. The timer is dropped on
/// normal completion.
pub async fn with_step_timeout<T, F>(
    label: &str,
    duration: Option<Duration>,
    operation: F,
) -> Result<T, EngineError>
where
    F: std::future::Future<Output = Result<T, EngineError>>,
{
    match duration {
        None => operation.await,
        Some(duration) => match tokio::time::timeout(duration, operation).await {
            Ok(result) => result,
            Err(_) => Err(EngineError::timeout(label, duration.as_millis() as u64)),
        },
    }
}
