//! Retry loop with fixed and exponential backoff.

use crate::core::{Backoff, RetryPolicy};
use crate::errors::EngineError;
use std::time::Duration;
use tracing::debug;

/// Observer notified with the attempt number (1-based) before each attempt.
pub type AttemptObserver<'a> = &'a (dyn Fn(u32) + Send + Sync);

/// Computes the sleep before the next attempt.
///
/// `attempt` is the attempt that just failed (1-based). Exponential backoff
/// doubles per attempt: `delay * 2^(attempt - 1)`.
#[must_use]
pub fn backoff_delay(policy: &RetryPolicy, attempt: u32) -> Duration {
    let ms = match policy.backoff {
        Backoff::Fixed => policy.delay,
        Backoff::Exponential => policy
            .delay
            .saturating_mul(2u64.saturating_pow(attempt.saturating_sub(1))),
    };
    Duration::from_millis(ms)
}

/// Runs an operation under a retry policy.
///
/// Executes up to `policy.attempts` times (1 means no retry), sleeping the
/// backoff between attempts and re-raising the last error once exhausted.
pub async fn with_retry<T, F, Fut>(
    policy: &RetryPolicy,
    observer: Option<AttemptObserver<'_>>,
    mut operation: F,
) -> Result<T, EngineError>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, EngineError>>,
{
    let attempts = policy.attempts.max(1);
    let mut last_error = None;

    for attempt in 1..=attempts {
        if let Some(observer) = observer {
            observer(attempt);
        }

        match operation().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if attempt < attempts {
                    let delay = backoff_delay(policy, attempt);
                    debug!(
                        attempt,
                        remaining = attempts - attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "retrying after error"
                    );
                    tokio::time::sleep(delay).await;
                }
                last_error = Some(error);
            }
        }
    }

    match last_error {
        Some(error) => Err(error),
        None => Err(EngineError::execution("retry loop ran zero attempts")),
    }
}
