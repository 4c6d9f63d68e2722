//! Retry engine.
//!
//! A state machine over one logical request: `Attempt(n)` succeeds and is
//! done, or fails and is re-evaluated — either a new attempt after a
//! computed backoff delay, or the final failure tagged with the attempt
//! count. Aborts and validation failures are never retried.

use std::future::Future;
use std::time::Duration;

use sling_core::{CancellationToken, Error, ErrorKind, RequestConfig, ResponseEnvelope, RetryPolicy};
use tracing::{debug, warn};

/// Backoff delay for 0-indexed attempt `n`: `base * multiplier^n`, clamped
/// to the policy's maximum delay when one is set.
pub fn delay_for(policy: &RetryPolicy, attempt: u32) -> Duration {
    let factor = policy.backoff_multiplier.powi(attempt as i32);
    let millis = policy.base_delay.as_millis() as f64 * factor;
    // Saturate rather than wrap for absurd multipliers.
    let delay = if millis.is_finite() && millis >= 0.0 {
        Duration::from_millis(millis.min(u64::MAX as f64) as u64)
    } else {
        Duration::MAX
    };
    match policy.max_delay {
        Some(max) => delay.min(max),
        None => delay,
    }
}

/// Whether a failed attempt should be retried.
///
/// True only when the attempt count is below the budget AND the error
/// matches the retry condition: the custom predicate or the status
/// allow-list when either is configured, otherwise the default rule
/// (network/timeout failures and 5xx statuses).
pub fn should_retry(policy: &RetryPolicy, error: &Error, attempt: u32) -> bool {
    if attempt >= policy.max_retries {
        return false;
    }
    // Aborts and validation failures propagate immediately, always.
    if matches!(error.kind(), ErrorKind::Aborted | ErrorKind::Validation) {
        return false;
    }

    let customized = policy.predicate.is_some() || !policy.retry_on_statuses.is_empty();
    if customized {
        policy.predicate.as_ref().is_some_and(|accepts| accepts(error))
            || error
                .status_code()
                .is_some_and(|status| policy.retry_on_statuses.contains(&status.as_u16()))
    } else {
        error.is_transient()
    }
}

/// Runs `attempt_fn` under the retry policy.
///
/// `attempt_fn` receives the 0-indexed attempt number. The backoff sleep is
/// raced against the cancellation token: cancellation during the delay
/// surfaces an abort instead of a new attempt. On exhaustion the last
/// failure is returned, tagged with the final attempt count.
pub async fn run<F, Fut>(
    policy: Option<&RetryPolicy>,
    config: &RequestConfig,
    cancel: &CancellationToken,
    mut attempt_fn: F,
) -> Result<ResponseEnvelope, Error>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<ResponseEnvelope, Error>>,
{
    let mut attempt: u32 = 0;
    loop {
        let error = match attempt_fn(attempt).await {
            Ok(envelope) => return Ok(envelope),
            Err(error) => error,
        };

        let Some(policy) = policy else {
            return Err(error);
        };
        if !should_retry(policy, &error, attempt) {
            if attempt > 0 {
                warn!(target: "sling::retry", attempts = attempt + 1, error = %error, "retries exhausted");
            }
            return Err(error.with_retries(attempt));
        }

        let delay = delay_for(policy, attempt);
        debug!(target: "sling::retry", attempt, ?delay, error = %error, "scheduling retry");
        tokio::select! {
            _ = cancel.cancelled() => return Err(Error::aborted(config)),
            _ = tokio::time::sleep(delay) => {}
        }
        attempt += 1;
    }
}
