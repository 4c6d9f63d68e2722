//! Per-endpoint token-bucket rate limiting.
//!
//! One bucket per endpoint key, refilled lazily on access: whole elapsed
//! intervals each add a full `max_requests` worth of tokens, capped at
//! capacity. Buckets live in process memory only and reset on restart; this
//! is a best-effort, single-process limiter.
//!
//! The read-modify-write on a bucket happens under the map shard lock with
//! no suspension point inside, so concurrently issued requests can never
//! observe a half-updated bucket.

use std::time::Duration;

use dashmap::DashMap;
use sling_core::{CancellationToken, RateLimitMode, RateLimitPolicy};
use smol_str::SmolStr;
use tokio::time::Instant;
use tracing::{debug, trace};

#[derive(Debug)]
struct Bucket {
    tokens: u32,
    last_refill: Instant,
}

/// Outcome of a failed acquisition.
#[derive(Debug, PartialEq, Eq)]
pub enum AcquireError {
    /// Rejecting mode: the bucket is empty; `retry_after` is the remainder
    /// of the current interval.
    Rejected {
        /// Wait until the current interval rolls over.
        retry_after: Duration,
    },
    /// The caller's cancellation token fired during a queued wait.
    Cancelled,
}

enum Decision {
    Proceed,
    Exhausted { retry_after: Duration },
}

/// Token-bucket limiter keyed by endpoint.
#[derive(Debug, Default)]
pub struct RateLimiter {
    buckets: DashMap<SmolStr, Bucket>,
}

impl RateLimiter {
    /// New limiter with no buckets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Acquires one token for `key`, suspending (queue mode) or failing
    /// (reject mode) when the bucket is exhausted.
    pub async fn acquire(
        &self,
        key: &str,
        policy: &RateLimitPolicy,
        cancel: &CancellationToken,
    ) -> Result<(), AcquireError> {
        match self.check(key, policy) {
            Decision::Proceed => Ok(()),
            Decision::Exhausted { retry_after } => match policy.mode {
                RateLimitMode::Reject => {
                    debug!(%key, ?retry_after, "rate limit exhausted, rejecting");
                    Err(AcquireError::Rejected { retry_after })
                }
                RateLimitMode::Queue => {
                    debug!(%key, ?retry_after, "rate limit exhausted, queueing caller");
                    tokio::select! {
                        _ = cancel.cancelled() => return Err(AcquireError::Cancelled),
                        _ = tokio::time::sleep(retry_after) => {}
                    }
                    self.reset_after_wait(key, policy);
                    Ok(())
                }
            },
        }
    }

    /// Single atomic refill-and-consume step.
    fn check(&self, key: &str, policy: &RateLimitPolicy) -> Decision {
        let now = Instant::now();
        let mut bucket = self
            .buckets
            .entry(SmolStr::new(key))
            .or_insert_with(|| Bucket {
                tokens: policy.max_requests,
                last_refill: now,
            });

        let interval = policy.interval;
        if interval.is_zero() {
            return Decision::Proceed;
        }

        let elapsed = now.saturating_duration_since(bucket.last_refill);
        let intervals = (elapsed.as_nanos() / interval.as_nanos()) as u32;
        if intervals >= 1 {
            let refilled =
                u64::from(bucket.tokens) + u64::from(intervals) * u64::from(policy.max_requests);
            bucket.tokens = refilled.min(u64::from(policy.max_requests)) as u32;
            // Advance by whole intervals only; the partial remainder keeps
            // accruing toward the next refill.
            bucket.last_refill += interval * intervals;
        }

        if bucket.tokens >= 1 {
            bucket.tokens -= 1;
            trace!(%key, remaining = bucket.tokens, "rate limit token consumed");
            Decision::Proceed
        } else {
            let into_interval =
                Duration::from_nanos((elapsed.as_nanos() % interval.as_nanos()) as u64);
            Decision::Exhausted {
                retry_after: interval - into_interval,
            }
        }
    }

    /// After a queued wait the interval has rolled over: the bucket resets
    /// to full capacity and the waiter consumes one token.
    fn reset_after_wait(&self, key: &str, policy: &RateLimitPolicy) {
        let mut bucket = self
            .buckets
            .entry(SmolStr::new(key))
            .or_insert_with(|| Bucket {
                tokens: policy.max_requests,
                last_refill: Instant::now(),
            });
        bucket.tokens = policy.max_requests.saturating_sub(1);
        bucket.last_refill = Instant::now();
    }
}
