//! Per-request policy configuration.
//!
//! Every [`RequestConfig`](crate::RequestConfig) carries a [`Policy`] that
//! decides which cross-cutting concerns apply to that call: caching tier and
//! TTL, retry behavior, rate limiting, deduplication, and offline queueing.
//! All knobs are plain serde-friendly data so endpoint policies can live in
//! configuration files.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::Error;

/// Storage tier used for caching a request's response.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub enum CacheTier {
    /// Caching disabled for this request.
    #[default]
    None,
    /// Volatile in-process store; lost on restart.
    Memory,
    /// Persistent store; survives process restarts.
    Persistent,
}

/// Caching policy for a single request.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq, Default)]
pub struct CachePolicy {
    /// Which storage tier to cache against. `None` opts out entirely.
    #[serde(default)]
    pub tier: CacheTier,
    /// Time-to-live before a stored entry expires (e.g. "60s", "500ms").
    /// `None` means the entry never expires by age.
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    /// Explicit cache key, overriding the request fingerprint.
    #[serde(default)]
    pub key: Option<String>,
}

impl CachePolicy {
    /// Caching against the in-process memory tier with the given TTL.
    pub fn memory(ttl: Duration) -> Self {
        Self {
            tier: CacheTier::Memory,
            ttl: Some(ttl),
            key: None,
        }
    }

    /// Caching against the persistent tier with the given TTL.
    pub fn persistent(ttl: Duration) -> Self {
        Self {
            tier: CacheTier::Persistent,
            ttl: Some(ttl),
            key: None,
        }
    }

    /// Whether this request participates in caching at all.
    pub fn is_enabled(&self) -> bool {
        self.tier != CacheTier::None
    }
}

/// Custom retry predicate: returns `true` when the error should be retried.
pub type RetryPredicate = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Retry configuration for a single request.
///
/// The default maps the "bare `true`" shorthand of the policy surface:
/// 3 retries, 1 second base delay, 2x backoff multiplier, no delay cap.
#[derive(Clone, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Maximum number of retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay before the first retry.
    #[serde(with = "humantime_serde")]
    pub base_delay: Duration,
    /// Multiplier applied per attempt: delay for attempt `n` is
    /// `base_delay * backoff_multiplier^n`.
    pub backoff_multiplier: f64,
    /// Upper clamp for the computed delay.
    #[serde(default, with = "humantime_serde")]
    pub max_delay: Option<Duration>,
    /// Explicit allow-list of HTTP statuses that should be retried.
    #[serde(default)]
    pub retry_on_statuses: Vec<u16>,
    /// Custom predicate deciding retryability. When set (or when
    /// `retry_on_statuses` is non-empty) it replaces the default
    /// transient-error rule.
    #[serde(skip)]
    pub predicate: Option<RetryPredicate>,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            base_delay: Duration::from_millis(1000),
            backoff_multiplier: 2.0,
            max_delay: None,
            retry_on_statuses: Vec::new(),
            predicate: None,
        }
    }
}

impl std::fmt::Debug for RetryPolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryPolicy")
            .field("max_retries", &self.max_retries)
            .field("base_delay", &self.base_delay)
            .field("backoff_multiplier", &self.backoff_multiplier)
            .field("max_delay", &self.max_delay)
            .field("retry_on_statuses", &self.retry_on_statuses)
            .field("predicate", &self.predicate.as_ref().map(|_| "..."))
            .finish()
    }
}

impl RetryPolicy {
    /// Retry policy with a fixed retry budget and the default backoff curve.
    pub fn with_max_retries(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }
}

/// Behavior when a rate-limit bucket is exhausted.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq, Default)]
pub enum RateLimitMode {
    /// Suspend the caller until the current interval rolls over.
    #[default]
    Queue,
    /// Fail immediately with a rate-limit error carrying the wait time.
    Reject,
}

/// Token-bucket rate limit configuration for a single request.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RateLimitPolicy {
    /// Bucket capacity: requests allowed per interval.
    pub max_requests: u32,
    /// Refill interval length.
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
    /// Queue or reject when the bucket is empty.
    #[serde(default)]
    pub mode: RateLimitMode,
    /// Endpoint key for bucket selection. Defaults to the request target.
    #[serde(default)]
    pub key: Option<String>,
}

impl RateLimitPolicy {
    /// `max_requests` per `interval`, queueing on exhaustion.
    pub fn new(max_requests: u32, interval: Duration) -> Self {
        Self {
            max_requests,
            interval,
            mode: RateLimitMode::Queue,
            key: None,
        }
    }

    /// Switches the policy to fail-fast rejection.
    pub fn rejecting(mut self) -> Self {
        self.mode = RateLimitMode::Reject;
        self
    }
}

/// Accepted response status range, half-open: `min <= status < max`.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Eq, PartialEq)]
pub struct StatusRange {
    /// Lowest accepted status (inclusive).
    pub min: u16,
    /// First rejected status (exclusive upper bound).
    pub max: u16,
}

impl Default for StatusRange {
    fn default() -> Self {
        Self { min: 200, max: 300 }
    }
}

impl StatusRange {
    /// Whether `status` falls inside the accepted range.
    pub fn contains(&self, status: u16) -> bool {
        status >= self.min && status < self.max
    }
}

fn default_true() -> bool {
    true
}

/// Complete per-request policy set.
///
/// The defaults mirror the orchestrator's documented behavior: deduplication
/// and offline queueing enabled, caching / retry / rate limiting opt-in.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Policy {
    /// Caching tier, TTL, and key override.
    #[serde(default)]
    pub cache: CachePolicy,
    /// Retry configuration; `None` disables retries.
    #[serde(default)]
    pub retry: Option<RetryPolicy>,
    /// Rate limit configuration; `None` disables rate limiting.
    #[serde(default)]
    pub rate_limit: Option<RateLimitPolicy>,
    /// In-flight deduplication of equivalent requests.
    #[serde(default = "default_true")]
    pub dedup: bool,
    /// Queue the request for replay when issued while offline.
    #[serde(default = "default_true")]
    pub queue_offline: bool,
    /// Accepted response status range.
    #[serde(default)]
    pub accept_status: StatusRange,
}

impl Default for Policy {
    fn default() -> Self {
        Self {
            cache: CachePolicy::default(),
            retry: None,
            rate_limit: None,
            dedup: true,
            queue_offline: true,
            accept_status: StatusRange::default(),
        }
    }
}

impl Policy {
    /// Enables retries with the default budget (3 retries, 1s base, 2x).
    pub fn with_default_retry(mut self) -> Self {
        self.retry = Some(RetryPolicy::default());
        self
    }
}
