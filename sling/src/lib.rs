#![warn(missing_docs)]
//! # sling
//!
//! Client-side request orchestration above a raw network-fetch primitive.
//!
//! A [`Client`] gives callers one entry point that transparently applies
//! caching, in-flight deduplication, per-endpoint rate limiting, offline
//! queueing, retry with backoff, and a two-stage hook pipeline (global
//! interceptors plus named middleware) around every outbound request.
//!
//! The lifecycle of one logical call, in order: pre-hooks, mock
//! short-circuit, cache check, deduplication, rate limiting, offline check,
//! retry-wrapped transport exchange, post-hooks. This order is load-bearing:
//! a cache hit bypasses rate limiting entirely, and a deduplicated call
//! never separately consumes a rate-limit token.
//!
//! ```no_run
//! use sling::{Client, RequestConfig};
//! # use sling_core::{RawResponse, Transport, CancellationToken, Error};
//! # struct MyTransport;
//! # #[async_trait::async_trait]
//! # impl Transport for MyTransport {
//! #     async fn exchange(&self, _: &RequestConfig, _: CancellationToken) -> Result<RawResponse, Error> { unimplemented!() }
//! # }
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let client = Client::builder().transport(MyTransport).build()?;
//! let response = client.get("/users").await?;
//! println!("status: {}", response.status);
//! # Ok(())
//! # }
//! ```

/// Cache coordination: fingerprinted response entries with lazy TTL expiry.
pub mod cache;

/// The [`Client`] orchestrator and its builder.
pub mod client;

/// In-flight deduplication of equivalent requests.
pub mod dedup;

/// Hook pipeline: global interceptors and named middleware.
pub mod hooks;

/// Mock registry for short-circuiting requests in tests.
pub mod mock;

/// Persistent offline queue with sequential drain.
pub mod offline;

/// Per-endpoint token-bucket rate limiting.
pub mod ratelimit;

/// Retry engine: backoff computation and retryability evaluation.
pub mod retry;

pub use client::{BuildError, Client, ClientBuilder};
pub use hooks::{ErrorHook, HookPipeline, Middleware, RequestHook, ResponseHook};
pub use mock::MockResponse;
pub use offline::{DrainOutcome, QueueEntry};

pub use sling_core::{
    CachePolicy, CacheTier, CancellationToken, ConnectivityMonitor, Error, ErrorKind, Fingerprint,
    Payload, Policy, RateLimitMode, RateLimitPolicy, RawResponse, RequestConfig, ResponseEnvelope,
    RetryPolicy, SchemaValidator, StatusRange, Transport,
};
pub use sling_storage::{StorageAdapter, StorageError, StorageResult};

/// The `sling` prelude.
///
/// ```rust
/// use sling::prelude::*;
/// ```
pub mod prelude {
    pub use crate::{Client, Error, Policy, RequestConfig, ResponseEnvelope};
}
