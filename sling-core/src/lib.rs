#![warn(missing_docs)]
//! # sling-core
//!
//! Core traits and types for the sling request orchestration layer.
//!
//! This crate provides the foundational abstractions that the orchestrator
//! in the `sling` crate coordinates:
//!
//! - **Describe** a logical request ([`RequestConfig`]) and its per-call
//!   policies ([`Policy`])
//! - **Identify** equivalent requests ([`Fingerprint`])
//! - **Carry** results back to callers ([`ResponseEnvelope`])
//! - **Reach** the network ([`Transport`])
//! - **Observe** connectivity transitions ([`ConnectivityMonitor`])
//!
//! None of the types here contain orchestration logic; they are the shared
//! vocabulary between the orchestrator, storage backends, and transports.

pub mod connectivity;
pub mod error;
pub mod fingerprint;
pub mod policy;
pub mod request;
pub mod response;
pub mod transport;

pub use connectivity::ConnectivityMonitor;
pub use error::{Error, ErrorKind};
pub use fingerprint::Fingerprint;
pub use policy::{
    CachePolicy, CacheTier, Policy, RateLimitMode, RateLimitPolicy, RetryPolicy, RetryPredicate,
    StatusRange,
};
pub use request::{PayloadTransform, RequestConfig, SchemaValidator};
pub use response::{Payload, RawResponse, ResponseEnvelope};
pub use transport::Transport;

/// Cancellation token threaded through the whole request chain.
///
/// A caller-supplied token and the orchestrator's internal timeout both
/// cooperate through this type; either firing aborts the in-flight attempt.
pub use tokio_util::sync::CancellationToken;
