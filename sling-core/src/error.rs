//! Error taxonomy.
//!
//! [`Error`] is a closed tagged-variant type: every failure mode of the
//! orchestration layer is one variant, matched exhaustively — there is no
//! downcasting at the public boundary. Every variant carries the originating
//! [`RequestConfig`] so callers can inspect or manually replay the request.
//!
//! Errors are `Clone` because the deduplication table broadcasts one failure
//! to every joined caller; sources are captured as messages at the boundary.

use std::time::Duration;

use http::StatusCode;

use crate::request::RequestConfig;

/// Discriminant of [`Error`], for exhaustive matching without payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Network-level failure (connect, DNS, reset).
    Network,
    /// The per-attempt timeout elapsed.
    Timeout,
    /// Caller-initiated abort.
    Aborted,
    /// Payload parsing, transform, or schema validation failure.
    Validation,
    /// Rate limit exhausted in rejecting mode.
    RateLimited,
    /// Response status outside the accepted range.
    Status,
    /// Request was queued for later delivery while offline.
    Queued,
    /// Offline queue persistence failure.
    Storage,
}

/// Error type for the request orchestration layer.
///
/// The retryable variants (`Network`, `Timeout`, `Status`) carry a
/// `retries` counter; when the retry engine exhausts its budget, the final
/// failure is tagged with the number of retries that were performed.
#[derive(Debug, Clone, thiserror::Error)]
pub enum Error {
    /// Network-level failure; candidate for retry.
    #[error("network failure: {message}")]
    Network {
        /// Description of the underlying transport failure.
        message: String,
        /// Retries performed before this failure surfaced.
        retries: u32,
        /// Originating request configuration.
        request: Box<RequestConfig>,
    },
    /// The per-attempt timeout elapsed; candidate for retry.
    #[error("request timed out")]
    Timeout {
        /// Retries performed before this failure surfaced.
        retries: u32,
        /// Originating request configuration.
        request: Box<RequestConfig>,
    },
    /// Caller-initiated abort; never retried.
    #[error("request aborted")]
    Aborted {
        /// Originating request configuration.
        request: Box<RequestConfig>,
    },
    /// Payload parsing, transform, or schema validation failure; terminal.
    #[error("response validation failed: {message}")]
    Validation {
        /// What failed to validate.
        message: String,
        /// Originating request configuration.
        request: Box<RequestConfig>,
    },
    /// Rate limit exhausted in rejecting mode.
    #[error("rate limit exceeded, retry after {retry_after:?}")]
    RateLimited {
        /// Time until the current interval rolls over.
        retry_after: Duration,
        /// Originating request configuration.
        request: Box<RequestConfig>,
    },
    /// Response status outside the accepted range.
    #[error("unexpected response status {status}")]
    Status {
        /// The rejected status code.
        status: StatusCode,
        /// Retries performed before this failure surfaced.
        retries: u32,
        /// Originating request configuration.
        request: Box<RequestConfig>,
    },
    /// The request was enqueued for replay instead of being sent.
    #[error("offline: request queued for later delivery as {id}")]
    Queued {
        /// Offline queue entry id; usable for manual dequeue.
        id: String,
        /// Originating request configuration.
        request: Box<RequestConfig>,
    },
    /// Offline queue persistence failure.
    #[error("storage failure: {message}")]
    Storage {
        /// Description of the storage failure.
        message: String,
        /// Originating request configuration.
        request: Box<RequestConfig>,
    },
}

impl Error {
    /// Network failure with no retries performed yet.
    pub fn network(message: impl Into<String>, request: &RequestConfig) -> Self {
        Error::Network {
            message: message.into(),
            retries: 0,
            request: Box::new(request.clone()),
        }
    }

    /// Timeout with no retries performed yet.
    pub fn timeout(request: &RequestConfig) -> Self {
        Error::Timeout {
            retries: 0,
            request: Box::new(request.clone()),
        }
    }

    /// Caller-initiated abort.
    pub fn aborted(request: &RequestConfig) -> Self {
        Error::Aborted {
            request: Box::new(request.clone()),
        }
    }

    /// Validation failure.
    pub fn validation(message: impl Into<String>, request: &RequestConfig) -> Self {
        Error::Validation {
            message: message.into(),
            request: Box::new(request.clone()),
        }
    }

    /// Rejected status.
    pub fn status(status: StatusCode, request: &RequestConfig) -> Self {
        Error::Status {
            status,
            retries: 0,
            request: Box::new(request.clone()),
        }
    }

    /// The variant discriminant.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Network { .. } => ErrorKind::Network,
            Error::Timeout { .. } => ErrorKind::Timeout,
            Error::Aborted { .. } => ErrorKind::Aborted,
            Error::Validation { .. } => ErrorKind::Validation,
            Error::RateLimited { .. } => ErrorKind::RateLimited,
            Error::Status { .. } => ErrorKind::Status,
            Error::Queued { .. } => ErrorKind::Queued,
            Error::Storage { .. } => ErrorKind::Storage,
        }
    }

    /// The request configuration that produced this error.
    pub fn request(&self) -> &RequestConfig {
        match self {
            Error::Network { request, .. }
            | Error::Timeout { request, .. }
            | Error::Aborted { request }
            | Error::Validation { request, .. }
            | Error::RateLimited { request, .. }
            | Error::Status { request, .. }
            | Error::Queued { request, .. }
            | Error::Storage { request, .. } => request,
        }
    }

    /// The rejected HTTP status, for [`Error::Status`] only.
    pub fn status_code(&self) -> Option<StatusCode> {
        match self {
            Error::Status { status, .. } => Some(*status),
            _ => None,
        }
    }

    /// Retries performed before this failure surfaced. Zero for variants
    /// that never pass through the retry engine.
    pub fn retries(&self) -> u32 {
        match self {
            Error::Network { retries, .. }
            | Error::Timeout { retries, .. }
            | Error::Status { retries, .. } => *retries,
            _ => 0,
        }
    }

    /// Tags this error with the number of retries performed. No-op for
    /// variants that do not track retries.
    pub fn with_retries(mut self, count: u32) -> Self {
        match &mut self {
            Error::Network { retries, .. }
            | Error::Timeout { retries, .. }
            | Error::Status { retries, .. } => *retries = count,
            _ => {}
        }
        self
    }

    /// Whether this error is transient under the default retry rule:
    /// network failures, timeouts, and server-side (5xx) statuses.
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Network { .. } | Error::Timeout { .. } => true,
            Error::Status { status, .. } => status.is_server_error(),
            _ => false,
        }
    }
}
