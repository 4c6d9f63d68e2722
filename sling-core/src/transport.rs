//! Transport seam.
//!
//! The orchestrator is transport-agnostic: it consumes an opaque "perform
//! one network exchange" capability. `sling-reqwest` provides the
//! production implementation; tests use in-process doubles.

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::request::RequestConfig;
use crate::response::RawResponse;
use crate::Error;

/// One network exchange.
///
/// Implementations map their native failures onto the closed [`Error`]
/// taxonomy: connect-level failures to [`Error::Network`], elapsed deadlines
/// to [`Error::Timeout`], and cancellation to [`Error::Aborted`]. The
/// `cancel` token combines the caller-supplied token with the
/// orchestrator's timeout; implementations should abort the exchange when
/// it fires.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the exchange described by `config`.
    async fn exchange(
        &self,
        config: &RequestConfig,
        cancel: CancellationToken,
    ) -> Result<RawResponse, Error>;
}

#[async_trait]
impl Transport for Arc<dyn Transport> {
    async fn exchange(
        &self,
        config: &RequestConfig,
        cancel: CancellationToken,
    ) -> Result<RawResponse, Error> {
        (**self).exchange(config, cancel).await
    }
}
