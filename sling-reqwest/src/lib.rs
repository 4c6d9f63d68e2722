#![warn(missing_docs)]
//! reqwest-backed transport for sling.
//!
//! [`ReqwestTransport`] performs the actual HTTP exchanges for a
//! [`sling::Client`](https://docs.rs/sling). It resolves request targets
//! against a base URL (absolute targets pass through untouched), forwards
//! method, query, headers, and body, and maps reqwest's failures onto the
//! closed error taxonomy: elapsed deadlines become timeouts, everything
//! else at the connection level becomes a network failure, and
//! cancellation becomes an abort.
//!
//! ```no_run
//! use sling_reqwest::ReqwestTransport;
//!
//! # fn main() -> Result<(), sling_reqwest::TransportError> {
//! let transport = ReqwestTransport::new("https://api.example.com")?;
//! # Ok(())
//! # }
//! ```

use async_trait::async_trait;
use sling_core::{CancellationToken, Error, RawResponse, RequestConfig, Transport};
use tracing::trace;

/// Failure to construct a [`ReqwestTransport`].
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// The base URL did not parse.
    #[error("invalid base url `{url}`: {message}")]
    InvalidBaseUrl {
        /// The rejected URL.
        url: String,
        /// Parser diagnostic.
        message: String,
    },
}

/// [`Transport`] over a shared [`reqwest::Client`].
///
/// Cheap to clone; clones share the underlying connection pool.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: reqwest::Url,
}

impl ReqwestTransport {
    /// Transport with a default reqwest client and the given base URL.
    pub fn new(base_url: &str) -> Result<Self, TransportError> {
        Self::with_client(reqwest::Client::new(), base_url)
    }

    /// Transport over a caller-configured reqwest client, for connection
    /// pool, proxy, or TLS settings beyond the defaults.
    pub fn with_client(client: reqwest::Client, base_url: &str) -> Result<Self, TransportError> {
        let base_url =
            reqwest::Url::parse(base_url).map_err(|err| TransportError::InvalidBaseUrl {
                url: base_url.to_owned(),
                message: err.to_string(),
            })?;
        Ok(Self { client, base_url })
    }

    /// Resolves a config's target and query against the base URL. An
    /// unparseable target is terminal, not a retry candidate.
    fn url_for(&self, config: &RequestConfig) -> Result<reqwest::Url, Error> {
        let target = &config.target;
        let mut url = if target.starts_with("http://") || target.starts_with("https://") {
            reqwest::Url::parse(target)
        } else {
            self.base_url.join(target)
        }
        .map_err(|err| Error::validation(format!("invalid request url `{target}`: {err}"), config))?;

        if !config.query.is_empty() {
            let mut pairs = url.query_pairs_mut();
            for (key, value) in &config.query {
                pairs.append_pair(key, value);
            }
        }
        Ok(url)
    }
}

fn map_reqwest_error(err: reqwest::Error, config: &RequestConfig) -> Error {
    if err.is_timeout() {
        Error::timeout(config)
    } else {
        Error::network(err.to_string(), config)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn exchange(
        &self,
        config: &RequestConfig,
        cancel: CancellationToken,
    ) -> Result<RawResponse, Error> {
        let url = self.url_for(config)?;
        trace!(method = %config.method, %url, "dispatching exchange");

        let mut request = self
            .client
            .request(config.method.clone(), url)
            .headers(config.headers.clone());
        if let Some(body) = &config.body {
            request = request.body(body.clone());
        }

        let send = async {
            let response = request
                .send()
                .await
                .map_err(|err| map_reqwest_error(err, config))?;
            let status = response.status();
            let headers = response.headers().clone();
            let body = response
                .bytes()
                .await
                .map_err(|err| map_reqwest_error(err, config))?;
            Ok(RawResponse {
                status,
                headers,
                body,
            })
        };

        tokio::select! {
            _ = cancel.cancelled() => Err(Error::aborted(config)),
            outcome = send => outcome,
        }
    }
}
