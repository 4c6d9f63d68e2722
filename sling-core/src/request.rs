//! Request configuration.
//!
//! [`RequestConfig`] is the immutable-by-convention description of one
//! logical request. The orchestrator never mutates a config in place; hooks
//! receive a config by value and return a (possibly new) one.

use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method};
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::policy::Policy;
use crate::response::Payload;
use crate::Error;

/// Transform applied to the parsed payload before validation.
pub type PayloadTransform = Arc<dyn Fn(Payload) -> Result<Payload, String> + Send + Sync>;

/// Schema validation hook, applied after payload parsing and transformation.
///
/// Validation failure is terminal for the request: it is surfaced as
/// [`Error::Validation`](crate::Error::Validation) and never retried.
pub trait SchemaValidator: Send + Sync {
    /// Validates the payload, returning it (possibly normalized) on success.
    fn parse(&self, payload: Payload) -> Result<Payload, String>;
}

impl<F> SchemaValidator for F
where
    F: Fn(Payload) -> Result<Payload, String> + Send + Sync,
{
    fn parse(&self, payload: Payload) -> Result<Payload, String> {
        (self)(payload)
    }
}

/// Description of one logical request.
///
/// Carries the transport-facing fields (method, target, query, headers,
/// body, timeout), the per-call [`Policy`] overrides, and the optional
/// cancellation token and payload hooks.
///
/// Configs are serializable so the offline queue can persist them across
/// process restarts. The non-data fields (`cancel`, `transform`,
/// `validator`, the retry predicate) are skipped during serialization and
/// do not survive queue persistence.
#[derive(Clone, Serialize, Deserialize)]
pub struct RequestConfig {
    /// HTTP method.
    #[serde(with = "method_serde")]
    pub method: Method,
    /// Target identifier: a path or absolute URL, interpreted by the transport.
    pub target: String,
    /// Query parameters, appended to the target in order.
    #[serde(default)]
    pub query: Vec<(String, String)>,
    /// Request headers.
    #[serde(default, with = "header_map_serde")]
    pub headers: HeaderMap,
    /// Optional request body.
    #[serde(default)]
    pub body: Option<Bytes>,
    /// Per-attempt timeout; elapsing aborts the attempt with a timeout error.
    #[serde(default, with = "humantime_serde")]
    pub timeout: Option<Duration>,
    /// Per-call policy overrides.
    #[serde(default)]
    pub policy: Policy,
    /// Caller-supplied cancellation token.
    #[serde(skip)]
    pub cancel: Option<CancellationToken>,
    /// Response payload transform.
    #[serde(skip)]
    pub transform: Option<PayloadTransform>,
    /// Schema validator for the response payload.
    #[serde(skip)]
    pub validator: Option<Arc<dyn SchemaValidator>>,
}

impl RequestConfig {
    /// New request config with default policy and no headers, query, or body.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            query: Vec::new(),
            headers: HeaderMap::new(),
            body: None,
            timeout: None,
            policy: Policy::default(),
            cancel: None,
            transform: None,
            validator: None,
        }
    }

    /// Shorthand for a GET config.
    pub fn get(target: impl Into<String>) -> Self {
        Self::new(Method::GET, target)
    }

    /// Shorthand for a POST config.
    pub fn post(target: impl Into<String>) -> Self {
        Self::new(Method::POST, target)
    }

    /// Appends a query parameter.
    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    /// Inserts a header; invalid names or values are ignored.
    pub fn header(mut self, name: &str, value: &str) -> Self {
        if let (Ok(name), Ok(value)) = (
            http::header::HeaderName::try_from(name),
            http::header::HeaderValue::try_from(value),
        ) {
            self.headers.insert(name, value);
        }
        self
    }

    /// Sets a raw body.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON body and the matching content type.
    pub fn json<T: Serialize>(self, value: &T) -> Result<Self, Error> {
        let bytes = serde_json::to_vec(value).map_err(|source| Error::Validation {
            message: format!("failed to serialize request body: {source}"),
            request: Box::new(self.clone()),
        })?;
        Ok(self
            .header(http::header::CONTENT_TYPE.as_str(), "application/json")
            .body(bytes))
    }

    /// Sets the per-attempt timeout.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Replaces the policy set.
    pub fn policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }

    /// Attaches a caller-supplied cancellation token.
    pub fn cancel_with(mut self, token: CancellationToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Attaches a payload transform.
    pub fn transform_with(mut self, transform: PayloadTransform) -> Self {
        self.transform = Some(transform);
        self
    }

    /// Attaches a schema validator.
    pub fn validate_with(mut self, validator: Arc<dyn SchemaValidator>) -> Self {
        self.validator = Some(validator);
        self
    }
}

impl std::fmt::Debug for RequestConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestConfig")
            .field("method", &self.method)
            .field("target", &self.target)
            .field("query", &self.query)
            .field("headers", &self.headers)
            .field("body_len", &self.body.as_ref().map(Bytes::len))
            .field("timeout", &self.timeout)
            .field("policy", &self.policy)
            .field("cancel", &self.cancel.is_some())
            .field("transform", &self.transform.is_some())
            .field("validator", &self.validator.is_some())
            .finish()
    }
}

mod method_serde {
    use http::Method;
    use serde::{Deserialize, Deserializer, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(method: &Method, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(method.as_str())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Method, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(D::Error::custom)
    }
}

mod header_map_serde {
    use http::{HeaderMap, HeaderName, HeaderValue};
    use serde::{Deserialize, Deserializer, Serialize, Serializer, de::Error as _};

    pub fn serialize<S: Serializer>(headers: &HeaderMap, serializer: S) -> Result<S::Ok, S::Error> {
        let pairs: Vec<(&str, &str)> = headers
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str(), v)))
            .collect();
        pairs.serialize(serializer)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<HeaderMap, D::Error> {
        let pairs = Vec::<(String, String)>::deserialize(deserializer)?;
        let mut headers = HeaderMap::with_capacity(pairs.len());
        for (name, value) in pairs {
            let name = HeaderName::try_from(name.as_str()).map_err(D::Error::custom)?;
            let value = HeaderValue::try_from(value.as_str()).map_err(D::Error::custom)?;
            headers.append(name, value);
        }
        Ok(headers)
    }
}
