//! Response types.
//!
//! [`RawResponse`] is what a [`Transport`](crate::Transport) hands back from
//! one network exchange; the orchestrator parses it into a [`Payload`] and
//! wraps it in a [`ResponseEnvelope`], the read-only result every caller
//! receives.

use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use crate::request::RequestConfig;
use crate::Error;

/// Response payload, parsed by content type.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub enum Payload {
    /// `application/json` bodies.
    Json(serde_json::Value),
    /// `text/*` bodies.
    Text(String),
    /// Everything else, kept as raw bytes.
    Binary(Bytes),
    /// Empty body.
    Empty,
}

impl Payload {
    /// Parses a body according to its content type.
    ///
    /// A JSON content type with an unparseable body is an error; the caller
    /// treats it as a validation failure (terminal, never retried).
    pub fn parse(body: Bytes, content_type: Option<&str>) -> Result<Self, String> {
        if body.is_empty() {
            return Ok(Payload::Empty);
        }
        let content_type = content_type.unwrap_or("");
        if content_type.starts_with("application/json") {
            serde_json::from_slice(&body)
                .map(Payload::Json)
                .map_err(|source| format!("invalid JSON body: {source}"))
        } else if content_type.starts_with("text/") {
            Ok(Payload::Text(String::from_utf8_lossy(&body).into_owned()))
        } else {
            Ok(Payload::Binary(body))
        }
    }
}

/// Raw result of one network exchange, before payload parsing.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Unparsed body bytes.
    pub body: Bytes,
}

impl RawResponse {
    /// Content type header value, if present and valid UTF-8.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(http::header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

/// Method-agnostic result of a completed logical request.
///
/// Created once per completed attempt and read-only thereafter.
#[derive(Debug, Clone)]
pub struct ResponseEnvelope {
    /// Parsed payload.
    pub payload: Payload,
    /// HTTP status code.
    pub status: StatusCode,
    /// Canonical reason phrase for the status.
    pub status_text: String,
    /// Response headers. Empty for cache hits: cached entries store only
    /// the payload, so a hit synthesizes the rest of the envelope.
    pub headers: HeaderMap,
    /// The request configuration that produced this response.
    pub request: RequestConfig,
    /// Whether this envelope was served from cache.
    pub cached: bool,
    /// Number of retries performed before this response (0 for a first-try
    /// success).
    pub retry_count: u32,
}

impl ResponseEnvelope {
    /// Deserializes a JSON payload into `T`.
    pub fn json<T: DeserializeOwned>(&self) -> Result<T, Error> {
        let value = match &self.payload {
            Payload::Json(value) => serde_json::from_value(value.clone()),
            Payload::Text(text) => serde_json::from_str(text),
            Payload::Binary(bytes) => serde_json::from_slice(bytes),
            Payload::Empty => serde_json::from_str("null"),
        };
        value.map_err(|source| Error::Validation {
            message: format!("failed to deserialize payload: {source}"),
            request: Box::new(self.request.clone()),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_json_by_content_type() {
        let payload = Payload::parse(
            Bytes::from_static(b"{\"ok\":true}"),
            Some("application/json; charset=utf-8"),
        )
        .unwrap();
        assert_eq!(payload, Payload::Json(serde_json::json!({"ok": true})));
    }

    #[test]
    fn invalid_json_is_an_error() {
        let result = Payload::parse(Bytes::from_static(b"not json"), Some("application/json"));
        assert!(result.is_err());
    }

    #[test]
    fn parses_text_and_binary() {
        let text = Payload::parse(Bytes::from_static(b"hello"), Some("text/plain")).unwrap();
        assert_eq!(text, Payload::Text("hello".into()));

        let binary =
            Payload::parse(Bytes::from_static(&[0, 1, 2]), Some("application/octet-stream"))
                .unwrap();
        assert_eq!(binary, Payload::Binary(Bytes::from_static(&[0, 1, 2])));
    }

    #[test]
    fn empty_body_is_empty_payload() {
        let payload = Payload::parse(Bytes::new(), Some("application/json")).unwrap();
        assert_eq!(payload, Payload::Empty);
    }
}
