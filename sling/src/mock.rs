//! Mock registry.
//!
//! Canned responses keyed by method and target. When mocking is enabled and
//! a request matches, the client synthesizes the response immediately:
//! nothing reaches the transport, the cache, the rate limiter, or the
//! deduplication table. Registering the first mock enables the registry.

use dashmap::DashMap;
use http::{HeaderMap, StatusCode};
use serde::Serialize;
use sling_core::{Payload, RequestConfig, ResponseEnvelope};
use smol_str::SmolStr;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::debug;

/// A canned response served in place of a real exchange.
#[derive(Debug, Clone)]
pub struct MockResponse {
    /// Status of the synthesized envelope.
    pub status: StatusCode,
    /// Headers of the synthesized envelope.
    pub headers: HeaderMap,
    /// Payload of the synthesized envelope.
    pub payload: Payload,
}

impl MockResponse {
    /// A 200 response with the given payload.
    pub fn ok(payload: Payload) -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            payload,
        }
    }

    /// A 200 response with a JSON payload.
    pub fn ok_json<T: Serialize>(value: &T) -> Self {
        let payload = match serde_json::to_value(value) {
            Ok(json) => Payload::Json(json),
            Err(_) => Payload::Empty,
        };
        Self::ok(payload)
    }

    /// An empty-bodied response with the given status.
    pub fn with_status(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            payload: Payload::Empty,
        }
    }

    /// Builds the envelope served to the caller.
    pub(crate) fn envelope(&self, config: &RequestConfig) -> ResponseEnvelope {
        ResponseEnvelope {
            payload: self.payload.clone(),
            status: self.status,
            status_text: self
                .status
                .canonical_reason()
                .unwrap_or_default()
                .to_owned(),
            headers: self.headers.clone(),
            request: config.clone(),
            cached: false,
            retry_count: 0,
        }
    }
}

/// Registered mocks, keyed by `(method, target)`.
#[derive(Debug, Default)]
pub struct MockRegistry {
    mocks: DashMap<(SmolStr, SmolStr), MockResponse>,
    enabled: AtomicBool,
}

impl MockRegistry {
    /// Empty, disabled registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a mock for a method and target, enabling the registry.
    pub fn add(&self, method: &http::Method, target: &str, response: MockResponse) {
        debug!(%method, %target, "mock registered");
        self.mocks
            .insert((SmolStr::new(method.as_str()), SmolStr::new(target)), response);
        self.enabled.store(true, Ordering::Relaxed);
    }

    /// Removes all mocks; the registry stays in its current mode.
    pub fn clear(&self) {
        self.mocks.clear();
    }

    /// Enables or disables matching without touching registrations.
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::Relaxed);
    }

    /// Whether matching is active.
    pub fn is_enabled(&self) -> bool {
        self.enabled.load(Ordering::Relaxed)
    }

    /// The mock matching this request, when the registry is enabled.
    pub fn matches(&self, config: &RequestConfig) -> Option<MockResponse> {
        if !self.is_enabled() {
            return None;
        }
        let key = (
            SmolStr::new(config.method.as_str()),
            SmolStr::new(config.target.as_str()),
        );
        self.mocks.get(&key).map(|found| found.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn registering_a_mock_enables_matching() {
        let registry = MockRegistry::new();
        assert!(!registry.is_enabled());
        assert!(registry.matches(&RequestConfig::get("/users")).is_none());

        registry.add(
            &http::Method::GET,
            "/users",
            MockResponse::ok_json(&serde_json::json!([{"id": 1}])),
        );
        assert!(registry.is_enabled());
        let found = registry.matches(&RequestConfig::get("/users")).unwrap();
        assert_eq!(found.status, StatusCode::OK);
    }

    #[test]
    fn matching_is_method_and_target_exact() {
        let registry = MockRegistry::new();
        registry.add(&http::Method::GET, "/users", MockResponse::ok(Payload::Empty));

        assert!(registry.matches(&RequestConfig::post("/users")).is_none());
        assert!(registry.matches(&RequestConfig::get("/orders")).is_none());
        assert!(registry.matches(&RequestConfig::get("/users")).is_some());
    }

    #[test]
    fn disabling_suspends_matching_without_clearing() {
        let registry = MockRegistry::new();
        registry.add(&http::Method::GET, "/users", MockResponse::ok(Payload::Empty));

        registry.set_enabled(false);
        assert!(registry.matches(&RequestConfig::get("/users")).is_none());

        registry.set_enabled(true);
        assert!(registry.matches(&RequestConfig::get("/users")).is_some());
    }

    #[test]
    fn synthesized_envelope_carries_status_text_and_request() {
        let config = RequestConfig::get("/teapot");
        let envelope = MockResponse::with_status(StatusCode::IM_A_TEAPOT).envelope(&config);
        assert_eq!(envelope.status, StatusCode::IM_A_TEAPOT);
        assert_eq!(envelope.status_text, "I'm a teapot");
        assert_eq!(envelope.request.target, "/teapot");
        assert!(!envelope.cached);
    }
}
