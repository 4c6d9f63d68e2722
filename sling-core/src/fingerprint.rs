//! Request fingerprinting.
//!
//! A [`Fingerprint`] is the deterministic identity string derived from a
//! request, and the join key across caching, deduplication, and offline
//! replay: two requests that would be indistinguishable at the transport
//! boundary fingerprint identically.

use std::fmt;

use http::Method;
use smol_str::SmolStr;

use crate::request::RequestConfig;

/// Deterministic identity string for a request.
///
/// Format: `{method}:{target}?{query}` with query pairs in canonical
/// (sorted) order, plus `:{body}` for non-idempotent methods where the body
/// changes the meaning of the exchange.
///
/// Backed by [`SmolStr`], so clones are cheap.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Fingerprint(SmolStr);

impl Fingerprint {
    /// Derives the fingerprint of a request. Pure: no I/O, no randomness.
    pub fn of(config: &RequestConfig) -> Self {
        let mut out = String::with_capacity(config.target.len() + 16);
        out.push_str(config.method.as_str());
        out.push(':');
        out.push_str(&config.target);

        if !config.query.is_empty() {
            let mut pairs: Vec<&(String, String)> = config.query.iter().collect();
            pairs.sort();
            out.push('?');
            for (i, (key, value)) in pairs.iter().enumerate() {
                if i > 0 {
                    out.push('&');
                }
                out.push_str(key);
                out.push('=');
                out.push_str(value);
            }
        }

        if body_is_significant(&config.method) {
            if let Some(body) = &config.body {
                out.push(':');
                out.push_str(&String::from_utf8_lossy(body));
            }
        }

        Fingerprint(SmolStr::new(out))
    }

    /// The fingerprint as a string slice.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// For idempotent methods the body never distinguishes exchanges; for the
/// rest it does.
fn body_is_significant(method: &Method) -> bool {
    matches!(
        *method,
        Method::POST | Method::PUT | Method::PATCH | Method::DELETE
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::RequestConfig;

    #[test]
    fn identical_requests_fingerprint_identically() {
        let a = RequestConfig::get("/users").query("page", "1").query("q", "x");
        let b = RequestConfig::get("/users").query("page", "1").query("q", "x");
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn query_order_does_not_matter() {
        let a = RequestConfig::get("/users").query("a", "1").query("b", "2");
        let b = RequestConfig::get("/users").query("b", "2").query("a", "1");
        assert_eq!(Fingerprint::of(&a), Fingerprint::of(&b));
    }

    #[test]
    fn method_and_target_distinguish() {
        let get = RequestConfig::get("/users");
        let post = RequestConfig::post("/users");
        let other = RequestConfig::get("/orders");
        assert_ne!(Fingerprint::of(&get), Fingerprint::of(&post));
        assert_ne!(Fingerprint::of(&get), Fingerprint::of(&other));
    }

    #[test]
    fn body_distinguishes_non_idempotent_requests_only() {
        let a = RequestConfig::post("/users").body(&b"{\"id\":1}"[..]);
        let b = RequestConfig::post("/users").body(&b"{\"id\":2}"[..]);
        assert_ne!(Fingerprint::of(&a), Fingerprint::of(&b));

        let c = RequestConfig::get("/users").body(&b"ignored"[..]);
        let d = RequestConfig::get("/users");
        assert_eq!(Fingerprint::of(&c), Fingerprint::of(&d));
    }

    #[test]
    fn display_is_stable() {
        let config = RequestConfig::get("/users").query("page", "2");
        assert_eq!(Fingerprint::of(&config).to_string(), "GET:/users?page=2");
    }
}
