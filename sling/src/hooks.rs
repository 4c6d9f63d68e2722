//! Hook pipeline.
//!
//! Two registration surfaces share one execution model: global interceptors
//! (anonymous, registered individually per stage) and named middleware (a
//! bundle of up to three stage hooks, removable by name). Hooks at the same
//! stage run sequentially in registration order, middleware hooks before
//! global interceptors on the request stage and after them on the response
//! stage.
//!
//! Request and response hooks can rewrite their value or fail the call by
//! returning an error. Error hooks only transform: every failure flows
//! through the error chain exactly once and comes out as an error.

use std::sync::Arc;

use async_trait::async_trait;
use smol_str::SmolStr;
use sling_core::{Error, RequestConfig, ResponseEnvelope};
use tracing::{debug, trace};

/// Observes or rewrites an outbound request before dispatch.
///
/// Returning `Err` fails the call before anything is sent.
#[async_trait]
pub trait RequestHook: Send + Sync {
    /// Runs against the request config; the returned config flows onward.
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, Error>;
}

/// Observes or rewrites a successful response envelope.
///
/// Returning `Err` converts the success into a failure, which then runs
/// through the error chain like any other error.
#[async_trait]
pub trait ResponseHook: Send + Sync {
    /// Runs against the envelope; the returned envelope flows onward.
    async fn on_response(&self, envelope: ResponseEnvelope) -> Result<ResponseEnvelope, Error>;
}

/// Observes or transforms a failure on its way out.
///
/// Error hooks cannot suppress a failure, only reshape it.
#[async_trait]
pub trait ErrorHook: Send + Sync {
    /// Runs against the error; the returned error flows onward.
    async fn on_error(&self, error: Error) -> Error;
}

#[async_trait]
impl<F> RequestHook for F
where
    F: Fn(RequestConfig) -> Result<RequestConfig, Error> + Send + Sync,
{
    async fn on_request(&self, config: RequestConfig) -> Result<RequestConfig, Error> {
        self(config)
    }
}

#[async_trait]
impl<F> ResponseHook for F
where
    F: Fn(ResponseEnvelope) -> Result<ResponseEnvelope, Error> + Send + Sync,
{
    async fn on_response(&self, envelope: ResponseEnvelope) -> Result<ResponseEnvelope, Error> {
        self(envelope)
    }
}

#[async_trait]
impl<F> ErrorHook for F
where
    F: Fn(Error) -> Error + Send + Sync,
{
    async fn on_error(&self, error: Error) -> Error {
        self(error)
    }
}

/// A named bundle of stage hooks, removable as a unit.
#[derive(Clone, Default)]
pub struct Middleware {
    name: SmolStr,
    pre: Option<Arc<dyn RequestHook>>,
    post: Option<Arc<dyn ResponseHook>>,
    error: Option<Arc<dyn ErrorHook>>,
}

impl Middleware {
    /// Empty middleware with the given name.
    pub fn new(name: impl Into<SmolStr>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// The name this middleware registers and deregisters under.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Attaches the request-stage hook.
    pub fn on_request(mut self, hook: impl RequestHook + 'static) -> Self {
        self.pre = Some(Arc::new(hook));
        self
    }

    /// Attaches the response-stage hook.
    pub fn on_response(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.post = Some(Arc::new(hook));
        self
    }

    /// Attaches the error-stage hook.
    pub fn on_error(mut self, hook: impl ErrorHook + 'static) -> Self {
        self.error = Some(Arc::new(hook));
        self
    }
}

impl std::fmt::Debug for Middleware {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Middleware")
            .field("name", &self.name)
            .field("pre", &self.pre.is_some())
            .field("post", &self.post.is_some())
            .field("error", &self.error.is_some())
            .finish()
    }
}

/// The registered hooks of a client, executed per stage in order.
#[derive(Clone, Default)]
pub struct HookPipeline {
    request_interceptors: Vec<Arc<dyn RequestHook>>,
    response_interceptors: Vec<Arc<dyn ResponseHook>>,
    error_interceptors: Vec<Arc<dyn ErrorHook>>,
    middleware: Vec<Middleware>,
}

impl HookPipeline {
    /// Empty pipeline.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a global request interceptor.
    pub fn add_request_interceptor(&mut self, hook: impl RequestHook + 'static) {
        self.request_interceptors.push(Arc::new(hook));
    }

    /// Registers a global response interceptor.
    pub fn add_response_interceptor(&mut self, hook: impl ResponseHook + 'static) {
        self.response_interceptors.push(Arc::new(hook));
    }

    /// Registers a global error interceptor.
    pub fn add_error_interceptor(&mut self, hook: impl ErrorHook + 'static) {
        self.error_interceptors.push(Arc::new(hook));
    }

    /// Registers a middleware. A middleware with the same name replaces the
    /// previous registration, keeping its original position.
    pub fn use_middleware(&mut self, middleware: Middleware) {
        match self
            .middleware
            .iter_mut()
            .find(|known| known.name == middleware.name)
        {
            Some(slot) => {
                debug!(name = %middleware.name, "replacing middleware");
                *slot = middleware;
            }
            None => {
                debug!(name = %middleware.name, "registering middleware");
                self.middleware.push(middleware);
            }
        }
    }

    /// Removes a middleware by name. Returns whether one was removed.
    pub fn remove_middleware(&mut self, name: &str) -> bool {
        let before = self.middleware.len();
        self.middleware.retain(|known| known.name != name);
        self.middleware.len() != before
    }

    /// Runs the request stage: middleware hooks first, then global
    /// interceptors, each receiving the previous hook's output. The first
    /// `Err` stops the chain and fails the call.
    pub async fn pre(&self, mut config: RequestConfig) -> Result<RequestConfig, Error> {
        for middleware in &self.middleware {
            if let Some(hook) = &middleware.pre {
                trace!(name = %middleware.name, "running middleware request hook");
                config = hook.on_request(config).await?;
            }
        }
        for hook in &self.request_interceptors {
            config = hook.on_request(config).await?;
        }
        Ok(config)
    }

    /// Runs the response stage: global interceptors first, then middleware
    /// hooks, mirroring the request stage.
    pub async fn post(&self, mut envelope: ResponseEnvelope) -> Result<ResponseEnvelope, Error> {
        for hook in &self.response_interceptors {
            envelope = hook.on_response(envelope).await?;
        }
        for middleware in &self.middleware {
            if let Some(hook) = &middleware.post {
                trace!(name = %middleware.name, "running middleware response hook");
                envelope = hook.on_response(envelope).await?;
            }
        }
        Ok(envelope)
    }

    /// Runs the error stage over a failure. Every registered error hook sees
    /// the (possibly transformed) error; the chain always yields an error.
    pub async fn error(&self, mut error: Error) -> Error {
        for hook in &self.error_interceptors {
            error = hook.on_error(error).await;
        }
        for middleware in &self.middleware {
            if let Some(hook) = &middleware.error {
                trace!(name = %middleware.name, "running middleware error hook");
                error = hook.on_error(error).await;
            }
        }
        error
    }
}

impl std::fmt::Debug for HookPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookPipeline")
            .field("request_interceptors", &self.request_interceptors.len())
            .field("response_interceptors", &self.response_interceptors.len())
            .field("error_interceptors", &self.error_interceptors.len())
            .field(
                "middleware",
                &self
                    .middleware
                    .iter()
                    .map(|m| m.name.as_str())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};
    use sling_core::Payload;
    use std::sync::Mutex;

    fn envelope() -> ResponseEnvelope {
        ResponseEnvelope {
            payload: Payload::Empty,
            status: StatusCode::OK,
            status_text: "OK".into(),
            headers: HeaderMap::new(),
            request: RequestConfig::get("/x"),
            cached: false,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn request_hooks_run_in_order_and_compose() {
        let mut pipeline = HookPipeline::new();
        pipeline.use_middleware(Middleware::new("auth").on_request(
            |config: RequestConfig| Ok(config.header("authorization", "Bearer t")),
        ));
        pipeline.add_request_interceptor(|config: RequestConfig| {
            Ok(config.header("x-trace", "abc"))
        });

        let out = pipeline.pre(RequestConfig::get("/x")).await.unwrap();
        assert!(out.headers.contains_key("authorization"));
        assert!(out.headers.contains_key("x-trace"));
    }

    #[tokio::test]
    async fn request_hook_error_stops_the_chain() {
        let ran = Arc::new(Mutex::new(false));
        let mut pipeline = HookPipeline::new();
        pipeline.add_request_interceptor(|config: RequestConfig| {
            Err(Error::validation("rejected by hook", &config))
        });
        let ran_clone = Arc::clone(&ran);
        pipeline.add_request_interceptor(move |config: RequestConfig| {
            *ran_clone.lock().unwrap() = true;
            Ok(config)
        });

        assert!(pipeline.pre(RequestConfig::get("/x")).await.is_err());
        assert!(!*ran.lock().unwrap());
    }

    #[tokio::test]
    async fn response_hooks_can_rewrite_or_fail() {
        let mut pipeline = HookPipeline::new();
        pipeline.add_response_interceptor(|mut envelope: ResponseEnvelope| {
            envelope.payload = Payload::Text("rewritten".into());
            Ok(envelope)
        });
        let out = pipeline.post(envelope()).await.unwrap();
        assert_eq!(out.payload, Payload::Text("rewritten".into()));

        let mut failing = HookPipeline::new();
        failing.add_response_interceptor(|envelope: ResponseEnvelope| {
            Err(Error::validation("bad body", &envelope.request))
        });
        assert!(failing.post(envelope()).await.is_err());
    }

    #[tokio::test]
    async fn error_hooks_transform_but_never_suppress() {
        let mut pipeline = HookPipeline::new();
        pipeline.add_error_interceptor(|error: Error| match error {
            Error::Network { request, retries, .. } => Error::Network {
                message: "annotated".into(),
                retries,
                request,
            },
            other => other,
        });

        let config = RequestConfig::get("/x");
        let out = pipeline.error(Error::network("raw", &config)).await;
        assert!(out.to_string().contains("annotated"));
    }

    #[tokio::test]
    async fn middleware_is_replaced_by_name_and_removable() {
        let mut pipeline = HookPipeline::new();
        pipeline.use_middleware(
            Middleware::new("auth")
                .on_request(|config: RequestConfig| Ok(config.header("x-v", "1"))),
        );
        pipeline.use_middleware(
            Middleware::new("auth")
                .on_request(|config: RequestConfig| Ok(config.header("x-v", "2"))),
        );

        let out = pipeline.pre(RequestConfig::get("/x")).await.unwrap();
        assert_eq!(out.headers.get("x-v").unwrap(), "2");

        assert!(pipeline.remove_middleware("auth"));
        assert!(!pipeline.remove_middleware("auth"));
        let out = pipeline.pre(RequestConfig::get("/x")).await.unwrap();
        assert!(out.headers.is_empty());
    }
}
