//! The [`Client`] orchestrator.
//!
//! One logical request flows through the stages in a fixed order: request
//! hooks, mock short-circuit, cache lookup, deduplication, rate limiting,
//! offline gate, retry-wrapped transport exchange, response hooks. Failures
//! from any stage pass through the error-hook chain exactly once on their
//! way out.
//!
//! The ordering is load-bearing. A cache hit never consumes a rate-limit
//! token; a deduplicated call joins the in-flight exchange instead of
//! spending its own token; a mock match returns before any of it.

use std::sync::{Arc, RwLock, Weak};

use http::Method;
use sling_core::{
    CacheTier, CancellationToken, ConnectivityMonitor, Error, Payload, Policy, RawResponse,
    RequestConfig, ResponseEnvelope, Transport,
};
use sling_storage::{MemoryAdapter, StorageAdapter, StorageResult};
use tracing::{debug, warn};

use crate::cache::CacheCoordinator;
use crate::dedup::{self, DedupDecision, DedupTable};
use crate::hooks::{ErrorHook, HookPipeline, Middleware, RequestHook, ResponseHook};
use crate::mock::{MockRegistry, MockResponse};
use crate::offline::{DrainOutcome, OfflineQueue, QueueEntry};
use crate::ratelimit::{AcquireError, RateLimiter};
use crate::retry;

/// Client construction failure.
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    /// No transport was supplied to the builder.
    #[error("a transport is required to build a client")]
    MissingTransport,
}

/// Request orchestrator over a [`Transport`].
///
/// Cheap to clone; clones share all state (caches, queues, hooks, mocks).
#[derive(Clone)]
pub struct Client {
    inner: Arc<ClientInner>,
}

struct ClientInner {
    transport: Arc<dyn Transport>,
    cache: CacheCoordinator,
    dedup: DedupTable,
    limiter: RateLimiter,
    offline: OfflineQueue,
    hooks: RwLock<HookPipeline>,
    mocks: MockRegistry,
    connectivity: ConnectivityMonitor,
    default_policy: Policy,
}

/// Builder for [`Client`].
///
/// Only the transport is required. Storage defaults to in-process memory
/// adapters; the offline queue defaults to the persistent cache adapter
/// when one is configured, so queued requests survive restarts alongside
/// the persistent cache.
#[derive(Default)]
pub struct ClientBuilder {
    transport: Option<Arc<dyn Transport>>,
    memory: Option<Arc<dyn StorageAdapter>>,
    persistent: Option<Arc<dyn StorageAdapter>>,
    offline: Option<Arc<dyn StorageAdapter>>,
    connectivity: Option<ConnectivityMonitor>,
    default_policy: Policy,
    hooks: HookPipeline,
}

impl ClientBuilder {
    /// Sets the transport performing network exchanges.
    pub fn transport(mut self, transport: impl Transport + 'static) -> Self {
        self.transport = Some(Arc::new(transport));
        self
    }

    /// Backing store for the memory cache tier.
    pub fn memory_store(mut self, adapter: impl StorageAdapter + 'static) -> Self {
        self.memory = Some(Arc::new(adapter));
        self
    }

    /// Backing store for the persistent cache tier.
    pub fn persistent_store(mut self, adapter: impl StorageAdapter + 'static) -> Self {
        self.persistent = Some(Arc::new(adapter));
        self
    }

    /// Backing store for the offline queue.
    pub fn offline_store(mut self, adapter: impl StorageAdapter + 'static) -> Self {
        self.offline = Some(Arc::new(adapter));
        self
    }

    /// Connectivity signal gating offline queueing and drains.
    pub fn connectivity(mut self, monitor: ConnectivityMonitor) -> Self {
        self.connectivity = Some(monitor);
        self
    }

    /// Policy applied by [`Client::config`] and the method shorthands.
    pub fn default_policy(mut self, policy: Policy) -> Self {
        self.default_policy = policy;
        self
    }

    /// Registers a middleware at build time.
    pub fn middleware(mut self, middleware: Middleware) -> Self {
        self.hooks.use_middleware(middleware);
        self
    }

    /// Registers a global request interceptor at build time.
    pub fn request_interceptor(mut self, hook: impl RequestHook + 'static) -> Self {
        self.hooks.add_request_interceptor(hook);
        self
    }

    /// Registers a global response interceptor at build time.
    pub fn response_interceptor(mut self, hook: impl ResponseHook + 'static) -> Self {
        self.hooks.add_response_interceptor(hook);
        self
    }

    /// Registers a global error interceptor at build time.
    pub fn error_interceptor(mut self, hook: impl ErrorHook + 'static) -> Self {
        self.hooks.add_error_interceptor(hook);
        self
    }

    /// Builds the client.
    ///
    /// When called inside a tokio runtime this also spawns the watcher that
    /// drains the offline queue on offline-to-online transitions; outside a
    /// runtime, drains must be triggered through [`Client::drain_offline`].
    pub fn build(self) -> Result<Client, BuildError> {
        let transport = self.transport.ok_or(BuildError::MissingTransport)?;
        let memory: Arc<dyn StorageAdapter> = self
            .memory
            .unwrap_or_else(|| Arc::new(MemoryAdapter::new()));
        let offline = self
            .offline
            .or_else(|| self.persistent.clone())
            .unwrap_or_else(|| Arc::new(MemoryAdapter::new()));
        let persistent: Arc<dyn StorageAdapter> = self
            .persistent
            .unwrap_or_else(|| Arc::new(MemoryAdapter::new()));

        let inner = Arc::new(ClientInner {
            transport,
            cache: CacheCoordinator::new(memory, persistent),
            dedup: DedupTable::new(),
            limiter: RateLimiter::new(),
            offline: OfflineQueue::new(offline),
            hooks: RwLock::new(self.hooks),
            mocks: MockRegistry::new(),
            connectivity: self.connectivity.unwrap_or_default(),
            default_policy: self.default_policy,
        });

        spawn_connectivity_watcher(&inner);
        Ok(Client { inner })
    }
}

/// Watches connectivity transitions and drains the queue when the client
/// comes back online. Holds a weak reference so a dropped client stops the
/// task at the next transition.
fn spawn_connectivity_watcher(inner: &Arc<ClientInner>) {
    let Ok(handle) = tokio::runtime::Handle::try_current() else {
        return;
    };
    let weak = Arc::downgrade(inner);
    let mut rx = inner.connectivity.subscribe();
    handle.spawn(async move {
        let mut online = *rx.borrow();
        while rx.changed().await.is_ok() {
            let now_online = *rx.borrow_and_update();
            if !online && now_online {
                let Some(inner) = Weak::upgrade(&weak) else {
                    break;
                };
                debug!("connectivity restored, draining offline queue");
                if let Err(err) = inner.drain_offline().await {
                    warn!(error = %err, "offline drain failed");
                }
            }
            online = now_online;
        }
    });
}

impl Client {
    /// Starts a builder.
    pub fn builder() -> ClientBuilder {
        ClientBuilder::default()
    }

    /// A request config carrying this client's default policy.
    ///
    /// Configs built directly through [`RequestConfig`] carry
    /// [`Policy::default`] instead.
    pub fn config(&self, method: Method, target: impl Into<String>) -> RequestConfig {
        RequestConfig::new(method, target).policy(self.inner.default_policy.clone())
    }

    /// GET shorthand under the default policy.
    pub async fn get(&self, target: impl Into<String>) -> Result<ResponseEnvelope, Error> {
        self.request(self.config(Method::GET, target)).await
    }

    /// POST shorthand under the default policy.
    pub async fn post(&self, target: impl Into<String>) -> Result<ResponseEnvelope, Error> {
        self.request(self.config(Method::POST, target)).await
    }

    /// PUT shorthand under the default policy.
    pub async fn put(&self, target: impl Into<String>) -> Result<ResponseEnvelope, Error> {
        self.request(self.config(Method::PUT, target)).await
    }

    /// PATCH shorthand under the default policy.
    pub async fn patch(&self, target: impl Into<String>) -> Result<ResponseEnvelope, Error> {
        self.request(self.config(Method::PATCH, target)).await
    }

    /// DELETE shorthand under the default policy.
    pub async fn delete(&self, target: impl Into<String>) -> Result<ResponseEnvelope, Error> {
        self.request(self.config(Method::DELETE, target)).await
    }

    /// Issues one logical request through the full orchestration pipeline.
    pub async fn request(&self, config: RequestConfig) -> Result<ResponseEnvelope, Error> {
        let pipeline = self.inner.pipeline();
        match self.inner.run(config, &pipeline).await {
            Ok(envelope) => Ok(envelope),
            // Every failure passes through the error chain exactly once.
            Err(error) => Err(pipeline.error(error).await),
        }
    }

    /// Registers a mock for a method and target, enabling mock mode.
    pub fn add_mock(&self, method: Method, target: &str, response: MockResponse) {
        self.inner.mocks.add(&method, target, response);
    }

    /// Removes all registered mocks.
    pub fn clear_mocks(&self) {
        self.inner.mocks.clear();
    }

    /// Enables or disables mock matching without clearing registrations.
    pub fn set_mock_mode(&self, enabled: bool) {
        self.inner.mocks.set_enabled(enabled);
    }

    /// Clears one cache tier, or both when `tier` is `None`.
    pub async fn clear_cache(&self, tier: Option<CacheTier>) -> StorageResult<()> {
        self.inner.cache.clear(tier).await
    }

    /// Invalidates cached entries matching `pattern` in the given tier (or
    /// both).
    pub async fn invalidate_cache(
        &self,
        pattern: &str,
        tier: Option<CacheTier>,
    ) -> StorageResult<()> {
        self.inner.cache.invalidate(pattern, tier).await
    }

    /// The connectivity signal. Toggling it offline makes subsequent
    /// requests queue; toggling it back online triggers a drain.
    pub fn connectivity(&self) -> ConnectivityMonitor {
        self.inner.connectivity.clone()
    }

    /// Registers or replaces a named middleware.
    pub fn use_middleware(&self, middleware: Middleware) {
        self.inner.hooks_mut().use_middleware(middleware);
    }

    /// Removes a middleware by name. Returns whether one was removed.
    pub fn remove_middleware(&self, name: &str) -> bool {
        self.inner.hooks_mut().remove_middleware(name)
    }

    /// Registers a global request interceptor.
    pub fn add_request_interceptor(&self, hook: impl RequestHook + 'static) {
        self.inner.hooks_mut().add_request_interceptor(hook);
    }

    /// Registers a global response interceptor.
    pub fn add_response_interceptor(&self, hook: impl ResponseHook + 'static) {
        self.inner.hooks_mut().add_response_interceptor(hook);
    }

    /// Registers a global error interceptor.
    pub fn add_error_interceptor(&self, hook: impl ErrorHook + 'static) {
        self.inner.hooks_mut().add_error_interceptor(hook);
    }

    /// Currently queued offline requests, in enqueue order.
    pub async fn queued_requests(&self) -> StorageResult<Vec<QueueEntry>> {
        self.inner.offline.list().await
    }

    /// Removes one queued request by id.
    pub async fn dequeue_request(&self, id: &str) -> StorageResult<()> {
        self.inner.offline.dequeue(id).await
    }

    /// Manually triggers an offline queue drain. A drain already in flight
    /// makes this a no-op.
    pub async fn drain_offline(&self) -> StorageResult<DrainOutcome> {
        self.inner.drain_offline().await
    }
}

impl std::fmt::Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("cache", &self.inner.cache)
            .field("inflight", &self.inner.dedup.len())
            .field("mocks_enabled", &self.inner.mocks.is_enabled())
            .field("online", &self.inner.connectivity.is_online())
            .finish()
    }
}

impl ClientInner {
    fn pipeline(&self) -> HookPipeline {
        self.hooks
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn hooks_mut(&self) -> std::sync::RwLockWriteGuard<'_, HookPipeline> {
        self.hooks
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    async fn run(
        &self,
        config: RequestConfig,
        pipeline: &HookPipeline,
    ) -> Result<ResponseEnvelope, Error> {
        let config = pipeline.pre(config).await?;
        self.dispatch(config, pipeline, false).await
    }

    /// Stage dispatch after request hooks: mock, cache, dedup, then the
    /// rate-limited, offline-gated, retry-wrapped exchange.
    async fn dispatch(
        &self,
        config: RequestConfig,
        pipeline: &HookPipeline,
        is_replay: bool,
    ) -> Result<ResponseEnvelope, Error> {
        // Mock matches return as-is, bypassing response hooks along with
        // everything else.
        if let Some(mock) = self.mocks.matches(&config) {
            debug!(method = %config.method, target = %config.target, "serving mock response");
            return Ok(mock.envelope(&config));
        }

        if let Some(hit) = self.cache.read(&config).await {
            return pipeline.post(hit).await;
        }

        if config.policy.dedup {
            let fingerprint = sling_core::Fingerprint::of(&config);
            match self.dedup.check(&fingerprint) {
                DedupDecision::Join(rx) => {
                    let shared = dedup::await_shared(rx, &config).await?;
                    return pipeline.post(shared).await;
                }
                DedupDecision::Execute(guard) => {
                    let result = self.execute(&config, is_replay).await;
                    let envelope = guard.settle(result)?;
                    return pipeline.post(envelope).await;
                }
            }
        }

        let envelope = self.execute(&config, is_replay).await?;
        pipeline.post(envelope).await
    }

    /// Rate limit, offline gate, and the retry-wrapped exchange.
    async fn execute(
        &self,
        config: &RequestConfig,
        is_replay: bool,
    ) -> Result<ResponseEnvelope, Error> {
        let cancel = config.cancel.clone().unwrap_or_default();

        if let Some(limit) = &config.policy.rate_limit {
            let key = limit.key.as_deref().unwrap_or(&config.target);
            match self.limiter.acquire(key, limit, &cancel).await {
                Ok(()) => {}
                Err(AcquireError::Rejected { retry_after }) => {
                    return Err(Error::RateLimited {
                        retry_after,
                        request: Box::new(config.clone()),
                    });
                }
                Err(AcquireError::Cancelled) => return Err(Error::aborted(config)),
            }
        }

        // Replays come from the drain and must reach the transport even
        // while the monitor still reports offline mid-transition.
        if !is_replay && !self.connectivity.is_online() {
            if config.policy.queue_offline {
                return match self.offline.enqueue(config).await {
                    Ok(id) => Err(Error::Queued {
                        id,
                        request: Box::new(config.clone()),
                    }),
                    Err(err) => Err(Error::Storage {
                        message: err.to_string(),
                        request: Box::new(config.clone()),
                    }),
                };
            }
            return Err(Error::network("offline", config));
        }

        retry::run(config.policy.retry.as_ref(), config, &cancel, |attempt| {
            self.attempt(config, &cancel, attempt)
        })
        .await
    }

    /// One transport attempt: exchange, status validation, payload parsing,
    /// transform and schema validation, cache write.
    async fn attempt(
        &self,
        config: &RequestConfig,
        cancel: &CancellationToken,
        attempt: u32,
    ) -> Result<ResponseEnvelope, Error> {
        let exchange = self.transport.exchange(config, cancel.clone());
        let raw: RawResponse = tokio::select! {
            _ = cancel.cancelled() => return Err(Error::aborted(config)),
            outcome = async {
                match config.timeout {
                    Some(limit) => match tokio::time::timeout(limit, exchange).await {
                        Ok(result) => result,
                        Err(_) => Err(Error::timeout(config)),
                    },
                    None => exchange.await,
                }
            } => outcome?,
        };

        // Status validation runs before payload parsing so a 5xx with an
        // unparseable body stays retryable instead of becoming terminal.
        if !config.policy.accept_status.contains(raw.status.as_u16()) {
            return Err(Error::status(raw.status, config));
        }

        let content_type = raw.content_type().map(str::to_owned);
        let RawResponse {
            status,
            headers,
            body,
        } = raw;

        let mut payload = Payload::parse(body, content_type.as_deref())
            .map_err(|message| Error::validation(message, config))?;
        if let Some(transform) = &config.transform {
            payload = transform(payload).map_err(|message| Error::validation(message, config))?;
        }
        if let Some(validator) = &config.validator {
            payload = validator
                .parse(payload)
                .map_err(|message| Error::validation(message, config))?;
        }

        let envelope = ResponseEnvelope {
            payload,
            status,
            status_text: status.canonical_reason().unwrap_or_default().to_owned(),
            headers,
            request: config.clone(),
            cached: false,
            retry_count: attempt,
        };
        self.cache.write(config, &envelope).await;
        Ok(envelope)
    }

    async fn drain_offline(&self) -> StorageResult<DrainOutcome> {
        let pipeline = self.pipeline();
        self.offline
            .drain(|config| {
                let pipeline = pipeline.clone();
                async move { self.dispatch(config, &pipeline, true).await }
            })
            .await
    }
}
