//! Cache coordination.
//!
//! The coordinator stores fingerprinted response entries against a chosen
//! storage tier, honoring a per-entry TTL. Expiry is computed lazily at read
//! time — an expired entry is deleted by the read that discovers it; there
//! is no background sweep.
//!
//! Adapter failures never fail the request: a read error is a miss, a write
//! error is a no-op, both logged at warn.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use http::{HeaderMap, StatusCode};
use serde::{Deserialize, Serialize};
use sling_core::{CacheTier, Fingerprint, Payload, RequestConfig, ResponseEnvelope};
use sling_storage::{StorageAdapter, StorageResult};
use tracing::{debug, warn};

/// Stored cache entry. Only the payload is kept; a hit synthesizes the rest
/// of the envelope (200 OK, empty headers, `cached: true`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct CacheEntry {
    pub payload: Payload,
    pub stored_at: DateTime<Utc>,
    #[serde(default, with = "humantime_serde")]
    pub ttl: Option<Duration>,
    pub key: String,
}

impl CacheEntry {
    fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.ttl {
            Some(ttl) => {
                let age = now.signed_duration_since(self.stored_at);
                age > chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX)
            }
            None => false,
        }
    }
}

/// Looks up and stores response envelopes against the configured tiers.
pub struct CacheCoordinator {
    memory: Arc<dyn StorageAdapter>,
    persistent: Arc<dyn StorageAdapter>,
}

impl CacheCoordinator {
    /// Coordinator over the two cache tiers.
    pub fn new(memory: Arc<dyn StorageAdapter>, persistent: Arc<dyn StorageAdapter>) -> Self {
        Self { memory, persistent }
    }

    fn adapter(&self, tier: CacheTier) -> Option<&Arc<dyn StorageAdapter>> {
        match tier {
            CacheTier::None => None,
            CacheTier::Memory => Some(&self.memory),
            CacheTier::Persistent => Some(&self.persistent),
        }
    }

    /// Cache key for a request: the explicit policy override, or the derived
    /// fingerprint, under a `cache:` namespace.
    pub(crate) fn storage_key(config: &RequestConfig) -> String {
        match &config.policy.cache.key {
            Some(key) => format!("cache:{key}"),
            None => format!("cache:{}", Fingerprint::of(config)),
        }
    }

    /// Cache lookup. Returns a synthesized envelope on a fresh hit; deletes
    /// and misses on an expired entry; treats adapter failures as misses.
    pub async fn read(&self, config: &RequestConfig) -> Option<ResponseEnvelope> {
        let adapter = self.adapter(config.policy.cache.tier)?;
        let key = Self::storage_key(config);

        let raw = match adapter.get(&key).await {
            Ok(raw) => raw?,
            Err(err) => {
                warn!(backend = adapter.name(), %key, error = %err, "cache read failed, treating as miss");
                return None;
            }
        };

        let entry: CacheEntry = match serde_json::from_slice(&raw) {
            Ok(entry) => entry,
            Err(err) => {
                warn!(backend = adapter.name(), %key, error = %err, "undecodable cache entry, evicting");
                let _ = adapter.delete(&key).await;
                return None;
            }
        };

        if entry.is_expired(Utc::now()) {
            debug!(backend = adapter.name(), %key, "cache entry expired, evicting");
            if let Err(err) = adapter.delete(&key).await {
                warn!(backend = adapter.name(), %key, error = %err, "failed to evict expired entry");
            }
            return None;
        }

        debug!(backend = adapter.name(), %key, "cache hit");
        Some(ResponseEnvelope {
            payload: entry.payload,
            status: StatusCode::OK,
            status_text: "OK".to_owned(),
            headers: HeaderMap::new(),
            request: config.clone(),
            cached: true,
            retry_count: 0,
        })
    }

    /// Stores a validated response. Only called after status validation has
    /// passed; failed attempts are never written. Adapter failures are
    /// swallowed.
    pub async fn write(&self, config: &RequestConfig, envelope: &ResponseEnvelope) {
        let Some(adapter) = self.adapter(config.policy.cache.tier) else {
            return;
        };
        let key = Self::storage_key(config);
        let entry = CacheEntry {
            payload: envelope.payload.clone(),
            stored_at: Utc::now(),
            ttl: config.policy.cache.ttl,
            key: key.clone(),
        };
        let raw = match serde_json::to_vec(&entry) {
            Ok(raw) => raw,
            Err(err) => {
                warn!(backend = adapter.name(), %key, error = %err, "unencodable cache entry, skipping write");
                return;
            }
        };
        if let Err(err) = adapter.set(&key, raw.into()).await {
            warn!(backend = adapter.name(), %key, error = %err, "cache write failed");
        } else {
            debug!(backend = adapter.name(), %key, "cache write");
        }
    }

    /// Clears one tier, or both when `tier` is `None`.
    pub async fn clear(&self, tier: Option<CacheTier>) -> StorageResult<()> {
        match tier {
            Some(CacheTier::None) => Ok(()),
            Some(tier) => match self.adapter(tier) {
                Some(adapter) => adapter.clear().await,
                None => Ok(()),
            },
            None => {
                self.memory.clear().await?;
                self.persistent.clear().await
            }
        }
    }

    /// Pattern invalidation. Invalidation in this design is coarse: the
    /// whole backend is cleared regardless of the pattern.
    pub async fn invalidate(&self, pattern: &str, tier: Option<CacheTier>) -> StorageResult<()> {
        debug!(%pattern, "coarse cache invalidation, clearing backend");
        self.clear(tier).await
    }
}

impl std::fmt::Debug for CacheCoordinator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheCoordinator")
            .field("memory", &self.memory.name())
            .field("persistent", &self.persistent.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use sling_core::{CachePolicy, Policy};
    use sling_storage::MemoryAdapter;

    fn coordinator() -> (Arc<MemoryAdapter>, CacheCoordinator) {
        let memory = Arc::new(MemoryAdapter::new());
        let persistent = Arc::new(MemoryAdapter::new());
        let coordinator = CacheCoordinator::new(memory.clone(), persistent);
        (memory, coordinator)
    }

    fn cached_config(ttl: Duration) -> RequestConfig {
        RequestConfig::get("/users").policy(Policy {
            cache: CachePolicy::memory(ttl),
            ..Policy::default()
        })
    }

    fn envelope(config: &RequestConfig) -> ResponseEnvelope {
        ResponseEnvelope {
            payload: Payload::Json(serde_json::json!({"id": 1})),
            status: StatusCode::OK,
            status_text: "OK".to_owned(),
            headers: HeaderMap::new(),
            request: config.clone(),
            cached: false,
            retry_count: 0,
        }
    }

    async fn plant_entry(
        adapter: &MemoryAdapter,
        config: &RequestConfig,
        stored_at: DateTime<Utc>,
        ttl: Duration,
    ) {
        let key = CacheCoordinator::storage_key(config);
        let entry = CacheEntry {
            payload: Payload::Text("stale?".into()),
            stored_at,
            ttl: Some(ttl),
            key: key.clone(),
        };
        adapter
            .set(&key, serde_json::to_vec(&entry).unwrap().into())
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn write_then_read_hits_with_cached_flag() {
        let (_, coordinator) = coordinator();
        let config = cached_config(Duration::from_secs(60));
        coordinator.write(&config, &envelope(&config)).await;

        let hit = coordinator.read(&config).await.unwrap();
        assert!(hit.cached);
        assert_eq!(hit.payload, Payload::Json(serde_json::json!({"id": 1})));
    }

    #[tokio::test]
    async fn disabled_tier_never_participates() {
        let (memory, coordinator) = coordinator();
        let config = RequestConfig::get("/users");
        coordinator.write(&config, &envelope(&config)).await;
        assert!(memory.is_empty());
        assert!(coordinator.read(&config).await.is_none());
    }

    #[tokio::test]
    async fn read_just_before_ttl_hits_and_just_after_evicts() {
        let ttl = Duration::from_millis(60_000);
        let (memory, coordinator) = coordinator();
        let config = cached_config(ttl);

        // One millisecond short of expiry: still a hit.
        let almost = Utc::now() - chrono::Duration::milliseconds(59_999);
        plant_entry(&memory, &config, almost, ttl).await;
        assert!(coordinator.read(&config).await.is_some());

        // One millisecond past expiry: miss, and the entry is deleted.
        let past = Utc::now() - chrono::Duration::milliseconds(60_001);
        plant_entry(&memory, &config, past, ttl).await;
        assert!(coordinator.read(&config).await.is_none());
        assert!(memory.is_empty());
    }

    #[tokio::test]
    async fn explicit_key_overrides_fingerprint() {
        let (memory, coordinator) = coordinator();
        let mut config = cached_config(Duration::from_secs(60));
        config.policy.cache.key = Some("user-list".into());
        coordinator.write(&config, &envelope(&config)).await;
        assert!(memory.has("cache:user-list").await.unwrap());
    }

    #[tokio::test]
    async fn clear_targets_one_tier_or_both() {
        let memory = Arc::new(MemoryAdapter::new());
        let persistent = Arc::new(MemoryAdapter::new());
        let coordinator = CacheCoordinator::new(memory.clone(), persistent.clone());

        memory.set("cache:a", b"{}".as_ref().into()).await.unwrap();
        persistent.set("cache:b", b"{}".as_ref().into()).await.unwrap();

        coordinator.clear(Some(CacheTier::Memory)).await.unwrap();
        assert!(memory.is_empty());
        assert!(!persistent.is_empty());

        coordinator.clear(None).await.unwrap();
        assert!(persistent.is_empty());
    }
}
