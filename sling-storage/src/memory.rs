//! Volatile in-process backend.

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;

use crate::{StorageAdapter, StorageResult};

/// In-process map backend.
///
/// Lock-free reads via [`DashMap`]; contents are lost on process restart
/// and never shared across processes. This is the default cache tier and
/// the test stand-in for the persistent tier.
#[derive(Debug, Default)]
pub struct MemoryAdapter {
    entries: DashMap<String, Bytes>,
}

impl MemoryAdapter {
    /// New empty adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the store is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[async_trait]
impl StorageAdapter for MemoryAdapter {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        Ok(self.entries.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: Bytes) -> StorageResult<()> {
        self.entries.insert(key.to_owned(), value);
        Ok(())
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.entries.remove(key);
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        self.entries.clear();
        Ok(())
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.entries.contains_key(key))
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn set_get_delete_round_trip() {
        let adapter = MemoryAdapter::new();
        adapter.set("a", Bytes::from_static(b"1")).await.unwrap();
        assert_eq!(adapter.get("a").await.unwrap(), Some(Bytes::from_static(b"1")));
        assert!(adapter.has("a").await.unwrap());

        adapter.delete("a").await.unwrap();
        assert_eq!(adapter.get("a").await.unwrap(), None);
        assert!(!adapter.has("a").await.unwrap());
    }

    #[tokio::test]
    async fn set_replaces_and_clear_empties() {
        let adapter = MemoryAdapter::new();
        adapter.set("k", Bytes::from_static(b"v1")).await.unwrap();
        adapter.set("k", Bytes::from_static(b"v2")).await.unwrap();
        assert_eq!(adapter.get("k").await.unwrap(), Some(Bytes::from_static(b"v2")));

        adapter.set("other", Bytes::from_static(b"x")).await.unwrap();
        adapter.clear().await.unwrap();
        assert!(adapter.is_empty());
    }

    #[tokio::test]
    async fn deleting_missing_key_is_ok() {
        let adapter = MemoryAdapter::new();
        adapter.delete("ghost").await.unwrap();
    }
}
