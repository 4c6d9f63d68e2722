//! Persistent single-file backend.

use std::collections::HashMap;
use std::path::PathBuf;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::Mutex;
use tracing::trace;

use crate::{StorageAdapter, StorageResult};

/// File-backed persistent store.
///
/// The whole store is one JSON document on disk. Every mutation is a
/// read-modify-write under a mutex, committed by writing a sidecar file and
/// renaming it over the original, so a crash mid-write never leaves a
/// half-written document. Contents survive process restarts, which is what
/// the offline queue requires.
///
/// Suited to small stores (queue entries, modest caches); it re-reads the
/// document per operation and is not meant for high-volume data.
#[derive(Debug)]
pub struct FileAdapter {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileAdapter {
    /// Adapter persisting to `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    async fn load(&self) -> StorageResult<HashMap<String, Vec<u8>>> {
        match tokio::fs::read(&self.path).await {
            Ok(raw) => Ok(serde_json::from_slice(&raw)?),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(HashMap::new()),
            Err(err) => Err(err.into()),
        }
    }

    async fn commit(&self, entries: &HashMap<String, Vec<u8>>) -> StorageResult<()> {
        let mut sidecar = self.path.clone().into_os_string();
        sidecar.push(".tmp");
        let sidecar = PathBuf::from(sidecar);

        let raw = serde_json::to_vec(entries)?;
        tokio::fs::write(&sidecar, &raw).await?;
        tokio::fs::rename(&sidecar, &self.path).await?;
        trace!(path = %self.path.display(), entries = entries.len(), "committed store");
        Ok(())
    }
}

#[async_trait]
impl StorageAdapter for FileAdapter {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.remove(key).map(Bytes::from))
    }

    async fn set(&self, key: &str, value: Bytes) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        entries.insert(key.to_owned(), value.to_vec());
        self.commit(&entries).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        let mut entries = self.load().await?;
        if entries.remove(key).is_some() {
            self.commit(&entries).await?;
        }
        Ok(())
    }

    async fn clear(&self) -> StorageResult<()> {
        let _guard = self.lock.lock().await;
        self.commit(&HashMap::new()).await
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.load().await?.contains_key(key))
    }

    fn name(&self) -> &str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn round_trip_and_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path().join("store.json"));

        assert_eq!(adapter.get("a").await.unwrap(), None);
        adapter.set("a", Bytes::from_static(b"payload")).await.unwrap();
        assert_eq!(
            adapter.get("a").await.unwrap(),
            Some(Bytes::from_static(b"payload"))
        );

        adapter.delete("a").await.unwrap();
        assert!(!adapter.has("a").await.unwrap());
    }

    #[tokio::test]
    async fn contents_survive_a_new_adapter_instance() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("store.json");

        let first = FileAdapter::new(&path);
        first.set("queued", Bytes::from_static(b"{}")).await.unwrap();
        drop(first);

        let second = FileAdapter::new(&path);
        assert_eq!(
            second.get("queued").await.unwrap(),
            Some(Bytes::from_static(b"{}"))
        );
    }

    #[tokio::test]
    async fn clear_empties_the_store() {
        let dir = tempfile::tempdir().unwrap();
        let adapter = FileAdapter::new(dir.path().join("store.json"));
        adapter.set("a", Bytes::from_static(b"1")).await.unwrap();
        adapter.set("b", Bytes::from_static(b"2")).await.unwrap();
        adapter.clear().await.unwrap();
        assert!(!adapter.has("a").await.unwrap());
        assert!(!adapter.has("b").await.unwrap());
    }
}
