//! Offline queue.
//!
//! A persistent, backend-agnostic list of not-yet-sent requests. Requests
//! issued while offline are appended here (and the call fails fast with a
//! queued error); when connectivity returns the queue drains sequentially.
//!
//! An entry is removed only after its replay confirms success. Failed
//! replays re-persist the entry with an incremented retry counter and drop
//! it once the counter exceeds [`MAX_REPLAY_RETRIES`]. Only one drain runs
//! at a time; a drain triggered while one is active is a no-op.

use std::future::Future;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sling_core::{Error, RequestConfig, ResponseEnvelope};
use sling_storage::{StorageAdapter, StorageResult};
use tokio::sync::Mutex;
use tracing::{debug, warn};
use uuid::Uuid;

/// Replay retry ceiling: an entry is dropped on its fourth failed replay.
pub const MAX_REPLAY_RETRIES: u32 = 3;

const INDEX_KEY: &str = "offline:index";

fn entry_key(id: &str) -> String {
    format!("offline:entry:{id}")
}

/// One persisted queue entry. Survives process restarts when backed by a
/// persistent adapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueueEntry {
    /// Unique entry id.
    pub id: String,
    /// The original request, replayed verbatim on drain.
    pub request: RequestConfig,
    /// When the entry was enqueued.
    pub queued_at: DateTime<Utc>,
    /// Failed replay attempts so far.
    pub retry_count: u32,
}

/// Result of a drain trigger.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DrainOutcome {
    /// Another drain was already in flight; this trigger did nothing.
    AlreadyDraining,
    /// The queue was walked once.
    Completed {
        /// Entries replayed successfully and removed.
        replayed: usize,
        /// Entries that failed and were re-persisted for a later drain.
        requeued: usize,
        /// Entries dropped after exceeding the retry ceiling.
        dropped: usize,
    },
}

/// Persistent queue of deferred requests.
pub struct OfflineQueue {
    adapter: Arc<dyn StorageAdapter>,
    // Guards index read-modify-write cycles.
    index_lock: Mutex<()>,
    // try_lock here is what makes drains single-flight.
    drain_lock: Mutex<()>,
}

impl OfflineQueue {
    /// Queue over the given adapter. Use a persistent adapter if entries
    /// must survive restarts.
    pub fn new(adapter: Arc<dyn StorageAdapter>) -> Self {
        Self {
            adapter,
            index_lock: Mutex::new(()),
            drain_lock: Mutex::new(()),
        }
    }

    /// Appends a request to the queue, returning the new entry's id.
    pub async fn enqueue(&self, config: &RequestConfig) -> StorageResult<String> {
        let entry = QueueEntry {
            id: Uuid::new_v4().to_string(),
            request: config.clone(),
            queued_at: Utc::now(),
            retry_count: 0,
        };

        let _guard = self.index_lock.lock().await;
        self.persist(&entry).await?;
        let mut ids = self.read_index().await?;
        ids.push(entry.id.clone());
        self.write_index(&ids).await?;
        debug!(id = %entry.id, target = %config.target, "request queued for offline replay");
        Ok(entry.id)
    }

    /// All queued entries, in enqueue order.
    pub async fn list(&self) -> StorageResult<Vec<QueueEntry>> {
        let ids = self.read_index().await?;
        let mut entries = Vec::with_capacity(ids.len());
        for id in ids {
            match self.adapter.get(&entry_key(&id)).await? {
                Some(raw) => match serde_json::from_slice(&raw) {
                    Ok(entry) => entries.push(entry),
                    Err(err) => {
                        warn!(%id, error = %err, "undecodable queue entry, dropping");
                        self.dequeue(&id).await?;
                    }
                },
                // Index can reference an entry lost to a partial write.
                None => self.dequeue(&id).await?,
            }
        }
        Ok(entries)
    }

    /// Removes an entry by id. Removing an unknown id is not an error.
    pub async fn dequeue(&self, id: &str) -> StorageResult<()> {
        let _guard = self.index_lock.lock().await;
        self.adapter.delete(&entry_key(id)).await?;
        let mut ids = self.read_index().await?;
        ids.retain(|known| known != id);
        self.write_index(&ids).await
    }

    /// Drains the queue sequentially through `replay`.
    ///
    /// Each entry is replayed once per drain cycle. Success removes the
    /// entry — only after the replay result is confirmed; failure
    /// re-persists it with an incremented retry counter, or drops it past
    /// the ceiling. Returns immediately when a drain is already running.
    pub async fn drain<F, Fut>(&self, mut replay: F) -> StorageResult<DrainOutcome>
    where
        F: FnMut(RequestConfig) -> Fut,
        Fut: Future<Output = Result<ResponseEnvelope, Error>>,
    {
        let Ok(_guard) = self.drain_lock.try_lock() else {
            debug!("drain already in flight, skipping trigger");
            return Ok(DrainOutcome::AlreadyDraining);
        };

        let entries = self.list().await?;
        let mut replayed = 0;
        let mut requeued = 0;
        let mut dropped = 0;

        for mut entry in entries {
            match replay(entry.request.clone()).await {
                Ok(_) => {
                    self.dequeue(&entry.id).await?;
                    replayed += 1;
                }
                Err(err) => {
                    entry.retry_count += 1;
                    if entry.retry_count > MAX_REPLAY_RETRIES {
                        warn!(id = %entry.id, error = %err, "replay ceiling exceeded, dropping entry");
                        self.dequeue(&entry.id).await?;
                        dropped += 1;
                    } else {
                        debug!(id = %entry.id, retry_count = entry.retry_count, error = %err, "replay failed, requeueing");
                        self.persist(&entry).await?;
                        requeued += 1;
                    }
                }
            }
        }

        Ok(DrainOutcome::Completed {
            replayed,
            requeued,
            dropped,
        })
    }

    async fn persist(&self, entry: &QueueEntry) -> StorageResult<()> {
        let raw = serde_json::to_vec(entry)?;
        self.adapter.set(&entry_key(&entry.id), raw.into()).await
    }

    async fn read_index(&self) -> StorageResult<Vec<String>> {
        match self.adapter.get(INDEX_KEY).await? {
            Some(raw) => Ok(serde_json::from_slice(&raw)?),
            None => Ok(Vec::new()),
        }
    }

    async fn write_index(&self, ids: &[String]) -> StorageResult<()> {
        let raw = serde_json::to_vec(ids)?;
        self.adapter.set(INDEX_KEY, raw.into()).await
    }
}

impl std::fmt::Debug for OfflineQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OfflineQueue")
            .field("adapter", &self.adapter.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::{HeaderMap, StatusCode};
    use sling_core::Payload;
    use sling_storage::MemoryAdapter;

    fn queue() -> OfflineQueue {
        OfflineQueue::new(Arc::new(MemoryAdapter::new()))
    }

    fn envelope(config: &RequestConfig) -> ResponseEnvelope {
        ResponseEnvelope {
            payload: Payload::Empty,
            status: StatusCode::OK,
            status_text: "OK".into(),
            headers: HeaderMap::new(),
            request: config.clone(),
            cached: false,
            retry_count: 0,
        }
    }

    #[tokio::test]
    async fn enqueue_list_dequeue_round_trip() {
        let queue = queue();
        let id_a = queue.enqueue(&RequestConfig::post("/a")).await.unwrap();
        let id_b = queue.enqueue(&RequestConfig::post("/b")).await.unwrap();

        let entries = queue.list().await.unwrap();
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].id, id_a);
        assert_eq!(entries[0].request.target, "/a");
        assert_eq!(entries[1].id, id_b);

        queue.dequeue(&id_a).await.unwrap();
        let entries = queue.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id_b);
    }

    #[tokio::test]
    async fn drain_removes_entries_only_after_confirmed_success() {
        let queue = queue();
        queue.enqueue(&RequestConfig::post("/a")).await.unwrap();
        queue.enqueue(&RequestConfig::post("/b")).await.unwrap();

        let outcome = queue
            .drain(|config| async move { Ok(envelope(&config)) })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DrainOutcome::Completed {
                replayed: 2,
                requeued: 0,
                dropped: 0
            }
        );
        assert!(queue.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn failed_replays_are_requeued_with_incremented_counter() {
        let queue = queue();
        queue.enqueue(&RequestConfig::post("/a")).await.unwrap();

        let outcome = queue
            .drain(|config| async move { Err(Error::network("still down", &config)) })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DrainOutcome::Completed {
                replayed: 0,
                requeued: 1,
                dropped: 0
            }
        );
        let entries = queue.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].retry_count, 1);
    }

    #[tokio::test]
    async fn entries_are_dropped_after_fourth_failed_replay() {
        let queue = queue();
        queue.enqueue(&RequestConfig::post("/a")).await.unwrap();

        for expected_count in 1..=MAX_REPLAY_RETRIES {
            queue
                .drain(|config| async move { Err(Error::network("down", &config)) })
                .await
                .unwrap();
            assert_eq!(queue.list().await.unwrap()[0].retry_count, expected_count);
        }

        let outcome = queue
            .drain(|config| async move { Err(Error::network("down", &config)) })
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DrainOutcome::Completed {
                replayed: 0,
                requeued: 0,
                dropped: 1
            }
        );
        assert!(queue.list().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn concurrent_drain_triggers_are_noops() {
        let queue = Arc::new(queue());
        queue.enqueue(&RequestConfig::post("/a")).await.unwrap();

        let gate = Arc::new(tokio::sync::Notify::new());
        let slow = {
            let queue = Arc::clone(&queue);
            let gate = Arc::clone(&gate);
            tokio::spawn(async move {
                queue
                    .drain(|config| {
                        let gate = Arc::clone(&gate);
                        async move {
                            gate.notified().await;
                            Ok(envelope(&config))
                        }
                    })
                    .await
                    .unwrap()
            })
        };

        // Give the first drain time to take the lock and block in replay.
        tokio::task::yield_now().await;
        let second = queue
            .drain(|config| async move { Ok(envelope(&config)) })
            .await
            .unwrap();
        assert_eq!(second, DrainOutcome::AlreadyDraining);

        gate.notify_one();
        let first = slow.await.unwrap();
        assert!(matches!(first, DrainOutcome::Completed { replayed: 1, .. }));
    }

    #[tokio::test]
    async fn queue_survives_a_new_instance_over_the_same_adapter() {
        let adapter: Arc<dyn StorageAdapter> = Arc::new(MemoryAdapter::new());
        let first = OfflineQueue::new(Arc::clone(&adapter));
        let id = first.enqueue(&RequestConfig::post("/a")).await.unwrap();
        drop(first);

        let second = OfflineQueue::new(adapter);
        let entries = second.list().await.unwrap();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].id, id);
    }
}
