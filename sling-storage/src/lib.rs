#![warn(missing_docs)]
//! Storage adapter contract and backends for sling.
//!
//! The cache subsystem and the offline queue both speak the same
//! [`StorageAdapter`] contract: `get`/`set`/`delete`/`clear`/`has` over an
//! arbitrary string key and raw bytes. The contract is TTL-agnostic — expiry
//! interpretation belongs to the caller.
//!
//! Two backends ship here:
//!
//! - [`MemoryAdapter`] — volatile in-process map; lost on restart
//! - [`FileAdapter`] — persistent single-file JSON store; survives restarts

mod file;
mod memory;

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use thiserror::Error;

pub use file::FileAdapter;
pub use memory::MemoryAdapter;

/// Errors raised by storage backends.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Filesystem-level failure.
    #[error(transparent)]
    Io(#[from] std::io::Error),
    /// On-disk document could not be encoded or decoded.
    #[error(transparent)]
    Serialization(#[from] serde_json::Error),
    /// Backend-specific internal failure.
    #[error("storage backend error: {0}")]
    Internal(String),
}

/// Result alias for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Uniform key-value contract over an arbitrary backend.
///
/// Values are opaque bytes; callers own serialization and TTL semantics.
#[async_trait]
pub trait StorageAdapter: Send + Sync {
    /// Reads the value stored under `key`, if any.
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>>;

    /// Stores `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: Bytes) -> StorageResult<()>;

    /// Removes the value stored under `key`; removing a missing key is not
    /// an error.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Removes every stored value.
    async fn clear(&self) -> StorageResult<()>;

    /// Whether a value is stored under `key`.
    async fn has(&self, key: &str) -> StorageResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Backend name, for logging.
    fn name(&self) -> &str {
        "storage"
    }
}

#[async_trait]
impl StorageAdapter for Arc<dyn StorageAdapter> {
    async fn get(&self, key: &str) -> StorageResult<Option<Bytes>> {
        (**self).get(key).await
    }

    async fn set(&self, key: &str, value: Bytes) -> StorageResult<()> {
        (**self).set(key, value).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        (**self).delete(key).await
    }

    async fn clear(&self) -> StorageResult<()> {
        (**self).clear().await
    }

    async fn has(&self, key: &str) -> StorageResult<bool> {
        (**self).has(key).await
    }

    fn name(&self) -> &str {
        (**self).name()
    }
}
