//! Blob Store Module
//!
//! Content-addressable byte storage over a flat keyspace of
//! slash-delimited string keys. This is the one component specified only
//! at its interface (§4.A): the tile log writes C2SP tlog-tiles paths
//! here and reads them back verbatim; the actual durable backend (local
//! filesystem, S3/MinIO, Azure, ...) is an external collaborator.
//!
//! The crate ships one concrete implementation, [`memory::MemoryBlobStore`],
//! used as the reference/test backend.

pub mod memory;

use async_trait::async_trait;
use thiserror::Error;

/// Blob store errors.
#[derive(Debug, Error)]
pub enum BlobError {
    #[error("key not found: {0}")]
    NotFound(String),

    #[error("transport failure: {0}")]
    Transport(String),
}

/// Result type for blob store operations.
pub type BlobResult<T> = Result<T, BlobError>;

/// Content-addressable blob storage.
///
/// Implementations must durably persist `put` before it returns, and
/// provide last-writer-wins semantics on a given key (sufficient given
/// the log's single-writer discipline — concurrent overwrites of the
/// same key never happen in normal operation).
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Write `bytes` at `key`. Overwrite is permitted but is only ever
    /// exercised by the tile log on the rightmost partial tile at each
    /// level; full tiles are written exactly once.
    async fn put(&self, key: &str, bytes: Vec<u8>) -> BlobResult<()>;

    /// Read the bytes at `key`, or `None` if absent. Absence is a normal
    /// outcome (e.g. a hash tile not yet built), not an error.
    async fn get(&self, key: &str) -> BlobResult<Option<Vec<u8>>>;

    /// Whether `key` is present.
    async fn exists(&self, key: &str) -> BlobResult<bool> {
        Ok(self.get(key).await?.is_some())
    }

    /// Enumerate keys with the given prefix. Used only by auditing and
    /// diagnostic tooling, never by the registrar hot path.
    async fn list(&self, prefix: &str) -> BlobResult<Vec<String>>;

    /// Delete the value at `key`, if present. Not used by the registrar
    /// hot path; provided for completeness and for test cleanup.
    async fn delete(&self, key: &str) -> BlobResult<()>;
}

#[cfg(test)]
mod tests {
    use super::memory::MemoryBlobStore;
    use super::*;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let store = MemoryBlobStore::new();
        store.put("tile/0/000", vec![1, 2, 3]).await.unwrap();
        let got = store.get("tile/0/000").await.unwrap();
        assert_eq!(got, Some(vec![1, 2, 3]));
    }

    #[tokio::test]
    async fn test_get_missing_is_none_not_error() {
        let store = MemoryBlobStore::new();
        let got = store.get("tile/0/999").await.unwrap();
        assert_eq!(got, None);
    }

    #[tokio::test]
    async fn test_list_prefix() {
        let store = MemoryBlobStore::new();
        store.put("tile/0/000", vec![0u8; 32]).await.unwrap();
        store.put("tile/0/001", vec![0u8; 32]).await.unwrap();
        store.put("tile/entries/000", vec![0u8; 32]).await.unwrap();

        let mut keys = store.list("tile/0/").await.unwrap();
        keys.sort();
        assert_eq!(keys, vec!["tile/0/000", "tile/0/001"]);
    }

    #[tokio::test]
    async fn test_delete() {
        let store = MemoryBlobStore::new();
        store.put("k", vec![1]).await.unwrap();
        store.delete("k").await.unwrap();
        assert!(!store.exists("k").await.unwrap());
    }
}
