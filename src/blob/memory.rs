//! In-Memory Blob Store
//!
//! Reference implementation of [`super::BlobStore`] for tests and
//! development. Data is lost when the process exits.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use super::{BlobResult, BlobStore};

/// In-memory, thread-safe blob store backed by a `HashMap`.
#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    data: Arc<RwLock<HashMap<String, Vec<u8>>>>,
}

impl MemoryBlobStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, bytes: Vec<u8>) -> BlobResult<()> {
        self.data.write().await.insert(key.to_string(), bytes);
        Ok(())
    }

    async fn get(&self, key: &str) -> BlobResult<Option<Vec<u8>>> {
        Ok(self.data.read().await.get(key).cloned())
    }

    async fn list(&self, prefix: &str) -> BlobResult<Vec<String>> {
        Ok(self
            .data
            .read()
            .await
            .keys()
            .filter(|k| k.starts_with(prefix))
            .cloned()
            .collect())
    }

    async fn delete(&self, key: &str) -> BlobResult<()> {
        self.data.write().await.remove(key);
        Ok(())
    }
}
