//! In-memory object store

use crate::error::{ObjectStoreError, Result};
use crate::store::{ObjectStore, ObjectStream};
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::{self, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::debug;

const CHUNK_SIZE: usize = 64 * 1024;

/// Object store that keeps everything in memory.
///
/// Counts `get_object` calls so callers can observe how often the remote
/// side was hit, and can simulate network latency.
pub struct MemoryObjectStore {
    bucket: String,
    buckets: RwLock<Vec<String>>,
    objects: RwLock<HashMap<String, Bytes>>,
    latency: Option<Duration>,
    gets: AtomicU64,
}

impl MemoryObjectStore {
    /// Create a store whose bucket already exists
    pub fn new(bucket: &str) -> Self {
        Self {
            buckets: RwLock::new(vec![bucket.to_string()]),
            ..Self::without_bucket(bucket)
        }
    }

    /// Create a store whose bucket still has to be created
    pub fn without_bucket(bucket: &str) -> Self {
        Self {
            bucket: bucket.to_string(),
            buckets: RwLock::new(Vec::new()),
            objects: RwLock::new(HashMap::new()),
            latency: None,
            gets: AtomicU64::new(0),
        }
    }

    /// Delay every `get_object` by `latency` before returning
    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = Some(latency);
        self
    }

    /// Number of `get_object` calls made so far, including failed ones
    pub fn get_count(&self) -> u64 {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    fn bucket(&self) -> &str {
        &self.bucket
    }

    async fn get_object(&self, key: &str) -> Result<ObjectStream> {
        self.gets.fetch_add(1, Ordering::SeqCst);

        if let Some(latency) = self.latency {
            tokio::time::sleep(latency).await;
        }

        let body = self
            .objects
            .read()
            .await
            .get(key)
            .cloned()
            .ok_or_else(|| ObjectStoreError::NotFound(key.to_string()))?;

        debug!(key, size = body.len(), "Serving object from memory");

        let chunks: Vec<Result<Bytes>> = (0..body.len())
            .step_by(CHUNK_SIZE)
            .map(|start| Ok(body.slice(start..(start + CHUNK_SIZE).min(body.len()))))
            .collect();
        Ok(stream::iter(chunks).boxed())
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<()> {
        debug!(key, size = body.len(), "Storing object in memory");
        self.objects.write().await.insert(key.to_string(), body);
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        Ok(self.buckets.read().await.clone())
    }

    async fn create_bucket(&self, _region: &str) -> Result<()> {
        let mut buckets = self.buckets.write().await;
        if !buckets.contains(&self.bucket) {
            buckets.push(self.bucket.clone());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::TryStreamExt;

    async fn read_all(stream: ObjectStream) -> Vec<u8> {
        let chunks: Vec<Bytes> = stream.try_collect().await.unwrap();
        chunks.concat()
    }

    #[tokio::test]
    async fn test_put_and_get() {
        let store = MemoryObjectStore::new("bucket");
        store
            .put_object("greeting", Bytes::from_static(b"hello"))
            .await
            .unwrap();

        let body = read_all(store.get_object("greeting").await.unwrap()).await;
        assert_eq!(body, b"hello");
        assert_eq!(store.get_count(), 1);
    }

    #[tokio::test]
    async fn test_large_object_is_chunked() {
        let store = MemoryObjectStore::new("bucket");
        let data: Vec<u8> = (0..(CHUNK_SIZE * 2 + 10)).map(|i| (i % 251) as u8).collect();
        store
            .put_object("big", Bytes::from(data.clone()))
            .await
            .unwrap();

        let chunks: Vec<Bytes> = store
            .get_object("big")
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(chunks.len(), 3);
        assert_eq!(chunks.concat(), data);
    }

    #[tokio::test]
    async fn test_missing_object() {
        let store = MemoryObjectStore::new("bucket");

        let result = store.get_object("nope").await;
        assert!(matches!(result, Err(ObjectStoreError::NotFound(ref k)) if k == "nope"));
        assert_eq!(store.get_count(), 1);
    }
}
