//! The object store capability set

use crate::error::Result;
use async_trait::async_trait;
use bytes::Bytes;
use futures::stream::BoxStream;
use tracing::info;

/// Streamed object body
pub type ObjectStream = BoxStream<'static, Result<Bytes>>;

/// A bucket-scoped remote object store
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Name of the bucket every object operation targets
    fn bucket(&self) -> &str;

    /// Fetch the full content of an object as a byte stream
    async fn get_object(&self, key: &str) -> Result<ObjectStream>;

    /// Store an object, replacing any previous content under the same key
    async fn put_object(&self, key: &str, body: Bytes) -> Result<()>;

    /// Names of all buckets visible to the caller
    async fn list_buckets(&self) -> Result<Vec<String>>;

    /// Create the configured bucket in `region`
    async fn create_bucket(&self, region: &str) -> Result<()>;
}

/// Make sure the store's bucket exists, creating it when missing.
///
/// Returns `true` when the bucket had to be created.
pub async fn ensure_bucket(store: &dyn ObjectStore, region: &str) -> Result<bool> {
    let buckets = store.list_buckets().await?;
    if buckets.iter().any(|name| name == store.bucket()) {
        return Ok(false);
    }

    store.create_bucket(region).await?;
    info!(bucket = store.bucket(), region, "Created bucket");
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::MemoryObjectStore;

    #[tokio::test]
    async fn test_ensure_bucket_creates_missing_bucket() {
        let store = MemoryObjectStore::without_bucket("video.player");

        assert!(ensure_bucket(&store, "us-west-1").await.unwrap());
        assert_eq!(store.list_buckets().await.unwrap(), vec!["video.player"]);
    }

    #[tokio::test]
    async fn test_ensure_bucket_keeps_existing_bucket() {
        let store = MemoryObjectStore::new("video.player");

        assert!(!ensure_bucket(&store, "us-west-1").await.unwrap());
        assert_eq!(store.list_buckets().await.unwrap().len(), 1);
    }
}
