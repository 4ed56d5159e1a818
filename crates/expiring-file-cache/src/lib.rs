//! Disk cache for remote objects with sliding idle expiration
//!
//! [`ExpiringFileCache`] hands out local file paths for objects held in a
//! remote [`ObjectStore`](object_store_client::ObjectStore). The first request
//! for a key downloads the object into the cache root; every later request
//! restarts the entry's idle timer. Entries nobody asked for during a full
//! idle timeout are deleted from disk in the background.

mod cache;
mod error;
mod key;
mod types;

pub use cache::{CacheBuilder, CleanupHook, ExpiringFileCache, DEFAULT_IDLE_TIMEOUT};
pub use error::{CacheError, Result};
pub use key::validate_key;
pub use types::{CacheEntry, CacheStats, CleanupFailure};
