//! Cache types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Snapshot of a live cache entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CacheEntry {
    pub key: String,
    pub path: PathBuf,
    pub size: u64,
    pub fetched_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

/// Statistics about the cache
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub entries: usize,
    pub total_size: u64,
    pub hits: u64,
    pub misses: u64,
    /// Downloads started against the remote store
    pub fetches: u64,
    pub evictions: u64,
}

/// A background deletion that did not succeed
#[derive(Debug, Clone)]
pub struct CleanupFailure {
    pub key: String,
    pub path: PathBuf,
    pub reason: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cache_stats_default() {
        let stats = CacheStats::default();
        assert_eq!(stats.entries, 0);
        assert_eq!(stats.total_size, 0);
        assert_eq!(stats.hits, 0);
        assert_eq!(stats.misses, 0);
        assert_eq!(stats.fetches, 0);
        assert_eq!(stats.evictions, 0);
    }

    #[test]
    fn test_cache_entry_serialization() {
        let now = Utc::now();
        let entry = CacheEntry {
            key: "01J9ZQ4TQF".to_string(),
            path: PathBuf::from("/tmp/cache/01J9ZQ4TQF"),
            size: 12345,
            fetched_at: now,
            expires_at: now + chrono::Duration::hours(1),
        };

        let json = serde_json::to_string(&entry).unwrap();
        assert!(json.contains("01J9ZQ4TQF"));
        assert!(json.contains("12345"));

        let deserialized: CacheEntry = serde_json::from_str(&json).unwrap();
        assert_eq!(deserialized.key, entry.key);
        assert_eq!(deserialized.size, entry.size);
        assert_eq!(deserialized.expires_at, entry.expires_at);
    }
}
