//! Wire types for the file-share service

use expiring_file_cache::CacheStats;
use serde::{Deserialize, Serialize};

/// Returned after a successful upload
#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub key: String,
}

/// Health check response
#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: String,
    pub uptime_secs: u64,
    pub cache: CacheStats,
}
