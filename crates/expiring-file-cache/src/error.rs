//! Error types for the expiring file cache

use std::fmt;
use std::path::PathBuf;

/// Errors returned by cache operations.
///
/// The variants carry rendered causes rather than source errors so that a
/// single download failure can be handed to every caller waiting on it.
#[derive(Debug, Clone)]
pub enum CacheError {
    /// The cache root could not be created
    Initialization { root: PathBuf, reason: String },
    /// The key cannot be used as a cache file name
    InvalidKey { key: String, reason: String },
    /// The remote store has no object under the key
    NotFound(String),
    /// The remote object could not be retrieved
    Fetch { key: String, reason: String },
    /// The object could not be written to the cache root
    Write { key: String, reason: String },
    /// The cache root could not be removed during teardown
    Cleanup { root: PathBuf, reason: String },
    /// The cache has been torn down
    Closed,
}

impl fmt::Display for CacheError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CacheError::Initialization { root, reason } => {
                write!(f, "Cannot create cache root {}: {}", root.display(), reason)
            }
            CacheError::InvalidKey { key, reason } => {
                write!(f, "Invalid cache key {:?}: {}", key, reason)
            }
            CacheError::NotFound(key) => write!(f, "Object {} not found", key),
            CacheError::Fetch { key, reason } => write!(f, "Fetch of {} failed: {}", key, reason),
            CacheError::Write { key, reason } => write!(f, "Write of {} failed: {}", key, reason),
            CacheError::Cleanup { root, reason } => {
                write!(f, "Cannot remove cache root {}: {}", root.display(), reason)
            }
            CacheError::Closed => write!(f, "Cache is closed"),
        }
    }
}

impl std::error::Error for CacheError {}

impl CacheError {
    /// Whether the remote side failed to deliver the object
    pub fn is_fetch(&self) -> bool {
        matches!(self, CacheError::Fetch { .. } | CacheError::NotFound(_))
    }

    pub(crate) fn fetch(key: &str, err: object_store_client::ObjectStoreError) -> Self {
        if err.is_not_found() {
            return CacheError::NotFound(key.to_string());
        }
        CacheError::Fetch {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }

    pub(crate) fn write(key: &str, err: std::io::Error) -> Self {
        CacheError::Write {
            key: key.to_string(),
            reason: err.to_string(),
        }
    }
}

pub type Result<T> = std::result::Result<T, CacheError>;

#[cfg(test)]
mod tests {
    use super::*;
    use object_store_client::ObjectStoreError;

    #[test]
    fn test_fetch_error_display() {
        let err = CacheError::fetch(
            "clip",
            ObjectStoreError::Status {
                status: 503,
                message: "SlowDown: Please reduce your request rate.".to_string(),
            },
        );
        assert_eq!(
            format!("{}", err),
            "Fetch of clip failed: Object store returned status 503: SlowDown: Please reduce your request rate."
        );
        assert!(err.is_fetch());
    }

    #[test]
    fn test_missing_object_maps_to_not_found() {
        let err = CacheError::fetch("clip", ObjectStoreError::NotFound("clip".to_string()));
        assert!(matches!(err, CacheError::NotFound(ref k) if k == "clip"));
        assert!(err.is_fetch());
    }

    #[test]
    fn test_write_error_is_not_fetch() {
        let err = CacheError::write("clip", std::io::Error::other("No space left on device"));
        assert_eq!(format!("{}", err), "Write of clip failed: No space left on device");
        assert!(!err.is_fetch());
    }

    #[test]
    fn test_closed_display() {
        assert_eq!(format!("{}", CacheError::Closed), "Cache is closed");
    }
}
