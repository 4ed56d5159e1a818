use crate::error::{CacheError, Result};

/// Check that a key can be used verbatim as a file name in the cache root.
///
/// Names starting with a dot are reserved for the cache's own bookkeeping.
pub fn validate_key(key: &str) -> Result<()> {
    let reason = if key.is_empty() {
        "key is empty"
    } else if key.starts_with('.') {
        "key starts with a dot"
    } else if key.contains(['/', '\\', '\0']) {
        "key contains a path separator or NUL byte"
    } else {
        return Ok(());
    };

    Err(CacheError::InvalidKey {
        key: key.to_string(),
        reason: reason.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_generated_identifiers() {
        assert!(validate_key("0192f3a6c1e07c4b9d2e8f0a1b2c3d4e").is_ok());
        assert!(validate_key("01J9ZQ4TQF7X1M2N3P4Q5R6S7T").is_ok());
        assert!(validate_key("movie.mp4").is_ok());
    }

    #[test]
    fn test_rejects_empty_key() {
        let err = validate_key("").unwrap_err();
        assert!(matches!(
            err,
            CacheError::InvalidKey { ref reason, .. } if reason == "key is empty"
        ));
    }

    #[test]
    fn test_rejects_path_traversal() {
        for key in [".", "..", "../etc/passwd", "a/b", "a\\b", "nul\0byte"] {
            assert!(validate_key(key).is_err(), "{:?} should be rejected", key);
        }
    }

    #[test]
    fn test_rejects_reserved_dot_names() {
        for key in [".partial", ".partial-0", ".hidden"] {
            let err = validate_key(key).unwrap_err();
            assert!(matches!(
                err,
                CacheError::InvalidKey { ref reason, .. } if reason == "key starts with a dot"
            ));
        }
        assert!(validate_key("k.partial-0").is_ok());
    }
}
