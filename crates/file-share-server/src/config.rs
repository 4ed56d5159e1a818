use object_store_client::{Credentials, S3Config};
use std::env;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::{FileShareError, Result};

/// Where uploaded objects live
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    S3,
    /// Process-local store for development
    Memory,
}

/// Service configuration parsed from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub cache_dir: PathBuf,
    pub cache_idle_timeout: Duration,
    pub bucket: String,
    pub region: String,
    /// Custom S3-compatible endpoint; AWS when absent
    pub endpoint: Option<String>,
    pub credentials: Option<Credentials>,
    pub store_backend: StoreBackend,
    pub max_upload_bytes: usize,
    pub shutdown_grace: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            port: 8080,
            cache_dir: env::temp_dir().join("file-share-cache"),
            cache_idle_timeout: Duration::from_secs(60 * 60),
            bucket: "video.player".to_string(),
            region: "us-west-1".to_string(),
            endpoint: None,
            credentials: None,
            store_backend: StoreBackend::S3,
            max_upload_bytes: 256 * 1024 * 1024,
            shutdown_grace: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Parse configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Parse configuration from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let port = parse_or(&lookup, "PORT", defaults.port)?;

        let cache_dir = lookup("CACHE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.cache_dir);

        let cache_idle_timeout = lookup("CACHE_IDLE_SECS")
            .map(|v| parse("CACHE_IDLE_SECS", &v).map(Duration::from_secs))
            .transpose()?
            .unwrap_or(defaults.cache_idle_timeout);

        let bucket = lookup("S3_BUCKET").unwrap_or(defaults.bucket);
        let region = lookup("S3_REGION").unwrap_or(defaults.region);
        let endpoint = lookup("S3_ENDPOINT").filter(|v| !v.is_empty());

        let credentials = match (lookup("AWS_ACCESS_KEY_ID"), lookup("AWS_SECRET_ACCESS_KEY")) {
            (Some(access_key_id), Some(secret_access_key)) => Some(Credentials {
                access_key_id,
                secret_access_key,
            }),
            (None, None) => None,
            _ => {
                return Err(FileShareError::Config(
                    "AWS_ACCESS_KEY_ID and AWS_SECRET_ACCESS_KEY must be set together".into(),
                ))
            }
        };

        let store_backend = match lookup("STORE_BACKEND").as_deref() {
            None | Some("s3") => StoreBackend::S3,
            Some("memory") => StoreBackend::Memory,
            Some(other) => {
                return Err(FileShareError::Config(format!(
                    "unknown STORE_BACKEND {:?}, expected \"s3\" or \"memory\"",
                    other
                )))
            }
        };

        let max_upload_bytes = parse_or(&lookup, "MAX_UPLOAD_BYTES", defaults.max_upload_bytes)?;

        let shutdown_grace = lookup("SHUTDOWN_GRACE_SECS")
            .map(|v| parse("SHUTDOWN_GRACE_SECS", &v).map(Duration::from_secs))
            .transpose()?
            .unwrap_or(defaults.shutdown_grace);

        Ok(Self {
            port,
            cache_dir,
            cache_idle_timeout,
            bucket,
            region,
            endpoint,
            credentials,
            store_backend,
            max_upload_bytes,
            shutdown_grace,
        })
    }

    /// Connection settings for the S3 backend
    pub fn s3_config(&self) -> S3Config {
        let mut config = S3Config::aws(&self.region, &self.bucket, self.credentials.clone());
        if let Some(endpoint) = &self.endpoint {
            config.endpoint = endpoint.clone();
        }
        config
    }
}

fn parse<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value
        .trim()
        .parse()
        .map_err(|_| FileShareError::Config(format!("invalid {}: {:?}", name, value)))
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &str,
    default: T,
) -> Result<T> {
    match lookup(name) {
        Some(value) => parse(name, &value),
        None => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config_from(vars: &[(&str, &str)]) -> Result<Config> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|name| vars.get(name).cloned())
    }

    #[test]
    fn test_defaults() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.port, 8080);
        assert_eq!(config.bucket, "video.player");
        assert_eq!(config.region, "us-west-1");
        assert_eq!(config.cache_idle_timeout, Duration::from_secs(3600));
        assert_eq!(config.shutdown_grace, Duration::from_secs(60));
        assert_eq!(config.store_backend, StoreBackend::S3);
        assert!(config.credentials.is_none());
        assert_eq!(
            config.s3_config().endpoint,
            "https://s3.us-west-1.amazonaws.com"
        );
    }

    #[test]
    fn test_overrides() {
        let config = config_from(&[
            ("PORT", "9000"),
            ("CACHE_DIR", "/var/cache/share"),
            ("CACHE_IDLE_SECS", "120"),
            ("S3_ENDPOINT", "http://localhost:9000"),
            ("AWS_ACCESS_KEY_ID", "minio"),
            ("AWS_SECRET_ACCESS_KEY", "minio123"),
            ("STORE_BACKEND", "memory"),
        ])
        .unwrap();

        assert_eq!(config.port, 9000);
        assert_eq!(config.cache_dir, PathBuf::from("/var/cache/share"));
        assert_eq!(config.cache_idle_timeout, Duration::from_secs(120));
        assert_eq!(config.store_backend, StoreBackend::Memory);
        assert_eq!(config.s3_config().endpoint, "http://localhost:9000");
        assert_eq!(
            config.credentials.unwrap().access_key_id,
            "minio".to_string()
        );
    }

    #[test]
    fn test_invalid_values() {
        assert!(config_from(&[("PORT", "eighty")]).is_err());
        assert!(config_from(&[("CACHE_IDLE_SECS", "-1")]).is_err());
        assert!(config_from(&[("STORE_BACKEND", "ftp")]).is_err());
        assert!(config_from(&[("AWS_ACCESS_KEY_ID", "only-half")]).is_err());
    }
}
