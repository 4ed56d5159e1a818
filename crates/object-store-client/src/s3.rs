//! S3-compatible object store over HTTP

use crate::error::{ObjectStoreError, Result};
use crate::sigv4::{self, CanonicalRequest, Credentials, EMPTY_PAYLOAD_SHA256};
use crate::store::{ObjectStore, ObjectStream};
use async_trait::async_trait;
use bytes::Bytes;
use chrono::Utc;
use futures::{StreamExt, TryStreamExt};
use reqwest::{Method, StatusCode};
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

const SERVICE: &str = "s3";
const CONNECT_TIMEOUT_SECS: u64 = 10;

/// Connection settings for an S3-compatible endpoint
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Base URL, e.g. `https://s3.us-west-1.amazonaws.com` or a MinIO address
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    /// Requests are sent unsigned when absent
    pub credentials: Option<Credentials>,
}

impl S3Config {
    /// Settings for the AWS endpoint of `region`
    pub fn aws(region: &str, bucket: &str, credentials: Option<Credentials>) -> Self {
        Self {
            endpoint: format!("https://s3.{}.amazonaws.com", region),
            region: region.to_string(),
            bucket: bucket.to_string(),
            credentials,
        }
    }
}

/// Path-style S3 client
pub struct S3Client {
    client: reqwest::Client,
    endpoint: Url,
    config: S3Config,
}

impl S3Client {
    pub fn new(config: S3Config) -> Result<Self> {
        let endpoint = Url::parse(config.endpoint.trim_end_matches('/'))?;
        if endpoint.host_str().is_none() {
            return Err(ObjectStoreError::Config(format!(
                "endpoint has no host: {}",
                config.endpoint
            )));
        }

        let client = reqwest::Client::builder()
            .connect_timeout(Duration::from_secs(CONNECT_TIMEOUT_SECS))
            .build()?;

        Ok(Self {
            client,
            endpoint,
            config,
        })
    }

    fn object_path(&self, key: &str) -> String {
        sigv4::uri_encode_path(&format!("/{}/{}", self.config.bucket, key))
    }

    fn bucket_path(&self) -> String {
        sigv4::uri_encode_path(&format!("/{}", self.config.bucket))
    }

    fn host(&self) -> String {
        let host = self.endpoint.host_str().unwrap_or_default();
        match self.endpoint.port() {
            Some(port) => format!("{}:{}", host, port),
            None => host.to_string(),
        }
    }

    /// Build a signed request for an already-encoded path
    fn request(
        &self,
        method: Method,
        path: &str,
        extra_headers: &[(&str, String)],
        body: Option<Bytes>,
    ) -> reqwest::RequestBuilder {
        let now = Utc::now();
        let payload_sha256 = match &body {
            Some(body) => sigv4::sha256_hex(body),
            None => EMPTY_PAYLOAD_SHA256.to_string(),
        };

        let mut headers: Vec<(String, String)> = vec![
            ("host".to_string(), self.host()),
            ("x-amz-content-sha256".to_string(), payload_sha256.clone()),
            ("x-amz-date".to_string(), sigv4::amz_date(now)),
        ];
        headers.extend(
            extra_headers
                .iter()
                .map(|(name, value)| (name.to_string(), value.clone())),
        );

        let url = format!("{}{}", self.endpoint.as_str().trim_end_matches('/'), path);
        let mut builder = self.client.request(method.clone(), url);

        if let Some(credentials) = &self.config.credentials {
            let canonical = CanonicalRequest {
                method: method.as_str(),
                path,
                query: &[],
                headers: &headers,
                payload_sha256: &payload_sha256,
            };
            let auth =
                sigv4::authorization(&canonical, credentials, &self.config.region, SERVICE, now);
            builder = builder.header(reqwest::header::AUTHORIZATION, auth);
        }

        // reqwest derives Host from the URL itself
        for (name, value) in headers.iter().filter(|(name, _)| name != "host") {
            builder = builder.header(name.as_str(), value.as_str());
        }

        match body {
            Some(body) => builder.body(body),
            None => builder,
        }
    }

    async fn status_error(response: reqwest::Response) -> ObjectStoreError {
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        let message = error_message(&body).unwrap_or_else(|| {
            StatusCode::from_u16(status)
                .ok()
                .and_then(|s| s.canonical_reason())
                .unwrap_or("unknown error")
                .to_string()
        });
        ObjectStoreError::Status { status, message }
    }
}

#[async_trait]
impl ObjectStore for S3Client {
    fn bucket(&self) -> &str {
        &self.config.bucket
    }

    async fn get_object(&self, key: &str) -> Result<ObjectStream> {
        debug!(bucket = %self.config.bucket, key, "GetObject");
        let response = self
            .request(Method::GET, &self.object_path(key), &[], None)
            .send()
            .await?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(ObjectStoreError::NotFound(key.to_string()));
        }
        if !response.status().is_success() {
            let err = Self::status_error(response).await;
            warn!(key, error = %err, "GetObject failed");
            return Err(err);
        }

        Ok(response
            .bytes_stream()
            .map_err(ObjectStoreError::from)
            .boxed())
    }

    async fn put_object(&self, key: &str, body: Bytes) -> Result<()> {
        debug!(bucket = %self.config.bucket, key, size = body.len(), "PutObject");
        let response = self
            .request(Method::PUT, &self.object_path(key), &[], Some(body))
            .send()
            .await?;

        if !response.status().is_success() {
            let err = Self::status_error(response).await;
            warn!(key, error = %err, "PutObject failed");
            return Err(err);
        }
        Ok(())
    }

    async fn list_buckets(&self) -> Result<Vec<String>> {
        let response = self.request(Method::GET, "/", &[], None).send().await?;
        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        let body = response.text().await?;
        Ok(xml_elements(&body, "Name"))
    }

    async fn create_bucket(&self, region: &str) -> Result<()> {
        // us-east-1 is the default location and must not be named explicitly
        let body = (region != "us-east-1").then(|| {
            Bytes::from(format!(
                "<CreateBucketConfiguration xmlns=\"http://s3.amazonaws.com/doc/2006-03-01/\">\
                 <LocationConstraint>{}</LocationConstraint>\
                 </CreateBucketConfiguration>",
                region
            ))
        });

        let response = self
            .request(
                Method::PUT,
                &self.bucket_path(),
                &[("x-amz-acl", "bucket-owner-full-control".to_string())],
                body,
            )
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(Self::status_error(response).await);
        }
        Ok(())
    }
}

/// Text content of every `<tag>` element in an XML document
fn xml_elements(xml: &str, tag: &str) -> Vec<String> {
    let open = format!("<{}>", tag);
    let close = format!("</{}>", tag);
    let mut values = Vec::new();
    let mut rest = xml;

    while let Some(start) = rest.find(&open) {
        rest = &rest[start + open.len()..];
        let Some(end) = rest.find(&close) else {
            break;
        };
        values.push(xml_unescape(&rest[..end]));
        rest = &rest[end + close.len()..];
    }
    values
}

fn xml_unescape(text: &str) -> String {
    text.replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}

/// `Code: Message` from an S3 XML error body
fn error_message(body: &str) -> Option<String> {
    let code = xml_elements(body, "Code").into_iter().next()?;
    match xml_elements(body, "Message").into_iter().next() {
        Some(message) => Some(format!("{}: {}", code, message)),
        None => Some(code),
    }
}
