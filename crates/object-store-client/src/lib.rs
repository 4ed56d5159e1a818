//! Object store client
//!
//! The narrow object-store capability set used by the file-share service:
//! get and put objects by key, plus the bucket bootstrap performed once at
//! startup. Ships an S3-compatible HTTP client signed with AWS Signature V4
//! and an in-memory store for tests and local runs.

pub mod error;
pub mod memory;
pub mod s3;
pub mod sigv4;
pub mod store;

pub use error::{ObjectStoreError, Result};
pub use memory::MemoryObjectStore;
pub use s3::{S3Client, S3Config};
pub use sigv4::Credentials;
pub use store::{ensure_bucket, ObjectStore, ObjectStream};
