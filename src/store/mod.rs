//! Blob storage for compressed covers
//!
//! Covers are stored under `{prefix}/{filename}` on the local filesystem or
//! in any S3-compatible bucket.

pub mod local;
pub mod mock;
pub mod s3;

pub use local::LocalStore;
pub use mock::MemoryStore;
pub use s3::S3Store;

use crate::{Error, Result};
use async_trait::async_trait;

#[async_trait]
pub trait CoverStore: Send + Sync {
    async fn put(&self, key: &str, data: &[u8], content_type: &str) -> Result<()>;
    /// Removing a missing object is not an error.
    async fn delete(&self, key: &str) -> Result<()>;
    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Reject keys that could escape the store root.
pub fn check_key(key: &str) -> Result<()> {
    let invalid = key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|segment| segment.is_empty() || segment == "." || segment == "..");
    if invalid {
        return Err(Error::Storage(format!("Invalid storage key: '{}'", key)));
    }
    Ok(())
}
