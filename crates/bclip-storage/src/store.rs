//! Blob store interface.

use std::path::Path;

use async_trait::async_trait;

use crate::error::StorageResult;

/// Opaque object store addressed by bucket and key.
///
/// Implementations must be safe for concurrent use by several workers.
#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Upload a local file.
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<()>;

    /// Download an object into a local file, creating parent directories.
    async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()>;

    /// Public URL clients use to fetch the object.
    fn public_url(&self, bucket: &str, key: &str) -> String;

    /// Delete an object. Deleting a missing object is not an error.
    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()>;
}
