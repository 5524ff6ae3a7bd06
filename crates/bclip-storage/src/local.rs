//! Filesystem-backed blob store for development and tests.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::error::{StorageError, StorageResult};
use crate::store::BlobStore;

/// Stores objects under `<root>/<bucket>/<key>`.
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
    public_base_url: String,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let public_base_url = format!("file://{}", root.display());
        Self {
            root,
            public_base_url,
        }
    }

    /// Serve public URLs from a different origin (e.g. a static file server).
    pub fn with_public_base_url(mut self, base: impl Into<String>) -> Self {
        self.public_base_url = base.into();
        self
    }

    /// Create from `LOCAL_STORAGE_ROOT` (default `./data/blobs`).
    pub fn from_env() -> Self {
        let root = std::env::var("LOCAL_STORAGE_ROOT").unwrap_or_else(|_| "./data/blobs".into());
        let store = Self::new(root);
        match std::env::var("LOCAL_STORAGE_PUBLIC_URL") {
            Ok(base) => store.with_public_base_url(base),
            Err(_) => store,
        }
    }

    /// Filesystem path of an object.
    pub fn object_path(&self, bucket: &str, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes || bucket.is_empty() || bucket.contains('/') {
            return Err(StorageError::InvalidKey(format!("{}/{}", bucket, key)));
        }
        Ok(self.root.join(bucket).join(relative))
    }

    pub async fn exists(&self, bucket: &str, key: &str) -> bool {
        match self.object_path(bucket, key) {
            Ok(path) => tokio::fs::try_exists(path).await.unwrap_or(false),
            Err(_) => false,
        }
    }
}

#[async_trait]
impl BlobStore for LocalBlobStore {
    async fn upload_file(
        &self,
        bucket: &str,
        key: &str,
        path: &Path,
        _content_type: &str,
    ) -> StorageResult<()> {
        let target = self.object_path(bucket, key)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(path, &target)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", path.display(), e)))?;
        debug!("Stored {} at {}", path.display(), target.display());
        Ok(())
    }

    async fn download_file(&self, bucket: &str, key: &str, path: &Path) -> StorageResult<()> {
        let source = self.object_path(bucket, key)?;
        if !tokio::fs::try_exists(&source).await? {
            return Err(StorageError::not_found(key));
        }
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::copy(&source, path)
            .await
            .map_err(|e| StorageError::download_failed(e.to_string()))?;
        Ok(())
    }

    fn public_url(&self, bucket: &str, key: &str) -> String {
        format!("{}/{}/{}", self.public_base_url.trim_end_matches('/'), bucket, key)
    }

    async fn delete(&self, bucket: &str, key: &str) -> StorageResult<()> {
        let target = self.object_path(bucket, key)?;
        match tokio::fs::remove_file(&target).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(e.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_upload_download_delete() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path().join("blobs"));

        let src = dir.path().join("clip.mp4");
        tokio::fs::write(&src, b"video bytes").await.unwrap();

        store
            .upload_file("processed", "processed/42_final_noaudio.mp4", &src, "video/mp4")
            .await
            .unwrap();
        assert!(store.exists("processed", "processed/42_final_noaudio.mp4").await);

        let dst = dir.path().join("work").join("copy.mp4");
        store
            .download_file("processed", "processed/42_final_noaudio.mp4", &dst)
            .await
            .unwrap();
        assert_eq!(tokio::fs::read(&dst).await.unwrap(), b"video bytes");

        store
            .delete("processed", "processed/42_final_noaudio.mp4")
            .await
            .unwrap();
        assert!(!store.exists("processed", "processed/42_final_noaudio.mp4").await);

        // Deleting again is fine.
        store
            .delete("processed", "processed/42_final_noaudio.mp4")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_missing_object() {
        let dir = TempDir::new().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let err = store
            .download_file("uploads", "nope.mp4", &dir.path().join("x.mp4"))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[test]
    fn test_rejects_escaping_keys() {
        let store = LocalBlobStore::new("/srv/blobs");
        assert!(store.object_path("uploads", "../etc/passwd").is_err());
        assert!(store.object_path("uploads", "/abs").is_err());
        assert!(store.object_path("a/b", "k").is_err());
        assert!(store.object_path("uploads", "").is_err());
    }

    #[test]
    fn test_public_url() {
        let store = LocalBlobStore::new("/srv/blobs").with_public_base_url("http://localhost:8080/");
        assert_eq!(
            store.public_url("processed", "processed/1_thumb.jpg"),
            "http://localhost:8080/processed/processed/1_thumb.jpg"
        );
    }
}
