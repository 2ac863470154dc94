//! Durable artifact storage.
//!
//! `ObjectStorage` is the contract the recording and transcription pipelines
//! depend on: durable puts plus time-limited read URLs. The filesystem
//! implementation keeps artifacts under the data directory; a cloud-backed
//! implementation is a drop-in behind the same trait.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::{debug, info};

/// Outcome of a successful put.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub key: String,
    pub size: u64,
}

#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Store `bytes` under `key`, overwriting any existing object.
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<StoredObject>;

    /// Time-limited read URL for an existing object.
    async fn signed_get_url(&self, key: &str, ttl_seconds: u64) -> Result<String>;
}

/// Filesystem-backed storage rooted at a local directory.
pub struct FsObjectStorage {
    root: PathBuf,
}

impl FsObjectStorage {
    pub fn new(root: PathBuf) -> Self {
        Self { root }
    }

    fn object_path(&self, key: &str) -> PathBuf {
        // Keys are slash-separated; map them onto the directory tree.
        self.root.join(key)
    }
}

#[async_trait]
impl ObjectStorage for FsObjectStorage {
    async fn put(
        &self,
        key: &str,
        bytes: &[u8],
        content_type: &str,
        metadata: HashMap<String, String>,
    ) -> Result<StoredObject> {
        let path = self.object_path(key);
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("Failed to create object directory")?;
        }

        tokio::fs::write(&path, bytes)
            .await
            .with_context(|| format!("Failed to write object {:?}", path))?;

        debug!(
            "Stored object {} ({} bytes, {}, {} metadata entries)",
            key,
            bytes.len(),
            content_type,
            metadata.len()
        );

        Ok(StoredObject {
            key: key.to_string(),
            size: bytes.len() as u64,
        })
    }

    async fn signed_get_url(&self, key: &str, ttl_seconds: u64) -> Result<String> {
        let path = self.object_path(key);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            anyhow::bail!("Object not found: {}", key);
        }

        let expires = Utc::now().timestamp() + ttl_seconds as i64;
        let url = format!("file://{}?expires={}", path.to_string_lossy(), expires);
        info!("Issued signed URL for {} (ttl {}s)", key, ttl_seconds);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_and_sign() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path().to_path_buf());

        let stored = storage
            .put(
                "recordings/2025-06-01/m1/r1.mp4",
                b"fake video bytes",
                "video/mp4",
                HashMap::new(),
            )
            .await
            .unwrap();

        assert_eq!(stored.key, "recordings/2025-06-01/m1/r1.mp4");
        assert_eq!(stored.size, 16);

        let url = storage
            .signed_get_url("recordings/2025-06-01/m1/r1.mp4", 600)
            .await
            .unwrap();
        assert!(url.starts_with("file://"));
        assert!(url.contains("expires="));
    }

    #[tokio::test]
    async fn test_put_overwrites() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path().to_path_buf());

        storage
            .put("transcripts/a.txt", b"first", "text/plain", HashMap::new())
            .await
            .unwrap();
        let stored = storage
            .put("transcripts/a.txt", b"second version", "text/plain", HashMap::new())
            .await
            .unwrap();

        assert_eq!(stored.size, 14);
        let on_disk = tokio::fs::read(dir.path().join("transcripts/a.txt"))
            .await
            .unwrap();
        assert_eq!(on_disk, b"second version");
    }

    #[tokio::test]
    async fn test_sign_missing_object_fails() {
        let dir = TempDir::new().unwrap();
        let storage = FsObjectStorage::new(dir.path().to_path_buf());

        let result = storage.signed_get_url("nope/missing.mp4", 60).await;
        assert!(result.is_err());
    }
}
