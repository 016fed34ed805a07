//! Filesystem artifact store for development and tests.

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use saiad_models::ArtifactRef;
use tracing::debug;
use url::Url;

use crate::config::LocalStoreConfig;
use crate::error::{StorageError, StorageResult};
use crate::keys::validate_key;
use crate::store::ArtifactStore;

#[derive(Debug, Clone)]
pub struct LocalArtifactStore {
    root: PathBuf,
    public_base_url: Option<String>,
}

impl LocalArtifactStore {
    /// Create the root directory if needed and resolve it to an absolute path.
    pub async fn new(config: LocalStoreConfig) -> StorageResult<Self> {
        tokio::fs::create_dir_all(&config.root).await?;
        let root = tokio::fs::canonicalize(&config.root).await?;
        Ok(Self {
            root,
            public_base_url: config
                .public_base_url
                .map(|u| u.trim_end_matches('/').to_string()),
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_for(&self, key: &str) -> StorageResult<PathBuf> {
        validate_key(key)?;
        Ok(self.root.join(key))
    }

    fn reference(&self, key: &str, path: &Path, content_type: &str, size: u64) -> ArtifactRef {
        let uri = Url::from_file_path(path)
            .map(|u| u.to_string())
            .unwrap_or_else(|_| path.display().to_string());
        ArtifactRef {
            key: key.to_string(),
            uri,
            content_type: content_type.to_string(),
            size_bytes: Some(size),
        }
    }

    async fn ensure_parent(path: &Path) -> StorageResult<()> {
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }
}

#[async_trait]
impl ArtifactStore for LocalArtifactStore {
    fn backend(&self) -> &'static str {
        "local"
    }

    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<ArtifactRef> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path).await?;
        let size = data.len() as u64;
        tokio::fs::write(&path, data)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;
        debug!("Stored {} bytes at {}", size, path.display());
        Ok(self.reference(key, &path, content_type, size))
    }

    async fn put_file(
        &self,
        key: &str,
        source: &Path,
        content_type: &str,
    ) -> StorageResult<ArtifactRef> {
        let path = self.path_for(key)?;
        Self::ensure_parent(&path).await?;
        let size = tokio::fs::copy(source, &path)
            .await
            .map_err(|e| StorageError::upload_failed(format!("{}: {}", key, e)))?;
        Ok(self.reference(key, &path, content_type, size))
    }

    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>> {
        let path = self.path_for(key)?;
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(bytes),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StorageError::not_found(key)),
            Err(e) => Err(StorageError::download_failed(format!("{}: {}", key, e))),
        }
    }

    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_for(key)?;
        Ok(tokio::fs::try_exists(&path).await?)
    }

    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String> {
        let path = self.path_for(key)?;
        if !tokio::fs::try_exists(&path).await? {
            return Err(StorageError::not_found(key));
        }
        match &self.public_base_url {
            Some(base) => {
                let expires = Utc::now().timestamp() + expires_in.as_secs() as i64;
                Ok(format!("{}/{}?expires={}", base, key, expires))
            }
            None => Url::from_file_path(&path)
                .map(|u| u.to_string())
                .map_err(|_| StorageError::PresignFailed(path.display().to_string())),
        }
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_for(key)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(StorageError::delete_failed(format!("{}: {}", key, e))),
        }
    }

    async fn check_connectivity(&self) -> StorageResult<()> {
        tokio::fs::metadata(&self.root).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store(dir: &tempfile::TempDir) -> LocalArtifactStore {
        LocalArtifactStore::new(LocalStoreConfig {
            root: dir.path().join("artifacts"),
            public_base_url: Some("https://media.example.com/".into()),
        })
        .await
        .unwrap()
    }

    #[tokio::test]
    async fn test_put_and_fetch() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;

        let artifact = store
            .put_bytes("jobs/j1/script.json", b"{}".to_vec(), "application/json")
            .await
            .unwrap();
        assert_eq!(artifact.key, "jobs/j1/script.json");
        assert_eq!(artifact.size_bytes, Some(2));
        assert!(artifact.uri.starts_with("file://"));

        let out = dir.path().join("out/script.json");
        store.fetch_to_file("jobs/j1/script.json", &out).await.unwrap();
        assert_eq!(std::fs::read(&out).unwrap(), b"{}");
        assert!(store.exists("jobs/j1/script.json").await.unwrap());
    }

    #[tokio::test]
    async fn test_presign_uses_public_base() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store
            .put_bytes("jobs/j1/master.mp4", vec![0u8; 8], "video/mp4")
            .await
            .unwrap();

        let url = store
            .presign_get("jobs/j1/master.mp4", Duration::from_secs(3600))
            .await
            .unwrap();
        assert!(url.starts_with("https://media.example.com/jobs/j1/master.mp4?expires="));

        let err = store
            .presign_get("jobs/j1/missing.mp4", Duration::from_secs(60))
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::NotFound(_)));
    }

    #[tokio::test]
    async fn test_rejects_escaping_keys() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        let err = store
            .put_bytes("../outside", vec![1], "application/octet-stream")
            .await
            .unwrap_err();
        assert!(matches!(err, StorageError::InvalidKey(_)));
    }

    #[tokio::test]
    async fn test_delete_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let store = store(&dir).await;
        store.put_bytes("jobs/j/x.bin", vec![1], "application/octet-stream").await.unwrap();
        store.delete("jobs/j/x.bin").await.unwrap();
        store.delete("jobs/j/x.bin").await.unwrap();
        assert!(!store.exists("jobs/j/x.bin").await.unwrap());
    }
}
