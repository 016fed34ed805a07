//! The artifact store seam.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use saiad_models::ArtifactRef;
use tracing::info;

use crate::config::{LocalStoreConfig, S3Config, StorageBackend};
use crate::error::StorageResult;
use crate::local::LocalArtifactStore;
use crate::s3::S3ArtifactStore;

/// Durable storage for generated media. Records only ever hold the
/// returned [`ArtifactRef`], never bytes.
#[async_trait]
pub trait ArtifactStore: Send + Sync {
    /// Backend name for logs.
    fn backend(&self) -> &'static str;

    async fn put_bytes(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> StorageResult<ArtifactRef>;

    async fn put_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> StorageResult<ArtifactRef>;

    async fn get_bytes(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Download an object to a local file, creating parent directories.
    async fn fetch_to_file(&self, key: &str, path: &Path) -> StorageResult<()> {
        let bytes = self.get_bytes(key).await?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        tokio::fs::write(path, bytes).await?;
        Ok(())
    }

    async fn exists(&self, key: &str) -> StorageResult<bool>;

    /// Time-limited URL for downloading an object.
    async fn presign_get(&self, key: &str, expires_in: Duration) -> StorageResult<String>;

    async fn delete(&self, key: &str) -> StorageResult<()>;

    async fn check_connectivity(&self) -> StorageResult<()>;
}

/// Build the store selected by `ARTIFACT_BACKEND`.
pub async fn store_from_env() -> StorageResult<Arc<dyn ArtifactStore>> {
    match StorageBackend::from_env()? {
        StorageBackend::S3 => {
            let store = S3ArtifactStore::new(S3Config::from_env()?).await?;
            info!(bucket = %store.bucket(), "Using S3 artifact store");
            Ok(Arc::new(store))
        }
        StorageBackend::Local => {
            let config = LocalStoreConfig::from_env();
            info!(root = %config.root.display(), "Using local artifact store");
            Ok(Arc::new(LocalArtifactStore::new(config).await?))
        }
    }
}
