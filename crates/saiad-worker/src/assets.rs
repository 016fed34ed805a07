//! Moving generated media between vendors, artifact storage and local disk.
//!
//! Adapters hand back either a vendor URL or inline bytes. Both are copied
//! into artifact storage before anything is recorded on the job, so job
//! records only hold storage keys.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use saiad_adapters::{AdapterAsset, GeneratedAsset};
use saiad_models::ArtifactRef;
use saiad_storage::ArtifactStore;
use tracing::debug;

use crate::error::{WorkerError, WorkerResult};

const DEFAULT_MAX_DOWNLOAD_BYTES: u64 = 512 * 1024 * 1024;

#[derive(Clone)]
pub struct AssetPersister {
    store: Arc<dyn ArtifactStore>,
    http: reqwest::Client,
    max_download_bytes: u64,
}

impl AssetPersister {
    pub fn new(store: Arc<dyn ArtifactStore>) -> WorkerResult<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(300))
            .build()
            .map_err(|e| WorkerError::config_error(format!("HTTP client: {}", e)))?;
        Ok(Self {
            store,
            http,
            max_download_bytes: DEFAULT_MAX_DOWNLOAD_BYTES,
        })
    }

    pub fn with_max_download_bytes(mut self, limit: u64) -> Self {
        self.max_download_bytes = limit;
        self
    }

    pub fn store(&self) -> &Arc<dyn ArtifactStore> {
        &self.store
    }

    /// Copy an adapter's output into storage under `key`.
    pub async fn persist(&self, key: &str, generated: &GeneratedAsset) -> WorkerResult<ArtifactRef> {
        match &generated.asset {
            AdapterAsset::Inline {
                bytes,
                content_type,
            } => Ok(self.store.put_bytes(key, bytes.clone(), content_type).await?),
            AdapterAsset::Url { url, content_type } => {
                let (bytes, _) = self.download(url).await?;
                Ok(self.store.put_bytes(key, bytes, content_type).await?)
            }
        }
    }

    /// Fetch a remote file, returning its bytes and reported content type.
    ///
    /// The body is read chunk by chunk and abandoned as soon as it passes
    /// the size limit, whatever the server claimed up front.
    pub async fn download(&self, url: &str) -> WorkerResult<(Vec<u8>, Option<String>)> {
        debug!(url, "Downloading asset");
        let mut response = self
            .http
            .get(url)
            .send()
            .await
            .and_then(|r| r.error_for_status())
            .map_err(|e| WorkerError::download_failed(format!("{}: {}", url, e)))?;

        let limit = self.max_download_bytes;
        if let Some(declared) = response.content_length() {
            if declared > limit {
                return Err(too_large(url, limit));
            }
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut body = Vec::new();
        while let Some(chunk) = response
            .chunk()
            .await
            .map_err(|e| WorkerError::download_failed(format!("{}: {}", url, e)))?
        {
            if (body.len() + chunk.len()) as u64 > limit {
                return Err(too_large(url, limit));
            }
            body.extend_from_slice(&chunk);
        }
        Ok((body, content_type))
    }

    /// Copy a stored object to `dir`, keeping its extension.
    pub async fn materialize(&self, key: &str, dir: &Path, stem: &str) -> WorkerResult<PathBuf> {
        let extension = Path::new(key)
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or("bin");
        let path = dir.join(format!("{}.{}", stem, extension));
        self.store.fetch_to_file(key, &path).await?;
        Ok(path)
    }

    pub async fn upload_file(
        &self,
        key: &str,
        path: &Path,
        content_type: &str,
    ) -> WorkerResult<ArtifactRef> {
        Ok(self.store.put_file(key, path, content_type).await?)
    }
}

fn too_large(url: &str, limit: u64) -> WorkerError {
    WorkerError::asset_rejected(format!("{} is larger than {} bytes", url, limit))
}

/// True for references the pipeline must fetch rather than read from storage.
pub fn is_remote(uri: &str) -> bool {
    uri.starts_with("http://") || uri.starts_with("https://")
}

/// Content type guessed from a URL's file extension.
pub fn content_type_from_url(url: &str) -> &'static str {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    match Path::new(path)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase())
        .as_deref()
    {
        Some("jpg") | Some("jpeg") => "image/jpeg",
        Some("webp") => "image/webp",
        Some("mp4") => "video/mp4",
        Some("webm") => "video/webm",
        Some("mp3") => "audio/mpeg",
        Some("wav") => "audio/wav",
        _ => "image/png",
    }
}
