//! Storage backend selection.

use std::path::PathBuf;

use crate::error::{StorageError, StorageResult};

/// Which artifact backend to run against.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StorageBackend {
    S3,
    Local,
}

impl StorageBackend {
    pub fn from_env() -> StorageResult<Self> {
        match std::env::var("ARTIFACT_BACKEND")
            .unwrap_or_else(|_| "local".to_string())
            .to_lowercase()
            .as_str()
        {
            "s3" | "r2" => Ok(Self::S3),
            "local" | "fs" => Ok(Self::Local),
            other => Err(StorageError::config_error(format!(
                "Unknown ARTIFACT_BACKEND '{}'",
                other
            ))),
        }
    }
}

/// Configuration for an S3-compatible bucket.
#[derive(Debug, Clone)]
pub struct S3Config {
    /// Custom endpoint (R2, MinIO); AWS default when unset
    pub endpoint_url: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
    pub bucket_name: String,
    pub region: String,
}

impl S3Config {
    /// Create config from environment variables.
    pub fn from_env() -> StorageResult<Self> {
        Ok(Self {
            endpoint_url: std::env::var("S3_ENDPOINT_URL").ok().filter(|v| !v.is_empty()),
            access_key_id: std::env::var("S3_ACCESS_KEY_ID")
                .map_err(|_| StorageError::config_error("S3_ACCESS_KEY_ID not set"))?,
            secret_access_key: std::env::var("S3_SECRET_ACCESS_KEY")
                .map_err(|_| StorageError::config_error("S3_SECRET_ACCESS_KEY not set"))?,
            bucket_name: std::env::var("S3_BUCKET")
                .map_err(|_| StorageError::config_error("S3_BUCKET not set"))?,
            region: std::env::var("S3_REGION").unwrap_or_else(|_| "auto".to_string()),
        })
    }
}

/// Configuration for the filesystem store.
#[derive(Debug, Clone)]
pub struct LocalStoreConfig {
    pub root: PathBuf,
    /// Base URL a static file server exposes `root` under, if any
    pub public_base_url: Option<String>,
}

impl Default for LocalStoreConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("./artifacts"),
            public_base_url: None,
        }
    }
}

impl LocalStoreConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            root: std::env::var("ARTIFACT_ROOT").map(PathBuf::from).unwrap_or(d.root),
            public_base_url: std::env::var("ARTIFACT_PUBLIC_BASE_URL")
                .ok()
                .filter(|v| !v.is_empty()),
        }
    }
}
