//! Artifact storage for generated media.
//!
//! This crate provides:
//! - The [`ArtifactStore`] trait the pipeline persists every asset through
//! - An S3-compatible implementation (AWS S3, R2, MinIO)
//! - A local filesystem implementation
//! - The per-job object key layout

pub mod config;
pub mod error;
pub mod keys;
pub mod local;
pub mod s3;
pub mod store;

pub use config::{LocalStoreConfig, S3Config, StorageBackend};
pub use error::{StorageError, StorageResult};
pub use keys::{extension_for, ArtifactKeys, UPLOADS_PREFIX};
pub use local::LocalArtifactStore;
pub use s3::S3ArtifactStore;
pub use store::{store_from_env, ArtifactStore};
