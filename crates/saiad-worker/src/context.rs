//! Shared dependencies of the stage pipeline, and the per-job run state.

use std::future::Future;
use std::path::PathBuf;
use std::sync::Arc;

use saiad_adapters::{derive_idempotency_key, AdapterConfig, AdapterRegistry, CallOptions};
use saiad_media::{Compositor, FfmpegRenderer, RenderOutput};
use saiad_models::{GenerationConfig, GenerationJob, JobId, StageName, Storyboard, VideoArtifact};
use saiad_queue::JobTracker;
use saiad_storage::ArtifactKeys;
use tracing::warn;

use crate::assets::AssetPersister;
use crate::config::{PipelineConfig, WorkerConfig};
use crate::error::{WorkerError, WorkerResult};
use crate::logging::JobLogger;
use crate::retry::{retry_async, RetryConfig, RetryResult};

/// Everything a stage needs besides the job itself. Shared by all jobs.
pub struct PipelineContext {
    pub tracker: JobTracker,
    pub adapters: AdapterRegistry,
    pub assets: AssetPersister,
    pub compositor: Compositor,
    pub config: PipelineConfig,
    /// Parent of the per-job scratch directories
    pub work_root: PathBuf,
}

impl PipelineContext {
    /// Vendors, storage and renderer as configured by the environment.
    pub async fn from_env(tracker: JobTracker, worker: &WorkerConfig) -> WorkerResult<Self> {
        let adapters = AdapterRegistry::from_config(&AdapterConfig::from_env())
            .map_err(|e| WorkerError::config_error(e.to_string()))?;
        let store = saiad_storage::store_from_env().await?;
        let renderer = FfmpegRenderer::new().with_timeout(worker.render_timeout.as_secs());
        let compositor = Compositor::new(Arc::new(renderer)).with_font_file(worker.font_file.clone());

        let config = PipelineConfig::from_env();

        Ok(Self {
            tracker,
            adapters,
            assets: AssetPersister::new(store)?.with_max_download_bytes(config.max_download_bytes),
            compositor,
            config,
            work_root: worker.work_dir.clone(),
        })
    }

    /// Options for one logical adapter call. The key stays the same across
    /// retries so vendors can deduplicate.
    pub fn call_options(&self, job_id: &JobId, stage: StageName, scope: &str) -> CallOptions {
        CallOptions::new(
            derive_idempotency_key(&[job_id.as_str(), stage.as_str(), scope]),
            self.config.stage_timeout(stage),
        )
    }

    /// Run `operation`, retrying transient failures with backoff.
    pub async fn with_retry<T, F, Fut>(&self, operation: &str, f: F) -> WorkerResult<T>
    where
        F: Fn() -> Fut,
        Fut: Future<Output = WorkerResult<T>>,
    {
        let config = RetryConfig::for_pipeline(&self.config, operation);
        match retry_async(&config, |e: &WorkerError| e.is_retryable(), f).await {
            RetryResult::Success(value) => Ok(value),
            RetryResult::Failed { error, attempts } => {
                warn!(operation, attempts, error = %error, "Giving up on call");
                Err(error)
            }
        }
    }
}

/// Mutable state of one job while the orchestrator drives it.
pub struct JobRun {
    pub job_id: JobId,
    pub config: GenerationConfig,
    /// Working copy, replaced once a stage's completion is recorded
    pub storyboard: Storyboard,
    pub keys: ArtifactKeys,
    pub work_dir: PathBuf,
    pub logger: JobLogger,
    pub current_stage: Option<StageName>,
    /// Silent composite, kept on local disk for the audio stage
    pub composite: Option<RenderOutput>,
    /// Set by the audio stage once the master and its exports are stored
    pub artifact: Option<VideoArtifact>,
}

impl JobRun {
    pub fn new(job: &GenerationJob, work_root: &std::path::Path) -> Self {
        Self {
            job_id: job.id.clone(),
            config: job.config.clone(),
            storyboard: job.storyboard.clone(),
            keys: ArtifactKeys::new(job.id.as_str()),
            work_dir: work_root.join(job.id.as_str()),
            logger: JobLogger::new(&job.id, "generate_video"),
            current_stage: None,
            composite: None,
            artifact: None,
        }
    }
}
