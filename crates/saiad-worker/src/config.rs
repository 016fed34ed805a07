//! Worker configuration.

use std::path::PathBuf;
use std::time::Duration;

use saiad_models::StageName;

fn env_or<T: std::str::FromStr>(name: &str, default: T) -> T {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .unwrap_or(default)
}

/// Worker process configuration.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Global admission limit: jobs running at once in this process
    pub max_concurrent_jobs: usize,
    /// Scratch space for renders; one subdirectory per job
    pub work_dir: PathBuf,
    /// Graceful shutdown timeout
    pub shutdown_timeout: Duration,
    /// How often to claim messages abandoned by dead consumers
    pub claim_interval: Duration,
    /// Non-terminal jobs idle this long are failed by the sweeper
    pub stale_threshold: Duration,
    /// Terminal jobs older than this are purged from the store
    pub retention: Duration,
    /// How often the sweeper runs
    pub sweep_interval: Duration,
    /// Prometheus exporter port; disabled when unset
    pub metrics_port: Option<u16>,
    /// Font for burned-in overlays; fontconfig default when unset
    pub font_file: Option<PathBuf>,
    /// Kill a single FFmpeg invocation after this long
    pub render_timeout: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            max_concurrent_jobs: 2,
            work_dir: PathBuf::from("/tmp/saiad"),
            shutdown_timeout: Duration::from_secs(60),
            claim_interval: Duration::from_secs(30),
            stale_threshold: Duration::from_secs(30 * 60),
            retention: Duration::from_secs(7 * 24 * 3600),
            sweep_interval: Duration::from_secs(60),
            metrics_port: None,
            font_file: None,
            render_timeout: Duration::from_secs(600),
        }
    }
}

impl WorkerConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let defaults = Self::default();
        Self {
            max_concurrent_jobs: env_or("WORKER_MAX_JOBS", defaults.max_concurrent_jobs).max(1),
            work_dir: std::env::var("WORKER_WORK_DIR")
                .map(PathBuf::from)
                .unwrap_or(defaults.work_dir),
            shutdown_timeout: Duration::from_secs(env_or(
                "WORKER_SHUTDOWN_TIMEOUT",
                defaults.shutdown_timeout.as_secs(),
            )),
            claim_interval: Duration::from_secs(env_or(
                "WORKER_CLAIM_INTERVAL",
                defaults.claim_interval.as_secs(),
            )),
            stale_threshold: Duration::from_secs(env_or(
                "WORKER_STALE_THRESHOLD",
                defaults.stale_threshold.as_secs(),
            )),
            retention: Duration::from_secs(
                env_or("JOB_RETENTION_DAYS", 7u64) * 24 * 3600,
            ),
            sweep_interval: Duration::from_secs(env_or(
                "WORKER_SWEEP_INTERVAL",
                defaults.sweep_interval.as_secs(),
            )),
            metrics_port: std::env::var("WORKER_METRICS_PORT")
                .ok()
                .and_then(|s| s.parse().ok()),
            font_file: std::env::var("OVERLAY_FONT_FILE").ok().map(PathBuf::from),
            render_timeout: Duration::from_secs(env_or(
                "FFMPEG_TIMEOUT_SECS",
                defaults.render_timeout.as_secs(),
            )),
        }
    }
}

/// Retry and time budgets for the stage orchestrator.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Attempts per adapter call and per timed-out stage, first try included
    pub max_attempts: u32,
    pub base_backoff: Duration,
    pub max_backoff: Duration,
    pub script_timeout: Duration,
    pub image_timeout: Duration,
    pub video_timeout: Duration,
    pub compositing_timeout: Duration,
    pub audio_timeout: Duration,
    /// Upper bound on a job's total processing time, across all stages
    pub job_max_lifetime: Duration,
    /// Concurrent adapter calls within one stage's fan-out
    pub max_scene_parallel: usize,
    /// Animate stills into clips; when off, stills are used as-is
    pub animate_scenes: bool,
    /// Lifetime of presigned URLs handed to vendors
    pub presign_ttl: Duration,
    /// Largest remote asset the worker will download
    pub max_download_bytes: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(30),
            script_timeout: Duration::from_secs(120),
            image_timeout: Duration::from_secs(300),
            video_timeout: Duration::from_secs(900),
            compositing_timeout: Duration::from_secs(600),
            audio_timeout: Duration::from_secs(600),
            job_max_lifetime: Duration::from_secs(3600),
            max_scene_parallel: 4,
            animate_scenes: true,
            presign_ttl: Duration::from_secs(3600),
            max_download_bytes: 512 * 1024 * 1024,
        }
    }
}

impl PipelineConfig {
    pub fn from_env() -> Self {
        let d = Self::default();
        let secs = |name: &str, default: Duration| Duration::from_secs(env_or(name, default.as_secs()));
        Self {
            max_attempts: env_or("PIPELINE_MAX_ATTEMPTS", d.max_attempts).max(1),
            base_backoff: Duration::from_millis(env_or(
                "PIPELINE_BASE_BACKOFF_MS",
                d.base_backoff.as_millis() as u64,
            )),
            max_backoff: secs("PIPELINE_MAX_BACKOFF", d.max_backoff),
            script_timeout: secs("PIPELINE_SCRIPT_TIMEOUT", d.script_timeout),
            image_timeout: secs("PIPELINE_IMAGE_TIMEOUT", d.image_timeout),
            video_timeout: secs("PIPELINE_VIDEO_TIMEOUT", d.video_timeout),
            compositing_timeout: secs("PIPELINE_COMPOSITING_TIMEOUT", d.compositing_timeout),
            audio_timeout: secs("PIPELINE_AUDIO_TIMEOUT", d.audio_timeout),
            job_max_lifetime: secs("PIPELINE_JOB_MAX_LIFETIME", d.job_max_lifetime),
            max_scene_parallel: env_or("WORKER_MAX_SCENE_PARALLEL", d.max_scene_parallel).max(1),
            animate_scenes: env_or("PIPELINE_ANIMATE_SCENES", d.animate_scenes),
            presign_ttl: secs("PIPELINE_PRESIGN_TTL", d.presign_ttl),
            max_download_bytes: env_or("PIPELINE_MAX_DOWNLOAD_MB", d.max_download_bytes >> 20) << 20,
        }
    }

    /// Wall-clock budget for one attempt at a stage.
    pub fn stage_timeout(&self, stage: StageName) -> Duration {
        match stage {
            StageName::ScriptProcessing => self.script_timeout,
            StageName::ImageProcessing => self.image_timeout,
            StageName::VideoGeneration => self.video_timeout,
            StageName::VideoCompositing => self.compositing_timeout,
            StageName::AudioMixing => self.audio_timeout,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_defaults() {
        let config = PipelineConfig::default();
        assert_eq!(config.max_attempts, 3);
        assert_eq!(
            config.stage_timeout(StageName::VideoGeneration),
            Duration::from_secs(900)
        );
        assert_eq!(config.job_max_lifetime, Duration::from_secs(3600));
    }

    #[test]
    fn test_worker_defaults() {
        let config = WorkerConfig::default();
        assert_eq!(config.stale_threshold, Duration::from_secs(1800));
        assert_eq!(config.retention, Duration::from_secs(604_800));
    }
}
