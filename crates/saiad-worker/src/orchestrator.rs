//! Stage Orchestrator: drives one job through the five stages.
//!
//! Stages run strictly in order. Each is marked `in_progress`, executed
//! under its own time budget, and marked `completed` with its artifacts
//! and resolved storyboard in one write before the next one starts. The cancel flag is checked between stages.
//! Any stage failure finalizes the job as failed with the stage's error
//! code; reaching the end finalizes it as completed with the master
//! artifact.

use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use saiad_models::{JobId, JobOutcome, JobStatus, StageName, StageUpdate, VideoArtifact};
use tracing::{info, warn, Instrument};

use crate::context::{JobRun, PipelineContext};
use crate::error::{WorkerError, WorkerResult};
use crate::stages::{self, StageOutput};

const STAGE_DURATION_SECONDS: &str = "saiad_stage_duration_seconds";

#[derive(Clone)]
pub struct Orchestrator {
    ctx: Arc<PipelineContext>,
}

impl Orchestrator {
    pub fn new(ctx: PipelineContext) -> Self {
        Self { ctx: Arc::new(ctx) }
    }

    pub fn context(&self) -> &PipelineContext {
        &self.ctx
    }

    /// Process one job from `queued` to a terminal status.
    ///
    /// Jobs that are not `queued` are skipped: only the caller whose
    /// `start` write succeeds owns the job.
    pub async fn run(&self, job_id: &JobId) -> WorkerResult<()> {
        let tracker = &self.ctx.tracker;
        let Some(job) = tracker.get_status(job_id).await? else {
            warn!(job_id = %job_id, "Job not found, dropping");
            return Ok(());
        };
        if job.status != JobStatus::Queued {
            info!(job_id = %job_id, status = %job.status, "Job not queued, skipping");
            return Ok(());
        }
        let job = match tracker.start(job_id).await {
            Ok(job) => job,
            Err(e) if e.is_state_error() => {
                info!(job_id = %job_id, "Job claimed by another worker, skipping");
                return Ok(());
            }
            Err(e) => return Err(e.into()),
        };

        let mut run = JobRun::new(&job, &self.ctx.work_root);
        let span = run.logger.create_span();
        async {
            run.logger.log_start(&format!(
                "{} scenes, {}s, {}",
                run.storyboard.scenes.len(),
                run.config.target_duration_secs,
                run.config.aspect_ratio
            ));

            let lifetime = self.ctx.config.job_max_lifetime;
            let outcome = match tokio::time::timeout(lifetime, self.run_stages(&mut run)).await {
                Ok(Ok(artifact)) => JobOutcome::Completed(artifact),
                Ok(Err(e)) => {
                    run.logger.log_error(&e.to_string());
                    JobOutcome::Failed(e.to_failure(run.current_stage))
                }
                Err(_) => {
                    let e = WorkerError::JobTimeout(lifetime.as_secs());
                    run.logger.log_error(&e.to_string());
                    JobOutcome::Failed(e.to_failure(run.current_stage))
                }
            };

            let result = self.finish(&run, outcome).await;
            self.cleanup(&run).await;
            result
        }
        .instrument(span)
        .await
    }

    async fn finish(&self, run: &JobRun, outcome: JobOutcome) -> WorkerResult<()> {
        match self.ctx.tracker.finalize(&run.job_id, outcome).await {
            Ok(job) => {
                run.logger.log_completion(&format!(
                    "{} with {} credits",
                    job.status,
                    job.credits_consumed()
                ));
                Ok(())
            }
            Err(e) if e.is_state_error() => {
                // Finalized elsewhere (sweeper); the tracker logged it.
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn cleanup(&self, run: &JobRun) {
        match tokio::fs::remove_dir_all(&run.work_dir).await {
            Ok(()) => {}
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => run
                .logger
                .log_warning(&format!("Failed to remove work dir: {}", e)),
        }
    }

    async fn ensure_not_cancelled(&self, job_id: &JobId) -> WorkerResult<()> {
        if self.ctx.tracker.is_cancel_requested(job_id).await? {
            return Err(WorkerError::Cancelled);
        }
        Ok(())
    }

    async fn run_stages(&self, run: &mut JobRun) -> WorkerResult<VideoArtifact> {
        let tracker = &self.ctx.tracker;
        for stage in StageName::ALL {
            self.ensure_not_cancelled(&run.job_id).await?;

            run.current_stage = Some(stage);
            tracker
                .update_stage(&run.job_id, StageUpdate::started(stage))
                .await?;

            let started = Instant::now();
            let result = self.run_stage(stage, run).await;
            let outcome = if result.is_ok() { "ok" } else { "error" };
            histogram!(STAGE_DURATION_SECONDS, "stage" => stage.as_str(), "outcome" => outcome)
                .record(started.elapsed().as_secs_f64());
            let output = result?;

            // Results of a stage that finished after a cancel are dropped.
            self.ensure_not_cancelled(&run.job_id).await?;

            run.logger
                .log_stage_complete(stage, started.elapsed().as_secs_f64(), output.artifacts.len());
            let mut update = StageUpdate::completed(stage, output.artifacts);
            if let Some(storyboard) = &output.storyboard {
                update = update.with_storyboard(storyboard.clone());
            }
            match tracker.update_stage(&run.job_id, update).await {
                Ok(_) => {}
                // Cancelled between the check above and the write.
                Err(e) if e.is_cancel_requested() => return Err(WorkerError::Cancelled),
                Err(e) => return Err(e.into()),
            }
            if let Some(storyboard) = output.storyboard {
                run.storyboard = storyboard;
            }
        }

        run.artifact
            .take()
            .ok_or_else(|| WorkerError::missing_asset("final video artifact"))
    }

    /// One stage under its time budget. A timed-out attempt runs again, up
    /// to the pipeline's attempt ceiling; any other error ends the stage.
    async fn run_stage(&self, stage: StageName, run: &mut JobRun) -> WorkerResult<StageOutput> {
        let config = &self.ctx.config;
        let budget = config.stage_timeout(stage);
        let mut attempt = 0;

        loop {
            attempt += 1;
            run.logger.log_stage_start(stage, attempt);
            let error = match tokio::time::timeout(budget, self.execute(stage, run)).await {
                Ok(Ok(output)) => return Ok(output),
                Ok(Err(e)) => e,
                Err(_) => WorkerError::StageTimeout {
                    stage,
                    secs: budget.as_secs(),
                },
            };

            if !error.is_stage_retryable() || attempt >= config.max_attempts {
                return Err(error);
            }
            let delay = crate::retry::RetryConfig::for_pipeline(config, stage.as_str())
                .delay_for_attempt(attempt);
            run.logger.log_warning(&format!(
                "{} (attempt {}/{}), retrying in {:?}",
                error, attempt, config.max_attempts, delay
            ));
            tokio::time::sleep(delay).await;
        }
    }

    async fn execute(&self, stage: StageName, run: &mut JobRun) -> WorkerResult<StageOutput> {
        let ctx = &*self.ctx;
        match stage {
            StageName::ScriptProcessing => stages::script::run(ctx, run).await,
            StageName::ImageProcessing => stages::image::run(ctx, run).await,
            StageName::VideoGeneration => stages::video::run(ctx, run).await,
            StageName::VideoCompositing => stages::compositing::run(ctx, run).await,
            StageName::AudioMixing => stages::audio::run(ctx, run).await,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;
    use futures::StreamExt;
    use saiad_adapters::{
        AdapterAsset, AdapterError, AdapterRegistry, AdapterResult, GeneratedAsset,
        MusicProvider, MusicRequest, SceneScript, ScriptDraft, ScriptGenerator, ScriptRequest,
        SpeechRequest, SpeechSynthesizer, VideoClipGenerator, VideoClipRequest, VisualGenerator,
        VisualRequest,
    };
    use saiad_media::{Compositor, FfmpegCommand, MediaInfo, MediaResult, Renderer};
    use saiad_models::{
        AspectRatio, ErrorCode, ExportProfile, GenerationConfig, GenerationJob, ProductRef, Scene,
        StageStatus, Storyboard, UsageOutcome, VisualSource,
    };
    use saiad_queue::{BroadcastNotifier, InMemoryJobStore, InMemoryUsageSink, JobStore, JobTracker};
    use saiad_storage::{ArtifactStore, LocalArtifactStore, LocalStoreConfig};

    use crate::assets::AssetPersister;
    use crate::config::PipelineConfig;

    fn inline(vendor: &str, content_type: &str) -> GeneratedAsset {
        GeneratedAsset::new(
            vendor,
            AdapterAsset::Inline {
                bytes: vec![0u8; 16],
                content_type: content_type.to_string(),
            },
        )
    }

    struct FakeScript;

    #[async_trait]
    impl ScriptGenerator for FakeScript {
        fn vendor(&self) -> &str {
            "fake-script"
        }

        async fn generate_script(&self, request: &ScriptRequest) -> AdapterResult<ScriptDraft> {
            Ok(ScriptDraft {
                headline: request.product.display_name().to_string(),
                cta: "Buy now".to_string(),
                scenes: (1..=request.scene_durations.len() as u32)
                    .map(|index| SceneScript {
                        index,
                        narration: format!("Narration {}", index),
                        overlay: Some(format!("Overlay {}", index)),
                        visual_prompt: Some(format!("Shot {}", index)),
                    })
                    .collect(),
                vendor: "fake-script".to_string(),
                ..Default::default()
            })
        }
    }

    /// Visual generator that can fail on demand, or flag the job as
    /// cancelled while it runs.
    #[derive(Default)]
    struct FakeVisual {
        calls: AtomicU32,
        error: Option<fn() -> AdapterError>,
        cancel: Mutex<Option<(JobTracker, JobId)>>,
    }

    #[async_trait]
    impl VisualGenerator for FakeVisual {
        fn vendor(&self) -> &str {
            "fake-visual"
        }

        async fn generate_visual(&self, _request: &VisualRequest) -> AdapterResult<GeneratedAsset> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let cancel = self.cancel.lock().unwrap().clone();
            if let Some((tracker, job_id)) = cancel {
                tracker.request_cancel(&job_id).await.unwrap();
            }
            match self.error {
                Some(make) => Err(make()),
                None => Ok(inline("fake-visual", "image/png")),
            }
        }
    }

    struct FakeVideo;

    #[async_trait]
    impl VideoClipGenerator for FakeVideo {
        fn vendor(&self) -> &str {
            "fake-video"
        }

        async fn generate_video_clip(
            &self,
            request: &VideoClipRequest,
        ) -> AdapterResult<GeneratedAsset> {
            Ok(inline("fake-video", "video/mp4").with_duration(request.duration_secs))
        }
    }

    struct FakeSpeech;

    #[async_trait]
    impl SpeechSynthesizer for FakeSpeech {
        fn vendor(&self) -> &str {
            "fake-speech"
        }

        async fn synthesize_speech(&self, _request: &SpeechRequest) -> AdapterResult<GeneratedAsset> {
            Ok(inline("fake-speech", "audio/mpeg"))
        }
    }

    struct FakeMusic;

    #[async_trait]
    impl MusicProvider for FakeMusic {
        fn vendor(&self) -> &str {
            "fake-music"
        }

        async fn generate_or_select_music(
            &self,
            _request: &MusicRequest,
        ) -> AdapterResult<GeneratedAsset> {
            Ok(inline("fake-music", "audio/mpeg"))
        }
    }

    /// Writes an empty output file and reports the last `-t` as its duration.
    #[derive(Default)]
    struct FakeRenderer {
        durations: Mutex<HashMap<std::path::PathBuf, f64>>,
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, command: &FfmpegCommand) -> MediaResult<()> {
            let args = command.build_args();
            let duration = args
                .iter()
                .rposition(|a| a == "-t")
                .and_then(|i| args.get(i + 1))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0);
            tokio::fs::write(command.output(), b"fake").await?;
            self.durations
                .lock()
                .unwrap()
                .insert(command.output().to_path_buf(), duration);
            Ok(())
        }

        async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
            let duration = self.durations.lock().unwrap().get(path).copied().unwrap_or(0.0);
            Ok(MediaInfo {
                duration,
                width: 1920,
                height: 1080,
                fps: 30.0,
                codec: "h264".into(),
                has_video: true,
                has_audio: true,
                size: 4096,
                bitrate: 0,
            })
        }
    }

    struct Harness {
        dir: tempfile::TempDir,
        tracker: JobTracker,
        usage: Arc<InMemoryUsageSink>,
        store: Arc<InMemoryJobStore>,
        artifacts: Arc<dyn ArtifactStore>,
        visual: Arc<FakeVisual>,
    }

    impl Harness {
        async fn new(visual: FakeVisual) -> Self {
            let dir = tempfile::tempdir().unwrap();
            let store = Arc::new(InMemoryJobStore::new());
            let usage = Arc::new(InMemoryUsageSink::new());
            let tracker = JobTracker::new(
                store.clone(),
                Arc::new(BroadcastNotifier::new(256)),
                usage.clone(),
            );
            let artifacts: Arc<dyn ArtifactStore> = Arc::new(
                LocalArtifactStore::new(LocalStoreConfig {
                    root: dir.path().join("artifacts"),
                    public_base_url: None,
                })
                .await
                .unwrap(),
            );
            Self {
                dir,
                tracker,
                usage,
                store,
                artifacts,
                visual: Arc::new(visual),
            }
        }

        fn orchestrator(&self) -> Orchestrator {
            let adapters = AdapterRegistry::new()
                .with_script(Arc::new(FakeScript))
                .with_visual(self.visual.clone())
                .with_video(Arc::new(FakeVideo))
                .with_speech(Arc::new(FakeSpeech))
                .with_music(Arc::new(FakeMusic));
            Orchestrator::new(PipelineContext {
                tracker: self.tracker.clone(),
                adapters,
                assets: AssetPersister::new(self.artifacts.clone()).unwrap(),
                compositor: Compositor::new(Arc::new(FakeRenderer::default())),
                config: PipelineConfig {
                    base_backoff: Duration::from_millis(1),
                    max_backoff: Duration::from_millis(5),
                    ..PipelineConfig::default()
                },
                work_root: self.dir.path().join("work"),
            })
        }

        async fn submit(&self, durations: &[f64], export_formats: Vec<ExportProfile>) -> JobId {
            let scenes = durations
                .iter()
                .enumerate()
                .map(|(i, d)| Scene::new(i as u32 + 1, *d))
                .collect();
            self.submit_scenes(scenes, export_formats).await
        }

        async fn submit_scenes(&self, scenes: Vec<Scene>, export_formats: Vec<ExportProfile>) -> JobId {
            let total: f64 = scenes.iter().map(|s| s.duration_secs).sum();
            let mut config = GenerationConfig::new(
                ProductRef::new("galaxy-s25-ultra"),
                total,
                AspectRatio::LANDSCAPE,
            );
            config.export_formats = export_formats;
            let job = GenerationJob::new("proj-1", JobId::new().to_string(), config, Storyboard::new(scenes));
            let id = job.id.clone();
            self.store.create(job).await.unwrap();
            id
        }
    }

    #[tokio::test]
    async fn test_end_to_end_landscape_with_instagram_export() {
        let harness = Harness::new(FakeVisual::default()).await;
        let job_id = harness
            .submit(&[5.0, 10.0, 10.0, 5.0], vec![ExportProfile::Instagram])
            .await;

        harness.orchestrator().run(&job_id).await.unwrap();

        let job = harness.tracker.get_status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.stages.iter().all(|s| s.status == StageStatus::Completed));

        let artifact = job.artifact.expect("artifact recorded");
        assert!((artifact.duration_secs - 30.0).abs() < 1e-9);
        assert_eq!((artifact.width, artifact.height), (1920, 1080));
        assert!(harness.artifacts.exists(&artifact.master.key).await.unwrap());

        let youtube = artifact.variant(ExportProfile::Youtube).expect("default variant");
        assert_eq!(youtube.aspect_ratio, AspectRatio::LANDSCAPE);
        let instagram = artifact.variant(ExportProfile::Instagram).expect("instagram variant");
        assert_eq!(instagram.aspect_ratio, AspectRatio::PORTRAIT);
        assert!((instagram.duration_secs - 30.0).abs() <= 0.05);

        // Every scene ended up animated and scripted.
        for scene in &job.storyboard.scenes {
            let visual = scene.visual_source.as_ref().unwrap();
            assert_eq!(visual.kind, saiad_models::VisualKind::Video);
            assert!(scene.has_narration());
        }

        let events = harness.usage.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].credits_consumed, 10);
        assert_eq!(events[0].outcome, UsageOutcome::Completed);
    }

    #[tokio::test]
    async fn test_transient_errors_retried_up_to_three_attempts() {
        let harness = Harness::new(FakeVisual {
            error: Some(|| AdapterError::rate_limited("fake-visual", "slow down")),
            ..Default::default()
        })
        .await;
        let job_id = harness.submit(&[10.0], Vec::new()).await;

        harness.orchestrator().run(&job_id).await.unwrap();

        assert_eq!(harness.visual.calls.load(Ordering::SeqCst), 3);
        let job = harness.tracker.get_status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let failure = job.failure.clone().unwrap();
        assert_eq!(failure.code, ErrorCode::RateLimited);
        assert_eq!(failure.stage, Some(StageName::ImageProcessing));
        assert_eq!(job.stage(StageName::ImageProcessing).status, StageStatus::Failed);
        assert_eq!(job.stage(StageName::VideoGeneration).status, StageStatus::Pending);

        let events = harness.usage.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].credits_consumed, 1);
        assert_eq!(events[0].error_code, Some(ErrorCode::RateLimited));
    }

    #[tokio::test]
    async fn test_invalid_input_not_retried() {
        let harness = Harness::new(FakeVisual {
            error: Some(|| AdapterError::invalid_input("fake-visual", "bad prompt")),
            ..Default::default()
        })
        .await;
        let job_id = harness.submit(&[10.0], Vec::new()).await;

        harness.orchestrator().run(&job_id).await.unwrap();

        assert_eq!(harness.visual.calls.load(Ordering::SeqCst), 1);
        let job = harness.tracker.get_status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.failure.unwrap().code, ErrorCode::InvalidInput);
    }

    #[tokio::test]
    async fn test_visual_from_another_job_is_rejected() {
        let harness = Harness::new(FakeVisual::default()).await;
        let foreign = "jobs/someone-else/scenes/01/image.png";
        harness
            .artifacts
            .put_bytes(foreign, vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        let mut scene = Scene::new(1, 10.0);
        scene.visual_source = Some(VisualSource::image(foreign));
        let job_id = harness.submit_scenes(vec![scene], Vec::new()).await;

        harness.orchestrator().run(&job_id).await.unwrap();

        let job = harness.tracker.get_status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        let failure = job.failure.clone().unwrap();
        assert_eq!(failure.code, ErrorCode::InvalidInput);
        assert_eq!(failure.stage, Some(StageName::ImageProcessing));
        assert!(job.stage(StageName::ImageProcessing).artifacts.is_empty());
    }

    #[tokio::test]
    async fn test_visual_from_uploads_is_adopted() {
        let harness = Harness::new(FakeVisual::default()).await;
        let upload = "uploads/brand/hero.png";
        harness
            .artifacts
            .put_bytes(upload, vec![1, 2, 3], "image/png")
            .await
            .unwrap();
        let mut scene = Scene::new(1, 10.0);
        scene.visual_source = Some(VisualSource::image(upload));
        let job_id = harness.submit_scenes(vec![scene], Vec::new()).await;

        harness.orchestrator().run(&job_id).await.unwrap();

        let job = harness.tracker.get_status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(harness.visual.calls.load(Ordering::SeqCst), 0);
        let images = &job.stage(StageName::ImageProcessing).artifacts;
        assert_eq!(images[0].key, upload);
    }

    #[tokio::test]
    async fn test_cancel_during_image_stage_discards_results() {
        let harness = Harness::new(FakeVisual::default()).await;
        let job_id = harness.submit(&[5.0, 5.0], Vec::new()).await;
        *harness.visual.cancel.lock().unwrap() = Some((harness.tracker.clone(), job_id.clone()));

        harness.orchestrator().run(&job_id).await.unwrap();

        let job = harness.tracker.get_status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.as_ref().unwrap().code, ErrorCode::Cancelled);
        assert_eq!(job.stage(StageName::ScriptProcessing).status, StageStatus::Completed);
        assert_ne!(job.stage(StageName::ImageProcessing).status, StageStatus::Completed);
        assert_eq!(job.stage(StageName::VideoGeneration).status, StageStatus::Pending);
        assert!(job.artifact.is_none());

        // The stills were generated, but the cancelled stage never recorded them.
        assert_eq!(harness.visual.calls.load(Ordering::SeqCst), 2);
        assert!(job.stage(StageName::ImageProcessing).artifacts.is_empty());
        assert!(job.storyboard.scenes.iter().all(|s| s.visual_source.is_none()));
        // Script results from before the cancel are kept.
        assert!(job.storyboard.scenes.iter().all(|s| s.has_narration()));

        let events = harness.usage.events().await;
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].outcome, UsageOutcome::Cancelled);
    }

    #[tokio::test]
    async fn test_progress_never_decreases() {
        let harness = Harness::new(FakeVisual::default()).await;
        let job_id = harness.submit(&[5.0, 10.0, 10.0, 5.0], Vec::new()).await;
        let mut events = harness.tracker.subscribe(&job_id).await.unwrap();

        harness.orchestrator().run(&job_id).await.unwrap();

        let mut last = 0u8;
        let mut last_revision = 0u64;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), events.next())
                .await
                .expect("event stream stalled")
                .expect("event stream closed");
            assert!(event.progress >= last, "{} < {}", event.progress, last);
            assert!(event.revision > last_revision);
            last = event.progress;
            last_revision = event.revision;
            if event.status.is_terminal() {
                assert_eq!(event.status, JobStatus::Completed);
                assert_eq!(event.progress, 100);
                break;
            }
        }
    }

    #[tokio::test]
    async fn test_narration_progress_leaves_room_for_mixing() {
        let harness = Harness::new(FakeVisual::default()).await;
        let job_id = harness.submit(&[5.0, 10.0, 10.0, 5.0], Vec::new()).await;
        let mut events = harness.tracker.subscribe(&job_id).await.unwrap();

        harness.orchestrator().run(&job_id).await.unwrap();

        let audio = StageName::AudioMixing;
        let mixing_at = audio.progress_floor() + audio.weight() / 2;
        let mut narration_events = 0;
        loop {
            let event = tokio::time::timeout(Duration::from_secs(1), events.next())
                .await
                .expect("event stream stalled")
                .expect("event stream closed");
            let message = event.message.as_deref().unwrap_or_default();
            if message.starts_with("Recording narration") {
                narration_events += 1;
                assert!(event.progress <= mixing_at, "{} at {}", message, event.progress);
            }
            if message == "Mixing audio" {
                assert_eq!(event.progress, mixing_at);
            }
            if event.status.is_terminal() {
                break;
            }
        }
        assert_eq!(narration_events, 4);
    }

    #[tokio::test]
    async fn test_non_queued_job_is_skipped() {
        let harness = Harness::new(FakeVisual::default()).await;
        let job_id = harness.submit(&[10.0], Vec::new()).await;
        harness.tracker.start(&job_id).await.unwrap();

        harness.orchestrator().run(&job_id).await.unwrap();

        assert_eq!(harness.visual.calls.load(Ordering::SeqCst), 0);
        let job = harness.tracker.get_status(&job_id).await.unwrap().unwrap();
        assert_eq!(job.status, JobStatus::Processing);
    }
}
