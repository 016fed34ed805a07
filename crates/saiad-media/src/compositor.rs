//! Compositor: storyboard plus assets to master render and export variants.
//!
//! Every export is transcoded from the one master file, so all variants
//! are frame-consistent with each other.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

use metrics::histogram;
use saiad_models::{AspectRatio, ExportProfile, Storyboard};
use tracing::{info, warn};

use crate::command::FfmpegCommand;
use crate::error::{MediaError, MediaResult};
use crate::plan::{
    export_command, thumbnail_command, AudioMixPlan, CompositePlan, NarrationTrack,
    DURATION_TOLERANCE_SECS,
};
use crate::probe::MediaInfo;
use crate::renderer::Renderer;

const RENDER_DURATION_SECONDS: &str = "saiad_render_duration_seconds";

/// Inputs for the silent composite.
#[derive(Debug, Clone)]
pub struct CompositeRequest {
    pub storyboard: Storyboard,
    pub target_duration_secs: f64,
    pub aspect_ratio: AspectRatio,
    /// Local file for each scene index
    pub visuals: HashMap<u32, PathBuf>,
    pub work_dir: PathBuf,
}

/// Inputs for the audio mix onto a composite.
#[derive(Debug, Clone)]
pub struct AudioMixRequest {
    pub composite: PathBuf,
    pub storyboard: Storyboard,
    /// Local narration file per scene index; scenes without narration are absent
    pub narration: HashMap<u32, PathBuf>,
    pub music: Option<PathBuf>,
    pub work_dir: PathBuf,
}

/// A finished render and what ffprobe says about it.
#[derive(Debug, Clone)]
pub struct RenderOutput {
    pub path: PathBuf,
    pub info: MediaInfo,
    pub render_secs: f64,
}

#[derive(Debug, Clone)]
pub struct RenderedVariant {
    pub profile: ExportProfile,
    pub path: PathBuf,
    pub info: MediaInfo,
}

pub struct Compositor {
    renderer: Arc<dyn Renderer>,
    font_file: Option<PathBuf>,
}

impl Compositor {
    pub fn new(renderer: Arc<dyn Renderer>) -> Self {
        Self {
            renderer,
            font_file: None,
        }
    }

    /// Font used for burned-in text; fontconfig default when unset.
    pub fn with_font_file(mut self, font_file: Option<PathBuf>) -> Self {
        self.font_file = font_file;
        self
    }

    /// Run a command, retrying exactly once if the renderer crashed.
    async fn render(&self, operation: &'static str, command: &FfmpegCommand) -> MediaResult<f64> {
        let started = Instant::now();
        let result = match self.renderer.render(command).await {
            Err(e) if e.is_crash() => {
                warn!(operation, error = %e, "Renderer crashed, retrying once");
                self.renderer.render(command).await
            }
            other => other,
        };
        let elapsed = started.elapsed().as_secs_f64();
        let outcome = if result.is_ok() { "ok" } else { "error" };
        histogram!(RENDER_DURATION_SECONDS, "operation" => operation, "outcome" => outcome)
            .record(elapsed);
        result.map(|_| elapsed)
    }

    fn check_duration(expected: f64, info: &MediaInfo) -> MediaResult<()> {
        if (info.duration - expected).abs() > DURATION_TOLERANCE_SECS {
            return Err(MediaError::DurationDrift {
                expected,
                actual: info.duration,
            });
        }
        Ok(())
    }

    /// Render scenes with transitions and text overlays into a silent video.
    pub async fn composite(&self, request: &CompositeRequest) -> MediaResult<RenderOutput> {
        let resolution = request
            .aspect_ratio
            .master_resolution()
            .ok_or_else(|| MediaError::internal(format!("Unsupported aspect {}", request.aspect_ratio)))?;
        let plan = CompositePlan::new(
            &request.storyboard,
            request.target_duration_secs,
            resolution,
            &request.visuals,
        )?
        .with_font_file(self.font_file.clone());

        tokio::fs::create_dir_all(&request.work_dir).await?;
        let text_files = plan.overlay_text_paths(&request.work_dir);
        for (overlay, path) in plan.overlays.iter().zip(&text_files) {
            tokio::fs::write(path, overlay.text.as_bytes()).await?;
        }

        let output = request.work_dir.join("composite.mp4");
        let render_secs = self.render("composite", &plan.command(&output, &text_files)).await?;
        let info = self.renderer.probe(&output).await?;
        Self::check_duration(plan.total_duration_secs, &info)?;

        info!(
            scenes = plan.scenes.len(),
            duration = info.duration,
            render_secs,
            "Composite rendered"
        );
        Ok(RenderOutput {
            path: output,
            info,
            render_secs,
        })
    }

    /// Mix narration (aligned to scene windows) and music under the composite.
    pub async fn mix_audio(&self, request: &AudioMixRequest) -> MediaResult<RenderOutput> {
        let windows = request.storyboard.timeline();
        let narration = windows
            .iter()
            .filter_map(|w| {
                request.narration.get(&w.index).map(|path| NarrationTrack {
                    index: w.index,
                    path: path.clone(),
                    start_secs: w.start_secs,
                    window_secs: w.duration_secs,
                })
            })
            .collect();
        let plan = AudioMixPlan {
            composite: request.composite.clone(),
            total_duration_secs: request.storyboard.total_duration_secs(),
            narration,
            music: request.music.clone(),
        };

        tokio::fs::create_dir_all(&request.work_dir).await?;
        let output = request.work_dir.join("master.mp4");
        let render_secs = self.render("audio_mix", &plan.command(&output)).await?;
        let info = self.renderer.probe(&output).await?;
        Self::check_duration(plan.total_duration_secs, &info)?;

        Ok(RenderOutput {
            path: output,
            info,
            render_secs,
        })
    }

    /// Transcode each profile from the master, letterboxed.
    pub async fn export_variants(
        &self,
        master: &RenderOutput,
        profiles: &[ExportProfile],
        out_dir: &Path,
    ) -> MediaResult<Vec<RenderedVariant>> {
        tokio::fs::create_dir_all(out_dir).await?;
        let mut variants = Vec::with_capacity(profiles.len());
        for profile in profiles {
            let spec = profile.spec();
            let output = out_dir.join(format!("{}.mp4", profile.as_str()));
            let command = export_command(&master.path, &output, &spec, master.info.duration);
            self.render("export", &command).await?;

            let info = self.renderer.probe(&output).await?;
            Self::check_duration(master.info.duration, &info)?;
            variants.push(RenderedVariant {
                profile: *profile,
                path: output,
                info,
            });
        }
        Ok(variants)
    }

    pub async fn extract_thumbnail(&self, master: &RenderOutput, output: &Path) -> MediaResult<()> {
        let command = thumbnail_command(&master.path, output, master.info.duration);
        self.render("thumbnail", &command).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use saiad_models::{AdCopy, Scene, StoryboardError, VisualSource};
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::sync::Mutex;

    /// Writes an empty output file and reports the `-t` duration as probed.
    struct FakeRenderer {
        crashes_left: AtomicU32,
        bad_input: bool,
        durations: Mutex<HashMap<PathBuf, f64>>,
        calls: AtomicU32,
    }

    impl FakeRenderer {
        fn new(crashes: u32) -> Arc<Self> {
            Arc::new(Self {
                crashes_left: AtomicU32::new(crashes),
                bad_input: false,
                durations: Mutex::new(HashMap::new()),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl Renderer for FakeRenderer {
        async fn render(&self, command: &FfmpegCommand) -> MediaResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.bad_input {
                return Err(MediaError::ffmpeg_failed("exit 1", None, Some(1)));
            }
            if self
                .crashes_left
                .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
                .is_ok()
            {
                return Err(MediaError::renderer_crashed("signal 9", None));
            }
            let args = command.build_args();
            let duration = args
                .iter()
                .rposition(|a| a == "-t")
                .and_then(|i| args.get(i + 1))
                .and_then(|v| v.parse().ok())
                .unwrap_or(0.0);
            tokio::fs::write(command.output(), b"").await?;
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
                size: 1024,
                bitrate: 0,
            })
        }
    }

    fn request(work_dir: &Path, durations: &[f64]) -> CompositeRequest {
        let scenes = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                Scene::new(i as u32 + 1, *d).with_visual(VisualSource::image(format!("k{}", i)))
            })
            .collect();
        let mut storyboard = Storyboard::new(scenes);
        storyboard.copy = AdCopy {
            headline: Some("Galaxy S25 Ultra".into()),
            subline: Some("Pro-grade camera".into()),
            cta: Some("Buy now".into()),
        };
        CompositeRequest {
            storyboard,
            target_duration_secs: 30.0,
            aspect_ratio: AspectRatio::LANDSCAPE,
            visuals: (1..=durations.len() as u32)
                .map(|i| (i, work_dir.join(format!("scene{}.png", i))))
                .collect(),
            work_dir: work_dir.to_path_buf(),
        }
    }

    #[tokio::test]
    async fn test_composite_mix_and_export() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::new(0);
        let compositor = Compositor::new(renderer.clone());

        let req = request(dir.path(), &[5.0, 10.0, 10.0, 5.0]);
        let composite = compositor.composite(&req).await.unwrap();
        assert_eq!(composite.info.duration, 30.0);
        assert!(dir.path().join("overlay_00.txt").exists());

        let master = compositor
            .mix_audio(&AudioMixRequest {
                composite: composite.path.clone(),
                storyboard: req.storyboard.clone(),
                narration: HashMap::from([(1, dir.path().join("n1.mp3"))]),
                music: Some(dir.path().join("music.mp3")),
                work_dir: dir.path().to_path_buf(),
            })
            .await
            .unwrap();

        let variants = compositor
            .export_variants(
                &master,
                &[ExportProfile::Youtube, ExportProfile::Tiktok],
                &dir.path().join("exports"),
            )
            .await
            .unwrap();
        assert_eq!(variants.len(), 2);
        for variant in &variants {
            assert!((variant.info.duration - master.info.duration).abs() <= 0.05);
        }

        compositor
            .extract_thumbnail(&master, &dir.path().join("thumb.jpg"))
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_mismatched_storyboard_never_renders() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::new(0);
        let compositor = Compositor::new(renderer.clone());

        let err = compositor
            .composite(&request(dir.path(), &[5.0, 10.0, 10.0, 4.9]))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            MediaError::IncompleteStoryboard(StoryboardError::DurationMismatch { .. })
        ));
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_crash_retried_once() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = FakeRenderer::new(1);
        let compositor = Compositor::new(renderer.clone());
        compositor
            .composite(&request(dir.path(), &[15.0, 15.0]))
            .await
            .unwrap();
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);

        let renderer = FakeRenderer::new(2);
        let compositor = Compositor::new(renderer.clone());
        let err = compositor
            .composite(&request(dir.path(), &[15.0, 15.0]))
            .await
            .unwrap_err();
        assert!(err.is_crash());
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_bad_input_not_retried() {
        let dir = tempfile::tempdir().unwrap();
        let renderer = Arc::new(FakeRenderer {
            crashes_left: AtomicU32::new(0),
            bad_input: true,
            durations: Mutex::new(HashMap::new()),
            calls: AtomicU32::new(0),
        });
        let compositor = Compositor::new(renderer.clone());
        let err = compositor
            .composite(&request(dir.path(), &[10.0, 20.0]))
            .await
            .unwrap_err();
        assert_eq!(err.error_code(), saiad_models::ErrorCode::InvalidInput);
        assert_eq!(renderer.calls.load(Ordering::SeqCst), 1);
    }
}
