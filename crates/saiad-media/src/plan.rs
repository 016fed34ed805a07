//! Render planning: storyboard timing to FFmpeg filter graphs.
//!
//! Everything here is pure. The compositor writes overlay text files
//! and runs the commands these plans build.

use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use saiad_models::{ProfileSpec, Storyboard, StoryboardError, Transition, VisualKind};

use crate::command::FfmpegCommand;
use crate::error::MediaResult;

/// Output frame rate of every render.
pub const OUTPUT_FPS: u32 = 30;
/// Upper bound on a fade half-transition.
pub const MAX_FADE_SECS: f64 = 0.5;
/// Music level under narration.
pub const MUSIC_UNDER_NARRATION: f64 = 0.25;
pub const MUSIC_FADE_IN_SECS: f64 = 1.5;
pub const MUSIC_FADE_OUT_SECS: f64 = 2.0;
/// Thumbnail timestamp.
pub const THUMBNAIL_AT_SECS: f64 = 1.0;
/// Allowed drift between a render's probed duration and its target.
pub const DURATION_TOLERANCE_SECS: f64 = 0.05;

/// Fade length for a scene of `duration` seconds.
pub fn fade_secs(duration: f64) -> f64 {
    (duration / 4.0).min(MAX_FADE_SECS)
}

/// Escape a path for use inside a single-quoted filter option.
fn escape_filter_value(value: &str) -> String {
    value
        .replace('\\', "\\\\")
        .replace('\'', "'\\''")
        .replace(':', "\\:")
}

/// Where a text overlay sits on screen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OverlaySlot {
    Headline,
    Subline,
    Cta,
    Scene,
}

impl OverlaySlot {
    /// Font size as a fraction of output height.
    fn font_divisor(&self) -> u32 {
        match self {
            OverlaySlot::Headline => 12,
            OverlaySlot::Subline => 22,
            OverlaySlot::Cta => 16,
            OverlaySlot::Scene => 20,
        }
    }

    fn y_expr(&self) -> &'static str {
        match self {
            OverlaySlot::Headline => "h*0.08",
            OverlaySlot::Subline => "h*0.66",
            OverlaySlot::Cta => "h*0.88-text_h",
            OverlaySlot::Scene => "h*0.76",
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TextOverlay {
    pub slot: OverlaySlot,
    pub text: String,
    pub start_secs: f64,
    pub end_secs: f64,
}

/// One scene on the output timeline with its local visual.
#[derive(Debug, Clone, PartialEq)]
pub struct SceneClip {
    pub index: u32,
    pub start_secs: f64,
    pub duration_secs: f64,
    pub kind: VisualKind,
    pub path: PathBuf,
    pub fade_in_secs: f64,
    pub fade_out_secs: f64,
}

/// Silent composite: scenes, transitions and burned-in text.
#[derive(Debug, Clone)]
pub struct CompositePlan {
    pub width: u32,
    pub height: u32,
    pub total_duration_secs: f64,
    pub scenes: Vec<SceneClip>,
    pub overlays: Vec<TextOverlay>,
    pub font_file: Option<PathBuf>,
}

impl CompositePlan {
    /// Plan a composite. Fails with a storyboard error when timing does not
    /// sum to `target_secs` or a scene has no local visual.
    pub fn new(
        storyboard: &Storyboard,
        target_secs: f64,
        resolution: (u32, u32),
        visuals: &HashMap<u32, PathBuf>,
    ) -> MediaResult<Self> {
        storyboard.validate_for_compositing(target_secs)?;

        let mut board = storyboard.clone();
        board.sort();
        let windows = board.timeline();
        let count = board.scenes.len();

        let mut scenes = Vec::with_capacity(count);
        for (pos, (scene, window)) in board.scenes.iter().zip(windows.iter()).enumerate() {
            let path = visuals
                .get(&scene.index)
                .cloned()
                .ok_or(StoryboardError::UnresolvedVisual { index: scene.index })?;
            let kind = scene
                .visual_source
                .as_ref()
                .map(|v| v.kind)
                .unwrap_or(VisualKind::Image);

            let fade_in_secs = match pos.checked_sub(1).map(|p| board.scenes[p].transition) {
                Some(Transition::Fade) => fade_secs(window.duration_secs),
                _ => 0.0,
            };
            let fade_out_secs = if pos + 1 < count && scene.transition == Transition::Fade {
                fade_secs(window.duration_secs)
            } else {
                0.0
            };

            scenes.push(SceneClip {
                index: scene.index,
                start_secs: window.start_secs,
                duration_secs: window.duration_secs,
                kind,
                path,
                fade_in_secs,
                fade_out_secs,
            });
        }

        let mut overlays = Vec::new();
        if let (Some(first), Some(last)) = (windows.first(), windows.last()) {
            let copy = &board.copy;
            let mut push = |slot, text: &Option<String>, start: f64, end: f64| {
                if let Some(text) = text.as_ref().filter(|t| !t.trim().is_empty()) {
                    overlays.push(TextOverlay {
                        slot,
                        text: text.trim().to_string(),
                        start_secs: start,
                        end_secs: end,
                    });
                }
            };
            push(OverlaySlot::Headline, &copy.headline, first.start_secs, first.end_secs());
            push(OverlaySlot::Subline, &copy.subline, first.start_secs, first.end_secs());
            push(OverlaySlot::Cta, &copy.cta, last.start_secs, last.end_secs());
            for (scene, window) in board.scenes.iter().zip(windows.iter()) {
                push(
                    OverlaySlot::Scene,
                    &scene.overlay,
                    window.start_secs,
                    window.end_secs(),
                );
            }
        }

        Ok(Self {
            width: resolution.0,
            height: resolution.1,
            total_duration_secs: board.total_duration_secs(),
            scenes,
            overlays,
            font_file: None,
        })
    }

    pub fn with_font_file(mut self, font_file: Option<PathBuf>) -> Self {
        self.font_file = font_file;
        self
    }

    /// Paths the overlay texts are written to, one per overlay.
    pub fn overlay_text_paths(&self, work_dir: &Path) -> Vec<PathBuf> {
        (0..self.overlays.len())
            .map(|i| work_dir.join(format!("overlay_{:02}.txt", i)))
            .collect()
    }

    fn drawtext(&self, overlay: &TextOverlay, text_file: &Path) -> String {
        let mut filter = format!(
            "drawtext=textfile='{}':fontcolor=white:fontsize=h/{}:x=(w-text_w)/2:y={}:box=1:boxcolor=black@0.45:boxborderw=18",
            escape_filter_value(&text_file.to_string_lossy()),
            overlay.slot.font_divisor(),
            overlay.slot.y_expr(),
        );
        if let Some(font) = &self.font_file {
            let _ = write!(
                filter,
                ":fontfile='{}'",
                escape_filter_value(&font.to_string_lossy())
            );
        }
        let _ = write!(
            filter,
            ":enable='between(t,{:.3},{:.3})'",
            overlay.start_secs, overlay.end_secs
        );
        filter
    }

    /// Filter graph producing `[vout]`.
    pub fn filter_graph(&self, text_files: &[PathBuf]) -> String {
        let (w, h) = (self.width, self.height);
        let mut graph = String::new();

        for (i, scene) in self.scenes.iter().enumerate() {
            let _ = write!(
                graph,
                "[{i}:v]scale={w}:{h}:force_original_aspect_ratio=increase,crop={w}:{h},fps={fps},setsar=1,format=yuv420p,trim=duration={d:.3},setpts=PTS-STARTPTS",
                fps = OUTPUT_FPS,
                d = scene.duration_secs,
            );
            if scene.fade_in_secs > 0.0 {
                let _ = write!(graph, ",fade=t=in:st=0:d={:.3}", scene.fade_in_secs);
            }
            if scene.fade_out_secs > 0.0 {
                let _ = write!(
                    graph,
                    ",fade=t=out:st={:.3}:d={:.3}",
                    scene.duration_secs - scene.fade_out_secs,
                    scene.fade_out_secs
                );
            }
            let _ = write!(graph, "[v{}];", i);
        }

        for i in 0..self.scenes.len() {
            let _ = write!(graph, "[v{}]", i);
        }
        let _ = write!(graph, "concat=n={}:v=1:a=0[base];", self.scenes.len());

        let texts: Vec<String> = self
            .overlays
            .iter()
            .zip(text_files)
            .map(|(overlay, file)| self.drawtext(overlay, file))
            .collect();
        if texts.is_empty() {
            graph.push_str("[base]null[vout]");
        } else {
            let _ = write!(graph, "[base]{}[vout]", texts.join(","));
        }
        graph
    }

    pub fn command(&self, output: &Path, text_files: &[PathBuf]) -> FfmpegCommand {
        let mut cmd = FfmpegCommand::new(output);
        for scene in &self.scenes {
            let duration = format!("{:.3}", scene.duration_secs);
            cmd = match scene.kind {
                VisualKind::Image => cmd.input_with(
                    vec![
                        "-loop".to_string(),
                        "1".to_string(),
                        "-framerate".to_string(),
                        OUTPUT_FPS.to_string(),
                        "-t".to_string(),
                        duration,
                    ],
                    &scene.path,
                ),
                VisualKind::Video => cmd.input_with(
                    vec!["-stream_loop".to_string(), "-1".to_string(), "-t".to_string(), duration],
                    &scene.path,
                ),
            };
        }
        cmd.filter_complex(self.filter_graph(text_files))
            .map("[vout]")
            .output_arg("-an")
            .video_codec("libx264")
            .preset("veryfast")
            .crf(20)
            .output_args(["-pix_fmt", "yuv420p", "-r"])
            .output_arg(OUTPUT_FPS.to_string())
            .output_duration(self.total_duration_secs)
            .faststart()
    }
}

/// Narration clip placed on the timeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NarrationTrack {
    pub index: u32,
    pub path: PathBuf,
    pub start_secs: f64,
    /// Scene window length; longer narration is trimmed to it
    pub window_secs: f64,
}

/// Narration and music mixed under the silent composite.
#[derive(Debug, Clone)]
pub struct AudioMixPlan {
    pub composite: PathBuf,
    pub total_duration_secs: f64,
    pub narration: Vec<NarrationTrack>,
    pub music: Option<PathBuf>,
}

impl AudioMixPlan {
    pub fn music_volume(&self) -> f64 {
        if self.narration.is_empty() {
            1.0
        } else {
            MUSIC_UNDER_NARRATION
        }
    }

    /// Filter graph producing `[aout]`. Input 0 is the composite; narration
    /// follows in order, then music, then the silence bed.
    pub fn filter_graph(&self) -> String {
        let total = self.total_duration_secs;
        let mut graph = String::new();
        let mut labels = Vec::new();

        for (k, track) in self.narration.iter().enumerate() {
            let input = k + 1;
            let delay_ms = (track.start_secs * 1000.0).round() as i64;
            let _ = write!(
                graph,
                "[{input}:a]atrim=0:{w:.3},asetpts=PTS-STARTPTS,aresample=48000,adelay=delays={delay_ms}:all=1[n{k}];",
                w = track.window_secs,
            );
            labels.push(format!("[n{}]", k));
        }

        let mut next_input = self.narration.len() + 1;
        if self.music.is_some() {
            let fade_out_start = (total - MUSIC_FADE_OUT_SECS).max(0.0);
            let _ = write!(
                graph,
                "[{next_input}:a]atrim=0:{total:.3},asetpts=PTS-STARTPTS,aresample=48000,volume={vol:.2},afade=t=in:st=0:d={fin:.1},afade=t=out:st={fade_out_start:.3}:d={fout:.1}[music];",
                vol = self.music_volume(),
                fin = MUSIC_FADE_IN_SECS,
                fout = MUSIC_FADE_OUT_SECS,
            );
            labels.push("[music]".to_string());
            next_input += 1;
        }

        // Silence bed keeps the track exactly `total` long
        let _ = write!(graph, "[{}:a]atrim=0:{:.3}[bed];", next_input, total);
        labels.push("[bed]".to_string());

        let _ = write!(
            graph,
            "{}amix=inputs={}:duration=longest:dropout_transition=0:normalize=0,atrim=0:{:.3}[aout]",
            labels.join(""),
            labels.len(),
            total
        );
        graph
    }

    pub fn command(&self, output: &Path) -> FfmpegCommand {
        let total = format!("{:.3}", self.total_duration_secs);
        let mut cmd = FfmpegCommand::new(output).input(&self.composite);
        for track in &self.narration {
            cmd = cmd.input(&track.path);
        }
        if let Some(music) = &self.music {
            cmd = cmd.input_with(["-stream_loop", "-1"], music);
        }
        cmd.input_with(
            vec!["-f".to_string(), "lavfi".to_string(), "-t".to_string(), total],
            "anullsrc=channel_layout=stereo:sample_rate=48000",
        )
        .filter_complex(self.filter_graph())
        .map("0:v")
        .map("[aout]")
        .video_codec("copy")
        .audio_codec("aac")
        .audio_bitrate("192k")
        .output_duration(self.total_duration_secs)
        .faststart()
    }
}

/// Letterboxed platform variant of the master.
pub fn export_command(master: &Path, output: &Path, spec: &ProfileSpec, duration_secs: f64) -> FfmpegCommand {
    let (w, h) = (spec.width, spec.height);
    let kbps = spec.video_bitrate_kbps;
    FfmpegCommand::new(output)
        .input(master)
        .video_filter(format!(
            "scale={w}:{h}:force_original_aspect_ratio=decrease,pad={w}:{h}:(ow-iw)/2:(oh-ih)/2:black,setsar=1"
        ))
        .video_codec("libx264")
        .preset("veryfast")
        .video_bitrate_kbps(kbps)
        .output_arg("-maxrate")
        .output_arg(format!("{}k", kbps))
        .output_arg("-bufsize")
        .output_arg(format!("{}k", kbps * 2))
        .output_args(["-pix_fmt", "yuv420p"])
        .audio_codec("aac")
        .audio_bitrate("128k")
        .output_duration(duration_secs)
        .faststart()
}

/// JPEG frame from the master.
pub fn thumbnail_command(master: &Path, output: &Path, duration_secs: f64) -> FfmpegCommand {
    let at = THUMBNAIL_AT_SECS.min(duration_secs / 2.0);
    FfmpegCommand::new(output)
        .input_with(vec!["-ss".to_string(), format!("{:.3}", at)], master)
        .single_frame()
        .output_args(["-q:v", "2"])
}

#[cfg(test)]
mod tests {
    use super::*;
    use saiad_models::{AdCopy, ExportProfile, Scene, VisualSource};

    fn storyboard(durations: &[f64]) -> Storyboard {
        let scenes = durations
            .iter()
            .enumerate()
            .map(|(i, d)| {
                let index = i as u32 + 1;
                let mut scene = Scene::new(index, *d)
                    .with_visual(VisualSource::image(format!("jobs/j/scenes/{index}.png")));
                scene.transition = Transition::Fade;
                scene
            })
            .collect();
        let mut board = Storyboard::new(scenes);
        board.copy = AdCopy {
            headline: Some("Galaxy S25 Ultra".into()),
            subline: None,
            cta: Some("Shop now".into()),
        };
        board
    }

    fn visuals(n: u32) -> HashMap<u32, PathBuf> {
        (1..=n)
            .map(|i| (i, PathBuf::from(format!("/work/scene{i}.png"))))
            .collect()
    }

    #[test]
    fn test_plan_timeline_and_fades() {
        let plan =
            CompositePlan::new(&storyboard(&[5.0, 10.0, 10.0, 5.0]), 30.0, (1920, 1080), &visuals(4))
                .unwrap();

        assert_eq!(plan.total_duration_secs, 30.0);
        assert_eq!(plan.scenes[2].start_secs, 15.0);
        // No fade into the first scene or out of the last
        assert_eq!(plan.scenes[0].fade_in_secs, 0.0);
        assert_eq!(plan.scenes[3].fade_out_secs, 0.0);
        assert_eq!(plan.scenes[0].fade_out_secs, 0.5);
        assert_eq!(plan.scenes[1].fade_in_secs, 0.5);

        let headline = &plan.overlays[0];
        assert_eq!(headline.slot, OverlaySlot::Headline);
        assert_eq!((headline.start_secs, headline.end_secs), (0.0, 5.0));
        let cta = plan.overlays.iter().find(|o| o.slot == OverlaySlot::Cta).unwrap();
        assert_eq!((cta.start_secs, cta.end_secs), (25.0, 30.0));
    }

    #[test]
    fn test_short_scene_fade_is_quarter_duration() {
        assert_eq!(fade_secs(1.0), 0.25);
        assert_eq!(fade_secs(8.0), MAX_FADE_SECS);
    }

    #[test]
    fn test_plan_rejects_duration_mismatch() {
        let err = CompositePlan::new(
            &storyboard(&[5.0, 10.0, 10.0, 4.9]),
            30.0,
            (1920, 1080),
            &visuals(4),
        )
        .unwrap_err();
        assert!(matches!(
            err,
            crate::MediaError::IncompleteStoryboard(StoryboardError::DurationMismatch { .. })
        ));
    }

    #[test]
    fn test_plan_requires_local_visual() {
        let mut local = visuals(4);
        local.remove(&3);
        let err = CompositePlan::new(&storyboard(&[5.0, 10.0, 10.0, 5.0]), 30.0, (1920, 1080), &local)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::MediaError::IncompleteStoryboard(StoryboardError::UnresolvedVisual { index: 3 })
        ));
    }

    #[test]
    fn test_filter_graph_shape() {
        let plan =
            CompositePlan::new(&storyboard(&[5.0, 10.0, 10.0, 5.0]), 30.0, (1920, 1080), &visuals(4))
                .unwrap();
        let files = plan.overlay_text_paths(Path::new("/work"));
        let graph = plan.filter_graph(&files);

        assert!(graph.contains("[0:v]scale=1920:1080:force_original_aspect_ratio=increase,crop=1920:1080"));
        assert!(graph.contains("fade=t=out:st=4.500:d=0.500[v0]"));
        assert!(graph.contains("[v0][v1][v2][v3]concat=n=4:v=1:a=0[base]"));
        assert!(graph.contains("textfile='/work/overlay_00.txt'"));
        assert!(graph.contains("enable='between(t,25.000,30.000)'"));
        assert!(graph.ends_with("[vout]"));

        let args = plan.command(Path::new("/work/composite.mp4"), &files).build_args();
        assert_eq!(args.iter().filter(|a| *a == "-loop").count(), 4);
        assert!(args.contains(&"30.000".to_string()));
    }

    #[test]
    fn test_audio_mix_graph() {
        let plan = AudioMixPlan {
            composite: PathBuf::from("/work/composite.mp4"),
            total_duration_secs: 30.0,
            narration: vec![
                NarrationTrack {
                    index: 1,
                    path: PathBuf::from("/work/n1.mp3"),
                    start_secs: 0.0,
                    window_secs: 5.0,
                },
                NarrationTrack {
                    index: 2,
                    path: PathBuf::from("/work/n2.mp3"),
                    start_secs: 5.0,
                    window_secs: 10.0,
                },
            ],
            music: Some(PathBuf::from("/work/music.mp3")),
        };
        let graph = plan.filter_graph();
        assert!(graph.contains("[2:a]atrim=0:10.000,asetpts=PTS-STARTPTS,aresample=48000,adelay=delays=5000:all=1[n1]"));
        assert!(graph.contains("volume=0.25"));
        assert!(graph.contains("afade=t=out:st=28.000:d=2.0"));
        assert!(graph.contains("[4:a]atrim=0:30.000[bed]"));
        assert!(graph.contains("amix=inputs=4"));

        let no_narration = AudioMixPlan {
            narration: Vec::new(),
            ..plan
        };
        assert_eq!(no_narration.music_volume(), 1.0);
    }

    #[test]
    fn test_export_letterboxes() {
        let spec = ExportProfile::Tiktok.spec();
        let args = export_command(Path::new("m.mp4"), Path::new("t.mp4"), &spec, 30.0).build_args();
        let vf = args.iter().position(|a| a == "-vf").unwrap();
        assert!(args[vf + 1].contains("force_original_aspect_ratio=decrease,pad=1080:1920"));
    }
}
