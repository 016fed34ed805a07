#![deny(unreachable_patterns)]
//! FFmpeg CLI wrapper and compositor for generated ad videos.
//!
//! This crate provides:
//! - Type-safe FFmpeg command building
//! - Stderr capture for failure reports
//! - Timeout support via tokio
//! - Composite, audio mix, export and thumbnail plans
//! - A `Compositor` that renders and verifies them through a `Renderer`

pub mod command;
pub mod compositor;
pub mod error;
pub mod plan;
pub mod probe;
pub mod renderer;

pub use command::{check_ffmpeg, check_ffprobe, FfmpegCommand, FfmpegInput, FfmpegRunner};
pub use compositor::{
    AudioMixRequest, CompositeRequest, Compositor, RenderOutput, RenderedVariant,
};
pub use error::{MediaError, MediaResult};
pub use plan::{
    export_command, thumbnail_command, AudioMixPlan, CompositePlan, NarrationTrack, OverlaySlot,
    SceneClip, TextOverlay, DURATION_TOLERANCE_SECS, OUTPUT_FPS,
};
pub use probe::{probe_media, MediaInfo};
pub use renderer::{FfmpegRenderer, Renderer};
