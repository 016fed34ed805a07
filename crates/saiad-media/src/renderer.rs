//! The renderer seam: run an FFmpeg command, probe its output.

use std::path::Path;

use async_trait::async_trait;

use crate::command::{FfmpegCommand, FfmpegRunner};
use crate::error::MediaResult;
use crate::probe::{probe_media, MediaInfo};

#[async_trait]
pub trait Renderer: Send + Sync {
    async fn render(&self, command: &FfmpegCommand) -> MediaResult<()>;

    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo>;
}

/// Renderer backed by the `ffmpeg`/`ffprobe` binaries.
#[derive(Debug, Clone, Default)]
pub struct FfmpegRenderer {
    timeout_secs: Option<u64>,
}

impl FfmpegRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Kill any single render that runs longer than `secs`.
    pub fn with_timeout(mut self, secs: u64) -> Self {
        self.timeout_secs = Some(secs);
        self
    }
}

#[async_trait]
impl Renderer for FfmpegRenderer {
    async fn render(&self, command: &FfmpegCommand) -> MediaResult<()> {
        let runner = match self.timeout_secs {
            Some(secs) => FfmpegRunner::new().with_timeout(secs),
            None => FfmpegRunner::new(),
        };
        runner.run(command).await
    }

    async fn probe(&self, path: &Path) -> MediaResult<MediaInfo> {
        probe_media(path).await
    }
}
