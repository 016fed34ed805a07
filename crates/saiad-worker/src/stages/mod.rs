//! The five pipeline stages.
//!
//! Each stage reads the job's working storyboard, calls adapters or the
//! compositor, and persists what they produce to artifact storage. Nothing
//! is written to the job record here: the stage returns a `StageOutput`
//! and the orchestrator records it, or drops it if the job was cancelled.

pub mod audio;
pub mod compositing;
pub mod image;
pub mod script;
pub mod video;

use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};

use futures::future::join_all;
use saiad_models::{fan_out_progress, ArtifactRef, JobId, StageName, Storyboard};
use tokio::sync::Semaphore;
use tracing::warn;

use crate::context::PipelineContext;
use crate::error::WorkerResult;

/// What a finished stage hands back for its `StageResult`.
#[derive(Debug, Default)]
pub struct StageOutput {
    pub artifacts: Vec<ArtifactRef>,
    /// Storyboard with this stage's resolutions applied
    pub storyboard: Option<Storyboard>,
}

impl StageOutput {
    pub fn new(artifacts: Vec<ArtifactRef>) -> Self {
        Self {
            artifacts,
            storyboard: None,
        }
    }

    pub fn with_storyboard(mut self, storyboard: Storyboard) -> Self {
        self.storyboard = Some(storyboard);
        self
    }
}

/// Run `task` for every item, at most `max_scene_parallel` at once.
///
/// Waits for every task to resolve before returning; the first error in
/// item order fails the whole fan-out. Progress is recorded as each task
/// resolves, with messages like "Generating visuals (2/4)", climbing through
/// the first `span` points of the stage's weight.
pub(crate) async fn fan_out<I, T, F, Fut>(
    ctx: &PipelineContext,
    job_id: &JobId,
    stage: StageName,
    span: u8,
    label: &str,
    items: Vec<I>,
    task: F,
) -> WorkerResult<Vec<T>>
where
    F: Fn(I) -> Fut,
    Fut: Future<Output = WorkerResult<T>>,
{
    let total = items.len();
    let semaphore = Semaphore::new(ctx.config.max_scene_parallel.max(1));
    let done = AtomicUsize::new(0);

    let tasks = items.into_iter().map(|item| {
        let semaphore = &semaphore;
        let done = &done;
        let task = &task;
        async move {
            let _permit = semaphore.acquire().await;
            let result = task(item).await;

            let finished = done.fetch_add(1, Ordering::SeqCst) + 1;
            let message = format!("{} ({}/{})", label, finished, total);
            if let Err(e) = ctx
                .tracker
                .record_progress(job_id, fan_out_progress(stage, span, finished, total), &message)
                .await
            {
                warn!(job_id = %job_id, stage = stage.as_str(), error = %e, "Failed to record progress");
            }
            result
        }
    });

    join_all(tasks).await.into_iter().collect()
}
