//! `video_compositing`: scenes, transitions and text into a silent composite.

use std::collections::HashMap;

use saiad_media::CompositeRequest;
use saiad_models::StoryboardError;

use crate::context::{JobRun, PipelineContext};
use crate::error::WorkerResult;
use crate::stages::StageOutput;

pub async fn run(ctx: &PipelineContext, run: &mut JobRun) -> WorkerResult<StageOutput> {
    // Fail before downloading anything if the storyboard cannot be rendered.
    run.storyboard
        .validate_for_compositing(run.config.target_duration_secs)
        .map_err(saiad_media::MediaError::from)?;

    let scene_dir = run.work_dir.join("scenes");
    let mut visuals = HashMap::with_capacity(run.storyboard.scenes.len());
    for scene in &run.storyboard.scenes {
        let source = scene
            .visual_source
            .as_ref()
            .ok_or(StoryboardError::UnresolvedVisual { index: scene.index })
            .map_err(saiad_media::MediaError::from)?;
        let local = ctx
            .assets
            .materialize(&source.uri, &scene_dir, &format!("scene_{:02}", scene.index))
            .await?;
        visuals.insert(scene.index, local);
    }

    let request = CompositeRequest {
        storyboard: run.storyboard.clone(),
        target_duration_secs: run.config.target_duration_secs,
        aspect_ratio: run.config.aspect_ratio,
        visuals,
        work_dir: run.work_dir.clone(),
    };
    let output = ctx.compositor.composite(&request).await?;

    let stored = ctx
        .assets
        .upload_file(&run.keys.composite(), &output.path, "video/mp4")
        .await?;
    run.logger.log_progress(&format!(
        "Composite rendered: {:.2}s in {:.1}s",
        output.info.duration, output.render_secs
    ));
    run.composite = Some(output);
    Ok(StageOutput::new(vec![stored]))
}
