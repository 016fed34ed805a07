//! `video_generation`: animate each still into a short clip.
//!
//! Scenes that already have a clip are left alone. With animation turned
//! off, or no clip vendor configured, the stills go straight to the
//! compositor, which loops them for the scene's duration.

use saiad_adapters::{Capability, VideoClipRequest};
use saiad_models::{ArtifactRef, Scene, StageName, VisualKind, VisualSource};

use crate::context::{JobRun, PipelineContext};
use crate::error::{WorkerError, WorkerResult};
use crate::stages::{fan_out, StageOutput};

const STAGE: StageName = StageName::VideoGeneration;

pub async fn run(ctx: &PipelineContext, run: &JobRun) -> WorkerResult<StageOutput> {
    if !ctx.config.animate_scenes || ctx.adapters.vendors(Capability::VideoClip).is_empty() {
        run.logger.log_progress("Scene animation disabled, using stills");
        return Ok(StageOutput::default());
    }

    let stills: Vec<Scene> = run
        .storyboard
        .scenes
        .iter()
        .filter(|s| matches!(&s.visual_source, Some(v) if v.kind == VisualKind::Image))
        .cloned()
        .collect();
    if stills.is_empty() {
        return Ok(StageOutput::default());
    }

    let clips = fan_out(
        ctx,
        &run.job_id,
        STAGE,
        STAGE.weight(),
        "Animating scenes",
        stills,
        |scene| animate(ctx, run, scene),
    )
    .await?;

    let mut storyboard = run.storyboard.clone();
    let mut artifacts = Vec::with_capacity(clips.len());
    for (index, stored) in clips {
        if let Some(scene) = storyboard.scene_mut(index) {
            scene.visual_source = Some(VisualSource::video(stored.key.clone()));
        }
        artifacts.push(stored);
    }

    Ok(StageOutput::new(artifacts).with_storyboard(storyboard))
}

async fn animate(
    ctx: &PipelineContext,
    run: &JobRun,
    scene: Scene,
) -> WorkerResult<(u32, ArtifactRef)> {
    let image_key = scene
        .visual_source
        .as_ref()
        .map(|v| v.uri.clone())
        .ok_or_else(|| WorkerError::missing_asset(format!("scene {} still", scene.index)))?;
    // Vendors fetch the still themselves.
    let image_url = ctx
        .assets
        .store()
        .presign_get(&image_key, ctx.config.presign_ttl)
        .await?;

    let request = VideoClipRequest {
        image_url,
        prompt: scene.visual_prompt.clone().unwrap_or_default(),
        duration_secs: scene.duration_secs,
        aspect_ratio: run.config.aspect_ratio,
        options: ctx.call_options(&run.job_id, STAGE, &format!("scene-{}", scene.index)),
    };

    let adapters = &ctx.adapters;
    let assets = &ctx.assets;
    let key = run.keys.scene_clip(scene.index);
    let key = key.as_str();
    let request = &request;
    let stored = ctx
        .with_retry("generate_video_clip", move || async move {
            let generated = adapters.generate_video_clip(request).await?;
            let stored = assets.persist(key, &generated).await?;
            Ok::<_, WorkerError>(stored)
        })
        .await?;

    Ok((scene.index, stored))
}
