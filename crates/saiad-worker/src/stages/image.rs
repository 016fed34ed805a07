//! `image_processing`: one still per scene.
//!
//! Scenes that already carry a visual keep it; a remote URL is copied into
//! storage so later stages only deal with storage keys. Stored visuals must
//! belong to the job or to the shared uploads area.

use saiad_adapters::{default_visual_prompt, VisualRequest};
use saiad_models::{ArtifactRef, Scene, StageName, VisualKind, VisualSource};

use crate::assets::{content_type_from_url, is_remote};
use crate::context::{JobRun, PipelineContext};
use crate::error::{WorkerError, WorkerResult};
use crate::stages::{fan_out, StageOutput};

const STAGE: StageName = StageName::ImageProcessing;

pub async fn run(ctx: &PipelineContext, run: &JobRun) -> WorkerResult<StageOutput> {
    let scenes = run.storyboard.scenes.clone();

    let resolved = fan_out(
        ctx,
        &run.job_id,
        STAGE,
        STAGE.weight(),
        "Generating visuals",
        scenes,
        |scene| resolve_scene(ctx, run, scene),
    )
    .await?;

    let mut storyboard = run.storyboard.clone();
    let mut artifacts = Vec::with_capacity(resolved.len());
    for (index, source, stored) in resolved {
        if let Some(scene) = storyboard.scene_mut(index) {
            scene.visual_source = Some(source);
        }
        artifacts.push(stored);
    }

    Ok(StageOutput::new(artifacts).with_storyboard(storyboard))
}

async fn resolve_scene(
    ctx: &PipelineContext,
    run: &JobRun,
    scene: Scene,
) -> WorkerResult<(u32, VisualSource, ArtifactRef)> {
    match scene.visual_source.clone() {
        Some(source) => adopt(ctx, run, scene.index, source).await,
        None => generate(ctx, run, &scene).await,
    }
}

/// Take over a visual the request supplied.
async fn adopt(
    ctx: &PipelineContext,
    run: &JobRun,
    index: u32,
    source: VisualSource,
) -> WorkerResult<(u32, VisualSource, ArtifactRef)> {
    if !is_remote(&source.uri) {
        if !run.keys.may_adopt(&source.uri) {
            return Err(WorkerError::asset_rejected(format!(
                "scene {} visual {} is outside this job's storage",
                index, source.uri
            )));
        }
        let store = ctx.assets.store();
        if !store.exists(&source.uri).await? {
            return Err(WorkerError::missing_asset(format!(
                "scene {} visual {}",
                index, source.uri
            )));
        }
        let stored = ArtifactRef {
            key: source.uri.clone(),
            uri: source.uri.clone(),
            content_type: content_type_from_url(&source.uri).to_string(),
            size_bytes: None,
        };
        return Ok((index, source, stored));
    }

    let assets = &ctx.assets;
    let url = source.uri.as_str();
    let (bytes, content_type) = ctx
        .with_retry("download_visual", move || async move { assets.download(url).await })
        .await?;
    let content_type = content_type
        .filter(|ct| ct.starts_with("image/") || ct.starts_with("video/"))
        .unwrap_or_else(|| content_type_from_url(url).to_string());

    let key = match source.kind {
        VisualKind::Image => run.keys.scene_image(index, &content_type),
        VisualKind::Video => run.keys.scene_clip(index),
    };
    let stored = assets.store().put_bytes(&key, bytes, &content_type).await?;
    let adopted = VisualSource {
        kind: source.kind,
        uri: stored.key.clone(),
    };
    Ok((index, adopted, stored))
}

async fn generate(
    ctx: &PipelineContext,
    run: &JobRun,
    scene: &Scene,
) -> WorkerResult<(u32, VisualSource, ArtifactRef)> {
    let prompt = scene.visual_prompt.clone().unwrap_or_else(|| {
        default_visual_prompt(&run.config.product, run.config.tone, scene.overlay.as_deref())
    });
    let request = VisualRequest {
        prompt,
        aspect_ratio: run.config.aspect_ratio,
        options: ctx.call_options(&run.job_id, STAGE, &format!("scene-{}", scene.index)),
    };

    let adapters = &ctx.adapters;
    let assets = &ctx.assets;
    let keys = &run.keys;
    let request = &request;
    let index = scene.index;
    let stored = ctx
        .with_retry("generate_visual", move || async move {
            let generated = adapters.generate_visual(request).await?;
            let key = keys.scene_image(index, generated.asset.content_type());
            let stored = assets.persist(&key, &generated).await?;
            Ok::<_, WorkerError>(stored)
        })
        .await?;

    Ok((index, VisualSource::image(stored.key.clone()), stored))
}
