//! `audio_mixing`: narration and music onto the composite, then the
//! master, its platform exports and a thumbnail.

use std::collections::HashMap;
use std::path::PathBuf;

use saiad_adapters::{MusicRequest, SpeechRequest};
use saiad_media::RenderOutput;
use saiad_models::{ArtifactRef, ExportVariant, Scene, StageName, VideoArtifact};
use tracing::warn;

use crate::context::{JobRun, PipelineContext};
use crate::error::{WorkerError, WorkerResult};
use crate::stages::{fan_out, StageOutput};

const STAGE: StageName = StageName::AudioMixing;
/// Narration fills the first half of the stage; mixing and exports the rest.
const NARRATION_SPAN: u8 = STAGE.weight() / 2;

pub async fn run(ctx: &PipelineContext, run: &mut JobRun) -> WorkerResult<StageOutput> {
    let composite = run
        .composite
        .clone()
        .ok_or_else(|| WorkerError::missing_asset("composite render"))?;
    let mut artifacts = Vec::new();

    let narration = narrate(ctx, run).await?;
    let mut narration_files = HashMap::with_capacity(narration.len());
    for (index, path, stored) in narration {
        narration_files.insert(index, path);
        artifacts.push(stored);
    }

    let music = match select_music(ctx, run).await? {
        Some((path, stored)) => {
            artifacts.push(stored);
            Some(path)
        }
        None => None,
    };

    ctx.tracker
        .record_progress(&run.job_id, STAGE.progress_floor() + NARRATION_SPAN, "Mixing audio")
        .await?;
    let master = ctx
        .compositor
        .mix_audio(&saiad_media::AudioMixRequest {
            composite: composite.path.clone(),
            storyboard: run.storyboard.clone(),
            narration: narration_files,
            music,
            work_dir: run.work_dir.clone(),
        })
        .await?;
    let master_ref = ctx
        .assets
        .upload_file(&run.keys.master(), &master.path, "video/mp4")
        .await?;
    artifacts.push(master_ref.clone());

    ctx.tracker
        .record_progress(&run.job_id, STAGE.progress_floor() + STAGE.weight() * 3 / 4, "Exporting formats")
        .await?;
    let variants = export(ctx, run, &master).await?;
    artifacts.extend(variants.iter().map(|v| v.artifact.clone()));

    let thumbnail = thumbnail(ctx, run, &master).await;
    if let Some(thumb) = &thumbnail {
        artifacts.push(thumb.clone());
    }

    let (width, height) = run
        .config
        .aspect_ratio
        .master_resolution()
        .unwrap_or((master.info.width, master.info.height));
    run.artifact = Some(VideoArtifact {
        master: master_ref,
        duration_secs: master.info.duration,
        width,
        height,
        aspect_ratio: run.config.aspect_ratio,
        file_size: master.info.size,
        render_time_secs: composite.render_secs + master.render_secs,
        thumbnail,
        variants,
    });
    Ok(StageOutput::new(artifacts))
}

/// Speech for every scene with narration text, stored and copied locally.
async fn narrate(
    ctx: &PipelineContext,
    run: &JobRun,
) -> WorkerResult<Vec<(u32, PathBuf, ArtifactRef)>> {
    if !run.config.include_narration {
        return Ok(Vec::new());
    }
    let scenes: Vec<Scene> = run
        .storyboard
        .scenes
        .iter()
        .filter(|s| s.has_narration())
        .cloned()
        .collect();
    if scenes.is_empty() {
        return Ok(Vec::new());
    }

    fan_out(
        ctx,
        &run.job_id,
        STAGE,
        NARRATION_SPAN,
        "Recording narration",
        scenes,
        |scene| speak(ctx, run, scene),
    )
    .await
}

async fn speak(
    ctx: &PipelineContext,
    run: &JobRun,
    scene: Scene,
) -> WorkerResult<(u32, PathBuf, ArtifactRef)> {
    let request = SpeechRequest {
        text: scene.narration.trim().to_string(),
        voice: run.config.voice.clone(),
        language: run.config.language.clone(),
        options: ctx.call_options(&run.job_id, STAGE, &format!("narration-{}", scene.index)),
    };

    let adapters = &ctx.adapters;
    let assets = &ctx.assets;
    let keys = &run.keys;
    let request = &request;
    let index = scene.index;
    let stored = ctx
        .with_retry("synthesize_speech", move || async move {
            let generated = adapters.synthesize_speech(request).await?;
            let key = keys.scene_narration(index, generated.asset.content_type());
            let stored = assets.persist(&key, &generated).await?;
            Ok::<_, WorkerError>(stored)
        })
        .await?;

    let path = ctx
        .assets
        .materialize(&stored.key, &run.work_dir.join("narration"), &format!("scene_{:02}", index))
        .await?;
    Ok((index, path, stored))
}

async fn select_music(
    ctx: &PipelineContext,
    run: &JobRun,
) -> WorkerResult<Option<(PathBuf, ArtifactRef)>> {
    if !run.config.music_enabled() {
        return Ok(None);
    }
    let request = MusicRequest {
        category: run.config.product.category.clone(),
        selection: run.config.music.clone(),
        duration_secs: run.config.target_duration_secs,
        options: ctx.call_options(&run.job_id, STAGE, "music"),
    };

    let adapters = &ctx.adapters;
    let assets = &ctx.assets;
    let keys = &run.keys;
    let request = &request;
    let stored = ctx
        .with_retry("generate_or_select_music", move || async move {
            let generated = adapters.generate_or_select_music(request).await?;
            let key = keys.music(generated.asset.content_type());
            let stored = assets.persist(&key, &generated).await?;
            Ok::<_, WorkerError>(stored)
        })
        .await?;

    let path = ctx.assets.materialize(&stored.key, &run.work_dir, "music").await?;
    Ok(Some((path, stored)))
}

/// Transcode every requested profile from the master and store it.
async fn export(
    ctx: &PipelineContext,
    run: &JobRun,
    master: &RenderOutput,
) -> WorkerResult<Vec<ExportVariant>> {
    let profiles = run.config.export_profiles();
    let rendered = ctx
        .compositor
        .export_variants(master, &profiles, &run.work_dir.join("exports"))
        .await?;

    let mut variants = Vec::with_capacity(rendered.len());
    for variant in rendered {
        let spec = variant.profile.spec();
        let stored = ctx
            .assets
            .upload_file(&run.keys.export(variant.profile), &variant.path, "video/mp4")
            .await?;
        variants.push(ExportVariant {
            profile: variant.profile,
            aspect_ratio: spec.aspect_ratio,
            width: spec.width,
            height: spec.height,
            duration_secs: variant.info.duration,
            file_size: variant.info.size,
            artifact: stored,
        });
    }
    Ok(variants)
}

/// A missing thumbnail never fails the job.
async fn thumbnail(
    ctx: &PipelineContext,
    run: &JobRun,
    master: &RenderOutput,
) -> Option<ArtifactRef> {
    let path = run.work_dir.join("thumbnail.jpg");
    let result = async {
        ctx.compositor.extract_thumbnail(master, &path).await?;
        ctx.assets
            .upload_file(&run.keys.thumbnail(), &path, "image/jpeg")
            .await
    }
    .await;

    match result {
        Ok(stored) => Some(stored),
        Err(e) => {
            warn!(job_id = %run.job_id, error = %e, "Thumbnail extraction failed");
            None
        }
    }
}
