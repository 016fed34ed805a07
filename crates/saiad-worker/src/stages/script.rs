//! `script_processing`: fill in narration, on-screen text and visual prompts.

use saiad_adapters::{default_visual_prompt, ScriptDraft, ScriptRequest};
use saiad_models::{StageName, Storyboard};

use crate::context::{JobRun, PipelineContext};
use crate::error::{WorkerError, WorkerResult};
use crate::stages::StageOutput;

const STAGE: StageName = StageName::ScriptProcessing;

pub async fn run(ctx: &PipelineContext, run: &JobRun) -> WorkerResult<StageOutput> {
    let config = &run.config;
    let request = ScriptRequest {
        product: config.product.clone(),
        tone: config.tone,
        language: config.language.clone(),
        duration_secs: config.target_duration_secs,
        scene_durations: run.storyboard.scenes.iter().map(|s| s.duration_secs).collect(),
        template_id: config.template_id.clone(),
        options: ctx.call_options(&run.job_id, STAGE, "script"),
    };

    let adapters = &ctx.adapters;
    let request = &request;
    let draft = ctx
        .with_retry("generate_script", move || async move {
            adapters
                .generate_script(request)
                .await
                .map_err(WorkerError::from)
        })
        .await?;
    run.logger
        .log_progress(&format!("Script written by {}", draft.vendor));

    let mut storyboard = run.storyboard.clone();
    apply_draft(&mut storyboard, &draft, run);

    let payload = serde_json::to_vec_pretty(&draft)?;
    let stored = ctx
        .assets
        .store()
        .put_bytes(&run.keys.script(), payload, "application/json")
        .await?;

    Ok(StageOutput::new(vec![stored]).with_storyboard(storyboard))
}

/// Fill whatever the request left empty. User-written text always wins.
fn apply_draft(storyboard: &mut Storyboard, draft: &ScriptDraft, run: &JobRun) {
    let product = &run.config.product;
    let tone = run.config.tone;

    for scene in &mut storyboard.scenes {
        let written = draft.scene(scene.index);

        if scene.narration.trim().is_empty() {
            if let Some(text) = written.map(|w| w.narration.trim()).filter(|t| !t.is_empty()) {
                scene.narration = text.to_string();
            }
        }
        if scene.overlay.is_none() {
            scene.overlay = written
                .and_then(|w| w.overlay.clone())
                .filter(|t| !t.trim().is_empty());
        }
        if scene.visual_prompt.is_none() {
            let prompt = written
                .and_then(|w| w.visual_prompt.clone())
                .filter(|p| !p.trim().is_empty())
                .unwrap_or_else(|| default_visual_prompt(product, tone, scene.overlay.as_deref()));
            scene.visual_prompt = Some(prompt);
        }
    }

    let copy = &mut storyboard.copy;
    if copy.headline.is_none() && !draft.headline.trim().is_empty() {
        copy.headline = Some(draft.headline.trim().to_string());
    }
    if copy.subline.is_none() && !draft.subline.trim().is_empty() {
        copy.subline = Some(draft.subline.trim().to_string());
    }
    if copy.cta.is_none() && !draft.cta.trim().is_empty() {
        copy.cta = Some(draft.cta.trim().to_string());
    }
}
