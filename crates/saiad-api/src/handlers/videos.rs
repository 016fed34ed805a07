//! Video generation handlers: submit, status, cancel and download.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::info;

use saiad_models::{
    ArtifactRef, CancelOutcome, ExportProfile, GenerateVideoRequest, GenerationJob, JobFailure, JobId,
    JobStatus, StageName, StageStatus, VideoArtifact,
};

use crate::error::{ApiError, ApiResult};
use crate::state::AppState;

/// Header carrying the client's deduplication key.
pub const IDEMPOTENCY_KEY_HEADER: &str = "Idempotency-Key";

/// Seconds a full run takes at 100% remaining work.
const FULL_RUN_ESTIMATE_SECS: f64 = 180.0;

/// Response to a Submit call.
#[derive(Debug, Serialize)]
pub struct GenerateVideoResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    pub estimated_time_secs: u64,
}

/// Rough wall-clock estimate for a fresh job.
pub fn estimated_time_secs(target_duration_secs: f64) -> u64 {
    (60.0 + 4.0 * target_duration_secs).round().max(0.0) as u64
}

/// Remaining time from the weights of stages that have not completed.
pub fn estimated_remaining_secs(job: &GenerationJob) -> u64 {
    if job.is_terminal() {
        return 0;
    }
    let remaining_weight: u32 = job
        .stages
        .iter()
        .filter(|s| s.status != StageStatus::Completed)
        .map(|s| s.stage.weight() as u32)
        .sum();
    (remaining_weight as f64 / 100.0 * FULL_RUN_ESTIMATE_SECS).round() as u64
}

/// POST /api/v1/videos/generate
pub async fn generate_video(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Result<Json<GenerateVideoRequest>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<GenerateVideoResponse>)> {
    let Json(request) = body.map_err(|rejection| ApiError::validation(rejection.body_text()))?;

    let header_key = headers
        .get(IDEMPOTENCY_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty());

    let submission = state.intake.submit(request, header_key).await?;
    let job = submission.job;

    info!(
        job_id = %job.id,
        created = submission.created,
        "Generate request accepted"
    );

    Ok((
        StatusCode::ACCEPTED,
        Json(GenerateVideoResponse {
            estimated_time_secs: estimated_time_secs(job.config.target_duration_secs),
            job_id: job.id,
            status: job.status,
        }),
    ))
}

/// One row of the per-stage breakdown.
#[derive(Debug, Serialize)]
pub struct StageView {
    pub stage: StageName,
    pub label: &'static str,
    pub weight: u8,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

/// Pollable job snapshot.
#[derive(Debug, Serialize)]
pub struct JobStatusResponse {
    pub job_id: JobId,
    pub project_id: String,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_step: Option<StageName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub stages: Vec<StageView>,
    pub estimated_remaining_secs: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<VideoArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    pub cancel_requested: bool,
    pub is_stale: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl JobStatusResponse {
    fn from_job(job: GenerationJob, stale_threshold: chrono::Duration) -> Self {
        let estimated_remaining_secs = estimated_remaining_secs(&job);
        let is_stale = job.is_stale(Utc::now(), stale_threshold);
        let stages = job
            .stages
            .iter()
            .map(|s| StageView {
                stage: s.stage,
                label: s.stage.label(),
                weight: s.stage.weight(),
                status: s.status,
                started_at: s.started_at,
                completed_at: s.completed_at,
                error: s.error.clone(),
            })
            .collect();

        Self {
            job_id: job.id,
            project_id: job.project_id,
            status: job.status,
            progress: job.progress,
            current_step: job.current_stage,
            message: job.message,
            stages,
            estimated_remaining_secs,
            artifact: job.artifact,
            error: job.failure,
            cancel_requested: job.cancel_requested,
            is_stale,
            created_at: job.created_at,
            updated_at: job.updated_at,
        }
    }
}

async fn load_job(state: &AppState, job_id: &JobId) -> ApiResult<GenerationJob> {
    state
        .tracker
        .get_status(job_id)
        .await?
        .ok_or_else(|| ApiError::not_found(format!("Job {} not found", job_id)))
}

/// GET /api/v1/videos/:job_id/status
pub async fn get_job_status(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<JobStatusResponse>> {
    let job = load_job(&state, &JobId::from_string(job_id)).await?;
    let threshold = chrono::Duration::from_std(state.config.stale_threshold)
        .unwrap_or_else(|_| chrono::Duration::minutes(30));
    Ok(Json(JobStatusResponse::from_job(job, threshold)))
}

/// Response to a cancel request.
#[derive(Debug, Serialize)]
pub struct CancelResponse {
    pub job_id: JobId,
    pub status: JobStatus,
    /// True when the job is already failed; false when the worker still has to stop
    pub cancelled: bool,
    pub message: String,
}

/// POST /api/v1/videos/:job_id/cancel
pub async fn cancel_job(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
) -> ApiResult<Json<CancelResponse>> {
    let job_id = JobId::from_string(job_id);
    let existing = load_job(&state, &job_id).await?;
    if existing.is_terminal() {
        return Err(ApiError::conflict(format!(
            "Job {} is already {}",
            job_id, existing.status
        )));
    }

    let (job, outcome) = state.tracker.request_cancel(&job_id).await?;
    let (cancelled, message) = match outcome {
        CancelOutcome::Finalized => (true, "Job cancelled"),
        CancelOutcome::Flagged => (false, "Cancellation requested; the job stops after the current stage"),
    };

    Ok(Json(CancelResponse {
        job_id: job.id,
        status: job.status,
        cancelled,
        message: message.to_string(),
    }))
}

/// Download query parameters.
#[derive(Debug, Deserialize)]
pub struct DownloadQuery {
    /// Export profile name, or `master`. Defaults to the variant for the
    /// master's aspect ratio.
    #[serde(default)]
    pub format: Option<String>,
}

/// Presigned download link.
#[derive(Debug, Serialize)]
pub struct DownloadResponse {
    pub job_id: JobId,
    pub format: String,
    pub url: String,
    pub expires_in_secs: u64,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// GET /api/v1/videos/:job_id/download?format=...
pub async fn get_download_url(
    State(state): State<AppState>,
    Path(job_id): Path<String>,
    Query(query): Query<DownloadQuery>,
) -> ApiResult<Json<DownloadResponse>> {
    let job_id = JobId::from_string(job_id);
    let job = load_job(&state, &job_id).await?;

    if job.status != JobStatus::Completed {
        return Err(ApiError::conflict(format!(
            "Job {} is {}, not completed",
            job_id, job.status
        )));
    }
    let artifact = job
        .artifact
        .ok_or_else(|| ApiError::internal(format!("Completed job {} has no artifact", job_id)))?;

    let requested = query
        .format
        .map(|f| f.trim().to_lowercase())
        .filter(|f| !f.is_empty());
    let (format, reference) = match requested {
        Some(format) => {
            let reference = select_reference(&artifact, &format, &job_id)?;
            (format, reference)
        }
        None => match artifact.default_variant() {
            Some(variant) => (variant.profile.as_str().to_string(), variant.artifact.clone()),
            None => ("master".to_string(), artifact.master.clone()),
        },
    };

    let url = state
        .storage
        .presign_get(&reference.key, state.config.download_url_ttl)
        .await?;

    Ok(Json(DownloadResponse {
        job_id,
        format,
        url,
        expires_in_secs: state.config.download_url_ttl.as_secs(),
        content_type: reference.content_type,
        size_bytes: reference.size_bytes,
    }))
}

/// Stored object for an explicit `format`.
fn select_reference(
    artifact: &VideoArtifact,
    format: &str,
    job_id: &JobId,
) -> ApiResult<ArtifactRef> {
    if format == "master" {
        return Ok(artifact.master.clone());
    }
    let profile: ExportProfile = format
        .parse()
        .map_err(|e: saiad_models::ExportProfileParseError| ApiError::bad_request(e.to_string()))?;
    artifact
        .variant(profile)
        .map(|v| v.artifact.clone())
        .ok_or_else(|| {
            ApiError::not_found(format!("Format {} was not produced for job {}", profile, job_id))
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use saiad_models::{AspectRatio, GenerationConfig, ProductRef, Scene, Storyboard};

    #[test]
    fn test_estimated_time_scales_with_duration() {
        assert_eq!(estimated_time_secs(30.0), 180);
        assert_eq!(estimated_time_secs(5.0), 80);
    }

    #[test]
    fn test_estimated_remaining_drops_as_stages_complete() {
        let mut job = GenerationJob::new(
            "proj",
            "key",
            GenerationConfig::new(ProductRef::new("p"), 30.0, AspectRatio::LANDSCAPE),
            Storyboard::new(vec![Scene::new(1, 30.0)]),
        );
        assert_eq!(estimated_remaining_secs(&job), 180);

        job.start().unwrap();
        job.begin_stage(StageName::ScriptProcessing).unwrap();
        job.complete_stage(StageName::ScriptProcessing, Vec::new()).unwrap();
        job.begin_stage(StageName::ImageProcessing).unwrap();
        job.complete_stage(StageName::ImageProcessing, Vec::new()).unwrap();
        // 80 weight left
        assert_eq!(estimated_remaining_secs(&job), 144);

        job.request_cancel().unwrap();
        job.finalize(saiad_models::JobOutcome::Failed(JobFailure::cancelled()))
            .unwrap();
        assert_eq!(estimated_remaining_secs(&job), 0);
    }
}
