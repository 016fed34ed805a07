//! Generation job record and its state transitions.
//!
//! Every mutation goes through a method here so that the forward-only
//! status rules, stage ordering and progress monotonicity hold no matter
//! which store persists the record.

use chrono::{DateTime, Duration, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;
use uuid::Uuid;

use crate::{
    ArtifactRef, GenerationConfig, JobFailure, StageName, StageResult, StageStatus, Storyboard,
    VideoArtifact,
};

/// Unique identifier for a job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(transparent)]
pub struct JobId(pub String);

impl JobId {
    /// Generate a new random job ID.
    pub fn new() -> Self {
        Self(Uuid::new_v4().to_string())
    }

    /// Create from an existing string.
    pub fn from_string(s: impl Into<String>) -> Self {
        Self(s.into())
    }

    /// Get the inner string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for JobId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Overall job status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum JobStatus {
    /// Waiting for a worker
    #[default]
    Queued,
    /// Owned by a worker
    Processing,
    Completed,
    Failed,
}

impl JobStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            JobStatus::Queued => "queued",
            JobStatus::Processing => "processing",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Completed | JobStatus::Failed)
    }
}

impl fmt::Display for JobStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Rejected job mutation. The record is left untouched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum TransitionError {
    #[error("job is already {0}")]
    Terminal(JobStatus),

    #[error("job has a pending cancel request")]
    CancelRequested,

    #[error("job cannot move from {from} to {to}")]
    Status { from: JobStatus, to: JobStatus },

    #[error("stage {stage} cannot move from {from} to {to}")]
    Stage {
        stage: StageName,
        from: StageStatus,
        to: StageStatus,
    },

    #[error("stage {stage} cannot start before {blocked_by} completes")]
    StageOrder {
        stage: StageName,
        blocked_by: StageName,
    },
}

/// One `update_stage` request.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StageUpdate {
    pub stage: StageName,
    pub status: StageStatus,
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
    /// Storyboard as resolved by the stage, saved with the completion
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub storyboard: Option<Storyboard>,
}

impl StageUpdate {
    pub fn started(stage: StageName) -> Self {
        Self {
            stage,
            status: StageStatus::InProgress,
            artifacts: Vec::new(),
            error: None,
            storyboard: None,
        }
    }

    pub fn completed(stage: StageName, artifacts: Vec<ArtifactRef>) -> Self {
        Self {
            stage,
            status: StageStatus::Completed,
            artifacts,
            error: None,
            storyboard: None,
        }
    }

    pub fn with_storyboard(mut self, storyboard: Storyboard) -> Self {
        self.storyboard = Some(storyboard);
        self
    }

    pub fn failed(stage: StageName, error: JobFailure) -> Self {
        Self {
            stage,
            status: StageStatus::Failed,
            artifacts: Vec::new(),
            error: Some(error),
            storyboard: None,
        }
    }
}

/// Terminal outcome passed to `finalize`.
#[derive(Debug, Clone, PartialEq)]
pub enum JobOutcome {
    Completed(VideoArtifact),
    Failed(JobFailure),
}

/// Result of a cancel request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Queued job failed immediately
    Finalized,
    /// Processing job flagged; the worker stops at the next stage boundary
    Flagged,
}

/// One end-to-end request to produce a video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct GenerationJob {
    pub id: JobId,
    pub project_id: String,
    pub idempotency_key: String,
    pub config: GenerationConfig,
    pub storyboard: Storyboard,

    pub status: JobStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<StageName>,
    /// Overall progress (0-100), never decreases
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    /// One entry per stage, in execution order
    pub stages: Vec<StageResult>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<VideoArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,

    #[serde(default)]
    pub cancel_requested: bool,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finished_at: Option<DateTime<Utc>>,

    /// Bumped on every write; stores compare-and-swap on it
    #[serde(default)]
    pub revision: u64,
}

impl GenerationJob {
    pub fn new(
        project_id: impl Into<String>,
        idempotency_key: impl Into<String>,
        config: GenerationConfig,
        storyboard: Storyboard,
    ) -> Self {
        let now = Utc::now();
        Self {
            id: JobId::new(),
            project_id: project_id.into(),
            idempotency_key: idempotency_key.into(),
            config,
            storyboard,
            status: JobStatus::Queued,
            current_stage: None,
            progress: 0,
            message: Some("Queued".to_string()),
            stages: StageName::ALL.iter().map(|s| StageResult::pending(*s)).collect(),
            artifact: None,
            failure: None,
            cancel_requested: false,
            created_at: now,
            updated_at: now,
            started_at: None,
            finished_at: None,
            revision: 0,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn stage(&self, stage: StageName) -> &StageResult {
        &self.stages[stage.position()]
    }

    /// No update for longer than `threshold`.
    pub fn is_stale(&self, now: DateTime<Utc>, threshold: Duration) -> bool {
        !self.is_terminal() && now - self.updated_at > threshold
    }

    /// Credits owed for the stages that completed.
    pub fn credits_consumed(&self) -> u32 {
        self.stages
            .iter()
            .filter(|s| s.status == StageStatus::Completed)
            .map(|s| s.stage.credit_cost())
            .sum()
    }

    /// Whether stage ordering holds: nothing past the first non-completed
    /// stage is in progress or completed.
    pub fn stage_order_holds(&self) -> bool {
        let mut seen_open = false;
        for result in &self.stages {
            if seen_open && matches!(result.status, StageStatus::InProgress | StageStatus::Completed)
            {
                return false;
            }
            if result.status != StageStatus::Completed {
                seen_open = true;
            }
        }
        true
    }

    fn touch(&mut self) {
        self.updated_at = Utc::now();
        self.revision += 1;
    }

    fn ensure_not_terminal(&self) -> Result<(), TransitionError> {
        if self.is_terminal() {
            return Err(TransitionError::Terminal(self.status));
        }
        Ok(())
    }

    fn ensure_processing(&self) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        if self.status != JobStatus::Processing {
            return Err(TransitionError::Status {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        Ok(())
    }

    fn raise_progress(&mut self, progress: u8) {
        // 100 is reserved for completion.
        self.progress = self.progress.max(progress.min(99));
    }

    /// `queued -> processing`.
    pub fn start(&mut self) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        if self.status != JobStatus::Queued {
            return Err(TransitionError::Status {
                from: self.status,
                to: JobStatus::Processing,
            });
        }
        let now = Utc::now();
        self.status = JobStatus::Processing;
        self.started_at = Some(now);
        self.message = Some("Starting".to_string());
        self.touch();
        Ok(())
    }

    /// `pending -> in_progress`; every earlier stage must be completed.
    pub fn begin_stage(&mut self, stage: StageName) -> Result<(), TransitionError> {
        self.ensure_processing()?;

        if let Some(blocked_by) = StageName::ALL[..stage.position()]
            .iter()
            .find(|s| self.stage(**s).status != StageStatus::Completed)
        {
            return Err(TransitionError::StageOrder {
                stage,
                blocked_by: *blocked_by,
            });
        }

        let current = self.stage(stage).status;
        if current != StageStatus::Pending {
            return Err(TransitionError::Stage {
                stage,
                from: current,
                to: StageStatus::InProgress,
            });
        }

        let result = &mut self.stages[stage.position()];
        result.status = StageStatus::InProgress;
        result.started_at = Some(Utc::now());
        self.current_stage = Some(stage);
        self.message = Some(stage.label().to_string());
        self.raise_progress(stage.progress_floor());
        self.touch();
        Ok(())
    }

    /// `in_progress -> completed`, recording the stage's artifacts.
    ///
    /// Refused once a cancel is pending: the stage's results are dropped.
    pub fn complete_stage(
        &mut self,
        stage: StageName,
        artifacts: Vec<ArtifactRef>,
    ) -> Result<(), TransitionError> {
        self.ensure_processing()?;
        if self.cancel_requested {
            return Err(TransitionError::CancelRequested);
        }
        let current = self.stage(stage).status;
        if current != StageStatus::InProgress {
            return Err(TransitionError::Stage {
                stage,
                from: current,
                to: StageStatus::Completed,
            });
        }

        let result = &mut self.stages[stage.position()];
        result.status = StageStatus::Completed;
        result.completed_at = Some(Utc::now());
        result.artifacts = artifacts;
        self.raise_progress(stage.progress_floor() + stage.weight());
        self.touch();
        Ok(())
    }

    /// `in_progress -> failed`. The job itself fails through `finalize`.
    pub fn fail_stage(
        &mut self,
        stage: StageName,
        error: JobFailure,
    ) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        let current = self.stage(stage).status;
        if current != StageStatus::InProgress {
            return Err(TransitionError::Stage {
                stage,
                from: current,
                to: StageStatus::Failed,
            });
        }

        let result = &mut self.stages[stage.position()];
        result.status = StageStatus::Failed;
        result.completed_at = Some(Utc::now());
        result.error = Some(error);
        self.touch();
        Ok(())
    }

    /// Apply an `update_stage` request.
    pub fn apply_stage_update(&mut self, update: StageUpdate) -> Result<(), TransitionError> {
        match update.status {
            StageStatus::InProgress => self.begin_stage(update.stage),
            StageStatus::Completed => {
                self.complete_stage(update.stage, update.artifacts)?;
                // Timing is owned by the request; stages only resolve content.
                if let Some(storyboard) = update.storyboard {
                    self.storyboard = storyboard;
                }
                Ok(())
            }
            StageStatus::Failed => {
                let error = update.error.unwrap_or_else(|| {
                    JobFailure::new(crate::ErrorCode::Internal, "stage failed")
                        .at_stage(update.stage)
                });
                self.fail_stage(update.stage, error)
            }
            StageStatus::Pending => Err(TransitionError::Stage {
                stage: update.stage,
                from: self.stage(update.stage).status,
                to: StageStatus::Pending,
            }),
        }
    }

    /// Progress within the running stage. Lower values are ignored.
    pub fn record_progress(
        &mut self,
        progress: u8,
        message: impl Into<String>,
    ) -> Result<(), TransitionError> {
        self.ensure_processing()?;
        self.raise_progress(progress);
        self.message = Some(message.into());
        self.touch();
        Ok(())
    }

    /// Cancel: a queued job fails at once, a processing job is flagged.
    pub fn request_cancel(&mut self) -> Result<CancelOutcome, TransitionError> {
        self.ensure_not_terminal()?;
        match self.status {
            JobStatus::Queued => {
                self.finalize(JobOutcome::Failed(JobFailure::cancelled()))?;
                Ok(CancelOutcome::Finalized)
            }
            _ => {
                if !self.cancel_requested {
                    self.cancel_requested = true;
                    self.message = Some("Cancelling".to_string());
                    self.touch();
                }
                Ok(CancelOutcome::Flagged)
            }
        }
    }

    /// Move to a terminal status.
    pub fn finalize(&mut self, outcome: JobOutcome) -> Result<(), TransitionError> {
        self.ensure_not_terminal()?;
        let now = Utc::now();

        match outcome {
            JobOutcome::Completed(artifact) => {
                if self.status != JobStatus::Processing {
                    return Err(TransitionError::Status {
                        from: self.status,
                        to: JobStatus::Completed,
                    });
                }
                if let Some(open) = self
                    .stages
                    .iter()
                    .find(|s| s.status != StageStatus::Completed)
                {
                    return Err(TransitionError::Stage {
                        stage: open.stage,
                        from: open.status,
                        to: StageStatus::Completed,
                    });
                }
                self.status = JobStatus::Completed;
                self.progress = 100;
                self.artifact = Some(artifact);
                self.message = Some("Completed".to_string());
            }
            JobOutcome::Failed(failure) => {
                for result in &mut self.stages {
                    if result.status == StageStatus::InProgress {
                        result.status = StageStatus::Failed;
                        result.completed_at = Some(now);
                        result.error = Some(failure.clone());
                    }
                }
                self.status = JobStatus::Failed;
                self.message = Some(failure.message.clone());
                self.failure = Some(failure);
            }
        }

        self.finished_at = Some(now);
        self.touch();
        Ok(())
    }
}

/// Progress within a fanned-out stage after `done` of `total` calls resolved.
///
/// The fan-out covers the first `span` points of the stage's weight, so a
/// stage with work after its fan-out leaves room for it.
pub fn fan_out_progress(stage: StageName, span: u8, done: usize, total: usize) -> u8 {
    if total == 0 {
        return stage.progress_floor();
    }
    let span = span.min(stage.weight()) as usize;
    let share = (span * done.min(total)) / total;
    stage.progress_floor() + share as u8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AspectRatio, ErrorCode, ProductRef, Scene};

    fn job() -> GenerationJob {
        let config = GenerationConfig::new(
            ProductRef::new("galaxy-s25-ultra"),
            30.0,
            AspectRatio::LANDSCAPE,
        );
        let storyboard = Storyboard::new(vec![Scene::new(1, 15.0), Scene::new(2, 15.0)]);
        GenerationJob::new("proj", "key-1", config, storyboard)
    }

    fn artifact() -> VideoArtifact {
        VideoArtifact {
            master: ArtifactRef {
                key: "jobs/x/master.mp4".into(),
                uri: "file:///tmp/master.mp4".into(),
                content_type: "video/mp4".into(),
                size_bytes: Some(10),
            },
            duration_secs: 30.0,
            width: 1920,
            height: 1080,
            aspect_ratio: AspectRatio::LANDSCAPE,
            file_size: 10,
            render_time_secs: 1.0,
            thumbnail: None,
            variants: Vec::new(),
        }
    }

    #[test]
    fn test_new_job_has_all_stages_pending() {
        let job = job();
        assert_eq!(job.status, JobStatus::Queued);
        assert_eq!(job.stages.len(), 5);
        assert!(job.stages.iter().all(|s| s.status == StageStatus::Pending));
    }

    #[test]
    fn test_full_lifecycle() {
        let mut job = job();
        job.start().unwrap();
        let mut last_progress = job.progress;
        for stage in StageName::ALL {
            job.begin_stage(stage).unwrap();
            job.complete_stage(stage, Vec::new()).unwrap();
            assert!(job.progress >= last_progress);
            assert!(job.stage_order_holds());
            last_progress = job.progress;
        }
        assert_eq!(job.progress, 99);
        job.finalize(JobOutcome::Completed(artifact())).unwrap();
        assert_eq!(job.status, JobStatus::Completed);
        assert_eq!(job.progress, 100);
        assert_eq!(job.credits_consumed(), 10);
    }

    #[test]
    fn test_stage_cannot_skip_ahead() {
        let mut job = job();
        job.start().unwrap();
        let err = job.begin_stage(StageName::VideoGeneration).unwrap_err();
        assert_eq!(
            err,
            TransitionError::StageOrder {
                stage: StageName::VideoGeneration,
                blocked_by: StageName::ScriptProcessing,
            }
        );
    }

    #[test]
    fn test_stage_requires_processing() {
        let mut job = job();
        assert!(job.begin_stage(StageName::ScriptProcessing).is_err());
    }

    #[test]
    fn test_terminal_job_is_immutable() {
        let mut job = job();
        job.start().unwrap();
        job.finalize(JobOutcome::Failed(JobFailure::new(ErrorCode::Timeout, "t")))
            .unwrap();
        let snapshot = job.clone();
        assert_eq!(
            job.begin_stage(StageName::ScriptProcessing),
            Err(TransitionError::Terminal(JobStatus::Failed))
        );
        assert!(job.record_progress(50, "x").is_err());
        assert!(job.finalize(JobOutcome::Completed(artifact())).is_err());
        assert_eq!(job, snapshot);
    }

    #[test]
    fn test_progress_never_decreases() {
        let mut job = job();
        job.start().unwrap();
        job.record_progress(40, "a").unwrap();
        job.record_progress(10, "b").unwrap();
        assert_eq!(job.progress, 40);
        job.record_progress(100, "c").unwrap();
        assert_eq!(job.progress, 99);
    }

    #[test]
    fn test_cancel_queued_job_finalizes() {
        let mut job = job();
        assert_eq!(job.request_cancel().unwrap(), CancelOutcome::Finalized);
        assert_eq!(job.status, JobStatus::Failed);
        assert_eq!(job.failure.as_ref().unwrap().code, ErrorCode::Cancelled);
    }

    #[test]
    fn test_cancel_processing_job_flags() {
        let mut job = job();
        job.start().unwrap();
        assert_eq!(job.request_cancel().unwrap(), CancelOutcome::Flagged);
        assert!(job.cancel_requested);
        assert_eq!(job.status, JobStatus::Processing);
    }

    #[test]
    fn test_completion_after_cancel_is_refused() {
        let mut job = job();
        job.start().unwrap();
        job.begin_stage(StageName::ScriptProcessing).unwrap();
        job.request_cancel().unwrap();

        let mut resolved = job.storyboard.clone();
        resolved.scenes[0].narration = "late result".into();
        let before = job.clone();
        let err = job
            .apply_stage_update(
                StageUpdate::completed(StageName::ScriptProcessing, Vec::new())
                    .with_storyboard(resolved),
            )
            .unwrap_err();
        assert_eq!(err, TransitionError::CancelRequested);
        assert_eq!(job.storyboard, before.storyboard);
        assert_eq!(job.stage(StageName::ScriptProcessing).status, StageStatus::InProgress);
    }

    #[test]
    fn test_completion_saves_resolved_storyboard() {
        let mut job = job();
        job.start().unwrap();
        job.begin_stage(StageName::ScriptProcessing).unwrap();

        let mut resolved = job.storyboard.clone();
        resolved.scenes[0].narration = "Meet the phone".into();
        job.apply_stage_update(
            StageUpdate::completed(StageName::ScriptProcessing, Vec::new())
                .with_storyboard(resolved.clone()),
        )
        .unwrap();
        assert_eq!(job.storyboard, resolved);
        assert_eq!(job.stage(StageName::ScriptProcessing).status, StageStatus::Completed);
    }

    #[test]
    fn test_failure_marks_running_stage_failed() {
        let mut job = job();
        job.start().unwrap();
        job.begin_stage(StageName::ScriptProcessing).unwrap();
        job.complete_stage(StageName::ScriptProcessing, Vec::new()).unwrap();
        job.begin_stage(StageName::ImageProcessing).unwrap();
        job.finalize(JobOutcome::Failed(
            JobFailure::new(ErrorCode::UpstreamRejected, "policy").at_stage(StageName::ImageProcessing),
        ))
        .unwrap();
        assert_eq!(job.stage(StageName::ImageProcessing).status, StageStatus::Failed);
        assert_eq!(job.credits_consumed(), 1);
    }

    #[test]
    fn test_revision_bumps_on_write() {
        let mut job = job();
        job.start().unwrap();
        assert_eq!(job.revision, 1);
        let _ = job.begin_stage(StageName::AudioMixing);
        assert_eq!(job.revision, 1);
    }

    #[test]
    fn test_fan_out_progress() {
        let video = StageName::VideoGeneration;
        assert_eq!(fan_out_progress(StageName::ImageProcessing, 15, 0, 4), 5);
        assert_eq!(fan_out_progress(video, video.weight(), 2, 4), 42);
        assert_eq!(fan_out_progress(video, video.weight(), 4, 4), 65);
        // A span wider than the stage is clamped to it.
        assert_eq!(fan_out_progress(video, 200, 4, 4), 65);
    }

    #[test]
    fn test_partial_fan_out_stops_at_its_span() {
        let audio = StageName::AudioMixing;
        let half = audio.weight() / 2;
        assert_eq!(fan_out_progress(audio, half, 3, 3), audio.progress_floor() + half);
        assert!(fan_out_progress(audio, half, 3, 3) < audio.progress_floor() + audio.weight());
    }
}
