//! Live-update message types.
//!
//! `JobEvent` is what the progress notifier publishes after every store
//! write; `WsMessage` is the client-facing projection of it.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::{ErrorCode, GenerationJob, JobFailure, JobId, JobStatus, StageName, VideoArtifact};

/// Snapshot of a job emitted after each persisted write.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct JobEvent {
    pub job_id: JobId,
    /// Store revision that produced this event; strictly increasing per job
    pub revision: u64,
    pub status: JobStatus,
    pub progress: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_stage: Option<StageName>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub artifact: Option<VideoArtifact>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<JobFailure>,
    pub timestamp: DateTime<Utc>,
}

impl JobEvent {
    pub fn from_job(job: &GenerationJob) -> Self {
        Self {
            job_id: job.id.clone(),
            revision: job.revision,
            status: job.status,
            progress: job.progress,
            current_stage: job.current_stage,
            message: job.message.clone(),
            artifact: job.artifact.clone(),
            failure: job.failure.clone(),
            timestamp: job.updated_at,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    pub fn to_ws_message(&self) -> WsMessage {
        match (&self.status, &self.artifact, &self.failure) {
            (JobStatus::Completed, Some(artifact), _) => WsMessage::Completed {
                job_id: self.job_id.clone(),
                artifact: artifact.clone(),
            },
            (JobStatus::Failed, _, failure) => {
                let failure = failure
                    .clone()
                    .unwrap_or_else(|| JobFailure::new(ErrorCode::Internal, "Job failed"));
                WsMessage::Error {
                    job_id: self.job_id.clone(),
                    code: failure.code,
                    message: failure.message,
                }
            }
            _ => WsMessage::Progress {
                job_id: self.job_id.clone(),
                progress: self.progress,
                current_step: self.current_stage,
                message: self.message.clone(),
            },
        }
    }
}

/// Message pushed to live-update subscribers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WsMessage {
    Progress {
        job_id: JobId,
        progress: u8,
        #[serde(skip_serializing_if = "Option::is_none")]
        current_step: Option<StageName>,
        #[serde(skip_serializing_if = "Option::is_none")]
        message: Option<String>,
    },

    Completed {
        job_id: JobId,
        artifact: VideoArtifact,
    },

    Error {
        job_id: JobId,
        code: ErrorCode,
        message: String,
    },
}

impl WsMessage {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, WsMessage::Progress { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{AspectRatio, GenerationConfig, ProductRef, Scene, Storyboard};

    fn job() -> GenerationJob {
        GenerationJob::new(
            "proj",
            "key",
            GenerationConfig::new(ProductRef::new("p"), 10.0, AspectRatio::SQUARE),
            Storyboard::new(vec![Scene::new(1, 10.0)]),
        )
    }

    #[test]
    fn test_progress_message_shape() {
        let mut job = job();
        job.start().unwrap();
        job.begin_stage(StageName::ScriptProcessing).unwrap();

        let msg = JobEvent::from_job(&job).to_ws_message();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "progress");
        assert_eq!(json["current_step"], "script_processing");
        assert_eq!(json["message"], "Writing script");
        assert!(!msg.is_terminal());
    }

    #[test]
    fn test_error_message_shape() {
        let mut job = job();
        job.request_cancel().unwrap();

        let msg = JobEvent::from_job(&job).to_ws_message();
        let json = serde_json::to_value(&msg).unwrap();
        assert_eq!(json["type"], "error");
        assert_eq!(json["code"], "Cancelled");
        assert!(msg.is_terminal());
    }
}
