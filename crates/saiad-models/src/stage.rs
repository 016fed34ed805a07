//! Pipeline stages and per-stage results.

use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::{ArtifactRef, JobFailure};

/// Pipeline stage, in canonical execution order.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum StageName {
    ScriptProcessing,
    ImageProcessing,
    VideoGeneration,
    VideoCompositing,
    AudioMixing,
}

impl StageName {
    /// All stages in execution order.
    pub const ALL: [StageName; 5] = [
        StageName::ScriptProcessing,
        StageName::ImageProcessing,
        StageName::VideoGeneration,
        StageName::VideoCompositing,
        StageName::AudioMixing,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            StageName::ScriptProcessing => "script_processing",
            StageName::ImageProcessing => "image_processing",
            StageName::VideoGeneration => "video_generation",
            StageName::VideoCompositing => "video_compositing",
            StageName::AudioMixing => "audio_mixing",
        }
    }

    /// Zero-based position in the stage sequence.
    pub fn position(&self) -> usize {
        match self {
            StageName::ScriptProcessing => 0,
            StageName::ImageProcessing => 1,
            StageName::VideoGeneration => 2,
            StageName::VideoCompositing => 3,
            StageName::AudioMixing => 4,
        }
    }

    /// Share of overall progress owned by this stage. Weights sum to 100.
    pub const fn weight(&self) -> u8 {
        match self {
            StageName::ScriptProcessing => 5,
            StageName::ImageProcessing => 15,
            StageName::VideoGeneration => 45,
            StageName::VideoCompositing => 15,
            StageName::AudioMixing => 20,
        }
    }

    /// Credits billed once this stage completes.
    pub fn credit_cost(&self) -> u32 {
        match self {
            StageName::ScriptProcessing => 1,
            StageName::ImageProcessing => 2,
            StageName::VideoGeneration => 4,
            StageName::VideoCompositing => 1,
            StageName::AudioMixing => 2,
        }
    }

    /// Progress reached when every stage before this one is complete.
    pub fn progress_floor(&self) -> u8 {
        Self::ALL[..self.position()].iter().map(|s| s.weight()).sum()
    }

    /// Human-readable label for progress messages.
    pub fn label(&self) -> &'static str {
        match self {
            StageName::ScriptProcessing => "Writing script",
            StageName::ImageProcessing => "Generating visuals",
            StageName::VideoGeneration => "Animating scenes",
            StageName::VideoCompositing => "Compositing video",
            StageName::AudioMixing => "Mixing audio",
        }
    }

    /// Stage that follows this one, if any.
    pub fn next(&self) -> Option<StageName> {
        Self::ALL.get(self.position() + 1).copied()
    }
}

impl fmt::Display for StageName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StageName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.as_str() == s)
            .ok_or_else(|| format!("Unknown stage: {}", s))
    }
}

/// Status of a single stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema, Default)]
#[serde(rename_all = "snake_case")]
pub enum StageStatus {
    #[default]
    Pending,
    InProgress,
    Completed,
    Failed,
}

impl StageStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            StageStatus::Pending => "pending",
            StageStatus::InProgress => "in_progress",
            StageStatus::Completed => "completed",
            StageStatus::Failed => "failed",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, StageStatus::Completed | StageStatus::Failed)
    }
}

impl fmt::Display for StageStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome of one pipeline stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct StageResult {
    pub stage: StageName,
    pub status: StageStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
    /// Produced artifacts (references only)
    #[serde(default)]
    pub artifacts: Vec<ArtifactRef>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<JobFailure>,
}

impl StageResult {
    pub fn pending(stage: StageName) -> Self {
        Self {
            stage,
            status: StageStatus::Pending,
            started_at: None,
            completed_at: None,
            artifacts: Vec::new(),
            error: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_weights_sum_to_100() {
        let total: u32 = StageName::ALL.iter().map(|s| s.weight() as u32).sum();
        assert_eq!(total, 100);
    }

    #[test]
    fn test_full_run_costs_ten_credits() {
        let total: u32 = StageName::ALL.iter().map(|s| s.credit_cost()).sum();
        assert_eq!(total, 10);
    }

    #[test]
    fn test_progress_floor() {
        assert_eq!(StageName::ScriptProcessing.progress_floor(), 0);
        assert_eq!(StageName::ImageProcessing.progress_floor(), 5);
        assert_eq!(StageName::AudioMixing.progress_floor(), 80);
    }

    #[test]
    fn test_stage_order_and_parse() {
        assert!(StageName::ScriptProcessing < StageName::AudioMixing);
        assert_eq!(StageName::VideoGeneration.next(), Some(StageName::VideoCompositing));
        assert_eq!(StageName::AudioMixing.next(), None);
        assert_eq!("audio_mixing".parse::<StageName>().unwrap(), StageName::AudioMixing);
    }
}
