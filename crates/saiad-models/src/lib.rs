//! Shared data models for the SaiAd video pipeline.
//!
//! This crate provides Serde-serializable types for:
//! - Generation jobs, stages and their state transitions
//! - Scenes, storyboards and request configuration
//! - Artifacts and platform export profiles
//! - Error codes, live-update messages and usage events

pub mod artifact;
pub mod config;
pub mod error_code;
pub mod job;
pub mod scene;
pub mod stage;
pub mod style;
pub mod usage;
pub mod ws;

// Re-export common types
pub use artifact::{
    ArtifactRef, ExportProfile, ExportProfileParseError, ExportVariant, ProfileSpec, VideoArtifact,
    VisualKind, VisualSource,
};
pub use config::{
    GenerateVideoRequest, GenerationConfig, ProductRef, RequestValidationError, MAX_SCENES,
    MUSIC_NONE,
};
pub use error_code::{ErrorCode, JobFailure};
pub use job::{
    fan_out_progress, CancelOutcome, GenerationJob, JobId, JobOutcome, JobStatus, StageUpdate,
    TransitionError,
};
pub use scene::{to_millis, AdCopy, Scene, SceneWindow, Storyboard, StoryboardError};
pub use stage::{StageName, StageResult, StageStatus};
pub use style::{AspectRatio, AspectRatioParseError, Tone, Transition};
pub use usage::{UsageEvent, UsageOutcome};
pub use ws::{JobEvent, WsMessage};
