//! Generation request configuration and submit-time validation.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use validator::Validate;

use crate::{AspectRatio, ExportProfile, Storyboard, StoryboardError, Tone};

/// Maximum number of scenes in one storyboard.
pub const MAX_SCENES: usize = 20;

/// Music selection that disables background music.
pub const MUSIC_NONE: &str = "none";

/// Product the ad is about.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct ProductRef {
    /// Catalog identifier, e.g. `galaxy-s25-ultra`
    #[validate(length(min = 1, max = 128))]
    pub id: String,
    /// Display name; falls back to the id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 200))]
    pub name: Option<String>,
    /// Catalog category (smartphone, tv, appliance, ...)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 64))]
    pub category: Option<String>,
    /// Key selling points passed to the script writer
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

impl ProductRef {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            category: None,
            features: Vec::new(),
        }
    }

    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }
}

/// Requested configuration of one generation job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema, Validate)]
pub struct GenerationConfig {
    #[validate(nested)]
    pub product: ProductRef,

    /// Template the storyboard came from, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(max = 128))]
    pub template_id: Option<String>,

    /// Target video length in seconds
    #[validate(range(min = 5.0, max = 180.0))]
    pub target_duration_secs: f64,

    #[serde(default)]
    pub aspect_ratio: AspectRatio,

    #[serde(default)]
    pub tone: Tone,

    /// BCP-47-ish language code (`ko`, `en`, ...)
    #[serde(default = "default_language")]
    #[validate(length(min = 2, max = 16))]
    pub language: String,

    /// Voice preset or raw vendor voice id
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub voice: Option<String>,

    /// Music mood/track, `none` to disable, or unset to pick by category
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub music: Option<String>,

    #[serde(default = "default_true")]
    pub include_narration: bool,

    /// Extra platform profiles beyond the default for `aspect_ratio`
    #[serde(default)]
    pub export_formats: Vec<ExportProfile>,
}

fn default_language() -> String {
    "ko".to_string()
}

fn default_true() -> bool {
    true
}

impl GenerationConfig {
    pub fn new(product: ProductRef, target_duration_secs: f64, aspect_ratio: AspectRatio) -> Self {
        Self {
            product,
            template_id: None,
            target_duration_secs,
            aspect_ratio,
            tone: Tone::default(),
            language: default_language(),
            voice: None,
            music: None,
            include_narration: true,
            export_formats: Vec::new(),
        }
    }

    pub fn music_enabled(&self) -> bool {
        !matches!(self.music.as_deref(), Some(m) if m.eq_ignore_ascii_case(MUSIC_NONE))
    }

    /// Profiles the compositor must produce.
    pub fn export_profiles(&self) -> Vec<ExportProfile> {
        ExportProfile::resolve(self.aspect_ratio, &self.export_formats)
    }
}

/// Body of a Submit call.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema, Validate)]
pub struct GenerateVideoRequest {
    /// Owning project
    #[validate(length(min = 1, max = 128))]
    pub project_id: String,

    /// Client-supplied deduplication key
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[validate(length(min = 1, max = 128))]
    pub idempotency_key: Option<String>,

    #[validate(nested)]
    pub config: GenerationConfig,

    pub storyboard: Storyboard,
}

/// Submit-time rejection, raised before any job exists.
#[derive(Debug, Error)]
pub enum RequestValidationError {
    #[error("Invalid request: {0}")]
    Fields(#[from] validator::ValidationErrors),

    #[error(transparent)]
    Storyboard(#[from] StoryboardError),

    #[error("Unsupported aspect ratio: {0}")]
    UnsupportedAspect(AspectRatio),

    #[error("Too many scenes: {0} (max {MAX_SCENES})")]
    TooManyScenes(usize),
}

impl GenerateVideoRequest {
    /// Field rules, then the storyboard timing contract.
    pub fn check(&self) -> Result<(), RequestValidationError> {
        self.validate()?;

        if !self.config.aspect_ratio.is_supported() {
            return Err(RequestValidationError::UnsupportedAspect(self.config.aspect_ratio));
        }
        if self.storyboard.scenes.len() > MAX_SCENES {
            return Err(RequestValidationError::TooManyScenes(self.storyboard.scenes.len()));
        }

        self.storyboard
            .validate_timing(self.config.target_duration_secs)?;
        Ok(())
    }
}
