//! Persisted artifacts and platform export profiles.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::AspectRatio;

/// Reference to a persisted artifact. Never carries the bytes themselves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ArtifactRef {
    /// Storage key (e.g. `jobs/{job_id}/master.mp4`)
    pub key: String,
    /// Addressable location (`s3://bucket/key`, `file:///...`)
    pub uri: String,
    pub content_type: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size_bytes: Option<u64>,
}

/// Kind of visual backing a scene.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum VisualKind {
    Image,
    Video,
}

/// Resolved visual for a scene.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct VisualSource {
    pub kind: VisualKind,
    /// Artifact storage key or http(s) URL
    pub uri: String,
}

impl VisualSource {
    pub fn image(uri: impl Into<String>) -> Self {
        Self {
            kind: VisualKind::Image,
            uri: uri.into(),
        }
    }

    pub fn video(uri: impl Into<String>) -> Self {
        Self {
            kind: VisualKind::Video,
            uri: uri.into(),
        }
    }
}

/// Platform export profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ExportProfile {
    Youtube,
    Instagram,
    Tiktok,
    YoutubeShort,
    Square,
    InstagramPortrait,
    Coupang,
}

/// Encoding target for a profile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProfileSpec {
    pub aspect_ratio: AspectRatio,
    pub width: u32,
    pub height: u32,
    pub video_bitrate_kbps: u32,
}

impl ExportProfile {
    pub const ALL: [ExportProfile; 7] = [
        ExportProfile::Youtube,
        ExportProfile::Instagram,
        ExportProfile::Tiktok,
        ExportProfile::YoutubeShort,
        ExportProfile::Square,
        ExportProfile::InstagramPortrait,
        ExportProfile::Coupang,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExportProfile::Youtube => "youtube",
            ExportProfile::Instagram => "instagram",
            ExportProfile::Tiktok => "tiktok",
            ExportProfile::YoutubeShort => "youtube_short",
            ExportProfile::Square => "square",
            ExportProfile::InstagramPortrait => "instagram_portrait",
            ExportProfile::Coupang => "coupang",
        }
    }

    pub fn spec(&self) -> ProfileSpec {
        match self {
            ExportProfile::Youtube => ProfileSpec {
                aspect_ratio: AspectRatio::LANDSCAPE,
                width: 1920,
                height: 1080,
                video_bitrate_kbps: 8000,
            },
            ExportProfile::Instagram | ExportProfile::Tiktok | ExportProfile::YoutubeShort => {
                ProfileSpec {
                    aspect_ratio: AspectRatio::PORTRAIT,
                    width: 1080,
                    height: 1920,
                    video_bitrate_kbps: 6000,
                }
            }
            ExportProfile::Square => ProfileSpec {
                aspect_ratio: AspectRatio::SQUARE,
                width: 1080,
                height: 1080,
                video_bitrate_kbps: 5000,
            },
            ExportProfile::InstagramPortrait => ProfileSpec {
                aspect_ratio: AspectRatio::INSTAGRAM_PORTRAIT,
                width: 1080,
                height: 1350,
                video_bitrate_kbps: 5000,
            },
            ExportProfile::Coupang => ProfileSpec {
                aspect_ratio: AspectRatio::SQUARE,
                width: 720,
                height: 720,
                video_bitrate_kbps: 4000,
            },
        }
    }

    /// Default profile for a master aspect ratio.
    pub fn default_for(aspect: AspectRatio) -> Option<ExportProfile> {
        match aspect {
            AspectRatio::LANDSCAPE => Some(ExportProfile::Youtube),
            AspectRatio::PORTRAIT => Some(ExportProfile::YoutubeShort),
            AspectRatio::SQUARE => Some(ExportProfile::Square),
            AspectRatio::INSTAGRAM_PORTRAIT => Some(ExportProfile::InstagramPortrait),
            _ => None,
        }
    }

    /// Profiles to export for a job: the default for the master aspect first,
    /// then any extra requested profiles, without duplicates.
    pub fn resolve(aspect: AspectRatio, requested: &[ExportProfile]) -> Vec<ExportProfile> {
        let mut profiles = Vec::with_capacity(requested.len() + 1);
        let has_requested_aspect = requested.iter().any(|p| p.spec().aspect_ratio == aspect);
        if !has_requested_aspect {
            if let Some(default) = Self::default_for(aspect) {
                profiles.push(default);
            }
        }
        for profile in requested {
            if !profiles.contains(profile) {
                profiles.push(*profile);
            }
        }
        profiles
    }
}

impl fmt::Display for ExportProfile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExportProfile {
    type Err = ExportProfileParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let normalized = s.trim().to_lowercase();
        Self::ALL
            .into_iter()
            .find(|p| p.as_str() == normalized)
            .ok_or_else(|| ExportProfileParseError(s.to_string()))
    }
}

#[derive(Debug, Error)]
#[error("Unknown export profile: {0}")]
pub struct ExportProfileParseError(String);

/// One platform-specific rendition of the master.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ExportVariant {
    pub profile: ExportProfile,
    pub aspect_ratio: AspectRatio,
    pub width: u32,
    pub height: u32,
    pub duration_secs: f64,
    pub file_size: u64,
    pub artifact: ArtifactRef,
}

/// Final compiled video with its export variants.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct VideoArtifact {
    pub master: ArtifactRef,
    pub duration_secs: f64,
    pub width: u32,
    pub height: u32,
    pub aspect_ratio: AspectRatio,
    pub file_size: u64,
    pub render_time_secs: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thumbnail: Option<ArtifactRef>,
    /// Ordered export variants, all derived from `master`
    pub variants: Vec<ExportVariant>,
}

impl VideoArtifact {
    /// Find the variant for a profile.
    pub fn variant(&self, profile: ExportProfile) -> Option<&ExportVariant> {
        self.variants.iter().find(|v| v.profile == profile)
    }

    /// The variant matching the master's aspect ratio, the one a download
    /// without an explicit format gets.
    pub fn default_variant(&self) -> Option<&ExportVariant> {
        self.variants
            .iter()
            .find(|v| v.aspect_ratio == self.aspect_ratio)
    }

    /// Resolution string, e.g. `1920x1080`.
    pub fn resolution(&self) -> String {
        format!("{}x{}", self.width, self.height)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_adds_default_for_aspect() {
        let profiles = ExportProfile::resolve(AspectRatio::LANDSCAPE, &[ExportProfile::Tiktok]);
        assert_eq!(profiles, vec![ExportProfile::Youtube, ExportProfile::Tiktok]);
    }

    #[test]
    fn test_resolve_keeps_requested_profile_for_aspect() {
        let profiles = ExportProfile::resolve(
            AspectRatio::PORTRAIT,
            &[ExportProfile::Instagram, ExportProfile::Instagram, ExportProfile::Square],
        );
        assert_eq!(profiles, vec![ExportProfile::Instagram, ExportProfile::Square]);
    }

    #[test]
    fn test_profile_parse() {
        assert_eq!("YouTube_Short".parse::<ExportProfile>().unwrap(), ExportProfile::YoutubeShort);
        assert!("vimeo".parse::<ExportProfile>().is_err());
        assert_eq!(ExportProfile::Coupang.spec().width, 720);
    }
}
