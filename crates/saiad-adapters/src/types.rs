//! Normalized request and response types, one set per capability.

use std::fmt;
use std::time::Duration;

use saiad_models::{AspectRatio, ProductRef, Tone};
use serde::{Deserialize, Serialize};

/// Capability an adapter provides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Capability {
    Script,
    Visual,
    VideoClip,
    Speech,
    Music,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Script => "script",
            Capability::Visual => "visual",
            Capability::VideoClip => "video_clip",
            Capability::Speech => "speech",
            Capability::Music => "music",
        }
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-call options every adapter request carries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CallOptions {
    /// Stable across retries of the same logical call
    pub idempotency_key: String,
    /// Wall-clock budget for the whole call, including vendor-side polling
    pub timeout: Duration,
}

impl CallOptions {
    pub fn new(idempotency_key: impl Into<String>, timeout: Duration) -> Self {
        Self {
            idempotency_key: idempotency_key.into(),
            timeout,
        }
    }
}

/// A generated asset: a vendor URL to fetch, or bytes returned inline.
#[derive(Clone, PartialEq, Eq)]
pub enum AdapterAsset {
    Url {
        url: String,
        content_type: String,
    },
    Inline {
        bytes: Vec<u8>,
        content_type: String,
    },
}

impl AdapterAsset {
    pub fn content_type(&self) -> &str {
        match self {
            AdapterAsset::Url { content_type, .. } | AdapterAsset::Inline { content_type, .. } => {
                content_type
            }
        }
    }
}

impl fmt::Debug for AdapterAsset {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AdapterAsset::Url { url, content_type } => f
                .debug_struct("Url")
                .field("url", url)
                .field("content_type", content_type)
                .finish(),
            AdapterAsset::Inline {
                bytes,
                content_type,
            } => f
                .debug_struct("Inline")
                .field("len", &bytes.len())
                .field("content_type", content_type)
                .finish(),
        }
    }
}

/// Asset plus the metadata the orchestrator records.
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratedAsset {
    pub asset: AdapterAsset,
    /// Vendor that produced it
    pub vendor: String,
    /// Media duration when the vendor reports one
    pub duration_secs: Option<f64>,
}

impl GeneratedAsset {
    pub fn new(vendor: &str, asset: AdapterAsset) -> Self {
        Self {
            asset,
            vendor: vendor.to_string(),
            duration_secs: None,
        }
    }

    pub fn with_duration(mut self, secs: f64) -> Self {
        self.duration_secs = Some(secs);
        self
    }
}

// ---------------------------------------------------------------------------
// Script
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ScriptRequest {
    pub product: ProductRef,
    pub tone: Tone,
    pub language: String,
    pub duration_secs: f64,
    /// Planned scene durations, in order
    pub scene_durations: Vec<f64>,
    pub template_id: Option<String>,
    pub options: CallOptions,
}

/// Script text for one scene.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SceneScript {
    #[serde(alias = "order")]
    pub index: u32,
    #[serde(default)]
    pub narration: String,
    /// On-screen text
    #[serde(default, alias = "text", skip_serializing_if = "Option::is_none")]
    pub overlay: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_prompt: Option<String>,
}

/// Generated ad script.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ScriptDraft {
    pub headline: String,
    #[serde(default)]
    pub subline: String,
    #[serde(default)]
    pub narration: String,
    #[serde(default)]
    pub cta: String,
    #[serde(default)]
    pub scenes: Vec<SceneScript>,
    /// Vendor that wrote it
    #[serde(default)]
    pub vendor: String,
}

impl ScriptDraft {
    pub fn scene(&self, index: u32) -> Option<&SceneScript> {
        self.scenes.iter().find(|s| s.index == index)
    }
}

// ---------------------------------------------------------------------------
// Visual / video clip
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct VisualRequest {
    pub prompt: String,
    pub aspect_ratio: AspectRatio,
    pub options: CallOptions,
}

#[derive(Debug, Clone)]
pub struct VideoClipRequest {
    /// Publicly fetchable URL of the still to animate
    pub image_url: String,
    pub prompt: String,
    pub duration_secs: f64,
    pub aspect_ratio: AspectRatio,
    pub options: CallOptions,
}

impl VideoClipRequest {
    /// Clip lengths vendors accept: the smallest of 5s or 10s covering the scene.
    pub fn clip_seconds(&self) -> u32 {
        if self.duration_secs <= 5.0 {
            5
        } else {
            10
        }
    }
}

// ---------------------------------------------------------------------------
// Speech / music
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct SpeechRequest {
    pub text: String,
    /// Preset name or raw vendor voice id
    pub voice: Option<String>,
    pub language: String,
    pub options: CallOptions,
}

#[derive(Debug, Clone)]
pub struct MusicRequest {
    /// Product category (smartphone, tv, ...)
    pub category: Option<String>,
    /// Mood or track name chosen by the user
    pub selection: Option<String>,
    pub duration_secs: f64,
    pub options: CallOptions,
}
