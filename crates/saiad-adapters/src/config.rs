//! Vendor credentials, endpoints and fallback order.

use std::time::Duration;

use crate::types::Capability;

/// Adapter configuration loaded from the environment.
#[derive(Debug, Clone)]
pub struct AdapterConfig {
    pub anthropic_api_key: Option<String>,
    pub anthropic_base_url: String,
    pub anthropic_model: String,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub openai_chat_model: String,
    pub openai_image_model: String,
    pub openai_tts_model: String,

    pub google_api_key: Option<String>,
    pub google_base_url: String,
    pub imagen_model: String,

    pub runway_api_key: Option<String>,
    pub runway_base_url: String,
    pub runway_model: String,

    pub replicate_api_token: Option<String>,
    pub replicate_base_url: String,
    pub replicate_svd_version: String,

    pub elevenlabs_api_key: Option<String>,
    pub elevenlabs_base_url: String,
    pub elevenlabs_model: String,

    pub suno_api_key: Option<String>,
    pub suno_base_url: String,

    /// Base URL the stock library tracks are served from
    pub stock_music_base_url: String,

    /// Vendor order per capability (names as in `vendor_name`)
    pub script_vendors: Vec<String>,
    pub visual_vendors: Vec<String>,
    pub video_vendors: Vec<String>,
    pub speech_vendors: Vec<String>,
    pub music_vendors: Vec<String>,

    /// Per-request HTTP timeout
    pub request_timeout: Duration,
    /// Interval between status polls for async vendors
    pub poll_interval: Duration,
    /// Maximum time to wait on an async vendor task
    pub max_wait: Duration,
}

impl Default for AdapterConfig {
    fn default() -> Self {
        Self {
            anthropic_api_key: None,
            anthropic_base_url: "https://api.anthropic.com".to_string(),
            anthropic_model: "claude-sonnet-4-20250514".to_string(),
            openai_api_key: None,
            openai_base_url: "https://api.openai.com".to_string(),
            openai_chat_model: "gpt-4o".to_string(),
            openai_image_model: "gpt-image-1".to_string(),
            openai_tts_model: "tts-1".to_string(),
            google_api_key: None,
            google_base_url: "https://generativelanguage.googleapis.com".to_string(),
            imagen_model: "imagen-3.0-generate-002".to_string(),
            runway_api_key: None,
            runway_base_url: "https://api.runwayml.com".to_string(),
            runway_model: "gen4_turbo".to_string(),
            replicate_api_token: None,
            replicate_base_url: "https://api.replicate.com".to_string(),
            replicate_svd_version:
                "3f0457e4619daac51203dedb472816fd4af51f3149fa7a9e0b5ffcf1b8172438".to_string(),
            elevenlabs_api_key: None,
            elevenlabs_base_url: "https://api.elevenlabs.io/v1".to_string(),
            elevenlabs_model: "eleven_multilingual_v2".to_string(),
            suno_api_key: None,
            suno_base_url: "https://api.sunoai.com".to_string(),
            stock_music_base_url: "https://cdn.saiad.ai/assets/music".to_string(),
            script_vendors: list(&["anthropic", "openai", "template"]),
            visual_vendors: list(&["imagen", "openai"]),
            video_vendors: list(&["runway", "replicate"]),
            speech_vendors: list(&["elevenlabs", "openai"]),
            music_vendors: list(&["suno", "stock"]),
            request_timeout: Duration::from_secs(120),
            poll_interval: Duration::from_secs(5),
            max_wait: Duration::from_secs(300),
        }
    }
}

fn list(items: &[&str]) -> Vec<String> {
    items.iter().map(|s| s.to_string()).collect()
}

fn secret(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn string_or(name: &str, default: String) -> String {
    std::env::var(name).ok().filter(|v| !v.is_empty()).unwrap_or(default)
}

fn order_or(name: &str, default: Vec<String>) -> Vec<String> {
    std::env::var(name)
        .ok()
        .map(|v| {
            v.split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect::<Vec<_>>()
        })
        .filter(|v| !v.is_empty())
        .unwrap_or(default)
}

fn secs_or(name: &str, default: Duration) -> Duration {
    std::env::var(name)
        .ok()
        .and_then(|s| s.parse().ok())
        .map(Duration::from_secs)
        .unwrap_or(default)
}

impl AdapterConfig {
    /// Create config from environment variables.
    pub fn from_env() -> Self {
        let d = Self::default();
        Self {
            anthropic_api_key: secret("ANTHROPIC_API_KEY"),
            anthropic_base_url: string_or("ANTHROPIC_BASE_URL", d.anthropic_base_url),
            anthropic_model: string_or("ANTHROPIC_MODEL", d.anthropic_model),
            openai_api_key: secret("OPENAI_API_KEY"),
            openai_base_url: string_or("OPENAI_BASE_URL", d.openai_base_url),
            openai_chat_model: string_or("OPENAI_CHAT_MODEL", d.openai_chat_model),
            openai_image_model: string_or("OPENAI_IMAGE_MODEL", d.openai_image_model),
            openai_tts_model: string_or("OPENAI_TTS_MODEL", d.openai_tts_model),
            google_api_key: secret("GOOGLE_AI_API_KEY"),
            google_base_url: string_or("GOOGLE_AI_BASE_URL", d.google_base_url),
            imagen_model: string_or("IMAGEN_MODEL", d.imagen_model),
            runway_api_key: secret("RUNWAY_API_KEY"),
            runway_base_url: string_or("RUNWAY_BASE_URL", d.runway_base_url),
            runway_model: string_or("RUNWAY_MODEL", d.runway_model),
            replicate_api_token: secret("REPLICATE_API_TOKEN"),
            replicate_base_url: string_or("REPLICATE_BASE_URL", d.replicate_base_url),
            replicate_svd_version: string_or("REPLICATE_SVD_VERSION", d.replicate_svd_version),
            elevenlabs_api_key: secret("ELEVENLABS_API_KEY"),
            elevenlabs_base_url: string_or("ELEVENLABS_BASE_URL", d.elevenlabs_base_url),
            elevenlabs_model: string_or("ELEVENLABS_MODEL", d.elevenlabs_model),
            suno_api_key: secret("SUNO_API_KEY"),
            suno_base_url: string_or("SUNO_BASE_URL", d.suno_base_url),
            stock_music_base_url: string_or("STOCK_MUSIC_BASE_URL", d.stock_music_base_url),
            script_vendors: order_or("SCRIPT_VENDORS", d.script_vendors),
            visual_vendors: order_or("VISUAL_VENDORS", d.visual_vendors),
            video_vendors: order_or("VIDEO_VENDORS", d.video_vendors),
            speech_vendors: order_or("SPEECH_VENDORS", d.speech_vendors),
            music_vendors: order_or("MUSIC_VENDORS", d.music_vendors),
            request_timeout: secs_or("ADAPTER_REQUEST_TIMEOUT", d.request_timeout),
            poll_interval: secs_or("ADAPTER_POLL_INTERVAL", d.poll_interval),
            max_wait: secs_or("ADAPTER_MAX_WAIT", d.max_wait),
        }
    }

    /// Configured vendor order for one capability.
    pub fn vendor_order(&self, capability: Capability) -> &[String] {
        match capability {
            Capability::Script => &self.script_vendors,
            Capability::Visual => &self.visual_vendors,
            Capability::VideoClip => &self.video_vendors,
            Capability::Speech => &self.speech_vendors,
            Capability::Music => &self.music_vendors,
        }
    }
}
