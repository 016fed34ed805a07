//! Ordered vendor chains per capability.
//!
//! A call walks its chain in order. Transient failures (rate limit,
//! unavailable, timeout) move on to the next vendor; invalid input and
//! rejections stop the chain since another vendor would refuse too.

use std::sync::Arc;

use metrics::counter;
use tracing::{info, warn};

use crate::capability::{
    MusicProvider, ScriptGenerator, SpeechSynthesizer, VideoClipGenerator, VisualGenerator,
};
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::music::StockMusicLibrary;
use crate::script::TemplateScriptWriter;
use crate::types::{
    Capability, GeneratedAsset, MusicRequest, ScriptDraft, ScriptRequest, SpeechRequest,
    VideoClipRequest, VisualRequest,
};
use crate::vendors::{
    AnthropicScriptWriter, ElevenLabsClient, ImagenClient, OpenAiClient, ReplicateClient,
    RunwayClient, SunoClient,
};

const ADAPTER_CALLS_TOTAL: &str = "saiad_adapter_calls_total";

#[derive(Default, Clone)]
pub struct AdapterRegistry {
    script: Vec<Arc<dyn ScriptGenerator>>,
    visual: Vec<Arc<dyn VisualGenerator>>,
    video: Vec<Arc<dyn VideoClipGenerator>>,
    speech: Vec<Arc<dyn SpeechSynthesizer>>,
    music: Vec<Arc<dyn MusicProvider>>,
}

impl std::fmt::Debug for AdapterRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterRegistry")
            .field("script", &self.script.len())
            .field("visual", &self.visual.len())
            .field("video", &self.video.len())
            .field("speech", &self.speech.len())
            .field("music", &self.music.len())
            .finish()
    }
}

fn record(capability: Capability, vendor: &str, outcome: &'static str) {
    counter!(
        ADAPTER_CALLS_TOTAL,
        "capability" => capability.as_str(),
        "vendor" => vendor.to_string(),
        "outcome" => outcome
    )
    .increment(1);
}

fn outcome_label(err: &AdapterError) -> &'static str {
    match err {
        AdapterError::RateLimited { .. } => "rate_limited",
        AdapterError::InvalidInput { .. } => "invalid_input",
        AdapterError::UpstreamUnavailable { .. } => "unavailable",
        AdapterError::Timeout { .. } => "timeout",
        AdapterError::UpstreamRejected { .. } => "rejected",
        AdapterError::Config(_) => "config",
    }
}

/// Record a failed attempt; true when the next vendor should be tried.
fn fall_through(capability: Capability, vendor: &str, err: &AdapterError) -> bool {
    record(capability, vendor, outcome_label(err));
    if err.is_retryable() {
        warn!(capability = %capability, vendor, error = %err, "Vendor failed, trying next");
        true
    } else {
        warn!(capability = %capability, vendor, error = %err, "Vendor refused request");
        false
    }
}

fn no_vendor(capability: Capability) -> AdapterError {
    AdapterError::unavailable("registry", format!("No {} vendor configured", capability))
}

impl AdapterRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_script(mut self, adapter: Arc<dyn ScriptGenerator>) -> Self {
        self.script.push(adapter);
        self
    }

    pub fn with_visual(mut self, adapter: Arc<dyn VisualGenerator>) -> Self {
        self.visual.push(adapter);
        self
    }

    pub fn with_video(mut self, adapter: Arc<dyn VideoClipGenerator>) -> Self {
        self.video.push(adapter);
        self
    }

    pub fn with_speech(mut self, adapter: Arc<dyn SpeechSynthesizer>) -> Self {
        self.speech.push(adapter);
        self
    }

    pub fn with_music(mut self, adapter: Arc<dyn MusicProvider>) -> Self {
        self.music.push(adapter);
        self
    }

    /// Build chains in the configured order, skipping vendors without keys.
    ///
    /// The template script writer and the stock music library need no
    /// credentials, so those two chains are never empty. Visuals and speech
    /// need at least one keyed vendor; video clips are optional since the
    /// pipeline falls back to stills.
    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Self> {
        let anthropic = AnthropicScriptWriter::from_config(config)?.map(Arc::new);
        let openai = OpenAiClient::from_config(config)?.map(Arc::new);
        let imagen = ImagenClient::from_config(config)?.map(Arc::new);
        let runway = RunwayClient::from_config(config)?.map(Arc::new);
        let replicate = ReplicateClient::from_config(config)?.map(Arc::new);
        let elevenlabs = ElevenLabsClient::from_config(config)?.map(Arc::new);
        let suno = SunoClient::from_config(config)?.map(Arc::new);

        let mut registry = Self::new();

        for name in &config.script_vendors {
            let adapter: Option<Arc<dyn ScriptGenerator>> = match name.as_str() {
                "anthropic" => anthropic.clone().map(|a| a as Arc<dyn ScriptGenerator>),
                "openai" => openai.clone().map(|a| a as Arc<dyn ScriptGenerator>),
                "template" => Some(Arc::new(TemplateScriptWriter)),
                other => {
                    warn!(vendor = other, "Unknown script vendor ignored");
                    None
                }
            };
            registry.script.extend(adapter);
        }
        if !registry.script.iter().any(|a| a.vendor() == TemplateScriptWriter::VENDOR) {
            registry.script.push(Arc::new(TemplateScriptWriter));
        }

        for name in &config.visual_vendors {
            let adapter: Option<Arc<dyn VisualGenerator>> = match name.as_str() {
                "imagen" => imagen.clone().map(|a| a as Arc<dyn VisualGenerator>),
                "openai" => openai.clone().map(|a| a as Arc<dyn VisualGenerator>),
                other => {
                    warn!(vendor = other, "Unknown visual vendor ignored");
                    None
                }
            };
            registry.visual.extend(adapter);
        }

        for name in &config.video_vendors {
            let adapter: Option<Arc<dyn VideoClipGenerator>> = match name.as_str() {
                "runway" => runway.clone().map(|a| a as Arc<dyn VideoClipGenerator>),
                "replicate" => replicate.clone().map(|a| a as Arc<dyn VideoClipGenerator>),
                other => {
                    warn!(vendor = other, "Unknown video vendor ignored");
                    None
                }
            };
            registry.video.extend(adapter);
        }

        for name in &config.speech_vendors {
            let adapter: Option<Arc<dyn SpeechSynthesizer>> = match name.as_str() {
                "elevenlabs" => elevenlabs.clone().map(|a| a as Arc<dyn SpeechSynthesizer>),
                "openai" => openai.clone().map(|a| a as Arc<dyn SpeechSynthesizer>),
                other => {
                    warn!(vendor = other, "Unknown speech vendor ignored");
                    None
                }
            };
            registry.speech.extend(adapter);
        }

        for name in &config.music_vendors {
            let adapter: Option<Arc<dyn MusicProvider>> = match name.as_str() {
                "suno" => suno.clone().map(|a| a as Arc<dyn MusicProvider>),
                "stock" => Some(Arc::new(StockMusicLibrary::from_config(config))),
                other => {
                    warn!(vendor = other, "Unknown music vendor ignored");
                    None
                }
            };
            registry.music.extend(adapter);
        }
        if !registry.music.iter().any(|a| a.vendor() == StockMusicLibrary::VENDOR) {
            registry
                .music
                .push(Arc::new(StockMusicLibrary::from_config(config)));
        }

        for capability in [Capability::Script, Capability::Visual, Capability::Speech] {
            if registry.vendors(capability).is_empty() {
                return Err(AdapterError::config(format!(
                    "no {} vendor configured; set an API key for one of {:?}",
                    capability,
                    config.vendor_order(capability)
                )));
            }
        }

        info!(
            script = ?registry.vendors(Capability::Script),
            visual = ?registry.vendors(Capability::Visual),
            video = ?registry.vendors(Capability::VideoClip),
            speech = ?registry.vendors(Capability::Speech),
            music = ?registry.vendors(Capability::Music),
            "Adapter chains configured"
        );
        Ok(registry)
    }

    /// Vendor names in chain order.
    pub fn vendors(&self, capability: Capability) -> Vec<String> {
        match capability {
            Capability::Script => self.script.iter().map(|a| a.vendor().to_string()).collect(),
            Capability::Visual => self.visual.iter().map(|a| a.vendor().to_string()).collect(),
            Capability::VideoClip => self.video.iter().map(|a| a.vendor().to_string()).collect(),
            Capability::Speech => self.speech.iter().map(|a| a.vendor().to_string()).collect(),
            Capability::Music => self.music.iter().map(|a| a.vendor().to_string()).collect(),
        }
    }

    pub async fn generate_script(&self, request: &ScriptRequest) -> AdapterResult<ScriptDraft> {
        let capability = Capability::Script;
        let mut last = None;
        for adapter in &self.script {
            match adapter.generate_script(request).await {
                Ok(draft) => {
                    record(capability, adapter.vendor(), "ok");
                    return Ok(draft);
                }
                Err(err) => {
                    if !fall_through(capability, adapter.vendor(), &err) {
                        return Err(err);
                    }
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| no_vendor(capability)))
    }

    pub async fn generate_visual(&self, request: &VisualRequest) -> AdapterResult<GeneratedAsset> {
        let capability = Capability::Visual;
        let mut last = None;
        for adapter in &self.visual {
            match adapter.generate_visual(request).await {
                Ok(asset) => {
                    record(capability, adapter.vendor(), "ok");
                    return Ok(asset);
                }
                Err(err) => {
                    if !fall_through(capability, adapter.vendor(), &err) {
                        return Err(err);
                    }
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| no_vendor(capability)))
    }

    pub async fn generate_video_clip(
        &self,
        request: &VideoClipRequest,
    ) -> AdapterResult<GeneratedAsset> {
        let capability = Capability::VideoClip;
        let mut last = None;
        for adapter in &self.video {
            match adapter.generate_video_clip(request).await {
                Ok(asset) => {
                    record(capability, adapter.vendor(), "ok");
                    return Ok(asset);
                }
                Err(err) => {
                    if !fall_through(capability, adapter.vendor(), &err) {
                        return Err(err);
                    }
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| no_vendor(capability)))
    }

    pub async fn synthesize_speech(&self, request: &SpeechRequest) -> AdapterResult<GeneratedAsset> {
        let capability = Capability::Speech;
        let mut last = None;
        for adapter in &self.speech {
            match adapter.synthesize_speech(request).await {
                Ok(asset) => {
                    record(capability, adapter.vendor(), "ok");
                    return Ok(asset);
                }
                Err(err) => {
                    if !fall_through(capability, adapter.vendor(), &err) {
                        return Err(err);
                    }
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| no_vendor(capability)))
    }

    pub async fn generate_or_select_music(
        &self,
        request: &MusicRequest,
    ) -> AdapterResult<GeneratedAsset> {
        let capability = Capability::Music;
        let mut last = None;
        for adapter in &self.music {
            match adapter.generate_or_select_music(request).await {
                Ok(asset) => {
                    record(capability, adapter.vendor(), "ok");
                    return Ok(asset);
                }
                Err(err) => {
                    if !fall_through(capability, adapter.vendor(), &err) {
                        return Err(err);
                    }
                    last = Some(err);
                }
            }
        }
        Err(last.unwrap_or_else(|| no_vendor(capability)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{AdapterAsset, CallOptions};
    use async_trait::async_trait;
    use saiad_models::AspectRatio;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Duration;

    struct Scripted {
        name: &'static str,
        result: AdapterResult<GeneratedAsset>,
        calls: AtomicU32,
    }

    impl Scripted {
        fn ok(name: &'static str) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Ok(GeneratedAsset::new(
                    name,
                    AdapterAsset::Url {
                        url: format!("https://{}.example.com/a.png", name),
                        content_type: "image/png".into(),
                    },
                )),
                calls: AtomicU32::new(0),
            })
        }

        fn err(name: &'static str, err: AdapterError) -> Arc<Self> {
            Arc::new(Self {
                name,
                result: Err(err),
                calls: AtomicU32::new(0),
            })
        }
    }

    #[async_trait]
    impl VisualGenerator for Scripted {
        fn vendor(&self) -> &str {
            self.name
        }

        async fn generate_visual(&self, _: &VisualRequest) -> AdapterResult<GeneratedAsset> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.result.clone()
        }
    }

    fn visual_request() -> VisualRequest {
        VisualRequest {
            prompt: "p".into(),
            aspect_ratio: AspectRatio::LANDSCAPE,
            options: CallOptions::new("idem", Duration::from_secs(1)),
        }
    }

    #[tokio::test]
    async fn test_transient_failure_falls_through() {
        let first = Scripted::err("a", AdapterError::rate_limited("a", "slow down"));
        let second = Scripted::ok("b");
        let registry = AdapterRegistry::new()
            .with_visual(first.clone())
            .with_visual(second.clone());

        let asset = registry.generate_visual(&visual_request()).await.unwrap();
        assert_eq!(asset.vendor, "b");
        assert_eq!(first.calls.load(Ordering::SeqCst), 1);
        assert_eq!(second.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rejection_stops_chain() {
        let first = Scripted::err("a", AdapterError::rejected("a", "policy"));
        let second = Scripted::ok("b");
        let registry = AdapterRegistry::new()
            .with_visual(first)
            .with_visual(second.clone());

        let err = registry.generate_visual(&visual_request()).await.unwrap_err();
        assert!(matches!(err, AdapterError::UpstreamRejected { .. }));
        assert_eq!(second.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_exhausted_chain_returns_last_error() {
        let registry = AdapterRegistry::new()
            .with_visual(Scripted::err("a", AdapterError::unavailable("a", "down")))
            .with_visual(Scripted::err("b", AdapterError::timeout("b", 30)));

        let err = registry.generate_visual(&visual_request()).await.unwrap_err();
        assert_eq!(err.vendor(), "b");
        assert!(matches!(err, AdapterError::Timeout { .. }));
    }

    #[tokio::test]
    async fn test_empty_chain_is_unavailable() {
        let err = AdapterRegistry::new()
            .generate_visual(&visual_request())
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::UpstreamUnavailable { .. }));
    }

    #[test]
    fn test_from_config_without_keys_is_config_error() {
        let err = AdapterRegistry::from_config(&AdapterConfig::default()).unwrap_err();
        assert!(matches!(err, AdapterError::Config(_)));
        assert!(err.to_string().contains("visual"));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_from_config_requires_speech_vendor() {
        let config = AdapterConfig {
            google_api_key: Some("g".into()),
            visual_vendors: vec!["imagen".into()],
            speech_vendors: vec!["elevenlabs".into()],
            ..AdapterConfig::default()
        };
        let err = AdapterRegistry::from_config(&config).unwrap_err();
        assert!(matches!(err, AdapterError::Config(ref m) if m.contains("speech")));
    }

    #[test]
    fn test_from_config_keeps_keyless_fallbacks() {
        let config = AdapterConfig {
            openai_api_key: Some("sk".into()),
            script_vendors: vec!["template".into()],
            visual_vendors: vec!["openai".into()],
            speech_vendors: vec!["openai".into()],
            music_vendors: vec!["suno".into()],
            ..AdapterConfig::default()
        };
        let registry = AdapterRegistry::from_config(&config).unwrap();
        assert_eq!(registry.vendors(Capability::Script), vec!["template"]);
        assert_eq!(registry.vendors(Capability::Music), vec!["stock"]);
        assert!(registry.vendors(Capability::VideoClip).is_empty());
    }

    #[test]
    fn test_from_config_respects_order() {
        let config = AdapterConfig {
            openai_api_key: Some("sk".into()),
            google_api_key: Some("g".into()),
            visual_vendors: vec!["openai".into(), "imagen".into()],
            ..AdapterConfig::default()
        };
        let registry = AdapterRegistry::from_config(&config).unwrap();
        assert_eq!(registry.vendors(Capability::Visual), vec!["openai", "imagen"]);
        assert_eq!(
            registry.vendors(Capability::Script),
            vec!["openai", "template"]
        );
    }
}
