//! ElevenLabs text-to-speech.

use async_trait::async_trait;
use serde::Serialize;
use tracing::debug;

use crate::capability::SpeechSynthesizer;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::http::VendorHttp;
use crate::types::{AdapterAsset, GeneratedAsset, SpeechRequest};

const VENDOR: &str = "elevenlabs";

/// Named voice presets and the ElevenLabs voice ids behind them.
static VOICE_PRESETS: [(&str, &str); 12] = [
    ("ko_professional_male", "pNInz6obpgDQGcFmaJgB"),
    ("ko_professional_female", "EXAVITQu4vr4xnSDxMaL"),
    ("ko_friendly_male", "VR6AewLTigWG4xSOukaG"),
    ("ko_friendly_female", "21m00Tcm4TlvDq8ikWAM"),
    ("ko_energetic", "yoZ06aMxZJJ28mfd3POQ"),
    ("en_professional_male", "pNInz6obpgDQGcFmaJgB"),
    ("en_professional_female", "EXAVITQu4vr4xnSDxMaL"),
    ("en_friendly", "jBpfuIE2acCO8z3wKNLl"),
    ("zh_professional_male", "g5CIjZEefAph4nQFvHAz"),
    ("zh_professional_female", "Xb7hH8MSUJpSbSDYk0k2"),
    ("ja_professional_male", "GBv7mTt0atIp3Br8iCZE"),
    ("ja_professional_female", "XrExE9yKIg1WjnnlVkGX"),
];

#[derive(Debug, Serialize)]
struct VoiceSettings {
    stability: f32,
    similarity_boost: f32,
    style: f32,
    use_speaker_boost: bool,
}

impl Default for VoiceSettings {
    fn default() -> Self {
        Self {
            stability: 0.5,
            similarity_boost: 0.75,
            style: 0.0,
            use_speaker_boost: true,
        }
    }
}

#[derive(Debug, Serialize)]
struct TtsBody<'a> {
    text: &'a str,
    model_id: &'a str,
    voice_settings: VoiceSettings,
}

pub struct ElevenLabsClient {
    http: VendorHttp,
    api_key: String,
    base_url: String,
    model: String,
}

fn preset_id(name: &str) -> Option<&'static str> {
    VOICE_PRESETS
        .iter()
        .find(|(preset, _)| *preset == name)
        .map(|(_, id)| *id)
}

/// Voice id for a preset name, a raw id, or the language default.
pub fn resolve_voice_id(voice: Option<&str>, language: &str) -> String {
    if let Some(voice) = voice.filter(|v| !v.trim().is_empty()) {
        return preset_id(voice).unwrap_or(voice).to_string();
    }
    let default = match language {
        "en" => "en_professional_female",
        "zh" => "zh_professional_female",
        "ja" => "ja_professional_female",
        _ => "ko_professional_female",
    };
    preset_id(default)
        .unwrap_or("EXAVITQu4vr4xnSDxMaL")
        .to_string()
}

impl ElevenLabsClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        config: &AdapterConfig,
    ) -> AdapterResult<Self> {
        Ok(Self {
            http: VendorHttp::new(VENDOR, config.request_timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: config.elevenlabs_model.clone(),
        })
    }

    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Option<Self>> {
        match &config.elevenlabs_api_key {
            Some(key) => {
                Self::new(key.clone(), config.elevenlabs_base_url.clone(), config).map(Some)
            }
            None => Ok(None),
        }
    }
}

#[async_trait]
impl SpeechSynthesizer for ElevenLabsClient {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> AdapterResult<GeneratedAsset> {
        if request.text.trim().is_empty() {
            return Err(AdapterError::invalid_input(VENDOR, "Empty narration text"));
        }
        let voice_id = resolve_voice_id(request.voice.as_deref(), &request.language);
        debug!(voice_id = %voice_id, chars = request.text.len(), "Synthesizing speech");

        let body = TtsBody {
            text: &request.text,
            model_id: &self.model,
            voice_settings: VoiceSettings::default(),
        };
        let builder = self
            .http
            .client()
            .post(format!("{}/text-to-speech/{}", self.base_url, voice_id))
            .header("xi-api-key", &self.api_key)
            .header(reqwest::header::ACCEPT, "audio/mpeg")
            .json(&body);
        let bytes = self.http.send_bytes(builder, &request.options).await?;

        Ok(GeneratedAsset::new(
            VENDOR,
            AdapterAsset::Inline {
                bytes,
                content_type: "audio/mpeg".to_string(),
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallOptions;
    use std::time::Duration;
    use wiremock::matchers::{header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn request(voice: Option<&str>) -> SpeechRequest {
        SpeechRequest {
            text: "갤럭시 S25 울트라".into(),
            voice: voice.map(String::from),
            language: "ko".into(),
            options: CallOptions::new("idem", Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_voice_resolution() {
        assert_eq!(
            resolve_voice_id(Some("ko_friendly_male"), "ko"),
            "VR6AewLTigWG4xSOukaG"
        );
        assert_eq!(resolve_voice_id(Some("customVoice123"), "ko"), "customVoice123");
        assert_eq!(resolve_voice_id(None, "ja"), "XrExE9yKIg1WjnnlVkGX");
        assert_eq!(resolve_voice_id(Some(" "), "fr"), "EXAVITQu4vr4xnSDxMaL");
    }

    #[tokio::test]
    async fn test_returns_inline_mpeg() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/text-to-speech/EXAVITQu4vr4xnSDxMaL"))
            .and(header("xi-api-key", "el-key"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(vec![0xFF, 0xFB, 0x90]))
            .mount(&server)
            .await;

        let client =
            ElevenLabsClient::new("el-key", server.uri(), &AdapterConfig::default()).unwrap();
        let asset = client
            .synthesize_speech(&request(Some("ko_professional_female")))
            .await
            .unwrap();
        assert_eq!(asset.asset.content_type(), "audio/mpeg");
    }

    #[tokio::test]
    async fn test_quota_exceeded_is_rejection() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(401).set_body_string("quota_exceeded"))
            .mount(&server)
            .await;

        let client =
            ElevenLabsClient::new("el-key", server.uri(), &AdapterConfig::default()).unwrap();
        let err = client.synthesize_speech(&request(None)).await.unwrap_err();
        assert!(matches!(err, AdapterError::UpstreamRejected { .. }));
        assert!(!err.is_retryable());
    }
}
