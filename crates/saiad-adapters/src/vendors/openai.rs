//! OpenAI client: chat completions for scripts, image generation and TTS.

use async_trait::async_trait;
use base64::Engine;
use saiad_models::AspectRatio;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use crate::capability::{ScriptGenerator, SpeechSynthesizer, VisualGenerator};
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::http::VendorHttp;
use crate::script::{build_script_prompt, parse_script_draft};
use crate::types::{
    AdapterAsset, GeneratedAsset, ScriptDraft, ScriptRequest, SpeechRequest, VisualRequest,
};

const VENDOR: &str = "openai";
static TTS_VOICES: [&str; 6] = ["alloy", "echo", "fable", "onyx", "nova", "shimmer"];

#[derive(Debug, Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChatMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    refusal: Option<String>,
}

#[derive(Debug, Serialize)]
struct ImageRequest<'a> {
    model: &'a str,
    prompt: &'a str,
    n: u32,
    size: &'a str,
}

#[derive(Debug, Deserialize)]
struct ImageResponse {
    #[serde(default)]
    data: Vec<ImageData>,
}

#[derive(Debug, Deserialize)]
struct ImageData {
    #[serde(default)]
    b64_json: Option<String>,
    #[serde(default)]
    url: Option<String>,
}

/// One client for the three OpenAI capabilities.
pub struct OpenAiClient {
    http: VendorHttp,
    api_key: String,
    base_url: String,
    chat_model: String,
    image_model: String,
    tts_model: String,
}

impl OpenAiClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        config: &AdapterConfig,
    ) -> AdapterResult<Self> {
        Ok(Self {
            http: VendorHttp::new(VENDOR, config.request_timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            chat_model: config.openai_chat_model.clone(),
            image_model: config.openai_image_model.clone(),
            tts_model: config.openai_tts_model.clone(),
        })
    }

    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Option<Self>> {
        match &config.openai_api_key {
            Some(key) => Self::new(key.clone(), config.openai_base_url.clone(), config).map(Some),
            None => Ok(None),
        }
    }

    fn post(&self, endpoint: &str) -> reqwest::RequestBuilder {
        self.http
            .client()
            .post(format!("{}/v1/{}", self.base_url, endpoint))
            .bearer_auth(&self.api_key)
    }
}

/// Image size closest to the requested aspect ratio.
fn image_size(aspect: AspectRatio) -> &'static str {
    let ratio = aspect.as_f64();
    if ratio > 1.1 {
        "1536x1024"
    } else if ratio < 0.9 {
        "1024x1536"
    } else {
        "1024x1024"
    }
}

/// OpenAI voice for a preset or raw voice name.
fn tts_voice(voice: Option<&str>) -> &'static str {
    match voice {
        Some(v) => {
            if let Some(name) = TTS_VOICES.iter().find(|n| v.eq_ignore_ascii_case(n)) {
                *name
            } else if v.contains("female") {
                "nova"
            } else if v.contains("male") {
                "onyx"
            } else {
                "alloy"
            }
        }
        None => "alloy",
    }
}

#[async_trait]
impl ScriptGenerator for OpenAiClient {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn generate_script(&self, request: &ScriptRequest) -> AdapterResult<ScriptDraft> {
        let prompt = build_script_prompt(request);
        let body = json!({
            "model": self.chat_model,
            "messages": [
                {"role": "system", "content": "You write video ad scripts and reply with JSON only."},
                {"role": "user", "content": prompt},
            ],
            "response_format": {"type": "json_object"},
        });

        debug!(model = %self.chat_model, "Requesting script from OpenAI");
        let response: ChatResponse = self
            .http
            .send_json(self.post("chat/completions").json(&body), &request.options)
            .await?;

        let choice = response
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::unavailable(VENDOR, "No choices in response"))?;

        if choice.message.refusal.is_some()
            || choice.finish_reason.as_deref() == Some("content_filter")
        {
            return Err(AdapterError::rejected(VENDOR, "Content policy refusal"));
        }

        parse_script_draft(VENDOR, choice.message.content.as_deref().unwrap_or_default())
    }
}

#[async_trait]
impl VisualGenerator for OpenAiClient {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn generate_visual(&self, request: &VisualRequest) -> AdapterResult<GeneratedAsset> {
        let body = ImageRequest {
            model: &self.image_model,
            prompt: &request.prompt,
            n: 1,
            size: image_size(request.aspect_ratio),
        };

        let response: ImageResponse = self
            .http
            .send_json(self.post("images/generations").json(&body), &request.options)
            .await?;

        let image = response
            .data
            .into_iter()
            .next()
            .ok_or_else(|| AdapterError::rejected(VENDOR, "No image returned"))?;

        let asset = match (image.b64_json, image.url) {
            (Some(b64), _) => AdapterAsset::Inline {
                bytes: base64::engine::general_purpose::STANDARD
                    .decode(b64.as_bytes())
                    .map_err(|e| AdapterError::unavailable(VENDOR, format!("Bad base64: {}", e)))?,
                content_type: "image/png".to_string(),
            },
            (None, Some(url)) => AdapterAsset::Url {
                url,
                content_type: "image/png".to_string(),
            },
            (None, None) => return Err(AdapterError::unavailable(VENDOR, "Empty image payload")),
        };

        Ok(GeneratedAsset::new(VENDOR, asset))
    }
}

#[async_trait]
impl SpeechSynthesizer for OpenAiClient {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn synthesize_speech(&self, request: &SpeechRequest) -> AdapterResult<GeneratedAsset> {
        if request.text.trim().is_empty() {
            return Err(AdapterError::invalid_input(VENDOR, "Empty narration text"));
        }
        let body = json!({
            "model": self.tts_model,
            "input": request.text,
            "voice": tts_voice(request.voice.as_deref()),
            "response_format": "mp3",
        });

        let bytes = self
            .http
            .send_bytes(self.post("audio/speech").json(&body), &request.options)
            .await?;

        Ok(GeneratedAsset::new(
            VENDOR,
            AdapterAsset::Inline {
                bytes,
                content_type: "audio/mpeg".to_string(),
            },
        ))
    }
}
