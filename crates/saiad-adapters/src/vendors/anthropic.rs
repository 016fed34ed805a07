//! Anthropic messages API script writer.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capability::ScriptGenerator;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::http::VendorHttp;
use crate::script::{build_script_prompt, parse_script_draft};
use crate::types::{ScriptDraft, ScriptRequest};

const VENDOR: &str = "anthropic";
const API_VERSION: &str = "2023-06-01";

#[derive(Debug, Serialize)]
struct MessagesRequest<'a> {
    model: &'a str,
    max_tokens: u32,
    messages: Vec<Message<'a>>,
}

#[derive(Debug, Serialize)]
struct Message<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct MessagesResponse {
    #[serde(default)]
    content: Vec<ContentBlock>,
    #[serde(default)]
    stop_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ContentBlock {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    text: String,
}

/// Claude-backed script generator.
pub struct AnthropicScriptWriter {
    http: VendorHttp,
    api_key: String,
    base_url: String,
    model: String,
}

impl AnthropicScriptWriter {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
        config: &AdapterConfig,
    ) -> AdapterResult<Self> {
        Ok(Self {
            http: VendorHttp::new(VENDOR, config.request_timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
        })
    }

    /// `None` when no API key is configured.
    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Option<Self>> {
        match &config.anthropic_api_key {
            Some(key) => Self::new(
                key.clone(),
                config.anthropic_base_url.clone(),
                config.anthropic_model.clone(),
                config,
            )
            .map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl ScriptGenerator for AnthropicScriptWriter {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn generate_script(&self, request: &ScriptRequest) -> AdapterResult<ScriptDraft> {
        let prompt = build_script_prompt(request);
        let body = MessagesRequest {
            model: &self.model,
            max_tokens: 2048,
            messages: vec![Message {
                role: "user",
                content: &prompt,
            }],
        };

        debug!(model = %self.model, "Requesting script from Anthropic");
        let builder = self
            .http
            .client()
            .post(format!("{}/v1/messages", self.base_url))
            .header("x-api-key", &self.api_key)
            .header("anthropic-version", API_VERSION)
            .json(&body);
        let response: MessagesResponse = self.http.send_json(builder, &request.options).await?;

        if response.stop_reason.as_deref() == Some("refusal") {
            return Err(AdapterError::rejected(VENDOR, "Model refused the request"));
        }

        let text = response
            .content
            .iter()
            .filter(|b| b.kind == "text")
            .map(|b| b.text.as_str())
            .collect::<String>();

        let draft = parse_script_draft(VENDOR, &text)?;
        info!(scenes = draft.scenes.len(), "Script generated by Anthropic");
        Ok(draft)
    }
}
