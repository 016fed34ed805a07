//! Google Imagen via the Generative Language API.

use async_trait::async_trait;
use base64::Engine;
use saiad_models::AspectRatio;
use serde::Deserialize;
use serde_json::json;

use crate::capability::VisualGenerator;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::http::VendorHttp;
use crate::types::{AdapterAsset, GeneratedAsset, VisualRequest};

const VENDOR: &str = "imagen";

#[derive(Debug, Deserialize)]
struct PredictResponse {
    #[serde(default)]
    predictions: Vec<Prediction>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Prediction {
    #[serde(default)]
    bytes_base64_encoded: Option<String>,
    #[serde(default)]
    mime_type: Option<String>,
}

pub struct ImagenClient {
    http: VendorHttp,
    api_key: String,
    base_url: String,
    model: String,
}

/// Imagen only accepts a fixed set of ratios; 4:5 renders as 3:4.
fn imagen_aspect(aspect: AspectRatio) -> &'static str {
    match aspect {
        AspectRatio::PORTRAIT => "9:16",
        AspectRatio::SQUARE => "1:1",
        AspectRatio::INSTAGRAM_PORTRAIT => "3:4",
        _ => "16:9",
    }
}

impl ImagenClient {
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

    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Option<Self>> {
        match &config.google_api_key {
            Some(key) => Self::new(
                key.clone(),
                config.google_base_url.clone(),
                config.imagen_model.clone(),
                config,
            )
            .map(Some),
            None => Ok(None),
        }
    }
}

#[async_trait]
impl VisualGenerator for ImagenClient {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn generate_visual(&self, request: &VisualRequest) -> AdapterResult<GeneratedAsset> {
        let body = json!({
            "instances": [{"prompt": request.prompt}],
            "parameters": {
                "sampleCount": 1,
                "aspectRatio": imagen_aspect(request.aspect_ratio),
                "outputOptions": {"mimeType": "image/png"},
            }
        });

        let builder = self
            .http
            .client()
            .post(format!(
                "{}/v1beta/models/{}:predict",
                self.base_url, self.model
            ))
            .query(&[("key", self.api_key.as_str())])
            .json(&body);
        let response: PredictResponse = self.http.send_json(builder, &request.options).await?;

        // Safety-filtered prompts come back with no predictions.
        let prediction = response
            .predictions
            .into_iter()
            .find(|p| p.bytes_base64_encoded.is_some())
            .ok_or_else(|| AdapterError::rejected(VENDOR, "Prompt was filtered"))?;

        let encoded = prediction.bytes_base64_encoded.unwrap_or_default();
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(encoded.as_bytes())
            .map_err(|e| AdapterError::unavailable(VENDOR, format!("Bad base64: {}", e)))?;

        Ok(GeneratedAsset::new(
            VENDOR,
            AdapterAsset::Inline {
                bytes,
                content_type: prediction
                    .mime_type
                    .unwrap_or_else(|| "image/png".to_string()),
            },
        ))
    }
}
