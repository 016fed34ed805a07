//! Replicate predictions (Stable Video Diffusion) as the video-clip fallback.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use crate::capability::VideoClipGenerator;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::http::{poll_until, PollState, VendorHttp};
use crate::types::{AdapterAsset, GeneratedAsset, VideoClipRequest};

const VENDOR: &str = "replicate";

#[derive(Debug, Deserialize)]
struct Prediction {
    id: String,
    status: String,
    #[serde(default)]
    output: Value,
    #[serde(default)]
    error: Option<Value>,
}

impl Prediction {
    fn output_url(&self) -> Option<String> {
        match &self.output {
            Value::String(url) => Some(url.clone()),
            Value::Array(items) => items.iter().find_map(|v| v.as_str().map(String::from)),
            _ => None,
        }
    }
}

pub struct ReplicateClient {
    http: VendorHttp,
    api_token: String,
    base_url: String,
    version: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl ReplicateClient {
    pub fn new(
        api_token: impl Into<String>,
        base_url: impl Into<String>,
        config: &AdapterConfig,
    ) -> AdapterResult<Self> {
        Ok(Self {
            http: VendorHttp::new(VENDOR, config.request_timeout)?,
            api_token: api_token.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            version: config.replicate_svd_version.clone(),
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
        })
    }

    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Option<Self>> {
        match &config.replicate_api_token {
            Some(token) => {
                Self::new(token.clone(), config.replicate_base_url.clone(), config).map(Some)
            }
            None => Ok(None),
        }
    }

    fn state(prediction: Prediction) -> AdapterResult<PollState<String>> {
        match prediction.status.as_str() {
            "succeeded" => prediction
                .output_url()
                .map(PollState::Ready)
                .ok_or_else(|| AdapterError::unavailable(VENDOR, "Prediction has no output")),
            "failed" | "canceled" => {
                let message = prediction
                    .error
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "Prediction failed".to_string());
                if message.to_lowercase().contains("nsfw") {
                    Err(AdapterError::rejected(VENDOR, message))
                } else {
                    Err(AdapterError::unavailable(VENDOR, message))
                }
            }
            _ => Ok(PollState::Pending),
        }
    }
}

#[async_trait]
impl VideoClipGenerator for ReplicateClient {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn generate_video_clip(
        &self,
        request: &VideoClipRequest,
    ) -> AdapterResult<GeneratedAsset> {
        let body = json!({
            "version": self.version,
            "input": {
                "input_image": request.image_url,
                "video_length": "25_frames_with_svd_xt",
                "frames_per_second": 6,
                "sizing_strategy": "maintain_aspect_ratio",
            }
        });

        let created: Prediction = self
            .http
            .send_json(
                self.http
                    .client()
                    .post(format!("{}/v1/predictions", self.base_url))
                    .bearer_auth(&self.api_token)
                    .json(&body),
                &request.options,
            )
            .await?;
        debug!(prediction_id = %created.id, "Replicate prediction created");

        let max_wait = self.max_wait.min(request.options.timeout);
        let prediction_url = format!("{}/v1/predictions/{}", self.base_url, created.id);
        let options = &request.options;
        let url = poll_until(VENDOR, self.poll_interval, max_wait, move || {
            let builder = self
                .http
                .client()
                .get(&prediction_url)
                .bearer_auth(&self.api_token);
            async move {
                let prediction: Prediction = self.http.send_json(builder, options).await?;
                Self::state(prediction)
            }
        })
        .await?;

        Ok(GeneratedAsset::new(
            VENDOR,
            AdapterAsset::Url {
                url,
                content_type: "video/mp4".to_string(),
            },
        ))
    }
}
