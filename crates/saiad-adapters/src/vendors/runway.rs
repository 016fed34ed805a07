//! Runway image-to-video.

use std::time::Duration;

use async_trait::async_trait;
use saiad_models::AspectRatio;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capability::VideoClipGenerator;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::http::{poll_until, PollState, VendorHttp};
use crate::types::{AdapterAsset, GeneratedAsset, VideoClipRequest};

const VENDOR: &str = "runway";
const API_VERSION: &str = "2024-11-06";

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ImageToVideoRequest<'a> {
    prompt_image: &'a str,
    prompt_text: &'a str,
    model: &'a str,
    duration: u32,
    ratio: &'a str,
}

#[derive(Debug, Deserialize)]
struct CreatedTask {
    id: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct Task {
    status: String,
    #[serde(default)]
    output: Vec<String>,
    #[serde(default)]
    failure: Option<String>,
    #[serde(default)]
    failure_code: Option<String>,
}

pub struct RunwayClient {
    http: VendorHttp,
    api_key: String,
    base_url: String,
    model: String,
    poll_interval: Duration,
    max_wait: Duration,
}

/// Output resolution string Runway expects for a ratio.
fn runway_ratio(aspect: AspectRatio) -> &'static str {
    match aspect {
        AspectRatio::PORTRAIT => "720:1280",
        AspectRatio::SQUARE => "960:960",
        AspectRatio::INSTAGRAM_PORTRAIT => "832:1104",
        _ => "1280:720",
    }
}

impl RunwayClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        config: &AdapterConfig,
    ) -> AdapterResult<Self> {
        Ok(Self {
            http: VendorHttp::new(VENDOR, config.request_timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: config.runway_model.clone(),
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
        })
    }

    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Option<Self>> {
        match &config.runway_api_key {
            Some(key) => Self::new(key.clone(), config.runway_base_url.clone(), config).map(Some),
            None => Ok(None),
        }
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        self.http
            .client()
            .request(method, format!("{}/v1/{}", self.base_url, path))
            .bearer_auth(&self.api_key)
            .header("X-Runway-Version", API_VERSION)
    }

    fn task_state(task: Task) -> AdapterResult<PollState<String>> {
        match task.status.as_str() {
            "SUCCEEDED" => task
                .output
                .into_iter()
                .next()
                .map(PollState::Ready)
                .ok_or_else(|| AdapterError::unavailable(VENDOR, "Task succeeded without output")),
            "FAILED" | "CANCELLED" => {
                let message = task.failure.unwrap_or_else(|| "Task failed".to_string());
                let code = task.failure_code.unwrap_or_default();
                if code.starts_with("SAFETY") {
                    Err(AdapterError::rejected(VENDOR, message))
                } else if code.starts_with("INPUT") {
                    Err(AdapterError::invalid_input(VENDOR, message))
                } else {
                    Err(AdapterError::unavailable(VENDOR, message))
                }
            }
            // PENDING, THROTTLED, RUNNING
            _ => Ok(PollState::Pending),
        }
    }
}

#[async_trait]
impl VideoClipGenerator for RunwayClient {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn generate_video_clip(
        &self,
        request: &VideoClipRequest,
    ) -> AdapterResult<GeneratedAsset> {
        let clip_seconds = request.clip_seconds();
        let body = ImageToVideoRequest {
            prompt_image: &request.image_url,
            prompt_text: &request.prompt,
            model: &self.model,
            duration: clip_seconds,
            ratio: runway_ratio(request.aspect_ratio),
        };

        let created: CreatedTask = self
            .http
            .send_json(
                self.request(reqwest::Method::POST, "image_to_video").json(&body),
                &request.options,
            )
            .await?;
        debug!(task_id = %created.id, "Runway task created");

        let max_wait = self.max_wait.min(request.options.timeout);
        let task_path = format!("tasks/{}", created.id);
        let options = &request.options;
        let url = poll_until(VENDOR, self.poll_interval, max_wait, move || {
            let builder = self.request(reqwest::Method::GET, &task_path);
            async move {
                let task: Task = self.http.send_json(builder, options).await?;
                Self::task_state(task)
            }
        })
        .await?;

        info!(task_id = %created.id, "Runway clip ready");
        Ok(GeneratedAsset::new(
            VENDOR,
            AdapterAsset::Url {
                url,
                content_type: "video/mp4".to_string(),
            },
        )
        .with_duration(clip_seconds as f64))
    }
}
