//! Suno instrumental generation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::capability::MusicProvider;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::http::{poll_until, PollState, VendorHttp};
use crate::music::mood_for;
use crate::types::{AdapterAsset, GeneratedAsset, MusicRequest};

const VENDOR: &str = "suno";

#[derive(Debug, Deserialize)]
struct Created {
    id: String,
}

#[derive(Debug, Deserialize)]
struct Clip {
    status: String,
    #[serde(default)]
    audio_url: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    error_message: Option<String>,
}

pub struct SunoClient {
    http: VendorHttp,
    api_key: String,
    base_url: String,
    poll_interval: Duration,
    max_wait: Duration,
}

impl SunoClient {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        config: &AdapterConfig,
    ) -> AdapterResult<Self> {
        Ok(Self {
            http: VendorHttp::new(VENDOR, config.request_timeout)?,
            api_key: api_key.into(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
            max_wait: config.max_wait,
        })
    }

    pub fn from_config(config: &AdapterConfig) -> AdapterResult<Option<Self>> {
        match &config.suno_api_key {
            Some(key) => Self::new(key.clone(), config.suno_base_url.clone(), config).map(Some),
            None => Ok(None),
        }
    }

    fn state(clips: Vec<Clip>) -> AdapterResult<PollState<(String, Option<f64>)>> {
        let Some(clip) = clips.into_iter().next() else {
            return Ok(PollState::Pending);
        };
        match clip.status.as_str() {
            "complete" => clip
                .audio_url
                .map(|url| PollState::Ready((url, clip.duration)))
                .ok_or_else(|| AdapterError::unavailable(VENDOR, "Clip complete without audio")),
            "error" => Err(AdapterError::unavailable(
                VENDOR,
                clip.error_message
                    .unwrap_or_else(|| "Generation failed".to_string()),
            )),
            _ => Ok(PollState::Pending),
        }
    }
}

#[async_trait]
impl MusicProvider for SunoClient {
    fn vendor(&self) -> &str {
        VENDOR
    }

    async fn generate_or_select_music(
        &self,
        request: &MusicRequest,
    ) -> AdapterResult<GeneratedAsset> {
        let mood = mood_for(request);
        let body = json!({
            "prompt": mood.prompt(),
            "duration": request.duration_secs.ceil() as u32,
            "make_instrumental": true,
            "wait_audio": false,
        });

        let created: Created = self
            .http
            .send_json(
                self.http
                    .client()
                    .post(format!("{}/api/generate", self.base_url))
                    .bearer_auth(&self.api_key)
                    .json(&body),
                &request.options,
            )
            .await?;
        debug!(clip_id = %created.id, mood = mood.as_str(), "Suno generation started");

        let max_wait = self.max_wait.min(request.options.timeout);
        let options = &request.options;
        let clip_id = created.id;
        let (url, duration) = poll_until(VENDOR, self.poll_interval, max_wait, move || {
            let builder = self
                .http
                .client()
                .get(format!("{}/api/get", self.base_url))
                .query(&[("ids", clip_id.as_str())])
                .bearer_auth(&self.api_key);
            async move {
                let clips: Vec<Clip> = self.http.send_json(builder, options).await?;
                Self::state(clips)
            }
        })
        .await?;

        let asset = GeneratedAsset::new(
            VENDOR,
            AdapterAsset::Url {
                url,
                content_type: "audio/mpeg".to_string(),
            },
        );
        Ok(match duration {
            Some(secs) => asset.with_duration(secs),
            None => asset,
        })
    }
}
