//! Background music moods and the stock track library.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::capability::MusicProvider;
use crate::config::AdapterConfig;
use crate::error::{AdapterError, AdapterResult};
use crate::types::{AdapterAsset, GeneratedAsset, MusicRequest};

/// Mood of a background track.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MusicMood {
    Tech,
    Cinematic,
    Calm,
    Energetic,
    Inspiring,
}

impl MusicMood {
    pub const ALL: [MusicMood; 5] = [
        MusicMood::Tech,
        MusicMood::Cinematic,
        MusicMood::Calm,
        MusicMood::Energetic,
        MusicMood::Inspiring,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            MusicMood::Tech => "tech",
            MusicMood::Cinematic => "cinematic",
            MusicMood::Calm => "calm",
            MusicMood::Energetic => "energetic",
            MusicMood::Inspiring => "inspiring",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL
            .into_iter()
            .find(|m| m.as_str().eq_ignore_ascii_case(value.trim()))
    }

    /// Mood that suits a product category.
    pub fn for_category(category: Option<&str>) -> Self {
        match category.map(|c| c.trim().to_lowercase()).as_deref() {
            Some("tv") | Some("monitor") => MusicMood::Cinematic,
            Some("appliance") | Some("home") => MusicMood::Calm,
            Some("wearable") | Some("watch") | Some("audio") => MusicMood::Energetic,
            Some("tablet") | Some("laptop") => MusicMood::Inspiring,
            _ => MusicMood::Tech,
        }
    }

    /// Prompt for generative music vendors.
    pub fn prompt(&self) -> &'static str {
        match self {
            MusicMood::Tech => {
                "Modern, sleek electronic music with a confident pulse for a tech product showcase"
            }
            MusicMood::Cinematic => {
                "Cinematic orchestral build with wide pads and a dramatic rise for a premium display"
            }
            MusicMood::Calm => "Warm, calm acoustic ambience for a home appliance commercial",
            MusicMood::Energetic => {
                "Energetic upbeat pop with punchy drums for an active lifestyle product"
            }
            MusicMood::Inspiring => {
                "Inspiring corporate piano and strings with a hopeful build for a creative device"
            }
        }
    }

    /// Track file in the stock library.
    pub fn stock_track(&self) -> &'static str {
        match self {
            MusicMood::Tech => "tech_upbeat.mp3",
            MusicMood::Cinematic => "cinematic_premium.mp3",
            MusicMood::Calm => "ambient_modern.mp3",
            MusicMood::Energetic => "energetic_fitness.mp3",
            MusicMood::Inspiring => "inspiring_corporate.mp3",
        }
    }
}

/// Mood for a request: an explicit mood selection wins over the category.
pub fn mood_for(request: &MusicRequest) -> MusicMood {
    request
        .selection
        .as_deref()
        .and_then(MusicMood::parse)
        .unwrap_or_else(|| MusicMood::for_category(request.category.as_deref()))
}

/// Pre-licensed tracks served from a static base URL. Never calls out.
pub struct StockMusicLibrary {
    base_url: String,
}

impl StockMusicLibrary {
    pub const VENDOR: &'static str = "stock";

    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
        }
    }

    pub fn from_config(config: &AdapterConfig) -> Self {
        Self::new(config.stock_music_base_url.clone())
    }

    /// Track file for a request: a named track, a mood, or the category default.
    pub fn track_for(request: &MusicRequest) -> AdapterResult<&'static str> {
        if let Some(selection) = request.selection.as_deref() {
            if let Some(mood) = MusicMood::parse(selection) {
                return Ok(mood.stock_track());
            }
            let wanted = selection.trim().trim_end_matches(".mp3");
            return MusicMood::ALL
                .into_iter()
                .map(|m| m.stock_track())
                .find(|track| track.trim_end_matches(".mp3") == wanted)
                .ok_or_else(|| {
                    AdapterError::invalid_input(
                        Self::VENDOR,
                        format!("Unknown music selection '{}'", selection),
                    )
                });
        }
        Ok(MusicMood::for_category(request.category.as_deref()).stock_track())
    }
}

#[async_trait]
impl MusicProvider for StockMusicLibrary {
    fn vendor(&self) -> &str {
        Self::VENDOR
    }

    async fn generate_or_select_music(
        &self,
        request: &MusicRequest,
    ) -> AdapterResult<GeneratedAsset> {
        let track = Self::track_for(request)?;
        Ok(GeneratedAsset::new(
            Self::VENDOR,
            AdapterAsset::Url {
                url: format!("{}/{}", self.base_url, track),
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

    fn request(category: Option<&str>, selection: Option<&str>) -> MusicRequest {
        MusicRequest {
            category: category.map(String::from),
            selection: selection.map(String::from),
            duration_secs: 30.0,
            options: CallOptions::new("idem", Duration::from_secs(5)),
        }
    }

    #[test]
    fn test_category_moods() {
        assert_eq!(MusicMood::for_category(Some("smartphone")), MusicMood::Tech);
        assert_eq!(MusicMood::for_category(Some("TV")), MusicMood::Cinematic);
        assert_eq!(MusicMood::for_category(Some("appliance")), MusicMood::Calm);
        assert_eq!(MusicMood::for_category(None), MusicMood::Tech);
    }

    #[test]
    fn test_selection_overrides_category() {
        let req = request(Some("tv"), Some("energetic"));
        assert_eq!(mood_for(&req), MusicMood::Energetic);
        assert_eq!(
            StockMusicLibrary::track_for(&req).unwrap(),
            "energetic_fitness.mp3"
        );
        assert_eq!(
            StockMusicLibrary::track_for(&request(None, Some("ambient_modern"))).unwrap(),
            "ambient_modern.mp3"
        );
    }

    #[tokio::test]
    async fn test_stock_library_resolves_url() {
        let library = StockMusicLibrary::new("https://cdn.example.com/music/");
        let asset = library
            .generate_or_select_music(&request(Some("tv"), None))
            .await
            .unwrap();
        assert_eq!(
            asset.asset,
            AdapterAsset::Url {
                url: "https://cdn.example.com/music/cinematic_premium.mp3".into(),
                content_type: "audio/mpeg".into()
            }
        );

        let err = library
            .generate_or_select_music(&request(None, Some("polka")))
            .await
            .unwrap_err();
        assert!(matches!(err, AdapterError::InvalidInput { .. }));
    }
}
