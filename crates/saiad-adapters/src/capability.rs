//! One async trait per capability.
//!
//! The orchestrator only ever sees these traits; vendor clients
//! implement them and the registry orders them into fallback chains.

use async_trait::async_trait;

use crate::error::AdapterResult;
use crate::types::{
    GeneratedAsset, MusicRequest, ScriptDraft, ScriptRequest, SpeechRequest, VideoClipRequest,
    VisualRequest,
};

#[async_trait]
pub trait ScriptGenerator: Send + Sync {
    fn vendor(&self) -> &str;

    async fn generate_script(&self, request: &ScriptRequest) -> AdapterResult<ScriptDraft>;
}

#[async_trait]
pub trait VisualGenerator: Send + Sync {
    fn vendor(&self) -> &str;

    async fn generate_visual(&self, request: &VisualRequest) -> AdapterResult<GeneratedAsset>;
}

#[async_trait]
pub trait VideoClipGenerator: Send + Sync {
    fn vendor(&self) -> &str;

    async fn generate_video_clip(
        &self,
        request: &VideoClipRequest,
    ) -> AdapterResult<GeneratedAsset>;
}

#[async_trait]
pub trait SpeechSynthesizer: Send + Sync {
    fn vendor(&self) -> &str;

    async fn synthesize_speech(&self, request: &SpeechRequest) -> AdapterResult<GeneratedAsset>;
}

#[async_trait]
pub trait MusicProvider: Send + Sync {
    fn vendor(&self) -> &str;

    async fn generate_or_select_music(&self, request: &MusicRequest)
        -> AdapterResult<GeneratedAsset>;
}
