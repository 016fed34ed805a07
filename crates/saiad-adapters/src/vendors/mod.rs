//! Vendor clients.

mod anthropic;
mod elevenlabs;
mod imagen;
mod openai;
mod replicate;
mod runway;
mod suno;

pub use anthropic::AnthropicScriptWriter;
pub use elevenlabs::{resolve_voice_id, ElevenLabsClient};
pub use imagen::ImagenClient;
pub use openai::OpenAiClient;
pub use replicate::ReplicateClient;
pub use runway::RunwayClient;
pub use suno::SunoClient;
