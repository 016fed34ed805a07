//! Capability adapters for third-party generative vendors.
//!
//! Each capability (script, visual, video clip, speech, music) is an async
//! trait. Vendor clients implement them, normalize their responses and map
//! failures onto [`AdapterError`]. [`AdapterRegistry`] arranges the clients
//! into ordered fallback chains.

pub mod capability;
pub mod config;
pub mod error;
pub mod http;
pub mod music;
pub mod registry;
pub mod script;
pub mod types;
pub mod vendors;

pub use capability::{
    MusicProvider, ScriptGenerator, SpeechSynthesizer, VideoClipGenerator, VisualGenerator,
};
pub use config::AdapterConfig;
pub use error::{AdapterError, AdapterResult};
pub use http::derive_idempotency_key;
pub use music::{MusicMood, StockMusicLibrary};
pub use registry::AdapterRegistry;
pub use script::{default_visual_prompt, TemplateScriptWriter};
pub use types::{
    AdapterAsset, CallOptions, Capability, GeneratedAsset, MusicRequest, SceneScript, ScriptDraft,
    ScriptRequest, SpeechRequest, VideoClipRequest, VisualRequest,
};
