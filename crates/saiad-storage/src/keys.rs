//! Object key layout for a job's artifacts.

use saiad_models::ExportProfile;

use crate::error::{StorageError, StorageResult};

/// File extension for a content type.
pub fn extension_for(content_type: &str) -> &'static str {
    match content_type.split(';').next().unwrap_or_default().trim() {
        "image/png" => "png",
        "image/jpeg" | "image/jpg" => "jpg",
        "image/webp" => "webp",
        "video/mp4" => "mp4",
        "video/webm" => "webm",
        "audio/mpeg" | "audio/mp3" => "mp3",
        "audio/wav" | "audio/x-wav" => "wav",
        "application/json" => "json",
        _ => "bin",
    }
}

/// Reject keys that could escape a prefix or root directory.
pub fn validate_key(key: &str) -> StorageResult<()> {
    if key.is_empty()
        || key.starts_with('/')
        || key.contains('\\')
        || key.split('/').any(|part| part.is_empty() || part == "." || part == "..")
    {
        return Err(StorageError::invalid_key(key));
    }
    Ok(())
}

/// Prefix for objects uploaded ahead of a job and referenced by requests.
pub const UPLOADS_PREFIX: &str = "uploads/";

/// Keys under `jobs/{job_id}/`.
#[derive(Debug, Clone)]
pub struct ArtifactKeys {
    prefix: String,
}

impl ArtifactKeys {
    pub fn new(job_id: &str) -> Self {
        Self {
            prefix: format!("jobs/{}", job_id),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Whether a request-supplied key may be taken over by this job: its own
    /// objects or shared uploads, never another job's.
    pub fn may_adopt(&self, key: &str) -> bool {
        if validate_key(key).is_err() {
            return false;
        }
        key.starts_with(UPLOADS_PREFIX)
            || key
                .strip_prefix(self.prefix.as_str())
                .is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn script(&self) -> String {
        format!("{}/script.json", self.prefix)
    }

    pub fn scene_image(&self, index: u32, content_type: &str) -> String {
        format!(
            "{}/scenes/{:02}/image.{}",
            self.prefix,
            index,
            extension_for(content_type)
        )
    }

    pub fn scene_clip(&self, index: u32) -> String {
        format!("{}/scenes/{:02}/clip.mp4", self.prefix, index)
    }

    pub fn scene_narration(&self, index: u32, content_type: &str) -> String {
        format!(
            "{}/scenes/{:02}/narration.{}",
            self.prefix,
            index,
            extension_for(content_type)
        )
    }

    pub fn music(&self, content_type: &str) -> String {
        format!("{}/music.{}", self.prefix, extension_for(content_type))
    }

    /// Silent composite written by the compositing stage.
    pub fn composite(&self) -> String {
        format!("{}/composite.mp4", self.prefix)
    }

    pub fn master(&self) -> String {
        format!("{}/master.mp4", self.prefix)
    }

    pub fn export(&self, profile: ExportProfile) -> String {
        format!("{}/exports/{}.mp4", self.prefix, profile.as_str())
    }

    pub fn thumbnail(&self) -> String {
        format!("{}/thumbnail.jpg", self.prefix)
    }
}
