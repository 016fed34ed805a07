//! Scenes and storyboards.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{Transition, VisualSource};

/// One timed segment of the target video.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Scene {
    /// Order index, contiguous from 1
    pub index: u32,
    /// Planned duration in seconds
    pub duration_secs: f64,
    /// Narration text (may be empty)
    #[serde(default)]
    pub narration: String,
    /// Prompt for visual generation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_prompt: Option<String>,
    /// Resolved visual, filled by the image/video stages or supplied up front
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visual_source: Option<VisualSource>,
    /// Text burned in while this scene plays
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overlay: Option<String>,
    /// Transition into the next scene
    #[serde(default)]
    pub transition: Transition,
}

impl Scene {
    pub fn new(index: u32, duration_secs: f64) -> Self {
        Self {
            index,
            duration_secs,
            narration: String::new(),
            visual_prompt: None,
            visual_source: None,
            overlay: None,
            transition: Transition::default(),
        }
    }

    pub fn with_narration(mut self, narration: impl Into<String>) -> Self {
        self.narration = narration.into();
        self
    }

    pub fn with_visual(mut self, source: VisualSource) -> Self {
        self.visual_source = Some(source);
        self
    }

    pub fn has_narration(&self) -> bool {
        !self.narration.trim().is_empty()
    }
}

/// Headline/subline/CTA copy burned into the video.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct AdCopy {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub headline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subline: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cta: Option<String>,
}

/// Timing window of a scene on the output timeline.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SceneWindow {
    pub index: u32,
    pub start_secs: f64,
    pub duration_secs: f64,
}

impl SceneWindow {
    pub fn end_secs(&self) -> f64 {
        self.start_secs + self.duration_secs
    }
}

/// Ordered scenes plus ad copy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct Storyboard {
    pub scenes: Vec<Scene>,
    #[serde(default)]
    pub copy: AdCopy,
}

/// Storyboard timing/content violations.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum StoryboardError {
    #[error("Storyboard has no scenes")]
    Empty,

    #[error("Scene indices must be contiguous from 1: expected {expected}, found {found}")]
    NonContiguousIndex { expected: u32, found: u32 },

    #[error("Scene {index} has a non-positive duration")]
    NonPositiveDuration { index: u32 },

    #[error("Scene durations sum to {actual_secs}s but the target is {expected_secs}s")]
    DurationMismatch { expected_secs: f64, actual_secs: f64 },

    #[error("Scene {index} has no resolved visual source")]
    UnresolvedVisual { index: u32 },
}

/// Durations are compared in whole milliseconds so float noise
/// (0.1 + 0.2) does not break exact-sum checks.
pub fn to_millis(secs: f64) -> i64 {
    (secs * 1000.0).round() as i64
}

impl Storyboard {
    pub fn new(scenes: Vec<Scene>) -> Self {
        let mut storyboard = Self {
            scenes,
            copy: AdCopy::default(),
        };
        storyboard.sort();
        storyboard
    }

    /// Build evenly sized scenes covering `total_secs`.
    pub fn evenly_split(total_secs: f64, count: u32) -> Self {
        let count = count.max(1);
        let total_ms = to_millis(total_secs);
        let base = total_ms / count as i64;
        let remainder = total_ms - base * count as i64;
        let scenes = (1..=count)
            .map(|index| {
                // The last scene absorbs the rounding remainder.
                let ms = if index == count { base + remainder } else { base };
                Scene::new(index, ms as f64 / 1000.0)
            })
            .collect();
        Self::new(scenes)
    }

    /// Sort scenes by order index.
    pub fn sort(&mut self) {
        self.scenes.sort_by_key(|s| s.index);
    }

    pub fn total_duration_secs(&self) -> f64 {
        self.total_duration_ms() as f64 / 1000.0
    }

    pub fn total_duration_ms(&self) -> i64 {
        self.scenes.iter().map(|s| to_millis(s.duration_secs)).sum()
    }

    /// Check ordering, positivity and the exact-sum contract.
    pub fn validate_timing(&self, target_secs: f64) -> Result<(), StoryboardError> {
        if self.scenes.is_empty() {
            return Err(StoryboardError::Empty);
        }

        let mut indices: Vec<u32> = self.scenes.iter().map(|s| s.index).collect();
        indices.sort_unstable();
        for (position, found) in indices.iter().enumerate() {
            let expected = position as u32 + 1;
            if *found != expected {
                return Err(StoryboardError::NonContiguousIndex {
                    expected,
                    found: *found,
                });
            }
        }

        if let Some(scene) = self
            .scenes
            .iter()
            .find(|s| !s.duration_secs.is_finite() || to_millis(s.duration_secs) <= 0)
        {
            return Err(StoryboardError::NonPositiveDuration { index: scene.index });
        }

        let actual_ms = self.total_duration_ms();
        if actual_ms != to_millis(target_secs) {
            return Err(StoryboardError::DurationMismatch {
                expected_secs: target_secs,
                actual_secs: actual_ms as f64 / 1000.0,
            });
        }

        Ok(())
    }

    /// Timing checks plus every scene having a resolved visual.
    pub fn validate_for_compositing(&self, target_secs: f64) -> Result<(), StoryboardError> {
        self.validate_timing(target_secs)?;
        if let Some(scene) = self.scenes.iter().find(|s| s.visual_source.is_none()) {
            return Err(StoryboardError::UnresolvedVisual { index: scene.index });
        }
        Ok(())
    }

    /// Scene windows in order index.
    pub fn timeline(&self) -> Vec<SceneWindow> {
        let mut ordered: Vec<&Scene> = self.scenes.iter().collect();
        ordered.sort_by_key(|s| s.index);

        let mut start_ms = 0i64;
        ordered
            .into_iter()
            .map(|scene| {
                let duration_ms = to_millis(scene.duration_secs);
                let window = SceneWindow {
                    index: scene.index,
                    start_secs: start_ms as f64 / 1000.0,
                    duration_secs: duration_ms as f64 / 1000.0,
                };
                start_ms += duration_ms;
                window
            })
            .collect()
    }

    pub fn scene(&self, index: u32) -> Option<&Scene> {
        self.scenes.iter().find(|s| s.index == index)
    }

    pub fn scene_mut(&mut self, index: u32) -> Option<&mut Scene> {
        self.scenes.iter_mut().find(|s| s.index == index)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board(durations: &[f64]) -> Storyboard {
        Storyboard::new(
            durations
                .iter()
                .enumerate()
                .map(|(i, d)| Scene::new(i as u32 + 1, *d))
                .collect(),
        )
    }

    #[test]
    fn test_exact_sum_accepted() {
        assert!(board(&[5.0, 10.0, 10.0, 5.0]).validate_timing(30.0).is_ok());
    }

    #[test]
    fn test_short_sum_rejected() {
        let err = board(&[5.0, 10.0, 10.0, 4.9]).validate_timing(30.0).unwrap_err();
        assert!(matches!(err, StoryboardError::DurationMismatch { .. }));
    }

    #[test]
    fn test_float_noise_tolerated() {
        assert!(board(&[0.1, 0.2]).validate_timing(0.3).is_ok());
    }

    #[test]
    fn test_indices_must_be_contiguous() {
        let storyboard = Storyboard::new(vec![Scene::new(1, 5.0), Scene::new(3, 5.0)]);
        assert_eq!(
            storyboard.validate_timing(10.0),
            Err(StoryboardError::NonContiguousIndex { expected: 2, found: 3 })
        );
    }

    #[test]
    fn test_zero_duration_rejected() {
        assert_eq!(
            board(&[0.0, 5.0]).validate_timing(5.0),
            Err(StoryboardError::NonPositiveDuration { index: 1 })
        );
    }

    #[test]
    fn test_compositing_requires_visuals() {
        let mut storyboard = board(&[15.0, 15.0]);
        storyboard.scenes[0].visual_source = Some(crate::VisualSource::image("a.png"));
        assert_eq!(
            storyboard.validate_for_compositing(30.0),
            Err(StoryboardError::UnresolvedVisual { index: 2 })
        );
    }

    #[test]
    fn test_timeline_offsets() {
        let windows = board(&[5.0, 10.0, 10.0, 5.0]).timeline();
        let starts: Vec<f64> = windows.iter().map(|w| w.start_secs).collect();
        assert_eq!(starts, vec![0.0, 5.0, 15.0, 25.0]);
        assert_eq!(windows[3].end_secs(), 30.0);
    }

    #[test]
    fn test_evenly_split_preserves_total() {
        let storyboard = Storyboard::evenly_split(10.0, 3);
        assert_eq!(storyboard.scenes.len(), 3);
        assert!(storyboard.validate_timing(10.0).is_ok());
    }
}
