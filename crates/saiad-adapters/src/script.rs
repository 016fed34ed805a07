//! Script prompt construction, response parsing and the built-in template writer.

use async_trait::async_trait;
use saiad_models::{ProductRef, Tone};

use crate::capability::ScriptGenerator;
use crate::error::{AdapterError, AdapterResult};
use crate::types::{SceneScript, ScriptDraft, ScriptRequest};

fn tone_description(tone: Tone) -> &'static str {
    match tone {
        Tone::Premium => "refined and aspirational; stress premium value and craftsmanship",
        Tone::Practical => "practical and reasonable; stress features and value for money",
        Tone::Mz => "casual and trendy; playful wording aimed at a young audience",
    }
}

fn language_instruction(language: &str) -> &'static str {
    match language {
        "en" => "Write in English.",
        "zh" => "Write in Simplified Chinese.",
        "ja" => "Write in Japanese.",
        _ => "Write in Korean.",
    }
}

/// Prompt sent to LLM script vendors.
pub fn build_script_prompt(request: &ScriptRequest) -> String {
    let product = &request.product;
    let features = if product.features.is_empty() {
        "- (none provided)".to_string()
    } else {
        product
            .features
            .iter()
            .map(|f| format!("- {}", f))
            .collect::<Vec<_>>()
            .join("\n")
    };
    let scenes = request
        .scene_durations
        .iter()
        .enumerate()
        .map(|(i, d)| format!("- scene {}: {:.1}s", i + 1, d))
        .collect::<Vec<_>>()
        .join("\n");

    format!(
        r#"You are an advertising copywriter for consumer electronics.
Write the script for a {duration:.0}-second video ad.

Product: {name}
Category: {category}
Key features:
{features}

Tone: {tone} ({tone_desc})
Template: {template}
{language}

The video has exactly these scenes:
{scenes}

Return ONLY a single JSON object with this schema:
{{
  "headline": "short headline, product name or key message",
  "subline": "one-line value proposition",
  "narration": "full narration, about {chars} characters",
  "cta": "short call to action",
  "scenes": [
    {{"index": 1, "narration": "narration spoken during this scene", "overlay": "on-screen text", "visual_prompt": "photographic description of the shot"}}
  ]
}}

Rules:
- Include one entry in "scenes" for every scene listed above, with matching index.
- Each scene's narration must be speakable within that scene's duration.
- Visual prompts describe a single still product shot, no text in the image.
"#,
        duration = request.duration_secs,
        name = product.display_name(),
        category = product.category.as_deref().unwrap_or("general"),
        features = features,
        tone = request.tone,
        tone_desc = tone_description(request.tone),
        template = request.template_id.as_deref().unwrap_or("standard"),
        language = language_instruction(&request.language),
        scenes = scenes,
        chars = (request.duration_secs * 2.5).round() as u64,
    )
}

/// Strip markdown fences and surrounding prose from an LLM reply.
pub fn extract_json(text: &str) -> Option<&str> {
    let text = text.trim();
    let text = text.strip_prefix("```json").unwrap_or(text);
    let text = text.strip_prefix("```").unwrap_or(text);
    let text = text.strip_suffix("```").unwrap_or(text);
    let start = text.find('{')?;
    let end = text.rfind('}')?;
    (start < end).then(|| &text[start..=end])
}

/// Parse an LLM reply into a draft. Unparseable output counts as a vendor
/// fault so the next vendor in the chain gets a turn.
pub fn parse_script_draft(vendor: &str, text: &str) -> AdapterResult<ScriptDraft> {
    let json = extract_json(text)
        .ok_or_else(|| AdapterError::unavailable(vendor, "Reply contained no JSON object"))?;
    let mut draft: ScriptDraft = serde_json::from_str(json)
        .map_err(|e| AdapterError::unavailable(vendor, format!("Unparseable script: {}", e)))?;

    if draft.headline.trim().is_empty() {
        return Err(AdapterError::unavailable(vendor, "Script is missing a headline"));
    }
    draft.scenes.sort_by_key(|s| s.index);
    draft.vendor = vendor.to_string();
    Ok(draft)
}

/// Default image prompt for a scene when the script supplies none.
pub fn default_visual_prompt(product: &ProductRef, tone: Tone, overlay: Option<&str>) -> String {
    let mood = match tone {
        Tone::Premium => "elegant studio lighting, dark gradient background, luxury feel",
        Tone::Practical => "bright natural light, everyday home setting, clean composition",
        Tone::Mz => "vivid colors, playful lifestyle scene, trendy urban setting",
    };
    let subject = match overlay {
        Some(text) if !text.trim().is_empty() => {
            format!("{} highlighting {}", product.display_name(), text.trim())
        }
        _ => product.display_name().to_string(),
    };
    format!(
        "Professional advertising photograph of {}, {}, high detail, no text",
        subject, mood
    )
}

struct TemplateCopy {
    subline: &'static str,
    narration: &'static str,
    cta: &'static str,
}

fn template_copy(tone: Tone, language: &str) -> TemplateCopy {
    let korean = !matches!(language, "en" | "zh" | "ja");
    match (tone, korean) {
        (Tone::Premium, true) => TemplateCopy {
            subline: "새로운 기준의 시작",
            narration: "{name}을 만나보세요. 혁신적인 기술과 세련된 디자인이 하나가 되었습니다.",
            cta: "지금 만나보세요",
        },
        (Tone::Practical, true) => TemplateCopy {
            subline: "현명한 선택",
            narration: "{name}과 함께 일상이 더 편리해집니다. 합리적인 가격으로 최고의 성능을 누리세요.",
            cta: "자세히 보기",
        },
        (Tone::Mz, true) => TemplateCopy {
            subline: "이건 써봐야 앎",
            narration: "요즘 제일 핫한 {name}. 한 번 써보면 바로 알게 됩니다.",
            cta: "지금 확인",
        },
        (Tone::Premium, false) => TemplateCopy {
            subline: "A new standard",
            narration: "Meet {name}. Innovative technology and refined design, together at last.",
            cta: "Discover now",
        },
        (Tone::Practical, false) => TemplateCopy {
            subline: "The smart choice",
            narration: "{name} makes every day easier. Top performance at a sensible price.",
            cta: "Learn more",
        },
        (Tone::Mz, false) => TemplateCopy {
            subline: "You have to try it",
            narration: "Everyone is talking about {name}. Try it once and you will get it.",
            cta: "Check it out",
        },
    }
}

/// Deterministic script built from tone templates. Never fails, so it is
/// the natural last entry in the script chain.
#[derive(Debug, Default, Clone)]
pub struct TemplateScriptWriter;

impl TemplateScriptWriter {
    pub const VENDOR: &'static str = "template";

    pub fn write(request: &ScriptRequest) -> ScriptDraft {
        let product = &request.product;
        let copy = template_copy(request.tone, &request.language);
        let narration = copy.narration.replace("{name}", product.display_name());

        let sentences: Vec<String> = narration
            .split_inclusive(['.', '!', '?'])
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .collect();

        let count = request.scene_durations.len().max(1);
        let scenes = (0..count)
            .map(|i| {
                let index = i as u32 + 1;
                let is_last = i + 1 == count && count > 1;
                let narration = if is_last {
                    copy.cta.to_string()
                } else {
                    sentences.get(i).cloned().unwrap_or_default()
                };
                let overlay = if i == 0 || is_last {
                    None
                } else {
                    product.features.get(i - 1).cloned()
                };
                SceneScript {
                    index,
                    narration,
                    visual_prompt: Some(default_visual_prompt(
                        product,
                        request.tone,
                        overlay.as_deref(),
                    )),
                    overlay,
                }
            })
            .collect();

        ScriptDraft {
            headline: product.display_name().to_string(),
            subline: copy.subline.to_string(),
            narration,
            cta: copy.cta.to_string(),
            scenes,
            vendor: Self::VENDOR.to_string(),
        }
    }
}

#[async_trait]
impl ScriptGenerator for TemplateScriptWriter {
    fn vendor(&self) -> &str {
        Self::VENDOR
    }

    async fn generate_script(&self, request: &ScriptRequest) -> AdapterResult<ScriptDraft> {
        Ok(Self::write(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CallOptions;
    use std::time::Duration;

    fn request() -> ScriptRequest {
        let mut product = ProductRef::new("galaxy-s25-ultra");
        product.name = Some("Galaxy S25 Ultra".into());
        product.features = vec!["200MP camera".into(), "S Pen".into()];
        ScriptRequest {
            product,
            tone: Tone::Premium,
            language: "en".into(),
            duration_secs: 30.0,
            scene_durations: vec![5.0, 10.0, 10.0, 5.0],
            template_id: None,
            options: CallOptions::new("k", Duration::from_secs(10)),
        }
    }

    #[test]
    fn test_extract_json_from_fenced_reply() {
        let reply = "Sure!\n```json\n{\"headline\": \"Hi\"}\n```";
        assert_eq!(extract_json(reply), Some("{\"headline\": \"Hi\"}"));
        assert_eq!(extract_json("no json here"), None);
    }

    #[test]
    fn test_parse_accepts_alias_fields() {
        let draft = parse_script_draft(
            "anthropic",
            r#"{"headline":"S25","subline":"x","narration":"n","cta":"Buy",
               "scenes":[{"order":2,"text":"Camera","narration":"b"},{"order":1,"narration":"a"}]}"#,
        )
        .unwrap();
        assert_eq!(draft.scenes[0].index, 1);
        assert_eq!(draft.scene(2).and_then(|s| s.overlay.as_deref()), Some("Camera"));
        assert_eq!(draft.vendor, "anthropic");
    }

    #[test]
    fn test_parse_rejects_missing_headline() {
        let err = parse_script_draft("openai", r#"{"headline":"  "}"#).unwrap_err();
        assert!(err.is_retryable());
    }

    #[test]
    fn test_prompt_lists_every_scene() {
        let prompt = build_script_prompt(&request());
        assert!(prompt.contains("scene 4: 5.0s"));
        assert!(prompt.contains("Galaxy S25 Ultra"));
        assert!(prompt.contains("Write in English."));
    }

    #[test]
    fn test_template_covers_all_scenes() {
        let draft = TemplateScriptWriter::write(&request());
        assert_eq!(draft.headline, "Galaxy S25 Ultra");
        assert_eq!(draft.scenes.len(), 4);
        assert_eq!(draft.scenes[3].narration, "Discover now");
        assert_eq!(draft.scenes[1].overlay.as_deref(), Some("200MP camera"));
        assert!(draft.scenes.iter().all(|s| s.visual_prompt.is_some()));
    }
}
