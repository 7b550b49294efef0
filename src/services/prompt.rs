//! Prompt helper: two built-in sticker-pack prompt presets, plus generation
//! of a custom prompt from a free-text topic via the Gemini REST API.

use super::{REQUEST_TIMEOUT, RemoteServiceError};
use serde::{Deserialize, Serialize};

const MODEL: &str = "gemini-2.5-flash";
const ENDPOINT_BASE: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Output language for generated prompts.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PromptLanguage {
    English,
    Chinese,
}

impl PromptLanguage {
    fn instruction(self) -> &'static str {
        match self {
            PromptLanguage::English => "Output language must be English.",
            PromptLanguage::Chinese => "输出语言为中文。",
        }
    }
}

/// Ready-made prompt presets shown without any API call.
pub const PRESET_LINE_STYLE: &str = "Generate a set of Q-version, LINE-style half-body sticker pack for the character in the image. Pay attention to head accessories.\nColorful hand-drawn style, use 4x6 layout, covering various common chat phrases or entertainment memes.\nRequirements: Do not copy the original image exactly. All text labels should be handwritten.\nGenerated image must be 4K resolution, 16:9 aspect ratio.";

pub const PRESET_BLIND_BOX: &str = "Design a set of 3D blind box style stickers, C4D render, Octane render, clay material, soft studio lighting.\nCharacters have exaggerated cute expressions including: laughing, crying, surprised, questioning, angry, finger heart.\nBackground: solid color soft gradient. 3x3 grid layout.\nGenerated image must be 4K resolution, high detail.";

/// Shown in the prompt box when no key is configured or the call failed —
/// service trouble never propagates past the prompt panel as an error.
pub const FALLBACK_NO_KEY: &str = "Please configure an API key to use AI generation.";
pub const FALLBACK_FAILED: &str = "AI service unavailable or invalid API key.";

/// Assemble the prompt-engineering request sent to the model for a topic.
pub fn build_request_text(topic: &str, language: PromptLanguage) -> String {
    format!(
        "You are an expert Prompt Engineer for Midjourney/DALL-E.\n\
         Based on the user topic: \"{}\", write a detailed sticker pack generation prompt.\n\
         \n\
         Requirements:\n\
         1. Style description (e.g., Q-version, Line style, 3D render).\n\
         2. Layout requirements (Recommend 3x3 or 4x6 or 3x8 grid).\n\
         3. Specific character expression/action descriptions.\n\
         4. Must include text: \"Generated image must be 4K resolution, 16:9\".\n\
         5. Must include text: \"Do not copy original image\".\n\
         6. {}\n\
         \n\
         Directly output the prompt content without conversational filler.",
        topic.trim(),
        language.instruction()
    )
}

// --- generateContent wire types --------------------------------------------

#[derive(Serialize)]
struct GenerateRequest {
    contents: Vec<Content>,
}

#[derive(Serialize, Deserialize)]
struct Content {
    parts: Vec<Part>,
}

#[derive(Serialize, Deserialize)]
struct Part {
    text: String,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
struct Candidate {
    content: Content,
}

/// Generate a sticker-pack prompt for `topic`. Blocking — run on a worker
/// thread. The caller (the prompt panel) maps every error onto a fallback
/// message; nothing here reaches the user as a raw error.
pub fn generate(
    topic: &str,
    language: PromptLanguage,
    api_key: &str,
) -> Result<String, RemoteServiceError> {
    if api_key.trim().is_empty() {
        return Err(RemoteServiceError::MissingApiKey);
    }

    let body = GenerateRequest {
        contents: vec![Content {
            parts: vec![Part { text: build_request_text(topic, language) }],
        }],
    };

    let client = reqwest::blocking::Client::builder()
        .timeout(REQUEST_TIMEOUT)
        .build()?;
    let response = client
        .post(format!("{}/{}:generateContent?key={}", ENDPOINT_BASE, MODEL, api_key))
        .json(&body)
        .send()?;

    let status = response.status();
    if !status.is_success() {
        return Err(super::error_for_status(
            status.as_u16(),
            status.canonical_reason().unwrap_or("unknown status"),
        ));
    }

    let parsed: GenerateResponse = response
        .json()
        .map_err(|e| RemoteServiceError::BadResponse(e.to_string()))?;
    parsed
        .candidates
        .into_iter()
        .next()
        .and_then(|c| c.content.parts.into_iter().next())
        .map(|p| p.text)
        .filter(|t| !t.trim().is_empty())
        .ok_or_else(|| RemoteServiceError::BadResponse("no candidate text".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_text_embeds_topic_and_constraints() {
        let text = build_request_text("  pixel art dog ", PromptLanguage::English);
        assert!(text.contains("\"pixel art dog\""));
        assert!(text.contains("3x3 or 4x6 or 3x8"));
        assert!(text.contains("Do not copy original image"));
        assert!(text.contains("Output language must be English."));

        let zh = build_request_text("柴犬", PromptLanguage::Chinese);
        assert!(zh.contains("输出语言为中文。"));
    }

    #[test]
    fn missing_key_is_reported_without_network() {
        assert!(matches!(
            generate("dog", PromptLanguage::English, ""),
            Err(RemoteServiceError::MissingApiKey)
        ));
    }

    #[test]
    fn response_shape_parses() {
        let raw = r#"{"candidates":[{"content":{"parts":[{"text":"a prompt"}],"role":"model"}}]}"#;
        let parsed: GenerateResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.candidates[0].content.parts[0].text, "a prompt");
    }
}
