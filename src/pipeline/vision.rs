//! Vision transcription: image → structured receipt text via a VLM.
//!
//! Thin on purpose: the instruction lives in
//! [`crate::prompts::VISION_EXTRACTION_PROMPT`] and provider resolution lives
//! in the scorer. One attempt, no retries; on failure the extractor falls
//! back to the generic image converter.

use crate::config::ScorerConfig;
use crate::prompts::VISION_EXTRACTION_PROMPT;
use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMProvider};
use std::sync::Arc;
use std::time::Instant;
use tracing::debug;

/// Build the two-message transcription request.
///
/// The empty user text is intentional: the image carries all the content.
pub fn build_messages(image: ImageData) -> Vec<ChatMessage> {
    vec![
        ChatMessage::system(VISION_EXTRACTION_PROMPT),
        ChatMessage::user_with_images("", vec![image]),
    ]
}

/// Ask the vision model to transcribe one image.
///
/// Returns the raw model text, or a human-readable error. Empty output is
/// reported as an error so the caller never scores an empty transcription.
pub async fn transcribe(
    provider: &Arc<dyn LLMProvider>,
    image: ImageData,
    config: &ScorerConfig,
) -> Result<String, String> {
    let start = Instant::now();
    let messages = build_messages(image);
    let options = build_options(config);

    let response = provider
        .chat(&messages, Some(&options))
        .await
        .map_err(|e| format!("vision call failed: {e}"))?;

    debug!(
        "Vision: {} input tokens, {} output tokens, {:?}",
        response.prompt_tokens,
        response.completion_tokens,
        start.elapsed()
    );

    if response.content.trim().is_empty() {
        return Err("vision model returned no text".to_string());
    }
    Ok(response.content)
}

/// Build `CompletionOptions` from the scorer config.
fn build_options(config: &ScorerConfig) -> CompletionOptions {
    CompletionOptions {
        temperature: Some(config.vision_temperature),
        max_tokens: Some(config.vision_max_tokens),
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn build_options_defaults() {
        let config = ScorerConfig::default();
        let opts = build_options(&config);
        assert_eq!(opts.temperature, Some(0.0));
        assert_eq!(opts.max_tokens, Some(2048));
    }

    #[test]
    fn request_has_system_then_image() {
        let messages = build_messages(ImageData::new("aGk=", "image/png"));
        assert_eq!(messages.len(), 2);
    }
}
