//! Configuration types for document scoring.
//!
//! All scoring behaviour is controlled through [`ScorerConfig`], built via its
//! [`ScorerConfigBuilder`]. One struct for every knob makes it easy to log a
//! run's settings and to share them between a CLI and a web front end.

use crate::error::ScoreError;
use crate::progress::ProgressCallback;
use crate::prompts::Rubric;
use edgequake_llm::LLMProvider;
use std::fmt;
use std::sync::Arc;

/// Default scoring model.
pub const DEFAULT_MODEL: &str = "gpt-4.1-mini";

/// Default Responses API base URL.
pub const DEFAULT_API_BASE: &str = "https://api.openai.com/v1";

/// Default vision model used to transcribe images.
pub const DEFAULT_VISION_MODEL: &str = "gpt-4.1-mini";

/// Configuration for scoring documents.
///
/// # Example
/// ```rust
/// use datadon_scorer::ScorerConfig;
///
/// let config = ScorerConfig::builder()
///     .model("gpt-4.1-mini")
///     .enhance_images(false)
///     .request_timeout_secs(30)
///     .build()
///     .unwrap();
/// ```
#[derive(Clone)]
pub struct ScorerConfig {
    /// Scoring model identifier. Default: `gpt-4.1-mini`.
    pub model: String,

    /// Base URL of the Responses endpoint. Default: `https://api.openai.com/v1`.
    pub api_base_url: String,

    /// API key for the scoring endpoint. If None, `OPENAI_API_KEY` is read
    /// when the HTTP transport is built.
    pub api_key: Option<String>,

    /// HTTP timeout for one scoring call in seconds. Default: 60.
    ///
    /// The scorer itself has no timeout semantics; an elapsed timeout
    /// surfaces as a transport error.
    pub request_timeout_secs: u64,

    /// Rubric sent as the first message of every request. Default: v1.3.
    pub rubric: Rubric,

    /// Run the contrast/sharpen/brighten/unsharp pass on images before
    /// transcription. Default: true.
    pub enhance_images: bool,

    /// Use a vision model for images when one can be resolved. Default: true.
    pub vision: bool,

    /// Pre-constructed vision provider. Takes precedence over `vision_provider_name`.
    pub vision_provider: Option<Arc<dyn LLMProvider>>,

    /// Vision provider name (e.g. "openai", "anthropic", "ollama").
    /// If None, auto-detected from the environment.
    pub vision_provider_name: Option<String>,

    /// Vision model identifier. Default: `gpt-4.1-mini`.
    pub vision_model: String,

    /// Sampling temperature for transcription. Default: 0.0.
    pub vision_temperature: f32,

    /// Maximum tokens the vision model may generate. Default: 2048.
    pub vision_max_tokens: usize,

    /// Optional per-file progress events for batches.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for ScorerConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_MODEL.to_string(),
            api_base_url: DEFAULT_API_BASE.to_string(),
            api_key: None,
            request_timeout_secs: 60,
            rubric: Rubric::default(),
            enhance_images: true,
            vision: true,
            vision_provider: None,
            vision_provider_name: None,
            vision_model: DEFAULT_VISION_MODEL.to_string(),
            vision_temperature: 0.0,
            vision_max_tokens: 2048,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for ScorerConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScorerConfig")
            .field("model", &self.model)
            .field("api_base_url", &self.api_base_url)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("request_timeout_secs", &self.request_timeout_secs)
            .field("rubric_version", &self.rubric.version)
            .field("enhance_images", &self.enhance_images)
            .field("vision", &self.vision)
            .field(
                "vision_provider",
                &self.vision_provider.as_ref().map(|_| "<dyn LLMProvider>"),
            )
            .field("vision_provider_name", &self.vision_provider_name)
            .field("vision_model", &self.vision_model)
            .field("vision_temperature", &self.vision_temperature)
            .field("vision_max_tokens", &self.vision_max_tokens)
            .finish()
    }
}

impl ScorerConfig {
    /// Create a new builder for `ScorerConfig`.
    pub fn builder() -> ScorerConfigBuilder {
        ScorerConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`ScorerConfig`].
#[derive(Debug)]
pub struct ScorerConfigBuilder {
    config: ScorerConfig,
}

impl ScorerConfigBuilder {
    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_base_url(mut self, url: impl Into<String>) -> Self {
        self.config.api_base_url = url.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn request_timeout_secs(mut self, secs: u64) -> Self {
        self.config.request_timeout_secs = secs;
        self
    }

    pub fn rubric(mut self, rubric: Rubric) -> Self {
        self.config.rubric = rubric;
        self
    }

    pub fn enhance_images(mut self, v: bool) -> Self {
        self.config.enhance_images = v;
        self
    }

    pub fn vision(mut self, v: bool) -> Self {
        self.config.vision = v;
        self
    }

    pub fn vision_provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.vision_provider = Some(provider);
        self
    }

    pub fn vision_provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.vision_provider_name = Some(name.into());
        self
    }

    pub fn vision_model(mut self, model: impl Into<String>) -> Self {
        self.config.vision_model = model.into();
        self
    }

    pub fn vision_temperature(mut self, t: f32) -> Self {
        self.config.vision_temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn vision_max_tokens(mut self, n: usize) -> Self {
        self.config.vision_max_tokens = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<ScorerConfig, ScoreError> {
        let c = &self.config;
        if c.model.trim().is_empty() {
            return Err(ScoreError::InvalidConfig("Model must not be empty".into()));
        }
        if !(c.api_base_url.starts_with("http://") || c.api_base_url.starts_with("https://")) {
            return Err(ScoreError::InvalidConfig(format!(
                "API base URL must be http(s), got '{}'",
                c.api_base_url
            )));
        }
        if c.request_timeout_secs == 0 {
            return Err(ScoreError::InvalidConfig("Timeout must be ≥ 1 second".into()));
        }
        if c.rubric.text.trim().is_empty() {
            return Err(ScoreError::InvalidConfig("Rubric text must not be empty".into()));
        }
        if c.vision_max_tokens == 0 {
            return Err(ScoreError::InvalidConfig("Vision max tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults() {
        let c = ScorerConfig::default();
        assert_eq!(c.model, "gpt-4.1-mini");
        assert_eq!(c.api_base_url, "https://api.openai.com/v1");
        assert_eq!(c.request_timeout_secs, 60);
        assert_eq!(c.rubric.version, "1.3");
        assert!(c.enhance_images);
        assert!(c.vision);
    }

    #[test]
    fn builder_rejects_bad_values() {
        assert!(ScorerConfig::builder().model("  ").build().is_err());
        assert!(ScorerConfig::builder().request_timeout_secs(0).build().is_err());
        assert!(ScorerConfig::builder().api_base_url("ftp://x").build().is_err());
        assert!(ScorerConfig::builder()
            .rubric(Rubric::custom("9", " "))
            .build()
            .is_err());
    }

    #[test]
    fn builder_clamps_temperature() {
        let c = ScorerConfig::builder().vision_temperature(9.0).build().unwrap();
        assert_eq!(c.vision_temperature, 2.0);
    }

    #[test]
    fn debug_redacts_key() {
        let c = ScorerConfig::builder().api_key("sk-secret").build().unwrap();
        let dbg = format!("{c:?}");
        assert!(!dbg.contains("sk-secret"));
        assert!(dbg.contains("<redacted>"));
    }
}
