//! Scoring entry points.
//!
//! [`Scorer`] owns the three collaborators a scoring run needs: the text
//! extractor, the Responses transport, and the one piece of mutable state in
//! the crate, the content-tag belief.
//!
//! ## Negotiation
//!
//! The endpoint has drifted over time in two ways the adapter absorbs
//! locally instead of failing the request:
//!
//! * **Content tag.** Text blocks are tagged `input_text` on current
//!   deployments and `text` on older ones. When the endpoint rejects the tag
//!   we sent, the request is retried once with the other tag. Whichever tag
//!   succeeds is remembered for the lifetime of the `Scorer`.
//! * **Format hint.** If the endpoint refuses `text.format = json_object`,
//!   the request is retried once without it. This is not remembered.
//!
//! Every other transport failure propagates unchanged.

use crate::config::ScorerConfig;
use crate::error::{FileFailure, ScoreError, TransportError};
use crate::output::{BatchContext, BatchEntry, BatchOutcome, ScoredResult, ScoringRequest};
use crate::pipeline::extract::TextExtractor;
use crate::pipeline::payload;
use crate::responses::{
    ContentTag, HttpTransport, InputMessage, ResponsesRequest, ResponsesTransport, Role,
    TextOptions,
};
use edgequake_llm::{LLMProvider, ProviderFactory};
use serde_json::Value;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Instant;
use tracing::{debug, info, warn};

/// Scores documents against the configured rubric.
///
/// Cheap to share behind an `Arc`; concurrent `score` calls only contend on
/// the content-tag lock, which is never held across an `.await`.
pub struct Scorer {
    config: ScorerConfig,
    transport: Arc<dyn ResponsesTransport>,
    extractor: TextExtractor,
    content_tag: Mutex<ContentTag>,
}

impl std::fmt::Debug for Scorer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scorer")
            .field("config", &self.config)
            .field("content_tag", &self.content_tag())
            .field("vision", &self.extractor.has_vision())
            .finish()
    }
}

impl Scorer {
    /// Build a scorer that talks to `config.api_base_url` over HTTP.
    ///
    /// The API key comes from the config, else `OPENAI_API_KEY`.
    ///
    /// # Errors
    /// [`ScoreError::MissingApiKey`] when neither is set, or
    /// [`ScoreError::ProviderNotConfigured`] when an explicitly named vision
    /// provider cannot be built.
    pub fn new(config: ScorerConfig) -> Result<Self, ScoreError> {
        let api_key = config
            .api_key
            .clone()
            .filter(|k| !k.is_empty())
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(|k| !k.is_empty()))
            .ok_or(ScoreError::MissingApiKey)?;

        let transport = HttpTransport::new(
            &config.api_base_url,
            api_key,
            config.request_timeout_secs,
        )?;
        debug!("Scoring endpoint: {}", transport.url());
        Self::with_transport(config, Arc::new(transport))
    }

    /// Build a scorer around any [`ResponsesTransport`].
    pub fn with_transport(
        config: ScorerConfig,
        transport: Arc<dyn ResponsesTransport>,
    ) -> Result<Self, ScoreError> {
        let vision = resolve_vision_provider(&config)?;
        if vision.is_some() {
            info!("Vision transcription enabled ({})", config.vision_model);
        }
        let extractor = TextExtractor::new(&config, vision);
        Ok(Self {
            config,
            transport,
            extractor,
            content_tag: Mutex::new(ContentTag::default()),
        })
    }

    /// The tag the next request will try first.
    pub fn content_tag(&self) -> ContentTag {
        *self
            .content_tag
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }

    fn remember_tag(&self, tag: ContentTag) {
        let mut current = self
            .content_tag
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if *current != tag {
            info!("Content tag '{}' accepted; using it from now on", tag.as_str());
            *current = tag;
        }
    }

    fn build_request(&self, tag: ContentTag, user_text: &str, json_hint: bool) -> ResponsesRequest {
        ResponsesRequest {
            model: self.config.model.clone(),
            input: vec![
                InputMessage::new(Role::System, tag, self.config.rubric.text.as_ref()),
                InputMessage::new(Role::User, tag, user_text),
            ],
            text_options: json_hint.then(TextOptions::json_object),
        }
    }

    /// Score one payload.
    ///
    /// # Errors
    /// - [`ScoreError::Transport`] for endpoint failures that local
    ///   negotiation cannot fix
    /// - [`ScoreError::MalformedResponse`] when the reply is not a JSON object
    /// - [`ScoreError::Schema`] when a required field is missing or unusable
    pub async fn score(&self, request: &ScoringRequest) -> Result<ScoredResult, ScoreError> {
        let start = Instant::now();
        let user_text = serde_json::to_string(request)
            .map_err(|e| ScoreError::Internal(format!("Could not serialise payload: {e}")))?;

        let mut tag = self.content_tag();
        let mut json_hint = true;
        let mut tag_retried = false;
        let mut hint_retried = false;

        let reply = loop {
            let body = self.build_request(tag, &user_text, json_hint);
            match self.transport.create(&body).await {
                Ok(reply) => {
                    self.remember_tag(tag);
                    break reply;
                }
                Err(TransportError::ContentTagRejected { rejected, message })
                    if !tag_retried && rejected.map_or(true, |r| r == tag) =>
                {
                    let next = tag.flipped();
                    warn!(
                        "Endpoint rejected content tag '{}', retrying with '{}': {}",
                        tag.as_str(),
                        next.as_str(),
                        message
                    );
                    tag = next;
                    tag_retried = true;
                }
                Err(TransportError::ResponseFormatUnsupported { message })
                    if !hint_retried && json_hint =>
                {
                    warn!("Endpoint refused the JSON format hint, retrying without it: {}", message);
                    json_hint = false;
                    hint_retried = true;
                }
                Err(e) => return Err(e.into()),
            }
        };

        let text = reply.text().ok_or_else(|| ScoreError::MalformedResponse {
            detail: "reply carried no output text".to_string(),
        })?;
        let result = parse_reply(&text)?;

        if result.schema_version != self.config.rubric.version {
            warn!(
                "{}: schema_version '{}' differs from rubric version '{}'",
                request.file_id, result.schema_version, self.config.rubric.version
            );
        }
        if !result.band_matches_points() {
            warn!(
                "{}: band '{}' does not match {} points (expected '{}'); keeping the model's band",
                request.file_id,
                result.band,
                result.points,
                crate::output::Band::for_points(result.points)
            );
        }

        info!(
            "Scored {}: {} points ({}) in {}ms",
            request.file_id,
            result.points,
            result.band,
            start.elapsed().as_millis()
        );
        Ok(result)
    }

    /// Extract, build the payload, score, and attach the extracted text.
    ///
    /// `file_id` defaults to the file's base name, `batch` to a batch of one.
    pub async fn score_file(
        &self,
        path: impl AsRef<Path>,
        file_id: Option<&str>,
        batch: Option<BatchContext>,
    ) -> Result<ScoredResult, ScoreError> {
        let path = path.as_ref();
        info!("Scoring file: {}", path.display());

        let text = self.extractor.extract(path).await?;
        let request = payload::build_request(path, &text, file_id, batch);
        let mut result = self.score(&request).await?;
        result.extracted_text = Some(text);
        Ok(result)
    }

    /// Score each path independently and in order.
    ///
    /// File *i* of *N* is scored with `BatchContext { N, i }`. A failing file
    /// becomes a [`FileFailure`] and never stops the batch.
    pub async fn score_batch<P: AsRef<Path>>(&self, paths: &[P]) -> BatchOutcome {
        let total = paths.len();
        let cb = self.config.progress_callback.as_ref();
        if let Some(cb) = cb {
            cb.on_batch_start(total);
        }

        let mut results = Vec::new();
        let mut errors = Vec::new();

        for (idx, path) in paths.iter().enumerate() {
            let path = path.as_ref();
            let position = idx + 1;
            let identifier = path.display().to_string();
            let batch = BatchContext::new(total as u32, position as u32);

            if let Some(cb) = cb {
                cb.on_file_start(position, total, &identifier);
            }

            match self.score_file(path, None, Some(batch)).await {
                Ok(result) => {
                    if let Some(cb) = cb {
                        cb.on_file_complete(position, total, result.points);
                    }
                    results.push(BatchEntry { identifier, result });
                }
                Err(e) => {
                    warn!("Batch file {}/{} failed: {}: {}", position, total, identifier, e);
                    if let Some(cb) = cb {
                        cb.on_file_error(position, total, &e.to_string());
                    }
                    errors.push(FileFailure::new(identifier, &e));
                }
            }
        }

        let outcome = BatchOutcome::from_parts(results, errors);
        if let Some(cb) = cb {
            cb.on_batch_complete(total, outcome.success);
        }
        info!(
            "Batch complete: {} scored, {} failed",
            outcome.success, outcome.failed
        );
        outcome
    }
}

/// Synchronous wrapper around [`Scorer::score_file`].
///
/// Creates a temporary tokio runtime internally; do not call from async code.
pub fn score_file_sync(
    scorer: &Scorer,
    path: impl AsRef<Path>,
    file_id: Option<&str>,
    batch: Option<BatchContext>,
) -> Result<ScoredResult, ScoreError> {
    tokio::runtime::Runtime::new()
        .map_err(|e| ScoreError::Internal(format!("Failed to create tokio runtime: {}", e)))?
        .block_on(scorer.score_file(path, file_id, batch))
}

/// Parse the reply text as a JSON object and map it onto a result.
///
/// No partial recovery: anything that is not a single JSON object is malformed.
fn parse_reply(text: &str) -> Result<ScoredResult, ScoreError> {
    let value: Value =
        serde_json::from_str(text.trim()).map_err(|e| ScoreError::MalformedResponse {
            detail: format!("{e}; reply starts with {:?}", preview(text)),
        })?;
    ScoredResult::from_response(&value)
}

fn preview(text: &str) -> String {
    text.chars().take(80).collect()
}

/// Resolve the vision provider, from most-specific to least-specific.
///
/// 1. Pre-built provider (`config.vision_provider`)
/// 2. Named provider + `config.vision_model`; failure is fatal
/// 3. `OPENAI_API_KEY` present → openai + `config.vision_model`
/// 4. [`ProviderFactory::from_env`]
///
/// Failure of 3 or 4 means "no vision": images fall back to the generic
/// converter instead of failing the whole scorer.
fn resolve_vision_provider(
    config: &ScorerConfig,
) -> Result<Option<Arc<dyn LLMProvider>>, ScoreError> {
    if !config.vision {
        return Ok(None);
    }

    if let Some(ref provider) = config.vision_provider {
        return Ok(Some(Arc::clone(provider)));
    }

    if let Some(ref name) = config.vision_provider_name {
        return ProviderFactory::create_llm_provider(name, &config.vision_model)
            .map(Some)
            .map_err(|e| ScoreError::ProviderNotConfigured {
                provider: name.clone(),
                hint: format!("{e}"),
            });
    }

    if std::env::var("OPENAI_API_KEY").is_ok_and(|k| !k.is_empty()) {
        match ProviderFactory::create_llm_provider("openai", &config.vision_model) {
            Ok(provider) => return Ok(Some(provider)),
            Err(e) => warn!("OpenAI vision provider unavailable: {}", e),
        }
    }

    match ProviderFactory::from_env() {
        Ok((provider, _embedding)) => Ok(Some(provider)),
        Err(e) => {
            debug!("No vision provider auto-detected: {}", e);
            Ok(None)
        }
    }
}
