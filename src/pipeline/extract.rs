//! Text Extractor: any supported file → normalised text.
//!
//! ## Dispatch
//!
//! ```text
//! image ─▶ enhance? ─▶ vision model ──(fails / absent)──▶ generic description
//! pdf   ─▶ pdfium text layer
//! text  ─▶ UTF-8 read
//! html  ─▶ tag stripping
//!                       └──────────▶ normalize ─▶ non-empty text
//! ```
//!
//! Intermediate files (enhanced copy, transcoded copy) are `NamedTempFile`s
//! owned by the call that made them, so they disappear on success, on
//! conversion failure and on panic alike.

use crate::config::ScorerConfig;
use crate::error::ConversionError;
use crate::pipeline::input::{self, DocumentKind};
use crate::pipeline::normalize::{html_to_text, normalize_text};
use crate::pipeline::{encode, enhance, vision};
use edgequake_llm::LLMProvider;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};

/// Converts uploaded files into text for scoring.
#[derive(Clone)]
pub struct TextExtractor {
    config: ScorerConfig,
    vision: Option<Arc<dyn LLMProvider>>,
}

impl TextExtractor {
    /// `vision` is the already-resolved provider, if any.
    pub fn new(config: &ScorerConfig, vision: Option<Arc<dyn LLMProvider>>) -> Self {
        Self {
            config: config.clone(),
            vision,
        }
    }

    pub fn has_vision(&self) -> bool {
        self.vision.is_some()
    }

    /// Extract normalised text from the file at `path`.
    ///
    /// # Errors
    /// A [`ConversionError`] naming the cause when the file is missing,
    /// unsupported, undecodable, or yields no text. Never returns empty text.
    pub async fn extract(&self, path: &Path) -> Result<String, ConversionError> {
        let start = Instant::now();
        let resolved = input::resolve_input(path)?;

        let raw = match resolved.kind {
            DocumentKind::Image(format) => self.extract_image(&resolved.path, format).await?,
            DocumentKind::Pdf => {
                let p = resolved.path.clone();
                run_blocking(move || extract_pdf_text(&p)).await?
            }
            DocumentKind::PlainText => read_text(&resolved.path)?,
            DocumentKind::Html => html_to_text(&read_text(&resolved.path)?),
        };

        let text = normalize_text(&raw);
        if text.is_empty() {
            return Err(ConversionError::EmptyText {
                path: resolved.path,
            });
        }

        info!(
            "Extracted {} chars from {} in {}ms",
            text.len(),
            resolved.path.display(),
            start.elapsed().as_millis()
        );
        Ok(text)
    }

    async fn extract_image(
        &self,
        path: &Path,
        format: ImageFormat,
    ) -> Result<String, ConversionError> {
        // Lives until this function returns; dropping it deletes the copy.
        let enhanced: Option<NamedTempFile> = if self.enhances_images() {
            let p = path.to_path_buf();
            match run_blocking(move || enhance::enhance_to_temp(&p)).await {
                Ok(tmp) => Some(tmp),
                Err(e) => {
                    warn!("Enhancement failed for {}, using original: {}", path.display(), e);
                    None
                }
            }
        } else {
            None
        };

        let (source, source_format): (PathBuf, ImageFormat) = match &enhanced {
            Some(tmp) => (tmp.path().to_path_buf(), ImageFormat::Png),
            None => (path.to_path_buf(), format),
        };

        if let Some(provider) = &self.vision {
            match self.transcribe(provider, source.clone(), source_format).await {
                Ok(text) => return Ok(text),
                Err(reason) => warn!(
                    "Vision transcription failed for {}, falling back to generic converter: {}",
                    path.display(),
                    reason
                ),
            }
        } else {
            debug!("No vision model configured; using generic image converter");
        }

        let original = path.to_path_buf();
        run_blocking(move || describe_image(&original, format)).await
    }

    /// Enhancement only feeds the vision model; the generic converter reads
    /// the original.
    fn enhances_images(&self) -> bool {
        self.config.enhance_images && self.vision.is_some()
    }

    async fn transcribe(
        &self,
        provider: &Arc<dyn LLMProvider>,
        source: PathBuf,
        format: ImageFormat,
    ) -> Result<String, String> {
        let image = run_blocking(move || encode::encode_for_vision(&source, format))
            .await
            .map_err(|e| e.to_string())?;

        let text = vision::transcribe(provider, image, &self.config).await?;
        if normalize_text(&text).is_empty() {
            return Err("vision model returned only whitespace".to_string());
        }
        Ok(text)
    }
}

/// Run blocking extraction work off the async worker threads.
async fn run_blocking<T, F>(f: F) -> Result<T, ConversionError>
where
    F: FnOnce() -> Result<T, ConversionError> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| ConversionError::Internal(format!("Extraction task panicked: {e}")))?
}

fn read_text(path: &Path) -> Result<String, ConversionError> {
    let bytes = std::fs::read(path).map_err(|source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

/// Generic image converter: describe the image without a model.
///
/// Produces the container facts a document converter reports for an image
/// when no vision model is available.
pub fn describe_image(path: &Path, format: ImageFormat) -> Result<String, ConversionError> {
    let img = image::open(path).map_err(|e| ConversionError::Decode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let name = path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    Ok(format!(
        "Image: {}\nFormat: {:?}\nDimensions: {} x {} px\nColor: {:?}",
        name,
        format,
        img.width(),
        img.height(),
        img.color()
    ))
}

/// Text layer of every page, joined by a blank line.
///
/// Blocking; pdfium is bound (and downloaded on first use) per call.
fn extract_pdf_text(path: &Path) -> Result<String, ConversionError> {
    let pdfium = pdfium_auto::bind_pdfium_silent().map_err(|e| ConversionError::Pdf {
        path: path.to_path_buf(),
        detail: format!("PDFium unavailable: {e}"),
    })?;

    let document = pdfium
        .load_pdf_from_file(path, None)
        .map_err(|e| ConversionError::Pdf {
            path: path.to_path_buf(),
            detail: format!("{e:?}"),
        })?;

    let mut pages = Vec::new();
    for (idx, page) in document.pages().iter().enumerate() {
        let text = page.text().map_err(|e| ConversionError::Pdf {
            path: path.to_path_buf(),
            detail: format!("page {}: {:?}", idx + 1, e),
        })?;
        pages.push(text.all());
    }

    debug!("PDF {}: {} pages", path.display(), pages.len());
    Ok(pages.join("\n\n"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use base64::{engine::general_purpose::STANDARD, Engine as _};
    use edgequake_llm::{ChatMessage, CompletionOptions, ImageData, LLMResponse, MockProvider};
    use image::{DynamicImage, Rgb, RgbImage};
    use std::sync::Mutex;

    /// Answers every chat with `reply` and keeps the images it was sent.
    struct RecordingVision {
        reply: String,
        images: Mutex<Vec<ImageData>>,
    }

    #[async_trait]
    impl LLMProvider for RecordingVision {
        fn name(&self) -> &str {
            "recording"
        }

        fn model(&self) -> &str {
            "recording-vision"
        }

        fn max_context_length(&self) -> usize {
            4096
        }

        async fn complete(&self, _prompt: &str) -> edgequake_llm::Result<LLMResponse> {
            Ok(LLMResponse::new(self.reply.clone(), "recording-vision"))
        }

        async fn complete_with_options(
            &self,
            prompt: &str,
            _options: &CompletionOptions,
        ) -> edgequake_llm::Result<LLMResponse> {
            self.complete(prompt).await
        }

        async fn chat(
            &self,
            messages: &[ChatMessage],
            _options: Option<&CompletionOptions>,
        ) -> edgequake_llm::Result<LLMResponse> {
            let mut seen = self.images.lock().unwrap();
            for m in messages {
                seen.extend(m.images.iter().flatten().cloned());
            }
            Ok(LLMResponse::new(self.reply.clone(), "recording-vision"))
        }
    }

    fn vision_extractor(provider: Arc<dyn LLMProvider>, enhance: bool) -> TextExtractor {
        let config = ScorerConfig::builder()
            .vision_provider(provider.clone())
            .enhance_images(enhance)
            .build()
            .unwrap();
        TextExtractor::new(&config, Some(provider))
    }

    async fn mock_vision(reply: &str) -> Arc<dyn LLMProvider> {
        let mock = MockProvider::new();
        mock.add_response(reply).await;
        Arc::new(mock)
    }

    fn save_receipt(dir: &Path, name: &str) -> PathBuf {
        let p = dir.join(name);
        DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 7, Rgb([240, 240, 240])))
            .save(&p)
            .unwrap();
        p
    }

    fn extractor(enhance: bool) -> TextExtractor {
        let config = ScorerConfig::builder()
            .vision(false)
            .enhance_images(enhance)
            .build()
            .unwrap();
        TextExtractor::new(&config, None)
    }

    #[tokio::test]
    async fn extracts_and_normalises_text_file() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("note.txt");
        std::fs::write(&p, "Gym session:   45min cardio  \r\n\r\n\r\n\r\n\r\n20min weights\r\n").unwrap();

        let text = extractor(false).extract(&p).await.unwrap();
        assert_eq!(text, "Gym session: 45min cardio\n\n\n20min weights");
    }

    #[tokio::test]
    async fn extracts_html() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("receipt.html");
        std::fs::write(&p, "<p>Lunch $12</p><p>Dinner $28</p>").unwrap();

        let text = extractor(false).extract(&p).await.unwrap();
        assert_eq!(text, "Lunch $12\nDinner $28");
    }

    #[tokio::test]
    async fn blank_file_is_an_error_not_empty_text() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("blank.md");
        std::fs::write(&p, "  \n\n\t\n").unwrap();

        let err = extractor(false).extract(&p).await.unwrap_err();
        assert!(matches!(err, ConversionError::EmptyText { .. }));
    }

    #[tokio::test]
    async fn missing_file_fails() {
        let err = extractor(false)
            .extract(Path::new("/no/such/receipt.jpg"))
            .await
            .unwrap_err();
        assert!(matches!(err, ConversionError::NotFound { .. }));
    }

    #[tokio::test]
    async fn image_without_vision_uses_generic_converter() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("receipt.png");
        DynamicImage::ImageRgb8(RgbImage::from_pixel(12, 7, Rgb([240, 240, 240])))
            .save(&p)
            .unwrap();

        let text = extractor(true).extract(&p).await.unwrap();
        assert!(text.contains("Image: receipt.png"), "got: {text}");
        assert!(text.contains("Dimensions: 12 x 7 px"), "got: {text}");
    }

    #[tokio::test]
    async fn enhancement_failure_is_not_fatal_but_decode_failure_is() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("broken.jpg");
        std::fs::write(&p, b"definitely not a jpeg").unwrap();

        // Enhancement fails (logged) and the generic converter then reports
        // the real cause against the original file.
        let err = extractor(true).extract(&p).await.unwrap_err();
        match err {
            ConversionError::Decode { path, .. } => assert_eq!(path, p),
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn vision_transcription_is_preferred() {
        let dir = tempfile::tempdir().unwrap();
        let p = save_receipt(dir.path(), "receipt.png");
        let provider = mock_vision("```text\nCostco Wholesale\r\nTotal   $38.47\n```").await;

        let text = vision_extractor(provider, true).extract(&p).await.unwrap();
        assert_eq!(text, "Costco Wholesale\nTotal $38.47");
    }

    #[tokio::test]
    async fn blank_transcription_falls_back_to_description() {
        let dir = tempfile::tempdir().unwrap();
        let p = save_receipt(dir.path(), "receipt.png");
        let provider = mock_vision(" \n\t ").await;

        let text = vision_extractor(provider, false).extract(&p).await.unwrap();
        assert!(text.contains("Image: receipt.png"), "got: {text}");
        assert!(text.contains("Dimensions: 12 x 7 px"), "got: {text}");
    }

    #[tokio::test]
    async fn bmp_reaches_vision_model_as_png() {
        let dir = tempfile::tempdir().unwrap();
        let p = save_receipt(dir.path(), "scan.bmp");
        let recorder = Arc::new(RecordingVision {
            reply: "Parking ticket 07:45".into(),
            images: Mutex::new(Vec::new()),
        });

        let text = vision_extractor(recorder.clone(), false)
            .extract(&p)
            .await
            .unwrap();
        assert_eq!(text, "Parking ticket 07:45");

        let images = recorder.images.lock().unwrap();
        assert_eq!(images.len(), 1);
        assert_eq!(images[0].mime_type, "image/png");
        let bytes = STANDARD.decode(&images[0].data).unwrap();
        let decoded = image::load_from_memory_with_format(&bytes, ImageFormat::Png).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (12, 7));
    }

    #[test]
    fn enhancement_only_runs_for_vision() {
        assert!(!extractor(true).enhances_images());
        let with_vision = vision_extractor(Arc::new(MockProvider::new()), true);
        assert!(with_vision.enhances_images());
        let disabled = vision_extractor(Arc::new(MockProvider::new()), false);
        assert!(!disabled.enhances_images());
    }

    #[test]
    fn describe_reports_format() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("scan.bmp");
        RgbImage::from_pixel(3, 4, Rgb([0, 0, 0])).save(&p).unwrap();
        let text = describe_image(&p, ImageFormat::Bmp).unwrap();
        assert!(text.contains("Format: Bmp"));
        assert!(text.contains("Dimensions: 3 x 4 px"));
    }
}
