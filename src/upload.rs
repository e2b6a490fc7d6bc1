//! Upload surface: the single- and batch-upload handlers a web layer calls.
//!
//! No HTTP framework lives here. A front end maps its multipart fields onto
//! [`UploadedFile`], calls [`UploadService::handle_upload`] or
//! [`UploadService::handle_batch_upload`], serialises the response, and uses
//! [`ScoreError::http_status`] for the failure status code.

use crate::error::ScoreError;
use crate::output::{BatchContext, ScoredResult};
use crate::pipeline::input::IMAGE_EXTENSIONS;
use crate::scorer::Scorer;
use crate::sink::RecordSink;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// Extensions accepted from clients (images only).
pub const ALLOWED_UPLOAD_EXTENSIONS: &[&str] = IMAGE_EXTENSIONS;

/// Largest accepted upload body.
pub const MAX_UPLOAD_BYTES: usize = 16 * 1024 * 1024;

const UNSUPPORTED_MESSAGE: &str = "Only image files are supported (JPG, PNG, WEBP, GIF, BMP, TIFF)";

/// One file as received from a client.
#[derive(Debug, Clone)]
pub struct UploadedFile {
    pub filename: String,
    pub bytes: Vec<u8>,
}

impl UploadedFile {
    pub fn new(filename: impl Into<String>, bytes: impl Into<Vec<u8>>) -> Self {
        Self {
            filename: filename.into(),
            bytes: bytes.into(),
        }
    }
}

/// Score fields returned to the client; never includes `extracted_text`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoredUpload {
    /// Sanitised name; set for batch entries only.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(flatten)]
    pub result: ScoredResult,
    pub saved_image: String,
    pub saved_json: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchUploadResponse {
    pub success: usize,
    pub failed: usize,
    pub results: Vec<ScoredUpload>,
    /// `"<filename>: <message>"` per failed file.
    pub errors: Vec<String>,
}

/// Reduce a client-supplied filename to a safe ASCII name.
///
/// Path separators and whitespace become `_`, anything outside
/// `[A-Za-z0-9._-]` is dropped, and leading/trailing dots and underscores
/// are stripped. May return an empty string.
pub fn secure_filename(filename: &str) -> String {
    let spaced = filename.replace(['/', '\\'], " ");
    let joined = spaced.split_whitespace().collect::<Vec<_>>().join("_");
    let kept: String = joined
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
        .collect();
    kept.trim_matches(['.', '_']).to_string()
}

fn upload_extension(filename: &str) -> Option<String> {
    filename
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .filter(|ext| ALLOWED_UPLOAD_EXTENSIONS.contains(&ext.as_str()))
}

/// Check a client filename and return the sanitised name to store it under.
///
/// # Errors
/// [`ScoreError::InvalidUpload`] for an empty name or a non-image extension.
pub fn validate_upload(filename: &str) -> Result<String, ScoreError> {
    if filename.is_empty() {
        return Err(ScoreError::InvalidUpload("No file selected".into()));
    }
    let ext = upload_extension(filename)
        .ok_or_else(|| ScoreError::InvalidUpload(UNSUPPORTED_MESSAGE.into()))?;

    let safe = secure_filename(filename);
    if upload_extension(&safe).as_deref() == Some(ext.as_str()) && safe.len() > ext.len() + 1 {
        Ok(safe)
    } else {
        // Sanitising ate the stem or the extension.
        Ok(format!("upload.{ext}"))
    }
}

/// Scores uploads and persists them through a [`RecordSink`].
#[derive(Debug, Clone)]
pub struct UploadService {
    scorer: Arc<Scorer>,
    sink: RecordSink,
    upload_dir: PathBuf,
}

impl UploadService {
    /// Uploaded bytes are staged under `upload_dir` only while being scored.
    pub fn new(scorer: Arc<Scorer>, sink: RecordSink, upload_dir: impl Into<PathBuf>) -> Self {
        Self {
            scorer,
            sink,
            upload_dir: upload_dir.into(),
        }
    }

    /// Score one upload.
    pub async fn handle_upload(&self, file: &UploadedFile) -> Result<ScoredUpload, ScoreError> {
        let filename = validate_upload(&file.filename)?;
        self.score_and_persist(&filename, &file.bytes, None).await
    }

    /// Score several uploads independently.
    ///
    /// Entries with an empty filename are skipped; every other failure is
    /// reported as `"<name>: <message>"` without stopping the batch.
    pub async fn handle_batch_upload(
        &self,
        files: &[UploadedFile],
    ) -> Result<BatchUploadResponse, ScoreError> {
        if files.is_empty() {
            return Err(ScoreError::InvalidUpload("No files selected".into()));
        }

        let total = files.len() as u32;
        let mut response = BatchUploadResponse::default();

        for (idx, file) in files.iter().enumerate() {
            if file.filename.is_empty() {
                continue;
            }
            let batch = BatchContext::new(total, idx as u32 + 1);

            let outcome = match validate_upload(&file.filename) {
                Ok(filename) => self
                    .score_and_persist(&filename, &file.bytes, Some(batch))
                    .await
                    .map(|mut scored| {
                        scored.filename = Some(filename);
                        scored
                    }),
                Err(e) => Err(e),
            };

            match outcome {
                Ok(scored) => response.results.push(scored),
                Err(e) => {
                    warn!("Upload {} failed: {}", file.filename, e);
                    response.errors.push(format!("{}: {}", file.filename, e));
                }
            }
        }

        response.success = response.results.len();
        response.failed = response.errors.len();
        info!(
            "Batch upload: {} scored, {} failed",
            response.success, response.failed
        );
        Ok(response)
    }

    async fn score_and_persist(
        &self,
        filename: &str,
        bytes: &[u8],
        batch: Option<BatchContext>,
    ) -> Result<ScoredUpload, ScoreError> {
        if bytes.len() > MAX_UPLOAD_BYTES {
            return Err(ScoreError::InvalidUpload(format!(
                "File too large ({} bytes, max {} MB)",
                bytes.len(),
                MAX_UPLOAD_BYTES / (1024 * 1024)
            )));
        }

        // Removed when dropped, whatever happens below.
        let staged = self.stage(filename, bytes).await?;

        let result = self
            .scorer
            .score_file(staged.path(), Some(filename), batch)
            .await?;
        let saved = self
            .sink
            .persist(staged.path(), filename, &result, batch)
            .await?;

        Ok(ScoredUpload {
            filename: None,
            result: result.without_extracted_text(),
            saved_image: saved.saved_filename,
            saved_json: saved.record_filename,
        })
    }

    async fn stage(&self, filename: &str, bytes: &[u8]) -> Result<tempfile::NamedTempFile, ScoreError> {
        let write_err = |dir: &Path, e: std::io::Error| ScoreError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        };

        tokio::fs::create_dir_all(&self.upload_dir)
            .await
            .map_err(|e| write_err(&self.upload_dir, e))?;

        let suffix = filename
            .rsplit_once('.')
            .map(|(_, ext)| format!(".{ext}"))
            .unwrap_or_default();
        let staged = tempfile::Builder::new()
            .prefix("upload_")
            .suffix(&suffix)
            .tempfile_in(&self.upload_dir)
            .map_err(|e| write_err(&self.upload_dir, e))?;

        tokio::fs::write(staged.path(), bytes)
            .await
            .map_err(|e| write_err(staged.path(), e))?;
        Ok(staged)
    }
}
