//! Error types for the datadon-scorer library.
//!
//! Three layers of failure, one enum each:
//!
//! * [`ConversionError`]: the file could not be turned into text (missing,
//!   unsupported, undecodable, no text layer).
//!
//! * [`TransportError`]: the remote scoring endpoint refused or failed the
//!   call. Two of its variants ([`TransportError::ContentTagRejected`] and
//!   [`TransportError::ResponseFormatUnsupported`]) are negotiated locally by
//!   the scorer; everything else propagates unmodified.
//!
//! * [`ScoreError`]: everything a caller of the top-level `score*` functions
//!   can see, including malformed replies and schema violations.
//!
//! [`FileFailure`] is the non-fatal counterpart stored in batch outcomes so
//! one bad file never aborts the rest of the batch.

use crate::responses::ContentTag;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use thiserror::Error;

/// Extraction or transcoding failed.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Input file was not found at the given path.
    #[error("File not found: '{path}'\nCheck the path exists and is readable.")]
    NotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The extension is not handled by any converter.
    #[error("Unsupported file type '{extension}' for '{path}'")]
    Unsupported { path: PathBuf, extension: String },

    /// The image could not be decoded or re-encoded.
    #[error("Could not decode image '{path}': {detail}")]
    Decode { path: PathBuf, detail: String },

    /// pdfium could not be bound or could not read the document.
    #[error("PDF extraction failed for '{path}': {detail}")]
    Pdf { path: PathBuf, detail: String },

    /// Every converter ran but none produced any text.
    #[error("No text could be extracted from '{path}'")]
    EmptyText { path: PathBuf },

    /// Reading the input or writing an intermediate file failed.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal extraction error: {0}")]
    Internal(String),
}

/// Failure reported by the remote scoring endpoint or the HTTP layer.
#[derive(Debug, Clone, Error)]
pub enum TransportError {
    /// The endpoint refused the content-block tag of the request.
    ///
    /// `rejected` is the tag named in the error message, when one was named.
    #[error("Endpoint rejected content tag{}: {message}", rejected.map(|t| format!(" '{}'", t.as_str())).unwrap_or_default())]
    ContentTagRejected {
        rejected: Option<ContentTag>,
        message: String,
    },

    /// The endpoint does not support the JSON-object response-format hint.
    #[error("Endpoint does not support the JSON response format hint: {message}")]
    ResponseFormatUnsupported { message: String },

    /// 401/403 from the endpoint; retrying will not help.
    #[error("Authentication error ({status}): {message}")]
    Auth { status: u16, message: String },

    /// HTTP 429.
    #[error("Rate limit exceeded{}", retry_after_secs.map(|s| format!(", retry after {s}s")).unwrap_or_default())]
    RateLimited { retry_after_secs: Option<u64> },

    /// Any other non-success response.
    #[error("API error ({status}): {message}")]
    Api { status: u16, message: String },

    /// The transport-level timeout elapsed.
    #[error("Request timed out after {secs}s")]
    Timeout { secs: u64 },

    /// Connection, TLS or request-building failure.
    #[error("HTTP error: {0}")]
    Http(String),

    /// The endpoint answered 2xx but the envelope was not the expected shape.
    #[error("Could not decode endpoint reply: {0}")]
    Decode(String),
}

/// All fatal errors returned by the datadon-scorer library.
#[derive(Debug, Error)]
pub enum ScoreError {
    #[error(transparent)]
    Conversion(#[from] ConversionError),

    /// The remote output was not parseable as a JSON object.
    #[error("LLM output was not valid JSON: {detail}")]
    MalformedResponse { detail: String },

    /// The parsed JSON is missing a required field or carries an unusable value.
    #[error("Scoring response schema error on '{field}': {detail}")]
    Schema { field: String, detail: String },

    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The configured vision provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// No API key for the scoring endpoint.
    #[error("No API key for the scoring endpoint.\nSet OPENAI_API_KEY or pass one in the configuration.")]
    MissingApiKey,

    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// The client sent an upload that cannot be processed.
    #[error("{0}")]
    InvalidUpload(String),

    /// Could not create or write a saved file or record.
    #[error("Failed to write '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ScoreError {
    pub(crate) fn schema(field: &str, detail: impl Into<String>) -> Self {
        ScoreError::Schema {
            field: field.to_string(),
            detail: detail.into(),
        }
    }

    /// True when the caller (not the service) is at fault.
    pub fn is_client_error(&self) -> bool {
        matches!(self, ScoreError::InvalidUpload(_))
    }

    /// Status code an HTTP front end should answer with.
    pub fn http_status(&self) -> u16 {
        if self.is_client_error() {
            400
        } else {
            500
        }
    }
}

/// A non-fatal error for a single file of a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileFailure {
    pub identifier: String,
    pub message: String,
}

impl FileFailure {
    pub fn new(identifier: impl Into<String>, error: &ScoreError) -> Self {
        Self {
            identifier: identifier.into(),
            message: error.to_string(),
        }
    }
}

impl std::fmt::Display for FileFailure {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.identifier, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn content_tag_rejected_display_names_tag() {
        let e = TransportError::ContentTagRejected {
            rejected: Some(ContentTag::InputText),
            message: "bad type".into(),
        };
        let msg = e.to_string();
        assert!(msg.contains("'input_text'"), "got: {msg}");
        assert!(msg.contains("bad type"));
    }

    #[test]
    fn rate_limit_display_with_and_without_retry() {
        let with = TransportError::RateLimited {
            retry_after_secs: Some(30),
        };
        assert!(with.to_string().contains("30s"));
        let without = TransportError::RateLimited {
            retry_after_secs: None,
        };
        assert_eq!(without.to_string(), "Rate limit exceeded");
    }

    #[test]
    fn schema_error_names_field() {
        let e = ScoreError::schema("band", "missing");
        assert!(e.to_string().contains("'band'"));
    }

    #[test]
    fn conversion_error_is_transparent() {
        let e: ScoreError = ConversionError::EmptyText {
            path: PathBuf::from("a.pdf"),
        }
        .into();
        assert_eq!(e.to_string(), "No text could be extracted from 'a.pdf'");
    }

    #[test]
    fn upload_errors_map_to_client_status() {
        assert_eq!(ScoreError::InvalidUpload("No file selected".into()).http_status(), 400);
        assert_eq!(ScoreError::MissingApiKey.http_status(), 500);
    }

    #[test]
    fn file_failure_display() {
        let f = FileFailure::new("b.png", &ScoreError::Internal("boom".into()));
        assert_eq!(f.to_string(), "b.png: Internal error: boom");
    }
}
