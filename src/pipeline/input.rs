//! Input resolution: validate a local path and decide which converter owns it.
//!
//! The extension decides the converter. Existence and read permission are
//! checked up front so callers get a precise [`ConversionError`] instead of a
//! decoder failure three layers down.

use crate::error::ConversionError;
use image::ImageFormat;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Image extensions the extractor (and the upload surface) accept.
pub const IMAGE_EXTENSIONS: &[&str] = &["jpg", "jpeg", "png", "webp", "gif", "bmp", "tiff", "tif"];

const TEXT_EXTENSIONS: &[&str] = &["txt", "md", "markdown", "csv", "tsv", "json", "log", "xml"];
const HTML_EXTENSIONS: &[&str] = &["html", "htm"];

/// Which converter handles a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DocumentKind {
    Image(ImageFormat),
    Pdf,
    PlainText,
    Html,
}

impl DocumentKind {
    /// Classify by extension (case-insensitive). `None` when unsupported.
    pub fn from_extension(ext: &str) -> Option<Self> {
        let ext = ext.to_ascii_lowercase();
        if IMAGE_EXTENSIONS.contains(&ext.as_str()) {
            return ImageFormat::from_extension(&ext).map(DocumentKind::Image);
        }
        if ext == "pdf" {
            return Some(DocumentKind::Pdf);
        }
        if TEXT_EXTENSIONS.contains(&ext.as_str()) {
            return Some(DocumentKind::PlainText);
        }
        if HTML_EXTENSIONS.contains(&ext.as_str()) {
            return Some(DocumentKind::Html);
        }
        None
    }
}

/// A validated local input.
#[derive(Debug, Clone)]
pub struct ResolvedInput {
    pub path: PathBuf,
    pub kind: DocumentKind,
}

/// Lower-cased extension of `path`, or an empty string.
pub fn extension_of(path: &Path) -> String {
    path.extension()
        .map(|e| e.to_string_lossy().to_ascii_lowercase())
        .unwrap_or_default()
}

/// Validate existence, read permission and extension.
pub fn resolve_input(path: &Path) -> Result<ResolvedInput, ConversionError> {
    if !path.exists() {
        return Err(ConversionError::NotFound {
            path: path.to_path_buf(),
        });
    }

    match std::fs::File::open(path) {
        Ok(_) => {}
        Err(e) if e.kind() == std::io::ErrorKind::PermissionDenied => {
            return Err(ConversionError::PermissionDenied {
                path: path.to_path_buf(),
            });
        }
        Err(source) => {
            return Err(ConversionError::Io {
                path: path.to_path_buf(),
                source,
            });
        }
    }

    let extension = extension_of(path);
    let kind = DocumentKind::from_extension(&extension).ok_or_else(|| {
        ConversionError::Unsupported {
            path: path.to_path_buf(),
            extension: extension.clone(),
        }
    })?;

    debug!("Resolved {} as {:?}", path.display(), kind);
    Ok(ResolvedInput {
        path: path.to_path_buf(),
        kind,
    })
}
