//! Image encoding: file → base64 `ImageData` for the vision request.
//!
//! Vision endpoints accept PNG, JPEG, GIF and WEBP payloads. Anything else
//! (BMP, TIFF) is transcoded to a scoped temporary PNG first; the temporary
//! file never outlives the call. `detail: "high"` keeps small receipt print
//! legible for GPT-4-class models.

use crate::error::ConversionError;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use image::ImageFormat;
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

/// MIME type for formats the vision endpoint ingests natively.
pub fn vision_mime(format: ImageFormat) -> Option<&'static str> {
    match format {
        ImageFormat::Png => Some("image/png"),
        ImageFormat::Jpeg => Some("image/jpeg"),
        ImageFormat::Gif => Some("image/gif"),
        ImageFormat::WebP => Some("image/webp"),
        _ => None,
    }
}

/// Decode `path` and write it to a temporary PNG.
pub fn transcode_to_png(path: &Path) -> Result<NamedTempFile, ConversionError> {
    let img = image::open(path).map_err(|e| ConversionError::Decode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let tmp = tempfile::Builder::new()
        .prefix("transcoded_")
        .suffix(".png")
        .tempfile()
        .map_err(|source| ConversionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    img.save_with_format(tmp.path(), ImageFormat::Png)
        .map_err(|e| ConversionError::Decode {
            path: tmp.path().to_path_buf(),
            detail: e.to_string(),
        })?;

    debug!("Transcoded {} → {}", path.display(), tmp.path().display());
    Ok(tmp)
}

fn encode_file(path: &Path, mime: &str) -> Result<ImageData, ConversionError> {
    let bytes = std::fs::read(path).map_err(|source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let b64 = STANDARD.encode(&bytes);
    debug!("Encoded {} → {} bytes base64", path.display(), b64.len());
    Ok(ImageData::new(b64, mime).with_detail("high"))
}

/// Base64-encode the image at `path`, transcoding when the format is not
/// accepted natively.
///
/// Blocking; run inside `spawn_blocking`.
pub fn encode_for_vision(path: &Path, format: ImageFormat) -> Result<ImageData, ConversionError> {
    match vision_mime(format) {
        Some(mime) => encode_file(path, mime),
        None => {
            let tmp = transcode_to_png(path)?;
            encode_file(tmp.path(), "image/png")
        }
    }
}
