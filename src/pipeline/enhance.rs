//! Deterministic image enhancement before transcription.
//!
//! Phone photos of receipts are low-contrast and slightly blurred. A fixed
//! contrast → sharpen → brighten → unsharp-mask pass recovers a lot of small
//! print for the vision model. The output is a scoped temporary PNG: it is
//! deleted when the returned [`NamedTempFile`] is dropped, on every exit path.

use crate::error::ConversionError;
use image::{DynamicImage, ImageFormat};
use std::path::Path;
use tempfile::NamedTempFile;
use tracing::debug;

const CONTRAST: f32 = 30.0;
const BRIGHTEN: i32 = 10;
const UNSHARP_SIGMA: f32 = 2.0;
const UNSHARP_THRESHOLD: i32 = 3;
const SHARPEN_KERNEL: [f32; 9] = [0.0, -1.0, 0.0, -1.0, 5.0, -1.0, 0.0, -1.0, 0.0];

/// Apply the enhancement pass to an in-memory image.
pub fn enhance(img: &DynamicImage) -> DynamicImage {
    img.adjust_contrast(CONTRAST)
        .filter3x3(&SHARPEN_KERNEL)
        .brighten(BRIGHTEN)
        .unsharpen(UNSHARP_SIGMA, UNSHARP_THRESHOLD)
}

/// Enhance the image at `path` into a temporary PNG.
///
/// Blocking; run inside `spawn_blocking`.
pub fn enhance_to_temp(path: &Path) -> Result<NamedTempFile, ConversionError> {
    let img = image::open(path).map_err(|e| ConversionError::Decode {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })?;

    let enhanced = enhance(&img);

    let tmp = tempfile::Builder::new()
        .prefix("enhanced_")
        .suffix(".png")
        .tempfile()
        .map_err(|source| ConversionError::Io {
            path: path.to_path_buf(),
            source,
        })?;

    enhanced
        .save_with_format(tmp.path(), ImageFormat::Png)
        .map_err(|e| ConversionError::Decode {
            path: tmp.path().to_path_buf(),
            detail: e.to_string(),
        })?;

    debug!(
        "Enhanced {} → {} ({}x{})",
        path.display(),
        tmp.path().display(),
        enhanced.width(),
        enhanced.height()
    );
    Ok(tmp)
}
