//! Payload Builder: extracted text → [`ScoringRequest`].

use crate::error::{ConversionError, ScoreError};
use crate::output::{BatchContext, ScoringRequest};
use serde_json::Value;
use std::path::Path;
use tracing::debug;

/// Assemble the scoring payload for one file.
///
/// `file_id` defaults to the base name of `path`; `batch` defaults to a
/// batch of one. Batch values are echoed unchanged.
pub fn build_request(
    path: &Path,
    extracted_text: &str,
    file_id: Option<&str>,
    batch: Option<BatchContext>,
) -> ScoringRequest {
    let file_id = match file_id {
        Some(id) => id.to_string(),
        None => base_name(path),
    };
    ScoringRequest {
        file_id,
        normalized_text: extracted_text.to_string(),
        batch_context: batch.unwrap_or_default(),
    }
}

fn base_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Recognise a pre-built payload file.
///
/// Returns `Ok(None)` for anything that is not a `.json` object carrying
/// string `file_id` and `normalized_text` keys, so the caller can treat the
/// file as an ordinary document instead.
pub fn load_payload_file(path: &Path) -> Result<Option<ScoringRequest>, ScoreError> {
    let is_json = path
        .extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"));
    if !is_json {
        return Ok(None);
    }

    let bytes = std::fs::read(path).map_err(|source| ConversionError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let Ok(value) = serde_json::from_slice::<Value>(&bytes) else {
        return Ok(None);
    };

    let looks_like_payload = value.get("file_id").is_some_and(Value::is_string)
        && value.get("normalized_text").is_some_and(Value::is_string);
    if !looks_like_payload {
        return Ok(None);
    }

    let request: ScoringRequest = serde_json::from_value(value).map_err(|e| {
        ScoreError::InvalidConfig(format!(
            "'{}' looks like a scoring payload but is invalid: {e}",
            path.display()
        ))
    })?;
    debug!("Loaded pre-built payload '{}' from {}", request.file_id, path.display());
    Ok(Some(request))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn file_id_defaults_to_base_name() {
        let req = build_request(Path::new("/tmp/up/receipt_01.jpg"), "Milk $5", None, None);
        assert_eq!(req.file_id, "receipt_01.jpg");
        assert_eq!(req.normalized_text, "Milk $5");
        assert_eq!(req.batch_context, BatchContext::single());
    }

    #[test]
    fn explicit_values_are_echoed() {
        for total in 1..=4u32 {
            for position in 1..=total {
                let ctx = BatchContext::new(total, position);
                let req = build_request(Path::new("a.png"), "t", Some("custom-id"), Some(ctx));
                assert_eq!(req.file_id, "custom-id");
                assert_eq!(req.batch_context.total_files_in_batch, total);
                assert_eq!(req.batch_context.file_position, position);
            }
        }
    }

    #[test]
    fn serialises_to_rubric_input_shape() {
        let req = build_request(Path::new("n.txt"), "hello", None, Some(BatchContext::new(3, 2)));
        assert_eq!(
            serde_json::to_value(&req).unwrap(),
            json!({
                "file_id": "n.txt",
                "normalized_text": "hello",
                "batch_context": {"total_files_in_batch": 3, "file_position": 2}
            })
        );
    }

    #[test]
    fn loads_prebuilt_payload() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("payload.json");
        std::fs::write(&p, r#"{"file_id": "x1", "normalized_text": "Costco receipt"}"#).unwrap();

        let req = load_payload_file(&p).unwrap().expect("payload");
        assert_eq!(req.file_id, "x1");
        assert_eq!(req.batch_context, BatchContext::single());
    }

    #[test]
    fn other_json_is_not_a_payload() {
        let dir = tempfile::tempdir().unwrap();
        let p = dir.path().join("export.json");
        std::fs::write(&p, r#"{"steps": 12000}"#).unwrap();
        assert!(load_payload_file(&p).unwrap().is_none());

        std::fs::write(&p, "not json at all").unwrap();
        assert!(load_payload_file(&p).unwrap().is_none());

        assert!(load_payload_file(Path::new("receipt.png")).unwrap().is_none());
    }
}
