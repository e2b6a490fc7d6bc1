//! Result Sink: durable JSON records of scored files.
//!
//! For every scored upload two artefacts are written:
//!
//! * `saved_dir/{stem}_{unix_ts}{.ext}`: a copy of the original file
//! * `output_dir/{saved_stem}_scored.json`: the result plus provenance
//!
//! Records are written atomically (temp file + rename) so a reader never
//! sees a half-written JSON document.

use crate::error::{FileFailure, ScoreError};
use crate::output::{BatchContext, BatchOutcome, ScoredResult};
use std::collections::HashMap;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// The persisted form of one scored file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScoreRecord {
    #[serde(flatten)]
    pub result: ScoredResult,
    pub original_filename: String,
    pub saved_filename: String,
    /// Present only for batch uploads.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub batch_context: Option<BatchContext>,
}

/// Where [`RecordSink::persist`] put things.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedRecord {
    pub saved_filename: String,
    pub record_filename: String,
    pub record_path: PathBuf,
}

#[derive(Debug, Clone)]
pub struct RecordSink {
    output_dir: PathBuf,
    saved_dir: PathBuf,
}

impl RecordSink {
    pub fn new(output_dir: impl Into<PathBuf>, saved_dir: impl Into<PathBuf>) -> Self {
        Self {
            output_dir: output_dir.into(),
            saved_dir: saved_dir.into(),
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn saved_dir(&self) -> &Path {
        &self.saved_dir
    }

    /// Copy `source` into the saved directory and write its record.
    ///
    /// `original_filename` is the name the file arrived under; it decides the
    /// saved name's stem and extension. Directories are created on demand.
    pub async fn persist(
        &self,
        source: &Path,
        original_filename: &str,
        result: &ScoredResult,
        batch_context: Option<BatchContext>,
    ) -> Result<SavedRecord, ScoreError> {
        create_dir(&self.saved_dir).await?;
        create_dir(&self.output_dir).await?;

        let saved_filename = self.unused_saved_name(original_filename, unix_timestamp());
        let saved_path = self.saved_dir.join(&saved_filename);
        tokio::fs::copy(source, &saved_path)
            .await
            .map_err(|e| ScoreError::OutputWriteFailed {
                path: saved_path.clone(),
                source: e,
            })?;
        debug!("Saved copy: {}", saved_path.display());

        let record_filename = format!("{}_scored.json", file_stem(&saved_filename));
        let record_path = self.output_dir.join(&record_filename);
        let record = ScoreRecord {
            result: result.clone(),
            original_filename: original_filename.to_string(),
            saved_filename: saved_filename.clone(),
            batch_context,
        };
        let json = serde_json::to_string_pretty(&record)
            .map_err(|e| ScoreError::Internal(format!("Could not serialise record: {e}")))?;
        write_atomic(&record_path, json.as_bytes()).await?;

        info!("Wrote record {}", record_path.display());
        Ok(SavedRecord {
            saved_filename,
            record_filename,
            record_path,
        })
    }

    /// Persist every scored entry of a batch over `inputs`.
    ///
    /// Entry identifiers are the input paths as given; file *i* of *N* is
    /// recorded with `BatchContext { N, i }`. An entry that cannot be saved
    /// moves from `results` to `errors` and the rest are still written.
    pub async fn persist_batch<P: AsRef<Path>>(
        &self,
        inputs: &[P],
        outcome: BatchOutcome,
    ) -> BatchOutcome {
        let total = inputs.len() as u32;
        let positions: HashMap<String, u32> = inputs
            .iter()
            .enumerate()
            .map(|(i, p)| (p.as_ref().display().to_string(), i as u32 + 1))
            .collect();

        let BatchOutcome {
            results,
            mut errors,
            ..
        } = outcome;
        let mut saved = Vec::with_capacity(results.len());

        for entry in results {
            let position = positions.get(&entry.identifier).copied().unwrap_or(1);
            let source = Path::new(&entry.identifier);
            let original = source
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| entry.identifier.clone());

            match self
                .persist(source, &original, &entry.result, Some(BatchContext::new(total, position)))
                .await
            {
                Ok(_) => saved.push(entry),
                Err(e) => {
                    warn!("Could not save record for {}: {}", entry.identifier, e);
                    errors.push(FileFailure::new(entry.identifier, &e));
                }
            }
        }

        BatchOutcome::from_parts(saved, errors)
    }

    /// `{stem}_{ts}{ext}`, with a numeric suffix if that name is taken
    /// (two uploads of the same name within one second).
    fn unused_saved_name(&self, original_filename: &str, ts: u64) -> String {
        let (stem, ext) = split_name(original_filename);
        let mut candidate = format!("{stem}_{ts}{ext}");
        let mut n = 1;
        while self.saved_dir.join(&candidate).exists() {
            candidate = format!("{stem}_{ts}_{n}{ext}");
            n += 1;
        }
        candidate
    }
}

/// Read a record back.
pub async fn load_record(path: &Path) -> Result<ScoreRecord, ScoreError> {
    let bytes = tokio::fs::read(path)
        .await
        .map_err(|e| ScoreError::Internal(format!("Could not read '{}': {e}", path.display())))?;
    serde_json::from_slice(&bytes)
        .map_err(|e| ScoreError::Internal(format!("Invalid record '{}': {e}", path.display())))
}

fn split_name(name: &str) -> (&str, &str) {
    match name.rfind('.') {
        Some(idx) if idx > 0 => (&name[..idx], &name[idx..]),
        _ => (name, ""),
    }
}

fn file_stem(name: &str) -> &str {
    split_name(name).0
}

fn unix_timestamp() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or_default()
}

async fn create_dir(dir: &Path) -> Result<(), ScoreError> {
    tokio::fs::create_dir_all(dir)
        .await
        .map_err(|e| ScoreError::OutputWriteFailed {
            path: dir.to_path_buf(),
            source: e,
        })
}

async fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), ScoreError> {
    let tmp_path = path.with_extension("json.tmp");
    tokio::fs::write(&tmp_path, bytes)
        .await
        .map_err(|e| ScoreError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })?;

    tokio::fs::rename(&tmp_path, path)
        .await
        .map_err(|e| ScoreError::OutputWriteFailed {
            path: path.to_path_buf(),
            source: e,
        })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::output::Band;
    use serde_json::Value;

    fn result() -> ScoredResult {
        ScoredResult {
            schema_version: "1.3".into(),
            points: 38,
            band: Band::Basic,
            reason: "Has amount but missing items".into(),
            encouragement: "Good start!".into(),
            tip: Some("List specific items".into()),
            extracted_text: Some("Lunch $12".into()),
        }
    }

    #[test]
    fn name_splitting() {
        assert_eq!(split_name("receipt.final.jpg"), ("receipt.final", ".jpg"));
        assert_eq!(split_name("noext"), ("noext", ""));
        assert_eq!(split_name(".hidden"), (".hidden", ""));
    }

    #[tokio::test]
    async fn persists_copy_and_record() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("upload.png");
        std::fs::write(&src, b"png-bytes").unwrap();

        let sink = RecordSink::new(dir.path().join("output"), dir.path().join("saved"));
        let saved = sink
            .persist(&src, "receipt.png", &result(), Some(BatchContext::new(2, 1)))
            .await
            .unwrap();

        assert!(saved.saved_filename.starts_with("receipt_"));
        assert!(saved.saved_filename.ends_with(".png"));
        assert_eq!(
            saved.record_filename,
            format!("{}_scored.json", file_stem(&saved.saved_filename))
        );
        assert_eq!(
            std::fs::read(sink.saved_dir().join(&saved.saved_filename)).unwrap(),
            b"png-bytes"
        );

        let raw: Value = serde_json::from_slice(&std::fs::read(&saved.record_path).unwrap()).unwrap();
        assert_eq!(raw["points"], 38);
        assert_eq!(raw["band"], "basic");
        assert_eq!(raw["extracted_text"], "Lunch $12");
        assert_eq!(raw["original_filename"], "receipt.png");
        assert_eq!(raw["saved_filename"], saved.saved_filename.as_str());
        assert_eq!(raw["batch_context"]["total_files_in_batch"], 2);

        let back = load_record(&saved.record_path).await.unwrap();
        assert_eq!(back.result, result());
        assert!(!saved.record_path.with_extension("json.tmp").exists());
    }

    #[tokio::test]
    async fn single_upload_record_has_no_batch_context() {
        let dir = tempfile::tempdir().unwrap();
        let src = dir.path().join("a.jpg");
        std::fs::write(&src, b"x").unwrap();

        let sink = RecordSink::new(dir.path().join("o"), dir.path().join("s"));
        let saved = sink.persist(&src, "a.jpg", &result(), None).await.unwrap();
        let raw: Value = serde_json::from_slice(&std::fs::read(&saved.record_path).unwrap()).unwrap();
        assert!(raw.get("batch_context").is_none());
        assert!(raw["tip"].is_string());
    }

    #[tokio::test]
    async fn batch_save_failure_does_not_block_other_entries() {
        use crate::output::BatchEntry;

        let dir = tempfile::tempdir().unwrap();
        let first = dir.path().join("first.png");
        let gone = dir.path().join("gone.png");
        let third = dir.path().join("third.png");
        std::fs::write(&first, b"1").unwrap();
        std::fs::write(&third, b"3").unwrap();
        let inputs = [first.clone(), gone.clone(), third.clone()];

        let entry = |p: &Path| BatchEntry {
            identifier: p.display().to_string(),
            result: result(),
        };
        let outcome = BatchOutcome::from_parts(
            vec![entry(&first), entry(&gone), entry(&third)],
            Vec::new(),
        );

        let sink = RecordSink::new(dir.path().join("o"), dir.path().join("s"));
        let outcome = sink.persist_batch(&inputs, outcome).await;

        assert_eq!(outcome.success, 2);
        assert_eq!(outcome.failed, 1);
        assert_eq!(outcome.errors[0].identifier, gone.display().to_string());
        assert_eq!(outcome.results[1].identifier, third.display().to_string());

        let mut positions = Vec::new();
        for f in std::fs::read_dir(sink.output_dir()).unwrap() {
            let record = load_record(&f.unwrap().path()).await.unwrap();
            let ctx = record.batch_context.unwrap();
            assert_eq!(ctx.total_files_in_batch, 3);
            positions.push(ctx.file_position);
        }
        positions.sort();
        assert_eq!(positions, vec![1, 3]);
    }

    #[test]
    fn same_second_uploads_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let sink = RecordSink::new(dir.path().join("o"), dir.path());
        std::fs::write(dir.path().join("r_100.jpg"), b"x").unwrap();
        assert_eq!(sink.unused_saved_name("r.jpg", 100), "r_100_1.jpg");
        assert_eq!(sink.unused_saved_name("r.jpg", 101), "r_101.jpg");
    }
}
