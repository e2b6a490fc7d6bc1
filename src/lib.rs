//! # datadon-scorer
//!
//! Score uploaded receipts, screenshots, PDFs and notes for a
//! data-contribution incentive programme using an LLM rubric.
//!
//! ## Why this crate?
//!
//! The scoring itself is done by a remote model following a fixed rubric.
//! What this crate engineers is everything around that call: turning any
//! supported file into clean text, building a deterministic payload, talking
//! to a Responses-style endpoint whose request shape has drifted over time,
//! validating the reply against the result schema, and keeping one bad file
//! from sinking a batch.
//!
//! ## Pipeline Overview
//!
//! ```text
//! file
//!  │
//!  ├─ 1. Input     check path, classify (image / pdf / text / html)
//!  ├─ 2. Extract   enhance + vision model for images, pdfium for PDFs
//!  ├─ 3. Normalize fences, line endings, invisible chars, blank lines
//!  ├─ 4. Payload   {file_id, normalized_text, batch_context}
//!  ├─ 5. Score     rubric + payload → Responses API, tag/format negotiation
//!  └─ 6. Sink      saved copy + {stem}_scored.json record
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use datadon_scorer::{Scorer, ScorerConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Scoring key from OPENAI_API_KEY; vision provider auto-detected.
//!     let scorer = Scorer::new(ScorerConfig::default())?;
//!     let result = scorer.score_file("receipt.jpg", None, None).await?;
//!     println!("{} points ({})", result.points, result.band);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature   | Default | Description |
//! |-----------|---------|-------------|
//! | `cli`     | on      | Enables the `datadon-score` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `bundled` | off     | Embeds the pdfium shared library in the binary |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! datadon-scorer = { version = "0.2", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod error;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod responses;
pub mod scorer;
pub mod sink;
pub mod upload;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{ScorerConfig, ScorerConfigBuilder};
pub use error::{ConversionError, FileFailure, ScoreError, TransportError};
pub use output::{BatchContext, BatchEntry, BatchOutcome, Band, ScoredResult, ScoringRequest};
pub use pipeline::extract::TextExtractor;
pub use pipeline::payload::{build_request, load_payload_file};
pub use progress::{BatchProgressCallback, NoopProgressCallback, ProgressCallback};
pub use prompts::Rubric;
pub use responses::{ContentTag, HttpTransport, ResponsesReply, ResponsesRequest, ResponsesTransport};
pub use scorer::{score_file_sync, Scorer};
pub use sink::{RecordSink, SavedRecord, ScoreRecord};
pub use upload::{BatchUploadResponse, ScoredUpload, UploadService, UploadedFile};
