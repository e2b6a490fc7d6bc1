//! CLI binary for datadon-scorer.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `ScorerConfig` and prints results as JSON on stdout.

use anyhow::{Context, Result};
use clap::Parser;
use datadon_scorer::config::{DEFAULT_API_BASE, DEFAULT_MODEL, DEFAULT_VISION_MODEL};
use datadon_scorer::{
    load_payload_file, BatchContext, BatchProgressCallback, ProgressCallback, RecordSink,
    ScoredResult, Scorer, ScorerConfig,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing::warn;
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn dim(s: &str) -> String {
    format!("\x1b[2m{s}\x1b[0m")
}
fn bold(s: &str) -> String {
    format!("\x1b[1m{s}\x1b[0m")
}
fn cyan(s: &str) -> String {
    format!("\x1b[36m{s}\x1b[0m")
}

const TICKS: &[&str] = &["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏", "⠿"];

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress for batches: a bar pinned to the bottom of the terminal
/// and one log line per scored file.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Position → (identifier, start time).
    started: Mutex<HashMap<usize, (String, Instant)>>,
    errors: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} files  \
             ⏱ {elapsed_precise}  {msg}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        bar.set_style(style);
        bar.set_prefix("Scoring");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            started: Mutex::new(HashMap::new()),
            errors: AtomicUsize::new(0),
        })
    }

    fn finish_file(&self, position: usize) -> (String, f64) {
        let entry = self
            .started
            .lock()
            .ok()
            .and_then(|mut m| m.remove(&position));
        match entry {
            Some((name, t)) => (name, t.elapsed().as_secs_f64()),
            None => (String::new(), 0.0),
        }
    }
}

impl BatchProgressCallback for CliProgressCallback {
    fn on_batch_start(&self, total_files: usize) {
        self.bar.set_length(total_files as u64);
        self.bar.println(format!(
            "{} {}",
            cyan("◆"),
            bold(&format!("Scoring {total_files} files…"))
        ));
    }

    fn on_file_start(&self, position: usize, _total: usize, identifier: &str) {
        if let Ok(mut m) = self.started.lock() {
            m.insert(position, (identifier.to_string(), Instant::now()));
        }
        self.bar.set_message(short_name(identifier));
    }

    fn on_file_complete(&self, position: usize, total: usize, points: u8) {
        let (name, secs) = self.finish_file(position);
        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            green("✓"),
            position,
            total,
            short_name(&name),
            bold(&format!("{points:>3} pts")),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_file_error(&self, position: usize, total: usize, error: &str) {
        let (name, secs) = self.finish_file(position);
        self.errors.fetch_add(1, Ordering::SeqCst);

        let first_line = error.lines().next().unwrap_or_default();
        let msg = if first_line.chars().count() > 80 {
            format!("{}\u{2026}", first_line.chars().take(79).collect::<String>())
        } else {
            first_line.to_string()
        };

        self.bar.println(format!(
            "  {} {:>3}/{:<3}  {:<32}  {}  {}",
            red("✗"),
            position,
            total,
            short_name(&name),
            red(&msg),
            dim(&format!("{secs:.1}s")),
        ));
        self.bar.inc(1);
    }

    fn on_batch_complete(&self, total_files: usize, success_count: usize) {
        let failed = self.errors.load(Ordering::SeqCst);
        self.bar.finish_and_clear();

        if failed == 0 {
            eprintln!(
                "{} {} files scored successfully",
                green("✔"),
                bold(&success_count.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} files scored  ({} failed)",
                if failed == total_files {
                    red("✘")
                } else {
                    cyan("⚠")
                },
                bold(&success_count.to_string()),
                total_files,
                red(&failed.to_string()),
            );
        }
    }
}

fn short_name(identifier: &str) -> String {
    Path::new(identifier)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| identifier.to_string())
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Score one receipt photo (JSON on stdout, record in ./output)
  datadon-score receipt.jpg

  # Score without saving anything
  datadon-score --no-save notes.md

  # Batch: every file gets its position in the batch context
  datadon-score uploads/*.png --output-dir scored/

  # Score a pre-built payload
  echo '{"file_id":"f1","normalized_text":"Costco ... Total $38.47"}' > p.json
  datadon-score p.json

  # Images without a vision model (generic description only)
  datadon-score --no-vision scan.tiff

  # Use another vision provider for transcription
  datadon-score --vision-provider anthropic --vision-model claude-sonnet-4-20250514 receipt.jpg

SUPPORTED INPUTS:
  Images   jpg jpeg png webp gif bmp tiff tif   (vision model, else generic description)
  PDF      pdf                                   (text layer via PDFium)
  Text     txt md markdown csv tsv json log xml
  HTML     html htm

ENVIRONMENT VARIABLES:
  OPENAI_API_KEY          Key for the scoring endpoint (and OpenAI vision)
  ANTHROPIC_API_KEY       Used when --vision-provider anthropic
  GEMINI_API_KEY          Used when --vision-provider gemini
  PDFIUM_LIB_PATH         Path to an existing libpdfium, skips auto-download
  PDFIUM_AUTO_CACHE_DIR   Override the default pdfium cache directory
  RUST_LOG                Overrides the log filter chosen by --verbose/--quiet
"#;

/// Score documents for data-contribution incentives.
#[derive(Parser, Debug)]
#[command(
    name = "datadon-score",
    version,
    about = "Score receipts, images and documents against the incentive rubric",
    long_about = "Extract the text of each document (vision model for images, PDFium for PDFs), \
send it with the scoring rubric to a Responses-style endpoint, and print the structured score. \
Each scored file is also saved together with a JSON record unless --no-save is given.",
    arg_required_else_help = true,
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Files to score. Several files are scored as one batch.
    #[arg(required = true)]
    inputs: Vec<PathBuf>,

    /// Scoring model ID.
    #[arg(long, env = "DATADON_MODEL", default_value = DEFAULT_MODEL)]
    model: String,

    /// Base URL of the Responses endpoint.
    #[arg(long, env = "DATADON_API_BASE", default_value = DEFAULT_API_BASE)]
    api_base: String,

    /// Scoring request timeout in seconds.
    #[arg(long, env = "DATADON_TIMEOUT", default_value_t = 60)]
    timeout: u64,

    /// File ID sent in the payload (single input only; default: file name).
    #[arg(long, env = "DATADON_FILE_ID")]
    file_id: Option<String>,

    /// Batch size to report for a single input.
    #[arg(long, env = "DATADON_BATCH_SIZE")]
    batch_size: Option<u32>,

    /// 1-indexed batch position to report for a single input.
    #[arg(long, env = "DATADON_BATCH_POSITION", requires = "batch_size")]
    batch_position: Option<u32>,

    /// Vision provider for images: openai, anthropic, gemini, ollama, azure.
    #[arg(
        long,
        env = "DATADON_VISION_PROVIDER",
        long_help = "Vision provider used to transcribe images. Auto-detected from API key \
          env vars if not set; when none is found, images get a generic description instead."
    )]
    vision_provider: Option<String>,

    /// Vision model ID.
    #[arg(long, env = "DATADON_VISION_MODEL", default_value = DEFAULT_VISION_MODEL)]
    vision_model: String,

    /// Never call a vision model; describe images generically.
    #[arg(long, env = "DATADON_NO_VISION")]
    no_vision: bool,

    /// Skip contrast/sharpen enhancement of images.
    #[arg(long, env = "DATADON_NO_ENHANCE")]
    no_enhance: bool,

    /// Directory for `*_scored.json` records.
    #[arg(long, env = "DATADON_OUTPUT_DIR", default_value = "output")]
    output_dir: PathBuf,

    /// Directory for timestamped copies of scored files.
    #[arg(long, env = "DATADON_SAVED_DIR", default_value = "saved")]
    saved_dir: PathBuf,

    /// Do not write copies or records.
    #[arg(long, env = "DATADON_NO_SAVE")]
    no_save: bool,

    /// Disable progress bar.
    #[arg(long, env = "DATADON_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "DATADON_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors and the JSON result.
    #[arg(short, long, env = "DATADON_QUIET")]
    quiet: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // The progress bar replaces INFO-level library logs in batch mode.
    let batch_mode = cli.inputs.len() > 1;
    let show_progress = batch_mode && !cli.quiet && !cli.no_progress;
    let filter = if cli.verbose {
        "debug"
    } else if cli.quiet || show_progress {
        "error"
    } else {
        "info"
    };

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter)),
        )
        .with_writer(io::stderr)
        .init();

    // ── Ensure PDFium engine is available (PDF inputs only) ──────────────
    if cli.inputs.iter().any(|p| has_extension(p, "pdf")) && !pdfium_auto::is_pdfium_cached() {
        ensure_pdfium(cli.quiet)?;
    }

    // ── Build scorer ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn BatchProgressCallback>)
    } else {
        None
    };
    let config = build_config(&cli, progress_cb)?;
    let scorer = Scorer::new(config).context("Failed to initialise scorer")?;
    let sink = (!cli.no_save).then(|| RecordSink::new(&cli.output_dir, &cli.saved_dir));

    if batch_mode {
        run_batch(&cli, &scorer, sink.as_ref()).await
    } else {
        run_single(&cli, &scorer, sink.as_ref()).await
    }
}

async fn run_single(cli: &Cli, scorer: &Scorer, sink: Option<&RecordSink>) -> Result<()> {
    let path = &cli.inputs[0];
    let batch = match (cli.batch_size, cli.batch_position) {
        (None, None) => None,
        (size, position) => Some(BatchContext::new(size.unwrap_or(1), position.unwrap_or(1))),
    };

    let result: ScoredResult =
        if let Some(mut request) = load_payload_file(path).context("Failed to read payload")? {
            if let Some(ref id) = cli.file_id {
                request.file_id = id.clone();
            }
            if let Some(ctx) = batch {
                request.batch_context = ctx;
            }
            scorer
                .score(&request)
                .await
                .with_context(|| format!("Scoring failed for payload {}", path.display()))?
        } else {
            let result = scorer
                .score_file(path, cli.file_id.as_deref(), batch)
                .await
                .with_context(|| format!("Scoring failed for {}", path.display()))?;

            if let Some(sink) = sink {
                let saved = sink
                    .persist(path, &file_name(path), &result, batch)
                    .await
                    .context("Failed to save scored record")?;
                if !cli.quiet {
                    eprintln!(
                        "{}  {} points ({})  →  {}",
                        green("✔"),
                        bold(&result.points.to_string()),
                        result.band,
                        dim(&saved.record_path.display().to_string()),
                    );
                }
            }
            result
        };

    let json = serde_json::to_string_pretty(&result).context("Failed to serialise result")?;
    println!("{json}");
    Ok(())
}

async fn run_batch(cli: &Cli, scorer: &Scorer, sink: Option<&RecordSink>) -> Result<()> {
    if cli.file_id.is_some() || cli.batch_size.is_some() || cli.batch_position.is_some() {
        warn!("--file-id/--batch-size/--batch-position apply to a single input and are ignored");
    }

    let outcome = scorer.score_batch(&cli.inputs).await;

    let outcome = match sink {
        Some(sink) => sink.persist_batch(&cli.inputs, outcome).await,
        None => outcome,
    };

    let json = serde_json::to_string_pretty(&outcome).context("Failed to serialise outcome")?;
    println!("{json}");

    if outcome.all_failed() {
        anyhow::bail!("All {} files failed to score", outcome.failed);
    }
    Ok(())
}

/// Map CLI args to `ScorerConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<ScorerConfig> {
    let mut builder = ScorerConfig::builder()
        .model(&cli.model)
        .api_base_url(&cli.api_base)
        .request_timeout_secs(cli.timeout)
        .vision(!cli.no_vision)
        .vision_model(&cli.vision_model)
        .enhance_images(!cli.no_enhance);

    if let Some(ref name) = cli.vision_provider {
        builder = builder.vision_provider_name(name);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

/// Download PDFium on first use, with a byte-progress bar unless quiet.
fn ensure_pdfium(quiet: bool) -> Result<()> {
    if quiet {
        tokio::task::block_in_place(|| pdfium_auto::ensure_pdfium_library(None))
            .context("Failed to download PDFium engine")?;
        return Ok(());
    }

    let dl_bar = ProgressBar::new(0);
    dl_bar.set_style(
        ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {bytes}/{total_bytes}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS),
    );
    dl_bar.set_prefix("PDF engine");
    dl_bar.enable_steady_tick(Duration::from_millis(80));

    let bar = dl_bar.clone();
    tokio::task::block_in_place(|| {
        pdfium_auto::ensure_pdfium_library(Some(&|downloaded, total| {
            if let Some(t) = total {
                if bar.length().unwrap_or(0) != t {
                    bar.set_length(t);
                }
            }
            bar.set_position(downloaded);
        }))
    })
    .context("Failed to download PDFium engine")?;

    dl_bar.finish_with_message("ready ✓");
    Ok(())
}

fn has_extension(path: &Path, ext: &str) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case(ext))
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn batch_position_needs_batch_size() {
        let err = Cli::try_parse_from(["datadon-score", "--batch-position", "3", "note.txt"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);

        let cli = Cli::try_parse_from([
            "datadon-score",
            "--batch-size",
            "4",
            "--batch-position",
            "3",
            "note.txt",
        ])
        .unwrap();
        assert_eq!((cli.batch_size, cli.batch_position), (Some(4), Some(3)));
    }
}
