//! CLI binary for edgequake-ocr-ingest.
//!
//! A thin shim over the library crate that maps CLI flags
//! to `IngestConfig` and prints the batch report.

use anyhow::{Context, Result};
use clap::Parser;
use edgequake_ocr_ingest::{
    IngestConfig, IngestProgressCallback, IngestReport, Ingestor, PacingPolicy, ProgressCallback,
};
use indicatif::{ProgressBar, ProgressStyle};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};
use tracing_subscriber::EnvFilter;

// ── ANSI colour helpers (no extra deps) ──────────────────────────────────────

fn green(s: &str) -> String {
    format!("\x1b[32m{s}\x1b[0m")
}
fn red(s: &str) -> String {
    format!("\x1b[31m{s}\x1b[0m")
}
fn yellow(s: &str) -> String {
    format!("\x1b[33m{s}\x1b[0m")
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

fn file_label(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}

fn truncate(msg: &str, max: usize) -> String {
    if msg.chars().count() > max {
        let cut: String = msg.chars().take(max - 1).collect();
        format!("{cut}\u{2026}")
    } else {
        msg.to_string()
    }
}

// ── CLI progress callback using indicatif ────────────────────────────────────

/// Terminal progress callback: one bar per document, reset as each document
/// starts, with a log line per finished document above it.
struct CliProgressCallback {
    bar: ProgressBar,
    /// Wall-clock start of the current document.
    doc_start: Mutex<Option<Instant>>,
    blocked: AtomicUsize,
}

impl CliProgressCallback {
    fn new() -> Arc<Self> {
        let bar = ProgressBar::new(0);
        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);

        bar.set_style(spinner_style);
        bar.set_prefix("Scanning");
        bar.set_message("Listing documents…");
        bar.enable_steady_tick(Duration::from_millis(80));

        Arc::new(Self {
            bar,
            doc_start: Mutex::new(None),
            blocked: AtomicUsize::new(0),
        })
    }

    fn elapsed_secs(&self) -> f64 {
        self.doc_start
            .lock()
            .ok()
            .and_then(|g| g.map(|t| t.elapsed().as_secs_f64()))
            .unwrap_or(0.0)
    }
}

impl IngestProgressCallback for CliProgressCallback {
    fn on_document_start(&self, path: &Path) {
        if let Ok(mut start) = self.doc_start.lock() {
            *start = Some(Instant::now());
        }
        self.blocked.store(0, Ordering::SeqCst);

        let spinner_style = ProgressStyle::with_template("{spinner:.cyan} {prefix:.bold}  {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner())
            .tick_strings(TICKS);
        self.bar.set_style(spinner_style);
        self.bar.set_prefix(file_label(path));
        self.bar.set_message("rasterising…");
    }

    fn on_pages_rendered(&self, _path: &Path, total_pages: usize) {
        let progress_style = ProgressStyle::with_template(
            "{spinner:.cyan} {prefix:.bold}  \
             [{bar:42.green/238}] {pos:>3}/{len} pages  \
             ⏱ {elapsed_precise}  ETA {eta_precise}",
        )
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("█▉▊▋▌▍▎▏  ")
        .tick_strings(TICKS);

        self.bar.set_length(total_pages as u64);
        self.bar.set_position(0);
        self.bar.set_style(progress_style);
        self.bar.reset_eta();
    }

    fn on_page_start(&self, _path: &Path, page_num: usize, _total: usize) {
        self.bar.set_message(format!("page {page_num}"));
    }

    fn on_page_complete(&self, _path: &Path, _page: usize, _total: usize, _text_len: usize) {
        self.bar.inc(1);
    }

    fn on_page_blocked(&self, path: &Path, page_num: usize, total: usize) {
        self.blocked.fetch_add(1, Ordering::SeqCst);
        self.bar.println(format!(
            "  {} {} page {}/{}  {}",
            yellow("⚠"),
            file_label(path),
            page_num,
            total,
            dim("blocked by content filtering"),
        ));
        self.bar.inc(1);
    }

    fn on_page_error(&self, _path: &Path, page_num: usize, _total: usize, _error: &str) {
        self.bar.set_message(red(&format!("page {page_num} failed")));
    }

    fn on_document_complete(&self, path: &Path, chunks: usize) {
        let blocked = self.blocked.load(Ordering::SeqCst);
        let pages = self.bar.length().unwrap_or(0);
        self.bar.println(format!(
            "  {} {:<40}  {:>4} pages  {:>6} chunks{}  {}",
            green("✓"),
            file_label(path),
            pages,
            chunks,
            if blocked > 0 {
                yellow(&format!("  ({blocked} blocked)"))
            } else {
                String::new()
            },
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
    }

    fn on_document_error(&self, path: &Path, error: &str) {
        self.bar.println(format!(
            "  {} {:<40}  {}  {}",
            red("✗"),
            file_label(path),
            red(&truncate(error.lines().next().unwrap_or(error), 80)),
            dim(&format!("{:.1}s", self.elapsed_secs())),
        ));
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        self.bar.finish_and_clear();
        let total = succeeded + failed;

        if failed == 0 {
            eprintln!(
                "{} {} documents ingested successfully",
                green("✔"),
                bold(&succeeded.to_string())
            );
        } else {
            eprintln!(
                "{} {}/{} documents ingested  ({} failed)",
                if failed == total { red("✘") } else { cyan("⚠") },
                bold(&succeeded.to_string()),
                total,
                red(&failed.to_string()),
            );
        }
    }
}

const AFTER_HELP: &str = r#"EXAMPLES:
  # Ingest every PDF in ./vlrs into ./ocr-text
  ocr-ingest

  # Other directories, shorter chunks
  ocr-ingest --input reports --output tables --chunk-len 60 --stride 15

  # Stay under 50 requests/minute with bursts of 5
  ocr-ingest --requests-per-minute 50 --burst 5

  # Use a specific model
  ocr-ingest --provider openai --model gpt-4.1-mini

  # Also write full-page text tables, JSON report on stdout
  ocr-ingest --page-tables --json > report.json

OUTPUT:
  One table per document, named OCR_<stem>.csv, with the columns
    file_path,text,page,chunk_num
  chunk_num is dense from 0 across the document; page is 1-based.
  With --page-tables, PAGES_<stem>.csv holds text,page_number,file_name.

ENVIRONMENT VARIABLES:
  ANTHROPIC_API_KEY       Anthropic API key (default provider, claude-3-haiku-20240307)
  OPENAI_API_KEY          OpenAI API key
  GEMINI_API_KEY          Google Gemini API key
  EDGEQUAKE_LLM_PROVIDER  Override provider (anthropic, openai, gemini, ollama)
  EDGEQUAKE_MODEL         Override model ID
  PDFIUM_LIB_PATH         Path to libpdfium when it is not on the system search path
  RUST_LOG                Log filter, e.g. edgequake_ocr_ingest=debug

  Variables are also read from a .env file in the working directory.
"#;

/// Turn a directory of scanned PDFs into overlapping text-chunk tables.
#[derive(Parser, Debug)]
#[command(
    name = "ocr-ingest",
    version,
    about = "Turn a directory of scanned PDFs into overlapping text-chunk tables",
    long_about = "Rasterise every PDF in a directory, transcribe each page with a Vision \
Language Model, and write one CSV table of overlapping fixed-length text chunks per document. \
Supports Anthropic, OpenAI, Google Gemini, and any OpenAI-compatible endpoint (Ollama, vLLM, etc.).",
    color = clap::ColorChoice::Auto,
    after_long_help = AFTER_HELP
)]
struct Cli {
    /// Directory containing the source PDFs.
    #[arg(short, long, env = "OCR_INGEST_INPUT", default_value = "vlrs")]
    input: PathBuf,

    /// Directory the chunk tables are written to.
    #[arg(short, long, env = "OCR_INGEST_OUTPUT", default_value = "ocr-text")]
    output: PathBuf,

    /// Scratch directory for page images; cleared before every document.
    #[arg(long, env = "OCR_INGEST_SCRATCH", default_value = "temp-images")]
    scratch: PathBuf,

    /// Tokens per chunk.
    #[arg(long, env = "OCR_INGEST_CHUNK_LEN", default_value_t = 80)]
    chunk_len: usize,

    /// Tokens between the starts of consecutive chunks.
    #[arg(long, env = "OCR_INGEST_STRIDE", default_value_t = 20)]
    stride: usize,

    /// LLM model ID (e.g. claude-3-haiku-20240307, gpt-4.1-mini).
    #[arg(long, env = "EDGEQUAKE_MODEL")]
    model: Option<String>,

    /// LLM provider: anthropic, openai, gemini, ollama, azure.
    #[arg(
        long,
        env = "EDGEQUAKE_PROVIDER",
        long_help = "LLM provider. Auto-detected from API key env vars if not set.\n\
          Supported: anthropic, openai, gemini, azure, ollama, or any OpenAI-compatible URL."
    )]
    provider: Option<String>,

    /// Pause before every OCR call, in milliseconds (0 disables pacing).
    #[arg(long, env = "OCR_INGEST_PAGE_DELAY_MS", default_value_t = 250)]
    page_delay_ms: u64,

    /// Token-bucket pacing: sustained requests per minute. Overrides --page-delay-ms.
    #[arg(long, env = "OCR_INGEST_REQUESTS_PER_MINUTE")]
    requests_per_minute: Option<u32>,

    /// Token-bucket pacing: calls allowed back to back.
    #[arg(long, env = "OCR_INGEST_BURST", default_value_t = 1)]
    burst: u32,

    /// Wait before retrying a rate-limited page, in seconds.
    #[arg(long, env = "OCR_INGEST_COOLDOWN_SECS", default_value_t = 60)]
    cooldown_secs: u64,

    /// Longest edge of a rendered page, in pixels.
    #[arg(long, env = "OCR_INGEST_MAX_PIXELS", default_value_t = 2000)]
    max_pixels: u32,

    /// Max LLM output tokens per page.
    #[arg(long, env = "OCR_INGEST_MAX_TOKENS", default_value_t = 4096)]
    max_tokens: usize,

    /// LLM temperature (0.0–2.0).
    #[arg(long, env = "OCR_INGEST_TEMPERATURE", default_value_t = 0.1)]
    temperature: f32,

    /// PDF user password for encrypted documents.
    #[arg(long, env = "OCR_INGEST_PASSWORD")]
    password: Option<String>,

    /// Also write a PAGES_<stem>.csv table of full-page text per document.
    #[arg(long, env = "OCR_INGEST_PAGE_TABLES")]
    page_tables: bool,

    /// Keep the scratch directory after the batch.
    #[arg(long, env = "OCR_INGEST_KEEP_SCRATCH")]
    keep_scratch: bool,

    /// Print the batch report as JSON on stdout.
    #[arg(long, env = "OCR_INGEST_JSON")]
    json: bool,

    /// Disable progress bar.
    #[arg(long, env = "OCR_INGEST_NO_PROGRESS")]
    no_progress: bool,

    /// Enable DEBUG-level tracing logs.
    #[arg(short, long, env = "OCR_INGEST_VERBOSE")]
    verbose: bool,

    /// Suppress all output except errors.
    #[arg(short, long, env = "OCR_INGEST_QUIET")]
    quiet: bool,
}

impl Cli {
    fn pacing(&self) -> PacingPolicy {
        match self.requests_per_minute {
            Some(rpm) => PacingPolicy::TokenBucket {
                burst: self.burst,
                requests_per_minute: rpm,
            },
            None if self.page_delay_ms == 0 => PacingPolicy::None,
            None => PacingPolicy::FixedDelay {
                millis: self.page_delay_ms,
            },
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Before parsing, so `.env` values feed clap's env fallbacks.
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // ── Logging setup ────────────────────────────────────────────────────
    // Suppress INFO-level library logs when the progress bar is active;
    // the bar provides all the feedback that matters to the user.
    let show_progress = !cli.quiet && !cli.no_progress && !cli.json;
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

    // ── Build config ─────────────────────────────────────────────────────
    let progress_cb: Option<ProgressCallback> = if show_progress {
        Some(CliProgressCallback::new() as Arc<dyn IngestProgressCallback>)
    } else {
        None
    };

    let config = build_config(&cli, progress_cb)?;
    tracing::debug!("{:?}", config);

    // ── Run the batch ────────────────────────────────────────────────────
    let ingestor = Ingestor::new(config).context("Failed to set up the OCR provider")?;
    let report = ingestor.ingest_all().await.context("Ingestion failed")?;

    if cli.json {
        let json = serde_json::to_string_pretty(&report).context("Failed to serialise report")?;
        println!("{json}");
    } else if !cli.quiet {
        print_summary(&report, &cli.output, show_progress);
    }

    Ok(())
}

/// Map CLI args to `IngestConfig`.
fn build_config(cli: &Cli, progress: Option<ProgressCallback>) -> Result<IngestConfig> {
    let mut builder = IngestConfig::builder()
        .source_dir(&cli.input)
        .output_dir(&cli.output)
        .scratch_dir(&cli.scratch)
        .chunk_len(cli.chunk_len)
        .stride(cli.stride)
        .pacing(cli.pacing())
        .rate_limit_cooldown_secs(cli.cooldown_secs)
        .max_rendered_pixels(cli.max_pixels)
        .max_tokens(cli.max_tokens)
        .temperature(cli.temperature)
        .write_page_tables(cli.page_tables)
        .cleanup_scratch(!cli.keep_scratch);

    if let Some(ref model) = cli.model {
        builder = builder.model(model);
    }
    if let Some(ref provider) = cli.provider {
        builder = builder.provider_name(provider);
    }
    if let Some(ref password) = cli.password {
        builder = builder.password(password);
    }
    if let Some(cb) = progress {
        builder = builder.progress_callback(cb);
    }

    builder.build().context("Invalid configuration")
}

fn print_summary(report: &IngestReport, output_dir: &Path, show_progress: bool) {
    // The progress callback already printed the per-document lines.
    if !show_progress {
        eprintln!(
            "Ingested {}/{} documents in {}ms",
            report.succeeded.len(),
            report.total_documents(),
            report.total_duration_ms
        );
    }

    let prompt: u64 = report.succeeded.iter().map(|d| d.stats.prompt_tokens).sum();
    let completion: u64 = report
        .succeeded
        .iter()
        .map(|d| d.stats.completion_tokens)
        .sum();
    eprintln!(
        "   {} chunks  →  {}",
        bold(&report.total_chunks().to_string()),
        bold(&output_dir.display().to_string()),
    );
    eprintln!(
        "   {} tokens in  /  {} tokens out",
        dim(&prompt.to_string()),
        dim(&completion.to_string()),
    );

    for failure in &report.failed {
        let page = failure
            .page
            .map(|p| format!(" page {p}"))
            .unwrap_or_default();
        eprintln!(
            "   {} {}{}: {}",
            red("✗"),
            failure.source_path.display(),
            page,
            failure.error.lines().next().unwrap_or(&failure.error)
        );
    }
}
