//! Configuration types for OCR ingestion.
//!
//! All ingestion behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. Every knob lives in one struct so a batch run
//! can be logged, diffed against another, and reproduced.
//!
//! Validation happens in [`IngestConfigBuilder::build`]: a bad chunk window
//! or an empty directory setting fails before any document is touched.

use crate::error::IngestError;
use crate::pipeline::chunk::{ChunkWindow, DEFAULT_CHUNK_LEN, DEFAULT_STRIDE};
use crate::pipeline::sort::IMAGE_EXTENSIONS;
use crate::progress::ProgressCallback;
use edgequake_llm::LLMProvider;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Default model when Anthropic is picked from `ANTHROPIC_API_KEY`.
pub const DEFAULT_MODEL: &str = "claude-3-haiku-20240307";

/// Configuration for an ingestion batch.
///
/// # Example
/// ```rust
/// use edgequake_ocr_ingest::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .source_dir("vlrs")
///     .output_dir("ocr-text")
///     .chunk_len(80)
///     .stride(20)
///     .build()
///     .unwrap();
/// assert_eq!(config.window.stride(), 20);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    /// Directory holding the source PDFs. Default: `vlrs`.
    pub source_dir: PathBuf,

    /// Shared directory page images are rendered into. Cleared before every
    /// document. Default: `temp-images`.
    pub scratch_dir: PathBuf,

    /// Directory the per-document tables are written to. Default: `ocr-text`.
    pub output_dir: PathBuf,

    /// Chunking window (length and stride, in whitespace tokens). Default: 80 / 20.
    pub window: ChunkWindow,

    /// Maximum rendered image dimension (width or height) in pixels. Default: 2000.
    ///
    /// Caps memory on oversized pages and keeps images under the upload
    /// limits of the vision APIs.
    pub max_rendered_pixels: u32,

    /// Explicit libpdfium to load. Default: `PDFIUM_LIB_PATH` if set, else
    /// the system library.
    pub pdfium_library_path: Option<PathBuf>,

    /// PDF user password for encrypted documents.
    pub password: Option<String>,

    /// LLM model identifier. If None, uses [`DEFAULT_MODEL`] or the provider default.
    pub model: Option<String>,

    /// LLM provider name (e.g. "anthropic", "openai", "ollama").
    pub provider_name: Option<String>,

    /// Pre-constructed LLM provider. Takes precedence over `provider_name`.
    pub provider: Option<Arc<dyn LLMProvider>>,

    /// Sampling temperature for the OCR call. Default: 0.1.
    ///
    /// Transcription wants the model faithful to the page, not creative.
    pub temperature: f32,

    /// Maximum tokens the model may generate per page. Default: 4096.
    pub max_tokens: usize,

    /// Wait before the single retry of a rate-limited page. Default: 60 s.
    pub rate_limit_cooldown_secs: u64,

    /// Pacing between consecutive OCR calls. Default: 250 ms fixed delay.
    pub pacing: PacingPolicy,

    /// File extensions treated as page images. Default: png, jpg, jpeg, bmp, gif.
    pub image_extensions: Vec<String>,

    /// Also write a `PAGES_*.csv` full-page text table per document. Default: false.
    pub write_page_tables: bool,

    /// Delete the scratch directory once the batch is done. Default: true.
    pub cleanup_scratch: bool,

    /// Optional progress callback.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            source_dir: PathBuf::from("vlrs"),
            scratch_dir: PathBuf::from("temp-images"),
            output_dir: PathBuf::from("ocr-text"),
            window: ChunkWindow::default(),
            max_rendered_pixels: 2000,
            pdfium_library_path: std::env::var_os("PDFIUM_LIB_PATH")
                .filter(|v| !v.is_empty())
                .map(PathBuf::from),
            password: None,
            model: None,
            provider_name: None,
            provider: None,
            temperature: 0.1,
            max_tokens: 4096,
            rate_limit_cooldown_secs: 60,
            pacing: PacingPolicy::default(),
            image_extensions: IMAGE_EXTENSIONS.iter().map(|s| s.to_string()).collect(),
            write_page_tables: false,
            cleanup_scratch: true,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("source_dir", &self.source_dir)
            .field("scratch_dir", &self.scratch_dir)
            .field("output_dir", &self.output_dir)
            .field("window", &self.window)
            .field("max_rendered_pixels", &self.max_rendered_pixels)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("model", &self.model)
            .field("provider_name", &self.provider_name)
            .field("provider", &self.provider.as_ref().map(|_| "<dyn LLMProvider>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("rate_limit_cooldown_secs", &self.rate_limit_cooldown_secs)
            .field("pacing", &self.pacing)
            .field("image_extensions", &self.image_extensions)
            .field("write_page_tables", &self.write_page_tables)
            .field("cleanup_scratch", &self.cleanup_scratch)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
            chunk_len: DEFAULT_CHUNK_LEN,
            stride: DEFAULT_STRIDE,
        }
    }

    pub fn rate_limit_cooldown(&self) -> Duration {
        Duration::from_secs(self.rate_limit_cooldown_secs)
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
    chunk_len: usize,
    stride: usize,
}

impl IngestConfigBuilder {
    pub fn source_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.source_dir = dir.into();
        self
    }

    pub fn scratch_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.scratch_dir = dir.into();
        self
    }

    pub fn output_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.output_dir = dir.into();
        self
    }

    /// Validated in [`Self::build`]; zero is rejected.
    pub fn chunk_len(mut self, tokens: usize) -> Self {
        self.chunk_len = tokens;
        self
    }

    /// Validated in [`Self::build`]; zero is rejected.
    pub fn stride(mut self, tokens: usize) -> Self {
        self.stride = tokens;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn password(mut self, pwd: impl Into<String>) -> Self {
        self.config.password = Some(pwd.into());
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = Some(model.into());
        self
    }

    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = Some(name.into());
        self
    }

    pub fn provider(mut self, provider: Arc<dyn LLMProvider>) -> Self {
        self.config.provider = Some(provider);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn rate_limit_cooldown_secs(mut self, secs: u64) -> Self {
        self.config.rate_limit_cooldown_secs = secs;
        self
    }

    pub fn pacing(mut self, policy: PacingPolicy) -> Self {
        self.config.pacing = policy;
        self
    }

    pub fn image_extensions<I, S>(mut self, exts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.config.image_extensions = exts
            .into_iter()
            .map(|e| e.into().trim_start_matches('.').to_string())
            .collect();
        self
    }

    pub fn write_page_tables(mut self, v: bool) -> Self {
        self.config.write_page_tables = v;
        self
    }

    pub fn cleanup_scratch(mut self, v: bool) -> Self {
        self.config.cleanup_scratch = v;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(mut self) -> Result<IngestConfig, IngestError> {
        self.config.window = ChunkWindow::new(self.chunk_len, self.stride)?;

        let c = &self.config;
        for (name, dir) in [
            ("source", &c.source_dir),
            ("scratch", &c.scratch_dir),
            ("output", &c.output_dir),
        ] {
            if dir.as_os_str().is_empty() {
                return Err(IngestError::InvalidConfig(format!(
                    "{} directory must not be empty",
                    name
                )));
            }
        }
        let scratch = resolve_dir(&c.scratch_dir)?;
        for (name, dir) in [("source", &c.source_dir), ("output", &c.output_dir)] {
            if resolve_dir(dir)?.starts_with(&scratch) {
                return Err(IngestError::InvalidConfig(format!(
                    "scratch directory '{}' is cleared before every document and must not contain the {} directory '{}'",
                    c.scratch_dir.display(),
                    name,
                    dir.display()
                )));
            }
        }
        if c.image_extensions.is_empty() {
            return Err(IngestError::InvalidConfig(
                "at least one image extension is required".into(),
            ));
        }
        if c.max_tokens == 0 {
            return Err(IngestError::InvalidConfig("max_tokens must be ≥ 1".into()));
        }
        Ok(self.config)
    }
}

/// Absolute form of `dir` with `.`/`..` folded away and symlinks resolved
/// for whatever prefix already exists, so two spellings of one directory
/// compare equal.
fn resolve_dir(dir: &Path) -> Result<PathBuf, IngestError> {
    let absolute = std::path::absolute(dir).map_err(|e| {
        IngestError::InvalidConfig(format!("cannot resolve '{}': {}", dir.display(), e))
    })?;

    let mut normal = PathBuf::new();
    for component in absolute.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normal.pop();
            }
            other => normal.push(other),
        }
    }

    let mut existing = normal.as_path();
    let mut tail = Vec::new();
    loop {
        if let Ok(canonical) = existing.canonicalize() {
            return Ok(tail.iter().rev().fold(canonical, |acc, part| acc.join(part)));
        }
        match (existing.parent(), existing.file_name()) {
            (Some(parent), Some(name)) => {
                tail.push(name.to_os_string());
                existing = parent;
            }
            _ => return Ok(normal),
        }
    }
}

// ── Enums ────────────────────────────────────────────────────────────────

/// How OCR calls are spaced out to stay under the provider's request budget.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum PacingPolicy {
    /// No waiting at all (local models, tests).
    None,
    /// Sleep `millis` before every call.
    FixedDelay { millis: u64 },
    /// Up to `burst` calls back to back, refilled at `requests_per_minute`.
    TokenBucket { burst: u32, requests_per_minute: u32 },
}

impl Default for PacingPolicy {
    fn default() -> Self {
        PacingPolicy::FixedDelay { millis: 250 }
    }
}
