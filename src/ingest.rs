//! The ingestion orchestrator.
//!
//! [`Ingestor`] walks the source directory one document at a time and runs
//! every document through the pipeline:
//!
//! ```text
//! rasterize_into ─▶ list_page_images ─▶ per page: pace, encode, OCR, clean
//!                                    ─▶ chunk_document ─▶ write_chunk_table
//! ```
//!
//! A document is assembled entirely in memory and its table written as the
//! last step, so a failure anywhere leaves no table behind for it. Failures
//! are contained per document: they are logged, recorded in the
//! [`IngestReport`], and the batch moves on. Only errors for which
//! [`IngestError::is_batch_fatal`] holds stop the batch.

use crate::config::{IngestConfig, DEFAULT_MODEL};
use crate::error::IngestError;
use crate::output::{
    DocumentFailure, DocumentOutput, DocumentStats, DocumentSummary, IngestReport, PageRecord,
};
use crate::pipeline::chunk::chunk_document;
use crate::pipeline::clean::clean_ocr_text;
use crate::pipeline::encode::encode_image_file;
use crate::pipeline::ocr::{OcrDriver, OcrModel, PageText, VisionOcrModel};
use crate::pipeline::pacing::{pacer_for, Pacer};
use crate::pipeline::rasterize::{rasterize_into, PdfiumRasterizer, Rasterizer, ScratchDir};
use crate::pipeline::sort::list_page_images;
use crate::pipeline::source::DocumentSource;
use crate::prompts::NO_TEXT_DETECTED;
use crate::stream::ingest_stream;
use crate::table::{write_chunk_table, write_page_table};
use edgequake_llm::{LLMProvider, ProviderFactory};
use futures::StreamExt;
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

/// Run a whole batch with the default collaborators.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocr_ingest::{ingest, IngestConfig};
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let config = IngestConfig::builder().source_dir("vlrs").build()?;
/// let report = ingest(config).await?;
/// for failure in &report.failed {
///     eprintln!("{}: {}", failure.source_path.display(), failure.error);
/// }
/// # Ok(())
/// # }
/// ```
pub async fn ingest(config: IngestConfig) -> Result<IngestReport, IngestError> {
    Ingestor::new(config)?.ingest_all().await
}

/// Drives rasterisation, OCR, cleaning and chunking over a source directory.
pub struct Ingestor {
    config: IngestConfig,
    rasterizer: Arc<dyn Rasterizer>,
    driver: OcrDriver,
    pacer: Arc<dyn Pacer>,
    scratch: ScratchDir,
}

impl Ingestor {
    /// Build an ingestor with pdfium rasterisation and a vision-LLM OCR model.
    ///
    /// Fails before any document is touched when no provider can be resolved.
    pub fn new(config: IngestConfig) -> Result<Self, IngestError> {
        let provider = resolve_provider(&config)?;
        let model: Arc<dyn OcrModel> = Arc::new(VisionOcrModel::new(provider, &config));
        let rasterizer: Arc<dyn Rasterizer> = Arc::new(PdfiumRasterizer::from_config(&config));
        let pacer = pacer_for(&config.pacing);
        Ok(Self::from_parts(config, rasterizer, model, pacer))
    }

    /// Build an ingestor from explicit collaborators.
    pub fn from_parts(
        config: IngestConfig,
        rasterizer: Arc<dyn Rasterizer>,
        model: Arc<dyn OcrModel>,
        pacer: Arc<dyn Pacer>,
    ) -> Self {
        let driver = OcrDriver::new(model, config.rate_limit_cooldown());
        let scratch = ScratchDir::new(config.scratch_dir.clone());
        Self {
            config,
            rasterizer,
            driver,
            pacer,
            scratch,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn scratch(&self) -> &ScratchDir {
        &self.scratch
    }

    /// The documents of the configured source directory.
    pub fn source(&self) -> DocumentSource {
        DocumentSource::new(self.config.source_dir.clone())
    }

    /// Ingest every document of the source directory.
    ///
    /// # Errors
    /// Returns `Err` only when the batch cannot go on at all: an unreadable
    /// source directory or a batch-fatal error such as a missing pdfium
    /// library. Per-document failures land in [`IngestReport::failed`].
    pub async fn ingest_all(&self) -> Result<IngestReport, IngestError> {
        let start = Instant::now();
        let mut report = IngestReport::default();

        let mut results = ingest_stream(self)?;
        while let Some(item) = results.next().await {
            match item.outcome {
                Ok(output) => report.succeeded.push(DocumentSummary::from(&output)),
                Err(e) if e.is_batch_fatal() => {
                    self.finish_batch();
                    return Err(e);
                }
                Err(e) => report.failed.push(DocumentFailure {
                    source_path: item.source_path,
                    page: e.page(),
                    error: e.to_string(),
                }),
            }
        }

        self.finish_batch();
        report.total_duration_ms = start.elapsed().as_millis() as u64;

        info!(
            "Batch complete: {}/{} documents, {} chunks, {}ms",
            report.succeeded.len(),
            report.total_documents(),
            report.total_chunks(),
            report.total_duration_ms
        );
        if let Some(ref cb) = self.config.progress_callback {
            cb.on_batch_complete(report.succeeded.len(), report.failed.len());
        }

        Ok(report)
    }

    fn finish_batch(&self) {
        if !self.config.cleanup_scratch {
            return;
        }
        match self.scratch.remove() {
            Ok(()) => debug!("Removed scratch directory {}", self.scratch.path().display()),
            Err(e) => warn!("Could not remove scratch directory: {}", e),
        }
    }

    /// Ingest one document and write its table(s).
    pub async fn ingest_document(&self, path: &Path) -> Result<DocumentOutput, IngestError> {
        let total_start = Instant::now();
        let cb = self.config.progress_callback.as_ref();
        info!("Ingesting {}", path.display());
        if let Some(cb) = cb {
            cb.on_document_start(path);
        }

        // ── Step 1: Rasterise into the cleared scratch directory ─────────────
        let render_start = Instant::now();
        let rendered = rasterize_into(self.rasterizer.as_ref(), path, &self.scratch).await?;

        // ── Step 2: Page images in page order ────────────────────────────────
        let images = list_page_images(self.scratch.path(), &self.config.image_extensions)?;
        if images.len() != rendered {
            warn!(
                "{}: rasteriser reported {} pages but {} images were found",
                path.display(),
                rendered,
                images.len()
            );
        }
        let total_pages = images.len();
        let rasterise_duration_ms = render_start.elapsed().as_millis() as u64;
        info!("Rendered {} pages in {}ms", total_pages, rasterise_duration_ms);
        if let Some(cb) = cb {
            cb.on_pages_rendered(path, total_pages);
        }

        // ── Step 3: OCR and clean page by page ───────────────────────────────
        let ocr_start = Instant::now();
        let mut stats = DocumentStats::default();
        let mut pages = Vec::with_capacity(total_pages);

        for (idx, image) in images.into_iter().enumerate() {
            let page_num = idx + 1;
            if let Some(cb) = cb {
                cb.on_page_start(path, page_num, total_pages);
            }

            let text = match self.recognize(page_num, &image).await {
                Ok(text) => text,
                Err(e) => {
                    if let Some(cb) = cb {
                        cb.on_page_error(path, page_num, total_pages, &e.to_string());
                    }
                    return Err(e);
                }
            };

            let clean_text = clean_ocr_text(&text.raw);
            if clean_text == NO_TEXT_DETECTED {
                debug!("Page {}: model found no text", page_num);
            }
            info!(
                "Page {}/{}: {} chars{}",
                page_num,
                total_pages,
                clean_text.len(),
                if text.blocked { " (blocked)" } else { "" }
            );

            stats.prompt_tokens += text.prompt_tokens as u64;
            stats.completion_tokens += text.completion_tokens as u64;
            if text.retries > 0 {
                stats.retried_pages += 1;
            }
            if text.blocked {
                stats.blocked_pages += 1;
            }
            if let Some(cb) = cb {
                if text.blocked {
                    cb.on_page_blocked(path, page_num, total_pages);
                } else {
                    cb.on_page_complete(path, page_num, total_pages, clean_text.len());
                }
            }

            pages.push(PageRecord {
                page_number: page_num,
                image_identifier: image,
                raw_text: Some(text.raw),
                clean_text,
                blocked: text.blocked,
                retries: text.retries,
            });
        }
        stats.ocr_duration_ms = ocr_start.elapsed().as_millis() as u64;

        // ── Step 4: Optional full-page table ─────────────────────────────────
        let page_table_path = if self.config.write_page_tables {
            Some(write_page_table(&self.config.output_dir, path, &pages).await?)
        } else {
            None
        };

        // ── Step 5: Chunk and write the table last ───────────────────────────
        let source_path = path.to_string_lossy();
        let chunks = chunk_document(&source_path, &pages, &self.config.window);
        let table_path = write_chunk_table(&self.config.output_dir, path, &chunks).await?;

        stats.pages = pages.len();
        stats.chunks = chunks.len();
        stats.rasterise_duration_ms = rasterise_duration_ms;
        stats.total_duration_ms = total_start.elapsed().as_millis() as u64;

        info!(
            "{}: {} pages, {} chunks, {} in / {} out tokens, {}ms",
            path.display(),
            stats.pages,
            stats.chunks,
            stats.prompt_tokens,
            stats.completion_tokens,
            stats.total_duration_ms
        );
        if let Some(cb) = cb {
            cb.on_document_complete(path, chunks.len());
        }

        Ok(DocumentOutput {
            source_path: path.to_path_buf(),
            table_path,
            page_table_path,
            pages,
            chunks,
            stats,
        })
    }

    /// Pace, encode and OCR one page image from the scratch directory.
    async fn recognize(&self, page_num: usize, image: &str) -> Result<PageText, IngestError> {
        self.pacer.acquire().await;
        let data = encode_image_file(&self.scratch.path().join(image)).await?;
        self.driver.recognize_page(page_num, data).await
    }
}

// ── Provider resolution ──────────────────────────────────────────────────

/// Model used when a provider is named without one.
fn default_model_for(provider_name: &str) -> Option<&'static str> {
    match provider_name {
        "anthropic" => Some(DEFAULT_MODEL),
        "openai" => Some("gpt-4.1-nano"),
        "gemini" => Some("gemini-2.0-flash"),
        _ => None,
    }
}

fn create_vision_provider(
    provider_name: &str,
    model: &str,
) -> Result<Arc<dyn LLMProvider>, IngestError> {
    ProviderFactory::create_llm_provider(provider_name, model).map_err(|e| {
        IngestError::ProviderNotConfigured {
            provider: provider_name.to_string(),
            hint: format!("{e}"),
        }
    })
}

fn non_empty_env(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

/// Resolve the OCR provider, from most-specific to least-specific:
///
/// 1. **Pre-built provider** (`config.provider`), used as-is.
/// 2. **Named provider** (`config.provider_name`) with `config.model`, or the
///    provider's default model.
/// 3. **Environment pair** `EDGEQUAKE_LLM_PROVIDER` + `EDGEQUAKE_MODEL`.
/// 4. **`ANTHROPIC_API_KEY`**: Anthropic with `config.model` or [`DEFAULT_MODEL`].
/// 5. **Full auto-detection** via [`ProviderFactory::from_env`].
pub fn resolve_provider(config: &IngestConfig) -> Result<Arc<dyn LLMProvider>, IngestError> {
    if let Some(ref provider) = config.provider {
        return Ok(Arc::clone(provider));
    }

    if let Some(ref name) = config.provider_name {
        let model = match config.model.as_deref().or_else(|| default_model_for(name)) {
            Some(m) => m,
            None => {
                return Err(IngestError::ProviderNotConfigured {
                    provider: name.clone(),
                    hint: format!("No default model for '{}'. Pass --model <MODEL>.", name),
                })
            }
        };
        return create_vision_provider(name, model);
    }

    if let (Some(prov), Some(model)) = (
        non_empty_env("EDGEQUAKE_LLM_PROVIDER"),
        non_empty_env("EDGEQUAKE_MODEL"),
    ) {
        return create_vision_provider(&prov, &model);
    }

    if non_empty_env("ANTHROPIC_API_KEY").is_some() {
        let model = config.model.as_deref().unwrap_or(DEFAULT_MODEL);
        return create_vision_provider("anthropic", model);
    }

    let (llm_provider, _embedding) =
        ProviderFactory::from_env().map_err(|e| IngestError::ProviderNotConfigured {
            provider: "auto".to_string(),
            hint: format!(
                "No LLM provider could be auto-detected from environment.\n\
                Set ANTHROPIC_API_KEY, OPENAI_API_KEY, or pass --provider.\n\
                Error: {}",
                e
            ),
        })?;

    Ok(llm_provider)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_models() {
        assert_eq!(default_model_for("anthropic"), Some("claude-3-haiku-20240307"));
        assert_eq!(default_model_for("openai"), Some("gpt-4.1-nano"));
        assert_eq!(default_model_for("ollama"), None);
    }

    #[test]
    fn named_provider_without_model_needs_one() {
        let config = IngestConfig::builder()
            .provider_name("ollama")
            .build()
            .unwrap();
        let err = resolve_provider(&config).err().unwrap();
        assert!(matches!(
            err,
            IngestError::ProviderNotConfigured { ref provider, .. } if provider == "ollama"
        ));
        assert!(err.is_batch_fatal());
    }
}
