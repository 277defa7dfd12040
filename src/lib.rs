//! # edgequake-ocr-ingest
//!
//! Turn a directory of scanned PDF reports into overlapping text chunks
//! ready for embedding, using a Vision Language Model (VLM) as the OCR engine.
//!
//! ## Why this crate?
//!
//! Scanned reports carry no text layer, so text extractors return nothing,
//! and classic OCR engines stumble on multi-column layouts, tables and
//! stamps. This crate rasterises each page into a PNG, asks a VLM to
//! transcribe it, and slices the transcript into fixed-length overlapping
//! windows tagged with their page, one table per document.
//!
//! ## Pipeline Overview
//!
//! ```text
//! vlrs/*.pdf
//!  │
//!  ├─ 1. Rasterise  pdfium → temp-images/page_{n}.png (cleared per document)
//!  ├─ 2. Sort       natural order: page_2 before page_10
//!  ├─ 3. OCR        one VLM call per page, paced; one retry after a rate limit,
//!  │                sentinel text when the page is content-filtered
//!  ├─ 4. Clean      strip <ocr_result> delimiters
//!  ├─ 5. Chunk      80-token windows every 20 tokens, per page
//!  └─ 6. Output     ocr-text/OCR_{stem}.csv: file_path,text,page,chunk_num
//! ```
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use edgequake_ocr_ingest::{ingest, IngestConfig};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Provider auto-detected from ANTHROPIC_API_KEY / OPENAI_API_KEY / …
//!     let config = IngestConfig::builder()
//!         .source_dir("vlrs")
//!         .output_dir("ocr-text")
//!         .build()?;
//!     let report = ingest(config).await?;
//!     eprintln!(
//!         "{} documents, {} chunks, {} failed",
//!         report.succeeded.len(),
//!         report.total_chunks(),
//!         report.failed.len()
//!     );
//!     Ok(())
//! }
//! ```
//!
//! ## Testing without a model
//!
//! Every external dependency sits behind a trait: [`Rasterizer`],
//! [`OcrModel`], [`Pacer`] and [`Embedder`]. Build an [`Ingestor`] with
//! [`Ingestor::from_parts`] to run the whole orchestrator against doubles.
//!
//! ## Feature Flags
//!
//! | Feature | Default | Description |
//! |---------|---------|-------------|
//! | `cli`   | on      | Enables the `ocr-ingest` binary (clap + anyhow + tracing-subscriber + indicatif) |
//!
//! Disable `cli` when using only the library:
//! ```toml
//! edgequake-ocr-ingest = { version = "0.1", default-features = false }
//! ```

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod embed;
pub mod error;
pub mod ingest;
pub mod output;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod stream;
pub mod table;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, PacingPolicy, DEFAULT_MODEL};
pub use embed::{embed_chunk_table, embed_chunks, write_embedding_table, Embedder, EmbeddingRow};
pub use error::{IngestError, OcrError};
pub use ingest::{ingest, resolve_provider, Ingestor};
pub use output::{
    Chunk, DocumentFailure, DocumentOutput, DocumentStats, DocumentSummary, IngestReport,
    PageRecord,
};
pub use pipeline::chunk::{chunk_document, chunk_page, ChunkWindow};
pub use pipeline::ocr::{OcrDriver, OcrModel, OcrResponse, VisionOcrModel};
pub use pipeline::pacing::{Pacer, Unpaced};
pub use pipeline::rasterize::{PdfiumRasterizer, Rasterizer, ScratchDir};
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use stream::{ingest_stream, DocumentResult, DocumentStream};
pub use table::{ChunkRow, PageRow};
