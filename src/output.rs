//! Records produced by the ingestion pipeline.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// One OCR'd page of a document.
///
/// `page_number` is the 1-based position of the page image after the
/// numeric sort, not anything the model reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRecord {
    pub page_number: usize,
    /// File name of the rendered page image inside the scratch directory.
    pub image_identifier: String,
    /// Model output before cleaning. `None` only before the OCR step ran.
    pub raw_text: Option<String>,
    pub clean_text: String,
    /// The provider refused the page and the sentinel was substituted.
    pub blocked: bool,
    /// Retries spent on this page (0, or 1 after a rate limit).
    pub retries: u8,
}

/// One overlapping window of page text.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub source_path: String,
    pub page_number: usize,
    /// Dense 0-based position across the whole document.
    pub chunk_index: usize,
    pub text: String,
}

/// Counters for one document.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentStats {
    pub pages: usize,
    pub blocked_pages: usize,
    pub retried_pages: usize,
    pub chunks: usize,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub rasterise_duration_ms: u64,
    pub ocr_duration_ms: u64,
    pub total_duration_ms: u64,
}

/// Everything produced for one successfully ingested document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocumentOutput {
    pub source_path: PathBuf,
    /// Where the chunk table was written.
    pub table_path: PathBuf,
    /// Where the page text table was written, when enabled.
    pub page_table_path: Option<PathBuf>,
    pub pages: Vec<PageRecord>,
    pub chunks: Vec<Chunk>,
    pub stats: DocumentStats,
}

/// Compact per-document line of a batch report.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentSummary {
    pub source_path: PathBuf,
    pub table_path: PathBuf,
    pub stats: DocumentStats,
}

impl From<&DocumentOutput> for DocumentSummary {
    fn from(out: &DocumentOutput) -> Self {
        Self {
            source_path: out.source_path.clone(),
            table_path: out.table_path.clone(),
            stats: out.stats.clone(),
        }
    }
}

/// A document that was skipped, with enough context to rerun it by hand.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentFailure {
    pub source_path: PathBuf,
    pub page: Option<usize>,
    pub error: String,
}

/// Outcome of a whole batch.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IngestReport {
    pub succeeded: Vec<DocumentSummary>,
    pub failed: Vec<DocumentFailure>,
    pub total_duration_ms: u64,
}

impl IngestReport {
    pub fn total_documents(&self) -> usize {
        self.succeeded.len() + self.failed.len()
    }

    pub fn total_chunks(&self) -> usize {
        self.succeeded.iter().map(|d| d.stats.chunks).sum()
    }
}
