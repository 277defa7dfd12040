//! Progress-callback trait for per-document and per-page ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events as the orchestrator walks the batch.
//!
//! # Example
//!
//! ```rust
//! use edgequake_ocr_ingest::{IngestProgressCallback, IngestConfig};
//! use std::path::Path;
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     pages: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _doc: &Path, page_num: usize, total_pages: usize, text_len: usize) {
//!         self.pages.fetch_add(1, Ordering::SeqCst);
//!         eprintln!("Page {}/{} done ({} chars)", page_num, total_pages, text_len);
//!     }
//! }
//!
//! let counter = Arc::new(CountingCallback { pages: AtomicUsize::new(0) });
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(counter as Arc<dyn IngestProgressCallback>)
//!     .build()
//!     .unwrap();
//! ```

use std::path::Path;
use std::sync::Arc;

/// Called by the orchestrator as it processes each document and page.
///
/// Documents and pages are processed sequentially, so events arrive in
/// order. All methods default to no-ops.
pub trait IngestProgressCallback: Send + Sync {
    /// A document is about to be rasterised.
    fn on_document_start(&self, path: &Path) {
        let _ = path;
    }

    /// Rasterisation finished; `total_pages` page images will be OCR'd.
    fn on_pages_rendered(&self, path: &Path, total_pages: usize) {
        let _ = (path, total_pages);
    }

    /// Just before the OCR request for a page is sent.
    fn on_page_start(&self, path: &Path, page_num: usize, total_pages: usize) {
        let _ = (path, page_num, total_pages);
    }

    /// A page was OCR'd; `text_len` is the byte length of its clean text.
    fn on_page_complete(&self, path: &Path, page_num: usize, total_pages: usize, text_len: usize) {
        let _ = (path, page_num, total_pages, text_len);
    }

    /// A page was refused by the provider and the sentinel substituted.
    fn on_page_blocked(&self, path: &Path, page_num: usize, total_pages: usize) {
        let _ = (path, page_num, total_pages);
    }

    /// A page failed for good; the document will be skipped.
    fn on_page_error(&self, path: &Path, page_num: usize, total_pages: usize, error: &str) {
        let _ = (path, page_num, total_pages, error);
    }

    /// The document's chunk table was written.
    fn on_document_complete(&self, path: &Path, chunks: usize) {
        let _ = (path, chunks);
    }

    /// The document failed and was skipped.
    fn on_document_error(&self, path: &Path, error: &str) {
        let _ = (path, error);
    }

    /// Every document of the batch has been attempted.
    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        let _ = (succeeded, failed);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;
