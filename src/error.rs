//! Error types for the edgequake-ocr-ingest library.
//!
//! Two distinct error types reflect two distinct layers:
//!
//! * [`IngestError`] — a document (or the whole batch) cannot proceed:
//!   unreadable PDF, rasterisation failure, a page whose OCR call failed
//!   for good, a table that could not be written, or bad configuration.
//!   The orchestrator catches it per document, logs it, and moves on to
//!   the next document. Only configuration errors and an unreadable source
//!   directory stop a batch.
//!
//! * [`OcrError`] — the raw signal returned by an [`crate::pipeline::ocr::OcrModel`].
//!   The OCR driver turns these into a retry, a sentinel substitution, or an
//!   [`IngestError`], so callers of the library never see them directly.

use std::path::PathBuf;
use thiserror::Error;

/// All errors returned by the edgequake-ocr-ingest library.
#[derive(Debug, Error)]
pub enum IngestError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The source directory could not be listed.
    #[error("Cannot read source directory '{path}': {source}")]
    SourceDirUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Input file was not found at the given path.
    #[error("PDF file not found: '{path}'\nCheck the path exists and is readable.")]
    FileNotFound { path: PathBuf },

    /// Process does not have read permission on the file.
    #[error("Permission denied reading '{path}'\nTry: chmod +r {path:?}")]
    PermissionDenied { path: PathBuf },

    /// The file exists and was read, but is not a PDF.
    #[error("File is not a valid PDF: '{path}'\nFirst bytes: {magic:?}")]
    NotAPdf { path: PathBuf, magic: [u8; 4] },

    // ── PDF errors ────────────────────────────────────────────────────────
    /// PDF header/trailer/xref is corrupt and cannot be parsed.
    #[error("PDF '{path}' is corrupt: {detail}\nTry repairing with: qpdf --decrypt input.pdf output.pdf")]
    CorruptPdf { path: PathBuf, detail: String },

    /// PDF requires a password but none was provided.
    #[error("PDF '{path}' is encrypted and requires a password.\nProvide it with --password <PASSWORD>.")]
    PasswordRequired { path: PathBuf },

    /// A password was provided but it is wrong.
    #[error("Wrong password for PDF '{path}'")]
    WrongPassword { path: PathBuf },

    /// pdfium-render returned an error for a specific page.
    #[error("Rasterisation failed for '{path}' page {page}: {detail}")]
    RasterisationFailed {
        path: PathBuf,
        page: usize,
        detail: String,
    },

    // ── Scratch directory ─────────────────────────────────────────────────
    /// The shared page-image directory could not be created, cleared or listed.
    #[error("Scratch directory '{path}' is unusable: {source}")]
    ScratchDir {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// A rendered page image could not be read back for encoding.
    #[error("Failed to read page image '{path}': {source}")]
    ImageReadFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // ── OCR errors ────────────────────────────────────────────────────────
    /// The model rate-limited the page twice in a row (original call and the
    /// single retry after the cooldown).
    #[error("Page {page}: rate limited again after a {cooldown_secs}s cooldown: {detail}")]
    RateLimitExhausted {
        page: usize,
        cooldown_secs: u64,
        detail: String,
    },

    /// The model call failed with a non-recoverable error.
    #[error("Page {page}: OCR call failed: {detail}")]
    OcrFailed { page: usize, detail: String },

    /// The configured provider is not initialised (missing API key etc.).
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    /// The embedding collaborator failed for a chunk.
    #[error("Embedding failed for chunk {chunk_num}: {detail}")]
    EmbeddingFailed { chunk_num: usize, detail: String },

    // ── Output errors ─────────────────────────────────────────────────────
    /// Could not create or write an output table.
    #[error("Failed to write output table '{path}': {source}")]
    OutputWriteFailed {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Rows could not be encoded as CSV.
    #[error("Failed to encode table '{path}': {detail}")]
    TableEncodeFailed { path: PathBuf, detail: String },

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── Pdfium binding errors ─────────────────────────────────────────────
    /// Could not bind to a pdfium library.
    #[error(
        "Failed to bind to pdfium library: {0}\n\n\
Install libpdfium system-wide, or set PDFIUM_LIB_PATH=/path/to/libpdfium\n\
to load a specific copy.\n"
    )]
    PdfiumBindingFailed(String),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl IngestError {
    /// The 1-based page this error is attached to, when there is one.
    ///
    /// Failure reports carry it next to the document path so a single
    /// document can be rerun by hand.
    pub fn page(&self) -> Option<usize> {
        match self {
            IngestError::RasterisationFailed { page, .. }
            | IngestError::RateLimitExhausted { page, .. }
            | IngestError::OcrFailed { page, .. } => Some(*page),
            _ => None,
        }
    }

    /// Whether this error must stop the whole batch rather than one document.
    pub fn is_batch_fatal(&self) -> bool {
        matches!(
            self,
            IngestError::SourceDirUnreadable { .. }
                | IngestError::InvalidConfig(_)
                | IngestError::ProviderNotConfigured { .. }
                | IngestError::PdfiumBindingFailed(_)
        )
    }
}

/// Signal returned by an OCR model call.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum OcrError {
    /// HTTP 429 or equivalent. Worth one retry after a cooldown.
    #[error("rate limited: {0}")]
    RateLimited(String),

    /// The request was rejected by a content filter or as a bad request.
    /// Retrying the same image will not help.
    #[error("blocked by content filtering: {0}")]
    ContentFiltered(String),

    /// Anything else (auth, network, malformed response).
    #[error("{0}")]
    Failed(String),
}
