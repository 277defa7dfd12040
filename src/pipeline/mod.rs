//! Pipeline stages for scanned-PDF ingestion.
//!
//! Each submodule implements exactly one step. The orchestrator in
//! [`crate::ingest`] strings them together per document.
//!
//! ## Data Flow
//!
//! ```text
//! source ──▶ rasterize ──▶ sort ──▶ encode ──▶ ocr ──▶ clean ──▶ chunk
//! (*.pdf)    (pdfium)      (natural) (base64)  (VLM)   (tags)    (windows)
//! ```
//!
//! 1. [`source`]    — enumerate candidate PDFs lazily and sanity-check them
//! 2. [`rasterize`] — clear the scratch directory, render one PNG per page;
//!    runs in `spawn_blocking` because pdfium is not async-safe
//! 3. [`sort`]      — list page images in natural order (`page_2` before `page_10`)
//! 4. [`encode`]    — base64-wrap each image file for the multimodal request
//! 5. [`pacing`]    — space out requests to stay under the provider budget
//! 6. [`ocr`]       — one model call per page with the rate-limit / content-filter
//!    recovery policy; the only stage with network I/O
//! 7. [`clean`]     — strip the `<ocr_result>` delimiters
//! 8. [`chunk`]     — overlapping fixed-length token windows, numbered per document

pub mod chunk;
pub mod clean;
pub mod encode;
pub mod ocr;
pub mod pacing;
pub mod rasterize;
pub mod sort;
pub mod source;
