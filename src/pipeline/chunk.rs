//! Sliding-window chunking of cleaned page text.
//!
//! Each page is tokenised on whitespace and a window of `chunk_len` tokens is
//! slid across it in steps of `stride`. The window state resets on every
//! page, so a chunk never spans two pages and always carries exactly one page
//! number.
//!
//! ## Trailing remainder
//!
//! A window is emitted only while its end is *strictly* below the page's
//! token count. The tail of a page that does not fill a further window is
//! dropped, and a page with `chunk_len` tokens or fewer yields no chunk at
//! all. This matches the chunk tables already loaded into the vector store;
//! changing the comparison would shift every `chunk_num` of existing data.

use crate::error::IngestError;
use crate::output::{Chunk, PageRecord};
use serde::{Deserialize, Serialize};

/// Default window width in whitespace tokens.
pub const DEFAULT_CHUNK_LEN: usize = 80;

/// Default offset between consecutive window starts on a page.
pub const DEFAULT_STRIDE: usize = 20;

/// Validated chunking parameters.
///
/// Both values are strictly positive. `stride >= chunk_len` is accepted and
/// simply produces non-overlapping (or gapped) chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkWindow {
    chunk_len: usize,
    stride: usize,
}

impl ChunkWindow {
    pub fn new(chunk_len: usize, stride: usize) -> Result<Self, IngestError> {
        if chunk_len == 0 {
            return Err(IngestError::InvalidConfig(
                "chunk length must be ≥ 1 token".into(),
            ));
        }
        if stride == 0 {
            return Err(IngestError::InvalidConfig("stride must be ≥ 1 token".into()));
        }
        Ok(Self { chunk_len, stride })
    }

    pub fn chunk_len(&self) -> usize {
        self.chunk_len
    }

    pub fn stride(&self) -> usize {
        self.stride
    }

    /// Whether consecutive chunks on a page share tokens.
    pub fn overlaps(&self) -> bool {
        self.stride < self.chunk_len
    }
}

impl Default for ChunkWindow {
    fn default() -> Self {
        Self {
            chunk_len: DEFAULT_CHUNK_LEN,
            stride: DEFAULT_STRIDE,
        }
    }
}

/// Split one page's text into window slices, each joined by single spaces.
pub fn chunk_page(text: &str, window: &ChunkWindow) -> Vec<String> {
    let tokens: Vec<&str> = text.split_whitespace().collect();
    let mut chunks = Vec::new();

    let mut start = 0;
    let mut end = window.chunk_len;
    while end < tokens.len() {
        chunks.push(tokens[start..end].join(" "));
        start += window.stride;
        end += window.stride;
    }

    chunks
}

/// Chunk every page of a document, in page order.
///
/// `chunk_index` is the running position across the whole document, so it
/// stays dense even when some pages contribute nothing.
pub fn chunk_document(source_path: &str, pages: &[PageRecord], window: &ChunkWindow) -> Vec<Chunk> {
    let mut chunks = Vec::new();

    for page in pages {
        for text in chunk_page(&page.clean_text, window) {
            chunks.push(Chunk {
                source_path: source_path.to_string(),
                page_number: page.page_number,
                chunk_index: chunks.len(),
                text,
            });
        }
    }

    chunks
}
