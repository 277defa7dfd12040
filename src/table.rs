//! Per-document output tables.
//!
//! Tables are plain UTF-8 CSV with a header row and no index column. Column
//! order is fixed by the row structs below and must not change: the loader
//! downstream joins embeddings back onto chunk rows by `(file_path, chunk_num)`.
//!
//! Writes are atomic: the whole table is encoded in memory, written to a
//! `.tmp` sibling, and renamed over the destination, so a killed process
//! never leaves a half-written table behind and a rerun simply replaces it.

use crate::error::IngestError;
use crate::output::{Chunk, PageRecord};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::info;

/// Header of the chunk table.
pub const CHUNK_COLUMNS: [&str; 4] = ["file_path", "text", "page", "chunk_num"];

/// Header of the full-page text table.
pub const PAGE_COLUMNS: [&str; 3] = ["text", "page_number", "file_name"];

/// One row of the chunk table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkRow {
    pub file_path: String,
    pub text: String,
    pub page: usize,
    pub chunk_num: usize,
}

impl From<&Chunk> for ChunkRow {
    fn from(chunk: &Chunk) -> Self {
        Self {
            file_path: chunk.source_path.clone(),
            text: chunk.text.clone(),
            page: chunk.page_number,
            chunk_num: chunk.chunk_index,
        }
    }
}

/// One row of the full-page text table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageRow {
    pub text: String,
    pub page_number: usize,
    pub file_name: String,
}

impl PageRow {
    pub fn new(page: &PageRecord, file_name: &str) -> Self {
        Self {
            text: page.clean_text.clone(),
            page_number: page.page_number,
            file_name: file_name.to_string(),
        }
    }
}

/// Source file name without directory or extension.
pub fn table_stem(source: &Path) -> String {
    source
        .file_stem()
        .or_else(|| source.file_name())
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "document".to_string())
}

/// `OCR_{stem}.csv`
pub fn chunk_table_name(source: &Path) -> String {
    format!("OCR_{}.csv", table_stem(source))
}

/// `PAGES_{stem}.csv`
pub fn page_table_name(source: &Path) -> String {
    format!("PAGES_{}.csv", table_stem(source))
}

/// Encode `rows` as CSV under an explicit header.
///
/// The header is written even when `rows` is empty, so a document whose
/// pages were all too short still gets a well-formed table.
pub fn encode_table<R: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: &[R],
) -> Result<Vec<u8>, IngestError> {
    let encode_err = |e: csv::Error| IngestError::TableEncodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    let mut wtr = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(Vec::new());
    wtr.write_record(columns).map_err(encode_err)?;
    for row in rows {
        wtr.serialize(row).map_err(encode_err)?;
    }

    wtr.into_inner().map_err(|e| IngestError::TableEncodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    })
}

/// Encode and atomically write a table to `path`.
pub async fn write_table<R: Serialize>(
    path: &Path,
    columns: &[&str],
    rows: &[R],
) -> Result<(), IngestError> {
    let bytes = encode_table(path, columns, rows)?;

    let write_err = |e| IngestError::OutputWriteFailed {
        path: path.to_path_buf(),
        source: e,
    };

    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await.map_err(write_err)?;
    }

    let tmp_path = path.with_extension("csv.tmp");
    tokio::fs::write(&tmp_path, &bytes).await.map_err(write_err)?;
    tokio::fs::rename(&tmp_path, path).await.map_err(write_err)?;

    info!("Wrote {} rows to {}", rows.len(), path.display());
    Ok(())
}

/// Write a document's chunk table into `output_dir`; returns its path.
pub async fn write_chunk_table(
    output_dir: &Path,
    source: &Path,
    chunks: &[Chunk],
) -> Result<PathBuf, IngestError> {
    let path = output_dir.join(chunk_table_name(source));
    let rows: Vec<ChunkRow> = chunks.iter().map(ChunkRow::from).collect();
    write_table(&path, &CHUNK_COLUMNS, &rows).await?;
    Ok(path)
}

/// Write a document's full-page text table into `output_dir`; returns its path.
pub async fn write_page_table(
    output_dir: &Path,
    source: &Path,
    pages: &[PageRecord],
) -> Result<PathBuf, IngestError> {
    let path = output_dir.join(page_table_name(source));
    let file_name = source.to_string_lossy();
    let rows: Vec<PageRow> = pages.iter().map(|p| PageRow::new(p, &file_name)).collect();
    write_table(&path, &PAGE_COLUMNS, &rows).await?;
    Ok(path)
}

/// Read a table back into typed rows.
pub fn read_table<R: DeserializeOwned>(path: &Path) -> Result<Vec<R>, IngestError> {
    let decode_err = |e: csv::Error| IngestError::TableEncodeFailed {
        path: path.to_path_buf(),
        detail: e.to_string(),
    };

    let mut rdr = csv::Reader::from_path(path).map_err(decode_err)?;
    rdr.deserialize().map(|r| r.map_err(decode_err)).collect()
}
