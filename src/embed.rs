//! Embedding of chunk tables.
//!
//! The embedding service itself is a collaborator: anything that turns a
//! passage into a fixed-length `f32` vector implements [`Embedder`]. This
//! module only walks a chunk table in order and lays the vectors out in an
//! `EMBED_OCR_*.csv` table that joins back onto the chunk table by
//! `(file_name, chunk_num)`.

use crate::error::IngestError;
use crate::table::{write_table, ChunkRow};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Header of the embedding table.
pub const EMBEDDING_COLUMNS: [&str; 4] = ["chunk_num", "embedding", "embedding_model", "file_name"];

/// Turns text into a vector of fixed dimensionality.
#[async_trait]
pub trait Embedder: Send + Sync {
    /// Identifier stored next to every vector, e.g. `text-embedding-3-small`.
    fn model(&self) -> &str;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, String>;
}

/// One row of the embedding table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingRow {
    pub chunk_num: usize,
    /// JSON array of the vector components.
    pub embedding: String,
    pub embedding_model: String,
    /// Name of the chunk table the row belongs to.
    pub file_name: String,
}

impl EmbeddingRow {
    /// Parse the stored vector back.
    pub fn vector(&self) -> Result<Vec<f32>, serde_json::Error> {
        serde_json::from_str(&self.embedding)
    }
}

/// Embed every row of a chunk table, in order.
///
/// Fails on the first chunk the embedder rejects, or when the embedder
/// changes dimensionality mid-table.
pub async fn embed_chunks(
    embedder: &dyn Embedder,
    table_name: &str,
    rows: &[ChunkRow],
) -> Result<Vec<EmbeddingRow>, IngestError> {
    let mut out = Vec::with_capacity(rows.len());
    let mut dimension: Option<usize> = None;

    for row in rows {
        debug!("Embedding chunk {} of {}", row.chunk_num, table_name);
        let vector = embedder
            .embed(&row.text)
            .await
            .map_err(|detail| IngestError::EmbeddingFailed {
                chunk_num: row.chunk_num,
                detail,
            })?;

        match dimension {
            None => dimension = Some(vector.len()),
            Some(d) if d != vector.len() => {
                return Err(IngestError::EmbeddingFailed {
                    chunk_num: row.chunk_num,
                    detail: format!("dimension changed from {} to {}", d, vector.len()),
                });
            }
            Some(_) => {}
        }

        let embedding = serde_json::to_string(&vector).map_err(|e| IngestError::EmbeddingFailed {
            chunk_num: row.chunk_num,
            detail: e.to_string(),
        })?;

        out.push(EmbeddingRow {
            chunk_num: row.chunk_num,
            embedding,
            embedding_model: embedder.model().to_string(),
            file_name: table_name.to_string(),
        });
    }

    Ok(out)
}

/// `EMBED_{table_name}`
pub fn embedding_table_name(table_name: &str) -> String {
    format!("EMBED_{}", table_name)
}

/// Read a chunk table, embed it, and write the embedding table into
/// `output_dir`. Returns the written path.
pub async fn embed_chunk_table(
    embedder: &dyn Embedder,
    chunk_table: &Path,
    output_dir: &Path,
) -> Result<PathBuf, IngestError> {
    let table_name = chunk_table
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();

    let rows: Vec<ChunkRow> = crate::table::read_table(chunk_table)?;
    info!("Embedding {} chunks from {}", rows.len(), chunk_table.display());

    let embedded = embed_chunks(embedder, &table_name, &rows).await?;
    write_embedding_table(output_dir, &table_name, &embedded).await
}

/// Write `EMBED_{table_name}` into `output_dir`; returns its path.
pub async fn write_embedding_table(
    output_dir: &Path,
    table_name: &str,
    rows: &[EmbeddingRow],
) -> Result<PathBuf, IngestError> {
    let path = output_dir.join(embedding_table_name(table_name));
    write_table(&path, &EMBEDDING_COLUMNS, rows).await?;
    Ok(path)
}
