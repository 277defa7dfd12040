//! Streaming batch API: emit one result per document as it completes.
//!
//! ## Why stream?
//!
//! A batch of scanned reports takes hours. [`ingest_stream`] lets callers
//! react to each document the moment its table is written (index it, upload
//! it, update a dashboard) instead of waiting for
//! [`crate::ingest::Ingestor::ingest_all`] to return.
//!
//! The stream is lazy: the source directory is read one entry at a time, and
//! nothing is rasterised until the next item is polled. Dropping the stream
//! stops the batch after the current document.

use crate::error::IngestError;
use crate::ingest::Ingestor;
use crate::output::DocumentOutput;
use futures::stream;
use std::path::PathBuf;
use std::pin::Pin;
use tokio_stream::Stream;
use tracing::error;

/// Outcome of one document of the batch.
#[derive(Debug)]
pub struct DocumentResult {
    pub source_path: PathBuf,
    pub outcome: Result<DocumentOutput, IngestError>,
}

/// A boxed stream of per-document results, in directory order.
pub type DocumentStream<'a> = Pin<Box<dyn Stream<Item = DocumentResult> + Send + 'a>>;

/// Ingest the source directory, yielding each document's result.
///
/// Failed documents are logged with their path and page and reported through
/// the progress callback before being yielded, so a caller that only counts
/// successes still leaves a trace of every failure.
///
/// # Errors
/// Returns `Err(IngestError::SourceDirUnreadable)` when the source directory
/// cannot be listed.
///
/// # Example
/// ```rust,no_run
/// use edgequake_ocr_ingest::{ingest_stream, IngestConfig, Ingestor};
/// use futures::StreamExt;
///
/// # #[tokio::main]
/// # async fn main() -> Result<(), Box<dyn std::error::Error>> {
/// let ingestor = Ingestor::new(IngestConfig::default())?;
/// let mut results = ingest_stream(&ingestor)?;
/// while let Some(doc) = results.next().await {
///     match doc.outcome {
///         Ok(out) => println!("{} -> {}", doc.source_path.display(), out.table_path.display()),
///         Err(e) => eprintln!("skipped {}: {e}", doc.source_path.display()),
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub fn ingest_stream(ingestor: &Ingestor) -> Result<DocumentStream<'_>, IngestError> {
    let documents = ingestor.source().documents()?;

    let s = stream::unfold((ingestor, documents), |(ingestor, mut documents)| async move {
        let source_path = documents.next()?;
        let outcome = ingestor.ingest_document(&source_path).await;

        if let Err(ref e) = outcome {
            match e.page() {
                Some(page) => error!(
                    "Skipping {} (page {}): {}",
                    source_path.display(),
                    page,
                    e
                ),
                None => error!("Skipping {}: {}", source_path.display(), e),
            }
            if let Some(ref cb) = ingestor.config().progress_callback {
                cb.on_document_error(&source_path, &e.to_string());
            }
        }

        Some((
            DocumentResult {
                source_path,
                outcome,
            },
            (ingestor, documents),
        ))
    });

    Ok(Box::pin(s))
}
