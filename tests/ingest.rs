//! Orchestrator tests against in-process doubles.
//!
//! A "PDF" here is a UTF-8 text file whose pages are separated by form feeds.
//! [`TextRasterizer`] writes each page's text as the bytes of
//! `page_{n}.png`, and [`EchoModel`] decodes the image payload back into
//! the text, so every table is fully determined by the source files.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD, Engine as _};
use edgequake_llm::ImageData;
use edgequake_ocr_ingest::pipeline::rasterize::page_image_name;
use edgequake_ocr_ingest::prompts::CONTENT_FILTERED_SENTINEL;
use edgequake_ocr_ingest::table::read_table;
use edgequake_ocr_ingest::{
    ingest_stream, ChunkRow, IngestConfig, IngestError, IngestProgressCallback, Ingestor,
    OcrError, OcrModel, OcrResponse, PacingPolicy, PageRow, Rasterizer, Unpaced,
};
use futures::StreamExt;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tempfile::TempDir;

// ── Doubles ──────────────────────────────────────────────────────────────

/// Splits the source file on `\x0c` and writes one page file per part.
/// A file starting with `CORRUPT` fails on page 2.
struct TextRasterizer;

#[async_trait]
impl Rasterizer for TextRasterizer {
    async fn rasterize(&self, pdf_path: &Path, out_dir: &Path) -> Result<usize, IngestError> {
        let body = std::fs::read_to_string(pdf_path).map_err(|_| IngestError::FileNotFound {
            path: pdf_path.to_path_buf(),
        })?;
        if body.starts_with("CORRUPT") {
            return Err(IngestError::RasterisationFailed {
                path: pdf_path.to_path_buf(),
                page: 2,
                detail: "bad xref".into(),
            });
        }

        let pages: Vec<&str> = body.split('\x0c').collect();
        for (idx, page) in pages.iter().enumerate() {
            std::fs::write(out_dir.join(page_image_name(idx + 1)), page.as_bytes()).unwrap();
        }
        Ok(pages.len())
    }
}

/// Echoes the page text wrapped in result tags. `RATELIMIT` pages are always
/// throttled; `BLOCKED` pages are always filtered.
#[derive(Default)]
struct EchoModel {
    calls: AtomicUsize,
}

#[async_trait]
impl OcrModel for EchoModel {
    async fn recognize(&self, image: ImageData) -> Result<OcrResponse, OcrError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let bytes = STANDARD.decode(&image.data).unwrap();
        let text = String::from_utf8(bytes).unwrap();

        match text.trim() {
            "RATELIMIT" => Err(OcrError::RateLimited("429 Too Many Requests".into())),
            "BLOCKED" => Err(OcrError::ContentFiltered("400 Bad Request".into())),
            _ => Ok(OcrResponse {
                text: format!("<ocr_result>\n{}\n</ocr_result>", text),
                prompt_tokens: 100,
                completion_tokens: 10,
            }),
        }
    }
}

// ── Fixture ──────────────────────────────────────────────────────────────

struct Batch {
    dir: TempDir,
}

impl Batch {
    fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir(dir.path().join("vlrs")).unwrap();
        Self { dir }
    }

    fn source(&self) -> PathBuf {
        self.dir.path().join("vlrs")
    }

    fn output(&self) -> PathBuf {
        self.dir.path().join("ocr-text")
    }

    fn scratch(&self) -> PathBuf {
        self.dir.path().join("temp-images")
    }

    fn add(&self, name: &str, pages: &[&str]) -> PathBuf {
        let path = self.source().join(name);
        std::fs::write(&path, pages.join("\x0c")).unwrap();
        path
    }

    fn config(&self) -> edgequake_ocr_ingest::IngestConfigBuilder {
        IngestConfig::builder()
            .source_dir(self.source())
            .output_dir(self.output())
            .scratch_dir(self.scratch())
            .chunk_len(4)
            .stride(2)
            .pacing(PacingPolicy::None)
            .rate_limit_cooldown_secs(0)
    }

    fn ingestor(&self, config: IngestConfig) -> (Ingestor, Arc<EchoModel>) {
        let model = Arc::new(EchoModel::default());
        let ingestor = Ingestor::from_parts(
            config,
            Arc::new(TextRasterizer),
            model.clone(),
            Arc::new(Unpaced),
        );
        (ingestor, model)
    }

    fn rows(&self, table: &str) -> Vec<ChunkRow> {
        read_table(&self.output().join(table)).unwrap()
    }
}

/// `n` distinct tokens tagged with `tag`.
fn words(tag: &str, n: usize) -> String {
    (0..n)
        .map(|i| format!("{tag}{i}"))
        .collect::<Vec<_>>()
        .join(" ")
}

// ── Tests ────────────────────────────────────────────────────────────────

#[tokio::test]
async fn failing_document_is_skipped_and_the_rest_still_written() {
    let batch = Batch::new();
    batch.add("alpha.pdf", &[&words("a", 7)]);
    let broken = batch.add("broken.pdf", &["CORRUPT"]);
    batch.add("omega.pdf", &[&words("o", 7)]);

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    let report = ingestor.ingest_all().await.unwrap();

    assert_eq!(report.succeeded.len(), 2);
    assert_eq!(report.failed.len(), 1);
    assert_eq!(report.failed[0].source_path, broken);
    assert_eq!(report.failed[0].page, Some(2));
    assert!(report.failed[0].error.contains("bad xref"));

    assert!(batch.output().join("OCR_alpha.csv").exists());
    assert!(batch.output().join("OCR_omega.csv").exists());
    assert!(!batch.output().join("OCR_broken.csv").exists());
}

#[tokio::test]
async fn chunk_table_rows_are_well_formed() {
    let batch = Batch::new();
    let src = batch.add("report.pdf", &[&words("x", 9), &words("y", 3), &words("z", 6)]);

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    ingestor.ingest_all().await.unwrap();

    let raw = std::fs::read_to_string(batch.output().join("OCR_report.csv")).unwrap();
    assert_eq!(raw.lines().next(), Some("file_path,text,page,chunk_num"));

    let rows = batch.rows("OCR_report.csv");
    // 9 tokens → starts 0, 2, 4; 3 tokens → none; 6 tokens → start 0 only.
    assert_eq!(rows.len(), 4);
    for (i, row) in rows.iter().enumerate() {
        assert_eq!(row.chunk_num, i);
        assert!(row.page >= 1);
        assert!(!row.text.is_empty());
        assert_eq!(row.file_path, src.to_string_lossy());
        assert_eq!(row.text.split(' ').count(), 4);
    }
    assert_eq!(rows[0].text, "x0 x1 x2 x3");
    assert_eq!(rows[2].text, "x4 x5 x6 x7");
    assert_eq!(rows[3].page, 3);
    assert_eq!(rows[3].text, "z0 z1 z2 z3");
}

#[tokio::test]
async fn rerun_produces_byte_identical_tables() {
    let batch = Batch::new();
    batch.add("report.pdf", &[&words("p", 11), &words("q", 8)]);

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    ingestor.ingest_all().await.unwrap();
    let first = std::fs::read(batch.output().join("OCR_report.csv")).unwrap();

    ingestor.ingest_all().await.unwrap();
    let second = std::fs::read(batch.output().join("OCR_report.csv")).unwrap();

    assert_eq!(first, second);
}

#[tokio::test]
async fn pages_follow_numeric_order() {
    let batch = Batch::new();
    let pages: Vec<String> = (1..=12).map(|n| words(&format!("p{n}_"), 5)).collect();
    let refs: Vec<&str> = pages.iter().map(String::as_str).collect();
    batch.add("long.pdf", &refs);

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    ingestor.ingest_all().await.unwrap();

    let rows = batch.rows("OCR_long.csv");
    let order: Vec<usize> = rows.iter().map(|r| r.page).collect();
    assert_eq!(order, (1..=12).collect::<Vec<_>>());
    assert!(rows[9].text.starts_with("p10_"));
    assert!(rows[1].text.starts_with("p2_"));
}

#[tokio::test]
async fn content_filtered_page_gets_the_sentinel() {
    let batch = Batch::new();
    let src = batch.add("mixed.pdf", &[&words("a", 5), "BLOCKED", &words("c", 5)]);

    let (ingestor, model) = batch.ingestor(batch.config().build().unwrap());
    let out = ingestor.ingest_document(&src).await.unwrap();

    assert_eq!(out.pages.len(), 3);
    assert!(out.pages[1].blocked);
    assert_eq!(out.pages[1].clean_text, CONTENT_FILTERED_SENTINEL);
    assert_eq!(out.stats.blocked_pages, 1);
    // no retry for a filtered page
    assert_eq!(model.calls.load(Ordering::SeqCst), 3);

    // the sentinel has 6 tokens, so it chunks like any other text
    let page2: Vec<_> = out.chunks.iter().filter(|c| c.page_number == 2).collect();
    assert_eq!(page2.len(), 1);
    assert_eq!(page2[0].text, "<OUTPUT BLOCKED BY CONTENT");
}

#[tokio::test]
async fn double_rate_limit_fails_only_that_document() {
    let batch = Batch::new();
    let throttled = batch.add("throttled.pdf", &[&words("a", 5), "RATELIMIT"]);
    batch.add("fine.pdf", &[&words("f", 5)]);

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    let report = ingestor.ingest_all().await.unwrap();

    assert_eq!(report.succeeded.len(), 1);
    assert_eq!(report.failed.len(), 1);
    let failure = &report.failed[0];
    assert_eq!(failure.source_path, throttled);
    assert_eq!(failure.page, Some(2));
    assert!(failure.error.contains("rate limited"));
    assert!(!batch.output().join("OCR_throttled.csv").exists());
}

#[tokio::test]
async fn stats_count_pages_chunks_and_tokens() {
    let batch = Batch::new();
    let src = batch.add("stats.pdf", &[&words("a", 7), &words("b", 2)]);

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    let out = ingestor.ingest_document(&src).await.unwrap();

    assert_eq!(out.stats.pages, 2);
    assert_eq!(out.stats.chunks, 2);
    assert_eq!(out.stats.prompt_tokens, 200);
    assert_eq!(out.stats.completion_tokens, 20);
    assert_eq!(out.stats.retried_pages, 0);
    assert_eq!(out.pages[0].image_identifier, "page_1.png");
    assert_eq!(out.table_path, batch.output().join("OCR_stats.csv"));
    assert!(out.page_table_path.is_none());
}

#[tokio::test]
async fn page_tables_hold_full_page_text() {
    let batch = Batch::new();
    let src = batch.add("pages.pdf", &["first page", "second page"]);

    let config = batch.config().write_page_tables(true).build().unwrap();
    let (ingestor, _) = batch.ingestor(config);
    let out = ingestor.ingest_document(&src).await.unwrap();

    let path = out.page_table_path.unwrap();
    assert_eq!(path, batch.output().join("PAGES_pages.csv"));
    let rows: Vec<PageRow> = read_table(&path).unwrap();
    assert_eq!(rows.len(), 2);
    assert_eq!(rows[1].text, "second page");
    assert_eq!(rows[1].page_number, 2);

    // too short to chunk, but the chunk table still exists with its header
    assert!(out.chunks.is_empty());
    assert!(out.table_path.exists());
}

#[tokio::test]
async fn scratch_is_removed_unless_kept() {
    let batch = Batch::new();
    batch.add("doc.pdf", &[&words("a", 5)]);

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    ingestor.ingest_all().await.unwrap();
    assert!(!batch.scratch().exists());

    let config = batch.config().cleanup_scratch(false).build().unwrap();
    let (ingestor, _) = batch.ingestor(config);
    ingestor.ingest_all().await.unwrap();
    assert!(batch.scratch().join("page_1.png").exists());
}

#[tokio::test]
async fn stale_pages_from_a_longer_document_are_not_reused() {
    let batch = Batch::new();
    let long = batch.add("long.pdf", &[&words("l", 5), &words("m", 5), &words("n", 5)]);
    let short = batch.add("short.pdf", &[&words("s", 5)]);

    let config = batch.config().cleanup_scratch(false).build().unwrap();
    let (ingestor, _) = batch.ingestor(config);
    ingestor.ingest_document(&long).await.unwrap();
    let out = ingestor.ingest_document(&short).await.unwrap();

    assert_eq!(out.pages.len(), 1);
    assert!(out.chunks.iter().all(|c| c.text.starts_with('s')));
}

#[tokio::test]
async fn directories_in_the_source_are_skipped() {
    let batch = Batch::new();
    batch.add("doc.pdf", &[&words("a", 5)]);
    std::fs::create_dir(batch.source().join("archive")).unwrap();

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    let report = ingestor.ingest_all().await.unwrap();

    assert_eq!(report.total_documents(), 1);
    assert!(report.failed.is_empty());
}

#[tokio::test]
async fn missing_source_dir_stops_the_batch() {
    let batch = Batch::new();
    let config = batch
        .config()
        .source_dir(batch.dir.path().join("nope"))
        .build()
        .unwrap();
    let (ingestor, _) = batch.ingestor(config);

    let err = ingestor.ingest_all().await.unwrap_err();
    assert!(matches!(err, IngestError::SourceDirUnreadable { .. }));
}

#[tokio::test]
async fn stream_yields_one_result_per_document() {
    let batch = Batch::new();
    batch.add("one.pdf", &[&words("a", 5)]);
    batch.add("two.pdf", &["CORRUPT"]);

    let (ingestor, _) = batch.ingestor(batch.config().build().unwrap());
    let results: Vec<_> = ingest_stream(&ingestor).unwrap().collect().await;

    assert_eq!(results.len(), 2);
    let ok = results.iter().filter(|r| r.outcome.is_ok()).count();
    assert_eq!(ok, 1);
}

#[derive(Default)]
struct Recorder {
    documents: AtomicUsize,
    pages: AtomicUsize,
    blocked: AtomicUsize,
    errors: AtomicUsize,
    batches: AtomicUsize,
}

impl IngestProgressCallback for Recorder {
    fn on_document_complete(&self, _: &Path, _: usize) {
        self.documents.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_complete(&self, _: &Path, _: usize, _: usize, _: usize) {
        self.pages.fetch_add(1, Ordering::SeqCst);
    }

    fn on_page_blocked(&self, _: &Path, _: usize, _: usize) {
        self.blocked.fetch_add(1, Ordering::SeqCst);
    }

    fn on_document_error(&self, _: &Path, _: &str) {
        self.errors.fetch_add(1, Ordering::SeqCst);
    }

    fn on_batch_complete(&self, succeeded: usize, failed: usize) {
        assert_eq!((succeeded, failed), (1, 1));
        self.batches.fetch_add(1, Ordering::SeqCst);
    }
}

#[tokio::test]
async fn progress_callback_sees_every_event() {
    let batch = Batch::new();
    batch.add("good.pdf", &[&words("a", 5), "BLOCKED"]);
    batch.add("bad.pdf", &["CORRUPT"]);

    let recorder = Arc::new(Recorder::default());
    let config = batch
        .config()
        .progress_callback(recorder.clone())
        .build()
        .unwrap();
    let (ingestor, _) = batch.ingestor(config);
    ingestor.ingest_all().await.unwrap();

    assert_eq!(recorder.documents.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.pages.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.blocked.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.errors.load(Ordering::SeqCst), 1);
    assert_eq!(recorder.batches.load(Ordering::SeqCst), 1);
}
