//! PDF rasterisation into the shared scratch directory.
//!
//! ## Scratch directory discipline
//!
//! All documents of a batch render into one [`ScratchDir`]. Its use is
//! exclusive and non-overlapping per document: [`rasterize_into`] clears
//! every file out of it *before* handing it to a [`Rasterizer`], so the page
//! images listed afterwards are exactly the current document's. A document
//! that fails half-way leaves stale pages behind, and the next call clears
//! them before anything else happens.
//!
//! ## Why spawn_blocking?
//!
//! `pdfium-render` wraps the pdfium C++ library, which uses thread-local
//! state and is not safe to call from async contexts. The whole render of a
//! document runs on a blocking-pool thread instead of stalling the runtime.

use crate::config::IngestConfig;
use crate::error::IngestError;
use crate::pipeline::source::validate_pdf;
use async_trait::async_trait;
use image::ImageFormat;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// File name of the rendered image for a 1-based page number.
pub fn page_image_name(page_num: usize) -> String {
    format!("page_{}.png", page_num)
}

/// The directory page images are rendered into.
#[derive(Debug, Clone)]
pub struct ScratchDir {
    path: PathBuf,
}

impl ScratchDir {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn err(&self, source: std::io::Error) -> IngestError {
        IngestError::ScratchDir {
            path: self.path.clone(),
            source,
        }
    }

    /// Create the directory if needed and delete every file and symlink in
    /// it. Sub-directories are left alone. Returns the number removed.
    pub fn clear(&self) -> Result<usize, IngestError> {
        std::fs::create_dir_all(&self.path).map_err(|e| self.err(e))?;

        let mut removed = 0;
        for entry in std::fs::read_dir(&self.path).map_err(|e| self.err(e))? {
            let entry = entry.map_err(|e| self.err(e))?;
            let file_type = entry.file_type().map_err(|e| self.err(e))?;
            if file_type.is_file() || file_type.is_symlink() {
                std::fs::remove_file(entry.path()).map_err(|e| self.err(e))?;
                removed += 1;
            }
        }

        if removed > 0 {
            debug!("Cleared {} stale files from {}", removed, self.path.display());
        }
        Ok(removed)
    }

    /// Clear the directory and remove it. A missing directory is not an error.
    pub fn remove(&self) -> Result<(), IngestError> {
        if !self.path.exists() {
            return Ok(());
        }
        self.clear()?;
        std::fs::remove_dir(&self.path).map_err(|e| self.err(e))
    }
}

/// Renders every page of a document as an image file.
///
/// Implementations write one file per page into `out_dir`, named so the page
/// number is recoverable ([`page_image_name`]), and return the page count.
/// `out_dir` is guaranteed to exist and be empty of files on entry.
#[async_trait]
pub trait Rasterizer: Send + Sync {
    async fn rasterize(&self, pdf_path: &Path, out_dir: &Path) -> Result<usize, IngestError>;
}

/// Clear `scratch`, then rasterise `pdf_path` into it.
pub async fn rasterize_into(
    rasterizer: &dyn Rasterizer,
    pdf_path: &Path,
    scratch: &ScratchDir,
) -> Result<usize, IngestError> {
    scratch.clear()?;
    rasterizer.rasterize(pdf_path, scratch.path()).await
}

/// [`Rasterizer`] backed by pdfium.
#[derive(Debug, Clone)]
pub struct PdfiumRasterizer {
    /// Longest edge of a rendered page, in pixels.
    pub max_rendered_pixels: u32,
    pub password: Option<String>,
    /// Explicit libpdfium to load; system library when `None`.
    pub library_path: Option<PathBuf>,
}

impl PdfiumRasterizer {
    pub fn from_config(config: &IngestConfig) -> Self {
        Self {
            max_rendered_pixels: config.max_rendered_pixels,
            password: config.password.clone(),
            library_path: config.pdfium_library_path.clone(),
        }
    }
}

#[async_trait]
impl Rasterizer for PdfiumRasterizer {
    async fn rasterize(&self, pdf_path: &Path, out_dir: &Path) -> Result<usize, IngestError> {
        validate_pdf(pdf_path)?;

        let path = pdf_path.to_path_buf();
        let out = out_dir.to_path_buf();
        let this = self.clone();

        tokio::task::spawn_blocking(move || this.render_blocking(&path, &out))
            .await
            .map_err(|e| IngestError::Internal(format!("Render task panicked: {}", e)))?
    }
}

impl PdfiumRasterizer {
    fn render_blocking(&self, pdf_path: &Path, out_dir: &Path) -> Result<usize, IngestError> {
        let pdfium = bind_pdfium(self.library_path.as_deref())?;
        let password = self.password.as_deref();

        let document = pdfium.load_pdf_from_file(pdf_path, password).map_err(|e| {
            let err_str = format!("{:?}", e);
            if err_str.contains("Password") || err_str.contains("password") {
                if password.is_some() {
                    IngestError::WrongPassword {
                        path: pdf_path.to_path_buf(),
                    }
                } else {
                    IngestError::PasswordRequired {
                        path: pdf_path.to_path_buf(),
                    }
                }
            } else {
                IngestError::CorruptPdf {
                    path: pdf_path.to_path_buf(),
                    detail: err_str,
                }
            }
        })?;

        let pages = document.pages();
        let total_pages = pages.len() as usize;
        info!("PDF loaded: {} pages", total_pages);

        let render_config = PdfRenderConfig::new()
            .set_target_width(self.max_rendered_pixels as i32)
            .set_maximum_height(self.max_rendered_pixels as i32);

        for (idx, page) in pages.iter().enumerate() {
            let page_num = idx + 1;
            let failed = |detail: String| IngestError::RasterisationFailed {
                path: pdf_path.to_path_buf(),
                page: page_num,
                detail,
            };

            let bitmap = page
                .render_with_config(&render_config)
                .map_err(|e| failed(format!("{:?}", e)))?;
            let image = bitmap.as_image();

            let file = out_dir.join(page_image_name(page_num));
            image
                .save_with_format(&file, ImageFormat::Png)
                .map_err(|e| failed(format!("saving {}: {}", file.display(), e)))?;

            debug!(
                "Saved {} ({}x{} px)",
                file.display(),
                image.width(),
                image.height()
            );
        }

        Ok(total_pages)
    }
}

/// Load libpdfium from `library_path`, or from the system search path.
fn bind_pdfium(library_path: Option<&Path>) -> Result<Pdfium, IngestError> {
    let bindings = match library_path {
        Some(path) => Pdfium::bind_to_library(path),
        None => Pdfium::bind_to_system_library(),
    }
    .map_err(|e| IngestError::PdfiumBindingFailed(format!("{:?}", e)))?;

    Ok(Pdfium::new(bindings))
}
