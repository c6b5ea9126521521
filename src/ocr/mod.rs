//! Text extraction from uploaded receipt images and PDFs.

mod pdf;
mod tesseract;

use std::sync::Arc;
use std::time::Instant;

use bytes::Bytes;
use image::DynamicImage;
use thiserror::Error;
use tracing::{debug, info};

use crate::blocking::{BlockingError, BlockingPool};
use crate::config::OcrConfig;

pub use pdf::Pdftoppm;
pub use tesseract::TesseractCli;

#[derive(Error, Debug)]
pub enum OcrError {
    #[error("invalid image: {0}")]
    InvalidImage(#[from] image::ImageError),

    #[error("failed to render PDF: {0}")]
    Render(String),

    #[error("PDF has no pages")]
    NoPages,

    #[error("text recognition failed: {0}")]
    Recognition(String),

    #[error(transparent)]
    Pool(#[from] BlockingError),
}

/// Blocking OCR engine: one image in, plain text out.
pub trait TextRecognizer: Send + Sync {
    fn recognize(&self, image: &DynamicImage) -> Result<String, OcrError>;
}

/// Blocking PDF rasteriser: returns one image per page, in page order.
pub trait PageRenderer: Send + Sync {
    fn render(&self, pdf: &[u8]) -> Result<Vec<DynamicImage>, OcrError>;
}

#[derive(Clone)]
pub struct OcrService {
    recognizer: Arc<dyn TextRecognizer>,
    renderer: Arc<dyn PageRenderer>,
    pool: BlockingPool,
}

impl OcrService {
    pub fn new(
        recognizer: Arc<dyn TextRecognizer>,
        renderer: Arc<dyn PageRenderer>,
        pool: BlockingPool,
    ) -> Self {
        Self {
            recognizer,
            renderer,
            pool,
        }
    }

    /// Tesseract for recognition, poppler's `pdftoppm` for rendering.
    pub fn from_config(config: &OcrConfig, pool: BlockingPool) -> Self {
        Self::new(
            Arc::new(TesseractCli::new(&config.tesseract_cmd, &config.lang)),
            Arc::new(Pdftoppm::new(&config.pdftoppm_cmd, config.pdf_dpi)),
            pool,
        )
    }

    pub async fn extract_from_image(&self, bytes: Bytes) -> Result<String, OcrError> {
        let start = Instant::now();
        let recognizer = self.recognizer.clone();
        let text = self
            .pool
            .run(move || {
                let image = image::load_from_memory(&bytes)?;
                recognizer.recognize(&image)
            })
            .await??;
        info!(
            chars = text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "image ocr complete"
        );
        Ok(text)
    }

    /// OCR every page in order; each page's text is followed by a newline.
    /// Any failing page fails the whole document.
    pub async fn extract_from_pdf(&self, bytes: Bytes) -> Result<String, OcrError> {
        let start = Instant::now();
        let renderer = self.renderer.clone();
        let pages = self.pool.run(move || renderer.render(&bytes)).await??;
        if pages.is_empty() {
            return Err(OcrError::NoPages);
        }
        debug!(pages = pages.len(), "pdf rendered");

        let mut full_text = String::new();
        for (idx, page) in pages.into_iter().enumerate() {
            let recognizer = self.recognizer.clone();
            let text = self.pool.run(move || recognizer.recognize(&page)).await??;
            debug!(page = idx + 1, chars = text.len(), "page ocr complete");
            full_text.push_str(&text);
            full_text.push('\n');
        }

        info!(
            chars = full_text.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "pdf ocr complete"
        );
        Ok(full_text)
    }
}

/// Whether an upload should go through the PDF path.
pub fn is_pdf(filename: &str, content_type: Option<&str>) -> bool {
    filename.to_ascii_lowercase().ends_with(".pdf")
        || content_type.is_some_and(|ct| ct.eq_ignore_ascii_case("application/pdf"))
}
