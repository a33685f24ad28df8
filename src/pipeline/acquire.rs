//! Stage 1: text acquisition.
//!
//! Images go straight to OCR. PDFs are read page by page from their text
//! layer; only the pages whose layer is blank are rasterised into a scoped
//! temp directory and OCR'd. Failures of the external engines never escape
//! this stage: they are logged and the affected page (or document) comes
//! back as empty text, which later stages turn into zero candidates.

use crate::config::IngestConfig;
use crate::document::{DocumentKind, UploadedDocument};
use crate::pipeline::ocr::OcrEngine;
use crate::pipeline::pdf::PdfBackend;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, warn};

/// Separator placed between pages in [`AcquiredText::raw_text`].
pub const PAGE_SEPARATOR: char = '\u{000C}';

/// Output of text acquisition for one document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AcquiredText {
    /// Full document text; PDF pages are joined with a form feed.
    pub raw_text: String,
    /// Overall reliability in `[0, 1]`: the minimum over pages that yielded
    /// text, or `0.0` when nothing was read.
    pub confidence: f64,
    /// One block per physical page, when the document was read page by page.
    pub page_blocks: Option<Vec<String>>,
}

impl AcquiredText {
    fn empty() -> Self {
        Self::default()
    }

    /// Whether no usable text was acquired.
    pub fn is_blank(&self) -> bool {
        self.raw_text.trim().is_empty()
    }
}

/// Runs stage 1 against an OCR engine and a PDF backend.
#[derive(Clone)]
pub struct TextAcquirer {
    ocr: Arc<dyn OcrEngine>,
    pdf: Arc<dyn PdfBackend>,
    pdf_text_confidence: f64,
    default_ocr_confidence: f64,
    max_rendered_pixels: u32,
    temp_dir: Option<PathBuf>,
}

impl TextAcquirer {
    pub fn new(ocr: Arc<dyn OcrEngine>, pdf: Arc<dyn PdfBackend>, config: &IngestConfig) -> Self {
        Self {
            ocr,
            pdf,
            pdf_text_confidence: config.pdf_text_confidence,
            default_ocr_confidence: config.default_ocr_confidence,
            max_rendered_pixels: config.max_rendered_pixels,
            temp_dir: config.temp_dir.clone(),
        }
    }

    /// Acquire the text of `doc`. Never fails; see the module docs.
    pub async fn acquire(&self, doc: &UploadedDocument) -> AcquiredText {
        let acquired = match doc.kind() {
            DocumentKind::Image => self.acquire_image(doc.path()).await,
            DocumentKind::Pdf => self.acquire_pdf(doc.path()).await,
        };
        info!(
            "Acquired {} chars from '{}' ({:?}, confidence {:.2})",
            acquired.raw_text.trim().len(),
            doc.original_name(),
            doc.kind(),
            acquired.confidence
        );
        debug!("Raw text of '{}':\n{}", doc.original_name(), acquired.raw_text);
        acquired
    }

    async fn acquire_image(&self, path: &Path) -> AcquiredText {
        match self.ocr.recognize(path).await {
            Ok(out) if !out.text.trim().is_empty() => AcquiredText {
                confidence: out.confidence.unwrap_or(self.default_ocr_confidence),
                raw_text: out.text,
                page_blocks: None,
            },
            Ok(_) => AcquiredText::empty(),
            Err(e) => {
                warn!("OCR failed for {}: {}", path.display(), e);
                AcquiredText::empty()
            }
        }
    }

    async fn acquire_pdf(&self, path: &Path) -> AcquiredText {
        let backend = Arc::clone(&self.pdf);
        let pdf_path = path.to_path_buf();
        let layer = match tokio::task::spawn_blocking(move || backend.page_texts(&pdf_path)).await
        {
            Ok(Ok(pages)) => pages,
            Ok(Err(e)) => {
                warn!("Cannot read PDF {}: {}", path.display(), e);
                return AcquiredText::empty();
            }
            Err(e) => {
                warn!("PDF text task panicked: {}", e);
                return AcquiredText::empty();
            }
        };

        let mut pages: Vec<String> = Vec::with_capacity(layer.len());
        let mut confidences: Vec<f64> = Vec::new();
        let mut scratch: Option<TempDir> = None;
        let mut scratch_failed = false;

        for (idx, text) in layer.into_iter().enumerate() {
            if !text.trim().is_empty() {
                confidences.push(self.pdf_text_confidence);
                pages.push(text);
                continue;
            }

            debug!("PDF page {} has no text layer; falling back to OCR", idx + 1);
            if scratch.is_none() && !scratch_failed {
                match self.scratch_dir() {
                    Ok(dir) => scratch = Some(dir),
                    Err(e) => {
                        warn!("Cannot create scratch directory for page images: {}", e);
                        scratch_failed = true;
                    }
                }
            }
            let Some(dir) = scratch.as_ref() else {
                pages.push(String::new());
                continue;
            };

            match self.ocr_page(path, idx, dir.path()).await {
                Some((text, confidence)) => {
                    confidences.push(confidence);
                    pages.push(text);
                }
                None => pages.push(String::new()),
            }
        }

        if let Some(dir) = scratch {
            let location = dir.path().to_path_buf();
            if let Err(e) = dir.close() {
                warn!("Failed to remove page images in {}: {}", location.display(), e);
            }
        }

        let confidence = confidences.into_iter().reduce(f64::min).unwrap_or(0.0);
        let raw_text = pages.join(&PAGE_SEPARATOR.to_string());
        AcquiredText {
            raw_text,
            confidence,
            page_blocks: Some(pages),
        }
    }

    /// Rasterise and OCR one page. `None` when rendering or OCR failed or
    /// recognised nothing.
    async fn ocr_page(&self, pdf: &Path, idx: usize, dir: &Path) -> Option<(String, f64)> {
        let image_path = dir.join(format!("page-{}.png", idx + 1));

        let backend = Arc::clone(&self.pdf);
        let (pdf_path, out, max_px) = (pdf.to_path_buf(), image_path.clone(), self.max_rendered_pixels);
        let rendered = tokio::task::spawn_blocking(move || {
            backend.render_page(&pdf_path, idx, &out, max_px)
        })
        .await;
        match rendered {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!("Page {}: rasterisation failed: {}", idx + 1, e);
                return None;
            }
            Err(e) => {
                warn!("Page {}: render task panicked: {}", idx + 1, e);
                return None;
            }
        }

        match self.ocr.recognize(&image_path).await {
            Ok(out) if !out.text.trim().is_empty() => Some((
                out.text,
                out.confidence.unwrap_or(self.default_ocr_confidence),
            )),
            Ok(_) => {
                debug!("Page {}: OCR recognised no text", idx + 1);
                None
            }
            Err(e) => {
                warn!("Page {}: OCR failed: {}", idx + 1, e);
                None
            }
        }
    }

    fn scratch_dir(&self) -> std::io::Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix("receipt-pages-");
        match &self.temp_dir {
            Some(dir) => builder.tempdir_in(dir),
            None => builder.tempdir(),
        }
    }
}
