//! PDF access via pdfium: per-page text layer and page rasterisation.
//!
//! pdfium keeps thread-local state and blocks on CPU work, so
//! [`PdfBackend`] methods are synchronous and callers run them inside
//! `tokio::task::spawn_blocking`.

use crate::error::ReceiptError;
use pdfium_render::prelude::*;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

/// Text-layer extraction and page rendering for PDF files.
pub trait PdfBackend: Send + Sync {
    /// Text layer of every page, in page order. Pages without a text layer
    /// yield an empty string.
    fn page_texts(&self, pdf: &Path) -> Result<Vec<String>, ReceiptError>;

    /// Render the page at 0-based `index` to a PNG file at `out`, with its
    /// longest edge capped at `max_pixels`.
    fn render_page(
        &self,
        pdf: &Path,
        index: usize,
        out: &Path,
        max_pixels: u32,
    ) -> Result<(), ReceiptError>;
}

/// [`PdfBackend`] over a dynamically loaded pdfium library.
#[derive(Debug, Clone, Default)]
pub struct PdfiumBackend {
    library_dir: Option<PathBuf>,
}

impl PdfiumBackend {
    /// Load pdfium from `library_dir` when given, else from the working
    /// directory or the system library path.
    pub fn new(library_dir: Option<PathBuf>) -> Self {
        Self { library_dir }
    }

    fn bind(&self) -> Result<Pdfium, ReceiptError> {
        let bindings = match &self.library_dir {
            Some(dir) => {
                let dir = dir.to_string_lossy();
                Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path(&*dir))
            }
            None => Pdfium::bind_to_library(Pdfium::pdfium_platform_library_name_at_path("./"))
                .or_else(|_| Pdfium::bind_to_system_library()),
        }
        .map_err(|e| {
            ReceiptError::upstream(
                "PDF",
                format!("failed to load the pdfium library: {e:?}"),
            )
        })?;
        Ok(Pdfium::new(bindings))
    }
}

/// pdfium addresses pages with a `u16`.
fn page_index(index: usize) -> Result<u16, ReceiptError> {
    u16::try_from(index).map_err(|_| {
        ReceiptError::upstream("PDF", format!("page {} is beyond pdfium's page range", index + 1))
    })
}

fn load_error(pdf: &Path, e: PdfiumError) -> ReceiptError {
    ReceiptError::upstream("PDF", format!("cannot open '{}': {e:?}", pdf.display()))
}

impl PdfBackend for PdfiumBackend {
    fn page_texts(&self, pdf: &Path) -> Result<Vec<String>, ReceiptError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| load_error(pdf, e))?;

        let mut texts = Vec::new();
        for (idx, page) in document.pages().iter().enumerate() {
            let text = page.text().map_err(|e| {
                ReceiptError::upstream("PDF", format!("page {}: {e:?}", idx + 1))
            })?;
            let content = text.all();
            debug!("PDF page {}: {} chars in text layer", idx + 1, content.trim().len());
            texts.push(content);
        }
        info!("PDF loaded: {} pages", texts.len());
        Ok(texts)
    }

    fn render_page(
        &self,
        pdf: &Path,
        index: usize,
        out: &Path,
        max_pixels: u32,
    ) -> Result<(), ReceiptError> {
        let pdfium = self.bind()?;
        let document = pdfium
            .load_pdf_from_file(pdf, None)
            .map_err(|e| load_error(pdf, e))?;

        let render_config = PdfRenderConfig::new()
            .set_target_width(max_pixels as i32)
            .set_maximum_height(max_pixels as i32);

        let page = document.pages().get(page_index(index)?).map_err(|e| {
            ReceiptError::upstream("PDF", format!("page {}: {e:?}", index + 1))
        })?;
        let bitmap = page.render_with_config(&render_config).map_err(|e| {
            ReceiptError::upstream("PDF", format!("render page {}: {e:?}", index + 1))
        })?;

        let image = bitmap.as_image();
        image
            .save_with_format(out, image::ImageFormat::Png)
            .map_err(|e| ReceiptError::Internal(format!("write page image: {e}")))?;
        debug!(
            "Rendered page {} → {}x{} px at {}",
            index + 1,
            image.width(),
            image.height(),
            out.display()
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn page_index_rejects_out_of_range_pages() {
        assert_eq!(page_index(0).unwrap(), 0);
        assert_eq!(page_index(usize::from(u16::MAX)).unwrap(), u16::MAX);
        let err = page_index(usize::from(u16::MAX) + 1).unwrap_err();
        assert!(err.is_upstream());
        assert!(err.to_string().contains("65537"));
    }
}
