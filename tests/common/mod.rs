//! Fakes shared by the integration tests. No external service is contacted.

#![allow(dead_code)]

use async_trait::async_trait;
use receipt_ledger::pipeline::ocr::OcrOutput;
use receipt_ledger::store::MemoryStore;
use receipt_ledger::{
    IngestConfig, IngestConfigBuilder, OcrEngine, PdfBackend, ReceiptError, ReceiptPipeline,
    TextGenerator,
};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const PAGE_TEXT_MARKER: &str = "Receipt page text: ";

/// Page text embedded at the end of an extraction prompt.
pub fn page_text(prompt: &str) -> &str {
    prompt
        .rsplit_once(PAGE_TEXT_MARKER)
        .map(|(_, text)| text)
        .unwrap_or_default()
}

/// Whether `prompt` is the single-record fallback prompt.
pub fn is_fallback(prompt: &str) -> bool {
    prompt.contains("single financial transaction")
}

// ── Text generation ──────────────────────────────────────────────────────

/// Generator answering through a closure over the prompt.
pub struct FnGenerator<F> {
    answer: F,
    prompts: Mutex<Vec<String>>,
}

impl<F> FnGenerator<F>
where
    F: Fn(&str) -> Result<String, ReceiptError> + Send + Sync,
{
    pub fn new(answer: F) -> Arc<Self> {
        Arc::new(Self {
            answer,
            prompts: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }
}

#[async_trait]
impl<F> TextGenerator for FnGenerator<F>
where
    F: Fn(&str) -> Result<String, ReceiptError> + Send + Sync,
{
    async fn generate(&self, prompt: &str) -> Result<String, ReceiptError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        (self.answer)(prompt)
    }
}

// ── OCR ──────────────────────────────────────────────────────────────────

/// OCR engine answering by image file-name suffix; anything else reads as
/// blank.
#[derive(Default)]
pub struct ScriptedOcr {
    answers: Vec<(String, OcrOutput)>,
    seen: Mutex<Vec<PathBuf>>,
}

impl ScriptedOcr {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn answer(mut self, suffix: &str, text: &str, confidence: Option<f64>) -> Self {
        self.answers.push((
            suffix.to_string(),
            OcrOutput {
                text: text.to_string(),
                confidence,
            },
        ));
        self
    }

    pub fn seen(&self) -> Vec<PathBuf> {
        self.seen.lock().unwrap().clone()
    }
}

#[async_trait]
impl OcrEngine for ScriptedOcr {
    async fn recognize(&self, image: &Path) -> Result<OcrOutput, ReceiptError> {
        self.seen.lock().unwrap().push(image.to_path_buf());
        let name = image.to_string_lossy();
        Ok(self
            .answers
            .iter()
            .find(|(suffix, _)| name.ends_with(suffix.as_str()))
            .map(|(_, out)| out.clone())
            .unwrap_or_default())
    }
}

// ── PDF ──────────────────────────────────────────────────────────────────

/// PDF backend with a fixed per-page text layer.
#[derive(Default)]
pub struct FakePdf {
    layer: Vec<String>,
    text_reads: AtomicUsize,
    rendered: Mutex<Vec<usize>>,
}

impl FakePdf {
    pub fn with_pages(pages: &[&str]) -> Self {
        Self {
            layer: pages.iter().map(|p| p.to_string()).collect(),
            ..Default::default()
        }
    }

    pub fn text_reads(&self) -> usize {
        self.text_reads.load(Ordering::SeqCst)
    }

    /// 0-based indices of rasterised pages.
    pub fn rendered(&self) -> Vec<usize> {
        self.rendered.lock().unwrap().clone()
    }
}

impl PdfBackend for FakePdf {
    fn page_texts(&self, _pdf: &Path) -> Result<Vec<String>, ReceiptError> {
        self.text_reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.layer.clone())
    }

    fn render_page(
        &self,
        _pdf: &Path,
        index: usize,
        out: &Path,
        _max_pixels: u32,
    ) -> Result<(), ReceiptError> {
        std::fs::write(out, b"\x89PNG")?;
        self.rendered.lock().unwrap().push(index);
        Ok(())
    }
}

// ── Assembly ─────────────────────────────────────────────────────────────

/// Pipeline over fakes, with retries off so failures surface at once.
pub fn pipeline(
    generator: Arc<dyn TextGenerator>,
    ocr: Arc<dyn OcrEngine>,
    pdf: Arc<dyn PdfBackend>,
    store: Arc<MemoryStore>,
    tweak: impl FnOnce(IngestConfigBuilder) -> IngestConfigBuilder,
) -> ReceiptPipeline {
    let builder = IngestConfig::builder()
        .generator(generator)
        .max_retries(0)
        .api_timeout_secs(5);
    let config = tweak(builder).build().expect("valid test config");
    ReceiptPipeline::with_engines(config, ocr, pdf, store).expect("pipeline builds")
}

/// One well-formed expense as the model would return it.
pub fn expense_json(amount: f64, date: &str, description: &str) -> String {
    format!(
        r#"{{"type":"expense","category":"Dining","amount":{amount},"currency":"INR","date":"{date}","description":"{description}","paymentMethod":"card","tags":[]}}"#
    )
}
