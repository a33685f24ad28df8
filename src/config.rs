//! Configuration for receipt ingestion.
//!
//! All pipeline behaviour is controlled through [`IngestConfig`], built via
//! its [`IngestConfigBuilder`]. Secrets (the Gemini API key) are injected
//! here at startup by the host; nothing in the library reads them from the
//! environment on its own.

use crate::error::ReceiptError;
use crate::pipeline::generate::TextGenerator;
use crate::progress::ProgressCallback;
use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

/// Default model for the Gemini REST provider.
pub const DEFAULT_GEMINI_MODEL: &str = "gemini-1.5-flash-latest";

/// Configuration for one [`crate::ingest::ReceiptPipeline`].
///
/// # Example
/// ```rust
/// use receipt_ledger::IngestConfig;
///
/// let config = IngestConfig::builder()
///     .api_key("test-key")
///     .api_timeout_secs(20)
///     .concurrency(2)
///     .build()
///     .unwrap();
/// assert_eq!(config.concurrency, 2);
/// ```
#[derive(Clone)]
pub struct IngestConfig {
    // ── Text generation ──────────────────────────────────────────────────
    /// Provider name. `"gemini"` (default) talks to the Generative Language
    /// REST API with [`IngestConfig::api_key`]; any other name is resolved
    /// through `edgequake_llm::ProviderFactory`.
    pub provider_name: String,

    /// Model identifier. Default: [`DEFAULT_GEMINI_MODEL`].
    pub model: String,

    /// API key for the Gemini provider.
    pub api_key: Option<String>,

    /// Pre-constructed generator. Takes precedence over `provider_name`.
    pub generator: Option<Arc<dyn TextGenerator>>,

    /// Sampling temperature. Default: 0.1.
    pub temperature: f32,

    /// Maximum tokens generated per call. Default: 2048.
    pub max_tokens: usize,

    /// Extra attempts after a failed generation call. Default: 1.
    pub max_retries: u32,

    /// Initial retry delay in milliseconds, doubled per attempt. Default: 500.
    pub retry_backoff_ms: u64,

    /// Per-call timeout for the generation service in seconds. Default: 30.
    pub api_timeout_secs: u64,

    /// Pages extracted at once. Default: 1 (strictly sequential).
    ///
    /// Values above 1 issue that many generation calls in parallel; results
    /// are still gathered in page order.
    pub concurrency: usize,

    // ── OCR / PDF ────────────────────────────────────────────────────────
    /// Tesseract language pack. Default: `eng`.
    pub ocr_language: String,

    /// Path to the `tesseract` binary. Default: `tesseract` (found on PATH).
    pub tesseract_path: PathBuf,

    /// Per-image OCR timeout in seconds. Default: 120.
    pub ocr_timeout_secs: u64,

    /// Longest edge of a rasterised PDF page, in pixels. Default: 2000.
    pub max_rendered_pixels: u32,

    /// Directory holding the pdfium shared library; system search when `None`.
    pub pdfium_library_path: Option<PathBuf>,

    /// Confidence assigned to text read from a PDF text layer. Default: 0.9.
    pub pdf_text_confidence: f64,

    /// Confidence used when the OCR engine reports none. Default: 0.7.
    pub default_ocr_confidence: f64,

    /// Directory for spooled uploads and page images; system temp when `None`.
    pub temp_dir: Option<PathBuf>,

    // ── Records ──────────────────────────────────────────────────────────
    /// Currency stored when the model gives none. Default: `INR`.
    pub default_currency: String,

    /// Largest accepted upload in bytes. Default: 20 MiB.
    pub max_upload_bytes: usize,

    /// Optional per-page progress events.
    pub progress_callback: Option<ProgressCallback>,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            provider_name: "gemini".to_string(),
            model: DEFAULT_GEMINI_MODEL.to_string(),
            api_key: None,
            generator: None,
            temperature: 0.1,
            max_tokens: 2048,
            max_retries: 1,
            retry_backoff_ms: 500,
            api_timeout_secs: 30,
            concurrency: 1,
            ocr_language: "eng".to_string(),
            tesseract_path: PathBuf::from("tesseract"),
            ocr_timeout_secs: 120,
            max_rendered_pixels: 2000,
            pdfium_library_path: None,
            pdf_text_confidence: 0.9,
            default_ocr_confidence: 0.7,
            temp_dir: None,
            default_currency: "INR".to_string(),
            max_upload_bytes: 20 * 1024 * 1024,
            progress_callback: None,
        }
    }
}

impl fmt::Debug for IngestConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IngestConfig")
            .field("provider_name", &self.provider_name)
            .field("model", &self.model)
            .field("api_key", &self.api_key.as_ref().map(|_| "<redacted>"))
            .field("generator", &self.generator.as_ref().map(|_| "<dyn TextGenerator>"))
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .field("max_retries", &self.max_retries)
            .field("api_timeout_secs", &self.api_timeout_secs)
            .field("concurrency", &self.concurrency)
            .field("ocr_language", &self.ocr_language)
            .field("tesseract_path", &self.tesseract_path)
            .field("pdfium_library_path", &self.pdfium_library_path)
            .field("default_currency", &self.default_currency)
            .finish()
    }
}

impl IngestConfig {
    /// Create a new builder for `IngestConfig`.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder {
            config: Self::default(),
        }
    }
}

/// Builder for [`IngestConfig`].
#[derive(Debug)]
pub struct IngestConfigBuilder {
    config: IngestConfig,
}

impl IngestConfigBuilder {
    pub fn provider_name(mut self, name: impl Into<String>) -> Self {
        self.config.provider_name = name.into();
        self
    }

    pub fn model(mut self, model: impl Into<String>) -> Self {
        self.config.model = model.into();
        self
    }

    pub fn api_key(mut self, key: impl Into<String>) -> Self {
        self.config.api_key = Some(key.into());
        self
    }

    pub fn generator(mut self, generator: Arc<dyn TextGenerator>) -> Self {
        self.config.generator = Some(generator);
        self
    }

    pub fn temperature(mut self, t: f32) -> Self {
        self.config.temperature = t.clamp(0.0, 2.0);
        self
    }

    pub fn max_tokens(mut self, n: usize) -> Self {
        self.config.max_tokens = n;
        self
    }

    pub fn max_retries(mut self, n: u32) -> Self {
        self.config.max_retries = n;
        self
    }

    pub fn retry_backoff_ms(mut self, ms: u64) -> Self {
        self.config.retry_backoff_ms = ms;
        self
    }

    pub fn api_timeout_secs(mut self, secs: u64) -> Self {
        self.config.api_timeout_secs = secs;
        self
    }

    pub fn concurrency(mut self, n: usize) -> Self {
        self.config.concurrency = n.max(1);
        self
    }

    pub fn ocr_language(mut self, lang: impl Into<String>) -> Self {
        self.config.ocr_language = lang.into();
        self
    }

    pub fn tesseract_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.tesseract_path = path.into();
        self
    }

    pub fn ocr_timeout_secs(mut self, secs: u64) -> Self {
        self.config.ocr_timeout_secs = secs;
        self
    }

    pub fn max_rendered_pixels(mut self, px: u32) -> Self {
        self.config.max_rendered_pixels = px.max(100);
        self
    }

    pub fn pdfium_library_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config.pdfium_library_path = Some(path.into());
        self
    }

    pub fn pdf_text_confidence(mut self, c: f64) -> Self {
        self.config.pdf_text_confidence = c;
        self
    }

    pub fn default_ocr_confidence(mut self, c: f64) -> Self {
        self.config.default_ocr_confidence = c;
        self
    }

    pub fn temp_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.config.temp_dir = Some(dir.into());
        self
    }

    pub fn default_currency(mut self, currency: impl Into<String>) -> Self {
        self.config.default_currency = currency.into();
        self
    }

    pub fn max_upload_bytes(mut self, n: usize) -> Self {
        self.config.max_upload_bytes = n;
        self
    }

    pub fn progress_callback(mut self, cb: ProgressCallback) -> Self {
        self.config.progress_callback = Some(cb);
        self
    }

    /// Build the configuration, validating constraints.
    pub fn build(self) -> Result<IngestConfig, ReceiptError> {
        let c = &self.config;
        for (name, value) in [
            ("pdf_text_confidence", c.pdf_text_confidence),
            ("default_ocr_confidence", c.default_ocr_confidence),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ReceiptError::InvalidConfig(format!(
                    "{name} must be within 0–1, got {value}"
                )));
            }
        }
        if c.api_timeout_secs == 0 || c.ocr_timeout_secs == 0 {
            return Err(ReceiptError::InvalidConfig(
                "Timeouts must be ≥ 1 second".into(),
            ));
        }
        if c.model.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig("Model must not be empty".into()));
        }
        if c.default_currency.trim().is_empty() {
            return Err(ReceiptError::InvalidConfig(
                "Default currency must not be empty".into(),
            ));
        }
        Ok(self.config)
    }
}
