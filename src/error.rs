//! Error types for the receipt-ledger library.
//!
//! Two distinct error types reflect two distinct failure modes:
//!
//! * [`ReceiptError`], **fatal**: the upload cannot produce a result
//!   (unsupported file, upstream service down, a candidate failed batch
//!   validation, the store refused the write). Returned as
//!   `Err(ReceiptError)` from [`crate::ingest::ReceiptPipeline::ingest`].
//!
//! * [`PageError`], **non-fatal**: one page's model output could not be
//!   turned into candidates. Recorded in [`crate::pipeline::extract::PageOutcome`]; the
//!   page contributes zero candidates and the next page is processed.

use std::path::PathBuf;
use thiserror::Error;

/// All fatal errors returned by the receipt-ledger library.
#[derive(Debug, Error)]
pub enum ReceiptError {
    // ── Input errors ──────────────────────────────────────────────────────
    /// The file extension is neither an image format nor PDF.
    #[error("Unsupported file format '{extension}': upload an image (png, jpg, jpeg, bmp, tif, tiff, webp) or a PDF")]
    UnsupportedFormat { extension: String },

    /// The request carried no file, or a zero-byte file.
    #[error("No file uploaded")]
    EmptyUpload,

    /// The upload exceeded the configured size limit.
    #[error("Upload of {size} bytes exceeds the {limit}-byte limit")]
    UploadTooLarge { size: usize, limit: usize },

    /// Input file was not found at the given path.
    #[error("Receipt file not found: '{path}'")]
    FileNotFound { path: PathBuf },

    // ── Upstream errors ───────────────────────────────────────────────────
    /// OCR engine or text-generation call failed outright.
    #[error("{service} error: {detail}")]
    UpstreamService { service: String, detail: String },

    /// The upstream call did not answer within the configured timeout.
    #[error("{service} call timed out after {secs}s")]
    UpstreamTimeout { service: String, secs: u64 },

    /// The configured provider could not be constructed.
    #[error("LLM provider '{provider}' is not configured.\n{hint}")]
    ProviderNotConfigured { provider: String, hint: String },

    // ── Batch validation errors ───────────────────────────────────────────
    /// A candidate lacks one of `type`, `amount`, `date`.
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// A candidate's date could not be read as a calendar date.
    #[error("Invalid date format from model: '{value}'")]
    InvalidDate { value: String },

    /// A candidate's field holds a value outside its allowed set.
    #[error("Invalid value for field {field}: '{value}'")]
    InvalidField { field: &'static str, value: String },

    // ── Persistence errors ────────────────────────────────────────────────
    /// The transaction store rejected the batch.
    #[error("Transaction store error: {0}")]
    Store(String),

    // ── Config errors ─────────────────────────────────────────────────────
    /// Builder validation failed.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    // ── I/O errors ────────────────────────────────────────────────────────
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    // ── Catch-all ─────────────────────────────────────────────────────────
    /// Unexpected internal error.
    #[error("Internal error: {0}")]
    Internal(String),
}

impl ReceiptError {
    /// HTTP status the upload endpoint reports for this error.
    ///
    /// Caller mistakes and batch-validation failures are 400; anything the
    /// caller cannot fix by changing the upload is 500.
    pub fn status_code(&self) -> u16 {
        match self {
            ReceiptError::UnsupportedFormat { .. }
            | ReceiptError::EmptyUpload
            | ReceiptError::MissingField { .. }
            | ReceiptError::InvalidDate { .. }
            | ReceiptError::InvalidField { .. } => 400,
            ReceiptError::UploadTooLarge { .. } => 413,
            _ => 500,
        }
    }

    /// Whether this is an upstream (OCR / LLM) failure.
    pub fn is_upstream(&self) -> bool {
        matches!(
            self,
            ReceiptError::UpstreamService { .. } | ReceiptError::UpstreamTimeout { .. }
        )
    }

    pub(crate) fn upstream(service: &str, detail: impl Into<String>) -> Self {
        ReceiptError::UpstreamService {
            service: service.to_string(),
            detail: detail.into(),
        }
    }
}

/// A non-fatal error for a single page.
///
/// The page yields zero candidates; the remaining pages still run.
#[derive(Debug, Clone, Error, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum PageError {
    /// The model answered, but no JSON value could be recovered from it.
    #[error("Page {page}: model output could not be parsed: {detail}")]
    MalformedOutput { page: usize, detail: String },

    /// The single-record fallback call itself failed; ignored like the
    /// original empty result.
    #[error("Page {page}: single-record fallback failed: {detail}")]
    FallbackFailed { page: usize, detail: String },
}
