//! # receipt-ledger
//!
//! Turn uploaded receipts (photos, scans and PDFs) into structured finance
//! transactions.
//!
//! ## Pipeline Overview
//!
//! ```text
//! upload (image | PDF)
//!  │
//!  ├─ 1. Acquire   OCR images; PDF text layer per page, OCR for blank pages
//!  ├─ 2. Segment   one text block per page
//!  ├─ 3. Extract   one LLM call per page → JSON candidates (+ single-record fallback)
//!  └─ 4. Persist   all-or-nothing validation, one unit of work in the store
//! ```
//!
//! Unusable model output for a page is absorbed (the page yields nothing).
//! Upstream failures abort the upload; a candidate that fails batch
//! validation aborts the batch. An upload that yields no candidates is a
//! normal outcome, [`IngestOutcome::NoTransactionsFound`].
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use receipt_ledger::{IngestConfig, IngestOutcome, ReceiptPipeline};
//! use receipt_ledger::store::MemoryStore;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = IngestConfig::builder()
//!         .api_key(std::env::var("GEMINI_API_KEY")?)
//!         .build()?;
//!     let store = Arc::new(MemoryStore::new());
//!     let pipeline = ReceiptPipeline::new(config, store)?;
//!
//!     let report = pipeline.ingest_file("receipt.jpg", "user-1").await?;
//!     match report.outcome {
//!         IngestOutcome::Saved(records) => println!("{} saved", records.len()),
//!         IngestOutcome::NoTransactionsFound => println!("nothing found"),
//!     }
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! | Feature  | Default | Description |
//! |----------|---------|-------------|
//! | `cli`    | on      | The `receipt-ledger` binary (clap + anyhow + tracing-subscriber + indicatif) |
//! | `server` | on      | The actix-web upload endpoint in [`server`] |
//!
//! ## External tools
//!
//! OCR runs the `tesseract` executable; PDFs need the pdfium shared library
//! (see [`IngestConfig::pdfium_library_path`]).

// ── Modules ──────────────────────────────────────────────────────────────

pub mod config;
pub mod document;
pub mod error;
pub mod ingest;
pub mod model;
pub mod pipeline;
pub mod progress;
pub mod prompts;
pub mod reply;
#[cfg(feature = "server")]
pub mod server;
pub mod store;

// ── Re-exports ───────────────────────────────────────────────────────────

pub use config::{IngestConfig, IngestConfigBuilder, DEFAULT_GEMINI_MODEL};
pub use document::{DocumentKind, UploadedDocument};
pub use error::{PageError, ReceiptError};
pub use ingest::{IngestOutcome, IngestReport, IngestStats, ReceiptPipeline};
pub use model::{
    ExtractionCandidate, NewTransaction, PaymentMethod, PersistedTransaction, TransactionMetadata,
    TransactionSource, TransactionStatus, TransactionType,
};
pub use pipeline::generate::TextGenerator;
pub use pipeline::ocr::OcrEngine;
pub use pipeline::pdf::PdfBackend;
pub use progress::{IngestProgressCallback, NoopProgressCallback, ProgressCallback};
pub use reply::{error_reply, outcome_reply, report_reply, Reply};
pub use store::TransactionStore;
