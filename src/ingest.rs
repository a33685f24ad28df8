//! Receipt ingestion orchestrator.
//!
//! [`ReceiptPipeline`] chains the four stages for one upload:
//!
//! 1. acquire text (OCR / PDF text layer)
//! 2. segment into pages
//! 3. extract candidates per page
//! 4. validate the batch and persist it as one unit of work
//!
//! The uploaded file is owned by the [`UploadedDocument`] passed in and the
//! page images by stage 1, so every temp file is gone when `ingest` returns,
//! whatever the outcome.

use crate::config::IngestConfig;
use crate::document::{DocumentKind, UploadedDocument};
use crate::error::{PageError, ReceiptError};
use crate::model::{ExtractionCandidate, PersistedTransaction};
use crate::pipeline::acquire::TextAcquirer;
use crate::pipeline::extract::extract_pages;
use crate::pipeline::generate::{resolve_generator, TextGenerator};
use crate::pipeline::ocr::{OcrEngine, TesseractCli};
use crate::pipeline::pdf::{PdfBackend, PdfiumBackend};
use crate::pipeline::segment::segment;
use crate::pipeline::validate::{validate_batch, Provenance};
use crate::store::TransactionStore;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use std::time::Instant;
use tracing::{info, warn};

/// What an upload produced.
#[derive(Debug, Clone, PartialEq)]
pub enum IngestOutcome {
    /// Records persisted, in page order.
    Saved(Vec<PersistedTransaction>),
    /// No page yielded a usable candidate. Not an error.
    NoTransactionsFound,
}

impl IngestOutcome {
    pub fn saved(&self) -> &[PersistedTransaction] {
        match self {
            IngestOutcome::Saved(records) => records,
            IngestOutcome::NoTransactionsFound => &[],
        }
    }
}

/// Counters for one upload.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct IngestStats {
    pub total_pages: usize,
    /// Pages whose text was blank and never sent to the model.
    pub blank_pages: usize,
    pub pages_with_candidates: usize,
    /// Pages that issued the single-record fallback prompt.
    pub fallback_pages: usize,
    pub candidates: usize,
    pub saved: usize,
    pub confidence: f64,
    pub duration_ms: u64,
}

/// Full result of [`ReceiptPipeline::ingest`].
#[derive(Debug, Clone, PartialEq)]
pub struct IngestReport {
    pub outcome: IngestOutcome,
    pub stats: IngestStats,
    /// Pages whose model output was discarded.
    pub page_errors: Vec<PageError>,
}

/// The receipt-to-transaction pipeline.
pub struct ReceiptPipeline {
    config: IngestConfig,
    acquirer: TextAcquirer,
    generator: Arc<dyn TextGenerator>,
    store: Arc<dyn TransactionStore>,
}

impl ReceiptPipeline {
    /// Pipeline over the Tesseract CLI, pdfium and the configured
    /// text-generation provider.
    pub fn new(config: IngestConfig, store: Arc<dyn TransactionStore>) -> Result<Self, ReceiptError> {
        let ocr = Arc::new(TesseractCli::from_config(&config));
        let pdf = Arc::new(PdfiumBackend::new(config.pdfium_library_path.clone()));
        Self::with_engines(config, ocr, pdf, store)
    }

    /// Pipeline over caller-supplied OCR and PDF engines. The generator is
    /// still resolved from `config` and wrapped with timeout and retries.
    pub fn with_engines(
        config: IngestConfig,
        ocr: Arc<dyn OcrEngine>,
        pdf: Arc<dyn PdfBackend>,
        store: Arc<dyn TransactionStore>,
    ) -> Result<Self, ReceiptError> {
        let generator = resolve_generator(&config)?;
        let acquirer = TextAcquirer::new(ocr, pdf, &config);
        Ok(Self {
            config,
            acquirer,
            generator,
            store,
        })
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    /// Ingest a file already on disk. The file is left in place.
    pub async fn ingest_file(
        &self,
        path: impl AsRef<Path>,
        user_id: &str,
    ) -> Result<IngestReport, ReceiptError> {
        let doc = UploadedDocument::from_path(path)?;
        self.ingest(&doc, user_id).await
    }

    /// Ingest uploaded bytes. They are spooled to a temp file that is
    /// removed before this returns.
    pub async fn ingest_bytes(
        &self,
        bytes: &[u8],
        original_name: &str,
        user_id: &str,
    ) -> Result<IngestReport, ReceiptError> {
        if bytes.len() > self.config.max_upload_bytes {
            return Err(ReceiptError::UploadTooLarge {
                size: bytes.len(),
                limit: self.config.max_upload_bytes,
            });
        }
        let doc = UploadedDocument::from_bytes(bytes, original_name, self.config.temp_dir.as_deref())?;
        self.ingest(&doc, user_id).await
    }

    /// Run all four stages for one document owned by `user_id`.
    pub async fn ingest(
        &self,
        doc: &UploadedDocument,
        user_id: &str,
    ) -> Result<IngestReport, ReceiptError> {
        let start = Instant::now();
        let progress = self.config.progress_callback.as_ref();
        info!(
            "Ingesting '{}' ({:?}) for user {}",
            doc.original_name(),
            doc.kind(),
            user_id
        );

        let acquired = self.acquirer.acquire(doc).await;
        let pages = segment(&acquired);
        let mut stats = IngestStats {
            total_pages: pages.len(),
            blank_pages: pages.iter().filter(|p| p.trim().is_empty()).count(),
            confidence: acquired.confidence,
            ..Default::default()
        };
        if let Some(cb) = progress {
            cb.on_ingest_start(pages.len());
        }

        let outcomes = if pages.is_empty() {
            info!("'{}': no text acquired", doc.original_name());
            Vec::new()
        } else {
            extract_pages(
                self.generator.as_ref(),
                &pages,
                self.config.concurrency,
                progress,
            )
            .await?
        };

        let mut page_errors = Vec::new();
        let mut candidates: Vec<ExtractionCandidate> = Vec::new();
        for outcome in outcomes {
            if outcome.used_fallback {
                stats.fallback_pages += 1;
            }
            if !outcome.candidates.is_empty() {
                stats.pages_with_candidates += 1;
            }
            if let Some(e) = outcome.error {
                warn!("{}", e);
                page_errors.push(e);
            }
            candidates.extend(outcome.candidates);
        }
        stats.candidates = candidates.len();

        let outcome = if candidates.is_empty() {
            info!("'{}': no transactions detected", doc.original_name());
            IngestOutcome::NoTransactionsFound
        } else {
            let provenance = Provenance {
                user_id,
                raw_text: &acquired.raw_text,
                confidence: acquired.confidence,
                pdf_filename: (doc.kind() == DocumentKind::Pdf).then(|| doc.original_name()),
                default_currency: &self.config.default_currency,
            };
            let records = validate_batch(&candidates, &provenance)?;
            let saved = self.store.insert_batch(records).await?;
            IngestOutcome::Saved(saved)
        };

        stats.saved = outcome.saved().len();
        stats.duration_ms = start.elapsed().as_millis() as u64;
        if let Some(cb) = progress {
            cb.on_ingest_complete(stats.total_pages, stats.saved);
        }
        info!(
            "'{}': {} page(s), {} candidate(s), {} saved in {}ms",
            doc.original_name(),
            stats.total_pages,
            stats.candidates,
            stats.saved,
            stats.duration_ms
        );

        Ok(IngestReport {
            outcome,
            stats,
            page_errors,
        })
    }
}
