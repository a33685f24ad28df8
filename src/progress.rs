//! Progress-callback trait for per-page ingestion events.
//!
//! Inject an [`Arc<dyn IngestProgressCallback>`] via
//! [`crate::config::IngestConfigBuilder::progress_callback`] to receive
//! events as the pipeline extracts each page. The CLI uses it to drive a
//! progress bar; a server could forward events to a job record.
//!
//! # Example
//!
//! ```rust
//! use receipt_ledger::{IngestConfig, IngestProgressCallback};
//! use std::sync::{Arc, atomic::{AtomicUsize, Ordering}};
//!
//! struct CountingCallback {
//!     candidates: AtomicUsize,
//! }
//!
//! impl IngestProgressCallback for CountingCallback {
//!     fn on_page_complete(&self, _page: usize, _total: usize, candidates: usize) {
//!         self.candidates.fetch_add(candidates, Ordering::SeqCst);
//!     }
//! }
//!
//! let config = IngestConfig::builder()
//!     .progress_callback(Arc::new(CountingCallback { candidates: AtomicUsize::new(0) }))
//!     .build()
//!     .unwrap();
//! ```

use std::sync::Arc;

/// Called by the pipeline as it processes an upload.
///
/// Implementations must be `Send + Sync`: with `concurrency > 1` page
/// events arrive from concurrently running futures. All methods default to
/// no-ops.
pub trait IngestProgressCallback: Send + Sync {
    /// Called once after segmentation, before any page is extracted.
    fn on_ingest_start(&self, total_pages: usize) {
        let _ = total_pages;
    }

    /// Called just before the first generation request for a page.
    fn on_page_start(&self, page_num: usize, total_pages: usize) {
        let _ = (page_num, total_pages);
    }

    /// Called when a page finished, with the number of accepted candidates
    /// (zero when the model found nothing or its output was unusable).
    fn on_page_complete(&self, page_num: usize, total_pages: usize, candidates: usize) {
        let _ = (page_num, total_pages, candidates);
    }

    /// Called when a page's output had to be discarded.
    fn on_page_error(&self, page_num: usize, total_pages: usize, error: &str) {
        let _ = (page_num, total_pages, error);
    }

    /// Called once after persistence, with the number of saved records.
    fn on_ingest_complete(&self, total_pages: usize, saved: usize) {
        let _ = (total_pages, saved);
    }
}

/// A no-op implementation for callers that don't need progress events.
pub struct NoopProgressCallback;

impl IngestProgressCallback for NoopProgressCallback {}

/// Convenience alias matching the type stored in [`crate::config::IngestConfig`].
pub type ProgressCallback = Arc<dyn IngestProgressCallback>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct TrackingCallback {
        pages: AtomicUsize,
        candidates: AtomicUsize,
        errors: AtomicUsize,
        saved: AtomicUsize,
    }

    impl IngestProgressCallback for TrackingCallback {
        fn on_page_start(&self, _page_num: usize, _total_pages: usize) {
            self.pages.fetch_add(1, Ordering::SeqCst);
        }

        fn on_page_complete(&self, _page_num: usize, _total_pages: usize, candidates: usize) {
            self.candidates.fetch_add(candidates, Ordering::SeqCst);
        }

        fn on_page_error(&self, _page_num: usize, _total_pages: usize, _error: &str) {
            self.errors.fetch_add(1, Ordering::SeqCst);
        }

        fn on_ingest_complete(&self, _total_pages: usize, saved: usize) {
            self.saved.store(saved, Ordering::SeqCst);
        }
    }

    #[test]
    fn noop_callback_does_not_panic() {
        let cb = NoopProgressCallback;
        cb.on_ingest_start(2);
        cb.on_page_start(1, 2);
        cb.on_page_complete(1, 2, 3);
        cb.on_page_error(2, 2, "unparseable");
        cb.on_ingest_complete(2, 3);
    }

    #[test]
    fn tracking_callback_receives_events() {
        let cb: Arc<TrackingCallback> = Arc::new(TrackingCallback::default());
        let dyn_cb: ProgressCallback = cb.clone();

        dyn_cb.on_page_start(1, 2);
        dyn_cb.on_page_complete(1, 2, 2);
        dyn_cb.on_page_start(2, 2);
        dyn_cb.on_page_error(2, 2, "no JSON value found");
        dyn_cb.on_page_complete(2, 2, 0);
        dyn_cb.on_ingest_complete(2, 2);

        assert_eq!(cb.pages.load(Ordering::SeqCst), 2);
        assert_eq!(cb.candidates.load(Ordering::SeqCst), 2);
        assert_eq!(cb.errors.load(Ordering::SeqCst), 1);
        assert_eq!(cb.saved.load(Ordering::SeqCst), 2);
    }
}
