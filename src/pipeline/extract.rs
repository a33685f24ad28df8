//! Stage 3: structured extraction, one generation call per page.
//!
//! Each page is sent with the multi-record prompt. The response is run
//! through [`recover_json`]; candidates lacking `type`, `amount` or `date`
//! are dropped. When the model proposes nothing at all (no JSON, or an
//! empty list), the page is asked once more with the single-record prompt
//! and that single result is kept only if it has all required fields.
//! Records that were proposed but incomplete do not trigger the second call.
//!
//! Unusable model output is never fatal: the page records a [`PageError`]
//! and contributes zero candidates. A failed primary generation call is
//! fatal and aborts the remaining pages.

use crate::error::{PageError, ReceiptError};
use crate::model::ExtractionCandidate;
use crate::pipeline::generate::TextGenerator;
use crate::pipeline::json::{candidate_values, recover_json};
use crate::progress::ProgressCallback;
use crate::prompts::{multi_record_prompt, single_record_prompt};
use futures::stream::{self, StreamExt, TryStreamExt};
use serde_json::Value;
use tracing::{debug, info, warn};

/// Result of extracting one page.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PageOutcome {
    /// 1-based page index.
    pub page: usize,
    /// Accepted candidates, each tagged with `page`.
    pub candidates: Vec<ExtractionCandidate>,
    /// Set when the page's model output had to be discarded.
    pub error: Option<PageError>,
    /// Whether the single-record prompt was issued.
    pub used_fallback: bool,
}

/// Extract candidates from the text of page `page` (1-based).
pub async fn extract_page(
    generator: &dyn TextGenerator,
    page: usize,
    text: &str,
) -> Result<PageOutcome, ReceiptError> {
    let mut outcome = PageOutcome {
        page,
        ..Default::default()
    };
    if text.trim().is_empty() {
        debug!("Page {}: blank, skipping extraction", page);
        return Ok(outcome);
    }

    let response = generator.generate(&multi_record_prompt(text)).await?;
    let mut nothing_proposed = true;
    match recover_json(&response) {
        Some(value) => {
            let values = candidate_values(value);
            nothing_proposed = values.is_empty();
            outcome.candidates = accepted(values, page);
        }
        None => {
            warn!("Page {}: no JSON value in model output", page);
            debug!("Page {} model output: {}", page, response);
            outcome.error = Some(PageError::MalformedOutput {
                page,
                detail: "no JSON value found in model output".into(),
            });
        }
    }

    if nothing_proposed {
        outcome.used_fallback = true;
        info!("Page {}: no candidates, retrying with single-record prompt", page);
        match generator.generate(&single_record_prompt(text)).await {
            Ok(fallback) => match recover_json(&fallback) {
                Some(value) => {
                    outcome.candidates = accepted(
                        candidate_values(value).into_iter().take(1).collect(),
                        page,
                    );
                }
                None if outcome.error.is_none() => {
                    outcome.error = Some(PageError::MalformedOutput {
                        page,
                        detail: "no JSON value found in single-record output".into(),
                    });
                }
                None => {}
            },
            Err(e) => {
                warn!("Page {}: single-record fallback failed: {}", page, e);
                outcome.error.get_or_insert(PageError::FallbackFailed {
                    page,
                    detail: e.to_string(),
                });
            }
        }
    }

    if !outcome.candidates.is_empty() {
        outcome.error = None;
    }
    debug!(
        "Page {}: {} candidate(s){}",
        page,
        outcome.candidates.len(),
        if outcome.used_fallback { " via fallback" } else { "" }
    );
    Ok(outcome)
}

/// Candidates from `values` that carry every required field, tagged with
/// their page.
fn accepted(values: Vec<Value>, page: usize) -> Vec<ExtractionCandidate> {
    let total = values.len();
    let kept: Vec<ExtractionCandidate> = values
        .into_iter()
        .filter_map(ExtractionCandidate::from_value)
        .filter_map(|candidate| match candidate.missing_required_field() {
            None => Some(ExtractionCandidate { page, ..candidate }),
            Some(field) => {
                debug!("Page {}: dropping candidate without {}", page, field);
                None
            }
        })
        .collect();
    if kept.len() < total {
        debug!("Page {}: kept {}/{} candidates", page, kept.len(), total);
    }
    kept
}

/// Extract every page, at most `concurrency` at a time, returning outcomes
/// in page order.
///
/// The first fatal error stops the run; pages still in flight are dropped
/// and no further page is started.
pub async fn extract_pages(
    generator: &dyn TextGenerator,
    pages: &[String],
    concurrency: usize,
    progress: Option<&ProgressCallback>,
) -> Result<Vec<PageOutcome>, ReceiptError> {
    let total_pages = pages.len();
    stream::iter(pages.iter().enumerate().map(|(idx, text)| {
        let page_num = idx + 1;
        async move {
            if let Some(cb) = progress {
                cb.on_page_start(page_num, total_pages);
            }
            let outcome = extract_page(generator, page_num, text).await;
            if let Some(cb) = progress {
                match &outcome {
                    Ok(o) => {
                        if let Some(e) = &o.error {
                            cb.on_page_error(page_num, total_pages, &e.to_string());
                        }
                        cb.on_page_complete(page_num, total_pages, o.candidates.len());
                    }
                    Err(e) => cb.on_page_error(page_num, total_pages, &e.to_string()),
                }
            }
            outcome
        }
    }))
    .buffered(concurrency.max(1))
    .try_collect()
    .await
}
