//! Stage 4a: batch validation and provenance.
//!
//! Turns the loose [`ExtractionCandidate`]s of one upload into strict
//! [`NewTransaction`]s. The batch is all-or-nothing: the first candidate
//! that fails a check aborts the whole upload with a 400-class error.

use crate::error::ReceiptError;
use crate::model::{
    ExtractionCandidate, NewTransaction, PaymentMethod, TransactionMetadata, TransactionSource,
    TransactionStatus, TransactionType, MAX_DESCRIPTION_CHARS,
};
use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime};
use tracing::warn;

/// Category stored when the model names none.
pub const DEFAULT_CATEGORY: &str = "Uncategorized";

/// Per-upload facts attached to every record of the batch.
#[derive(Debug, Clone, Copy)]
pub struct Provenance<'a> {
    pub user_id: &'a str,
    /// Full acquired text of the document.
    pub raw_text: &'a str,
    /// Acquisition confidence in `[0, 1]`.
    pub confidence: f64,
    /// Original file name, for PDF uploads.
    pub pdf_filename: Option<&'a str>,
    pub default_currency: &'a str,
}

/// Validate every candidate, in order. Fails on the first bad one.
pub fn validate_batch(
    candidates: &[ExtractionCandidate],
    provenance: &Provenance<'_>,
) -> Result<Vec<NewTransaction>, ReceiptError> {
    candidates
        .iter()
        .map(|c| validate_candidate(c, provenance))
        .collect()
}

/// Validate one candidate and attach provenance metadata.
pub fn validate_candidate(
    candidate: &ExtractionCandidate,
    provenance: &Provenance<'_>,
) -> Result<NewTransaction, ReceiptError> {
    if let Some(field) = candidate.missing_required_field() {
        return Err(ReceiptError::MissingField { field });
    }
    let kind_text = non_blank(&candidate.kind).unwrap_or_default();
    let kind: TransactionType = kind_text.parse().map_err(|value| ReceiptError::InvalidField {
        field: "type",
        value,
    })?;
    let amount = candidate.amount.unwrap_or_default().abs();
    let date = parse_date(non_blank(&candidate.date).unwrap_or_default())?;

    let description = non_blank(&candidate.description).map(|d| {
        if d.chars().count() > MAX_DESCRIPTION_CHARS {
            warn!(
                "Page {}: description truncated to {} characters",
                candidate.page, MAX_DESCRIPTION_CHARS
            );
            d.chars().take(MAX_DESCRIPTION_CHARS).collect()
        } else {
            d.to_string()
        }
    });

    Ok(NewTransaction {
        user_id: provenance.user_id.to_string(),
        kind,
        category: non_blank(&candidate.category)
            .unwrap_or(DEFAULT_CATEGORY)
            .to_string(),
        subcategory: non_blank(&candidate.subcategory).map(str::to_string),
        amount,
        currency: non_blank(&candidate.currency)
            .unwrap_or(provenance.default_currency)
            .to_ascii_uppercase(),
        date,
        description,
        payment_method: non_blank(&candidate.payment_method)
            .map(PaymentMethod::from_model_text)
            .unwrap_or_default(),
        tags: candidate
            .tags
            .iter()
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .collect(),
        source: TransactionSource::Receipt,
        receipt_image_url: None,
        is_deleted: false,
        status: TransactionStatus::Confirmed,
        metadata: TransactionMetadata {
            extracted_from_ocr: true,
            edited_by_user: false,
            ocr_raw_text: Some(provenance.raw_text.to_string()),
            pdf_filename: provenance.pdf_filename.map(str::to_string),
            confidence_score: Some(provenance.confidence.clamp(0.0, 1.0)),
            ocr_page: Some(candidate.page),
        },
    })
}

fn non_blank(field: &Option<String>) -> Option<&str> {
    field.as_deref().map(str::trim).filter(|s| !s.is_empty())
}

/// Month-name forms. Purely numeric dates go through [`numeric_date_formats`].
const TEXT_DATE_FORMATS: &[&str] = &[
    "%d %B %Y",
    "%d %b %Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%B %d %Y",
    "%b %d %Y",
];

const DATETIME_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f", "%Y-%m-%dT%H:%M"];

/// Earliest year accepted on a receipt.
const MIN_YEAR: i32 = 1000;

/// Read a calendar date from model text.
///
/// ISO 8601 dates and timestamps are tried first. Numeric dates are matched
/// on the shape of their digit groups: a four-digit first group is read
/// year-first; otherwise the date is read day-first, then month-first when
/// that is the only valid reading. A two-digit last group is a two-digit
/// year.
pub fn parse_date(value: &str) -> Result<NaiveDate, ReceiptError> {
    let s = value.trim();
    let invalid = || ReceiptError::InvalidDate {
        value: value.to_string(),
    };

    let parsed = if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        Some(dt.date_naive())
    } else if let Some(dt) = DATETIME_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
    {
        Some(dt.date())
    } else if let Some(formats) = numeric_date_formats(s) {
        formats
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    } else {
        TEXT_DATE_FORMATS
            .iter()
            .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
    };

    match parsed {
        Some(d) if d.year() >= MIN_YEAR => Ok(d),
        _ => Err(invalid()),
    }
}

/// Candidate formats, in order, for three digit groups joined by one of
/// `/`, `-` or `.`. `None` when `s` is not shaped like that.
fn numeric_date_formats(s: &str) -> Option<Vec<String>> {
    let sep = s.chars().find(|c| matches!(c, '/' | '-' | '.'))?;
    let groups: Vec<&str> = s.split(sep).collect();
    let well_formed = groups.len() == 3
        && groups
            .iter()
            .all(|g| !g.is_empty() && g.bytes().all(|b| b.is_ascii_digit()));
    if !well_formed || groups[1].len() > 2 {
        return None;
    }

    let orders: &[[&str; 3]] = match (groups[0].len(), groups[2].len()) {
        (4, 1..=2) => &[["%Y", "%m", "%d"]],
        (1..=2, 4) => &[["%d", "%m", "%Y"], ["%m", "%d", "%Y"]],
        (1..=2, 2) => &[["%d", "%m", "%y"], ["%m", "%d", "%y"]],
        _ => &[],
    };
    let sep = sep.to_string();
    Some(orders.iter().map(|order| order.join(sep.as_str())).collect())
}
