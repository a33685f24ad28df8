//! JSON replies of the upload endpoint.
//!
//! | Outcome | Status | Body |
//! |---|---|---|
//! | one record saved | 200 | the record |
//! | several records saved | 200 | array of records |
//! | nothing found | 200 | `{"message": "No transactions detected in this receipt."}` |
//! | caller / validation error | 400, 413 | `{"message": ...}` |
//! | upstream or internal error | 500 | `{"message": ..., "error": ...}` |
//!
//! The CLI prints the same bodies, so both surfaces agree.

use crate::error::ReceiptError;
use crate::ingest::{IngestOutcome, IngestReport};
use serde_json::{json, Value};

pub const NO_TRANSACTIONS_MESSAGE: &str = "No transactions detected in this receipt.";

/// Status code and JSON body for one upload.
#[derive(Debug, Clone, PartialEq)]
pub struct Reply {
    pub status: u16,
    pub body: Value,
}

impl Reply {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Reply for a completed upload.
pub fn outcome_reply(outcome: &IngestOutcome) -> Reply {
    let body = match outcome {
        IngestOutcome::NoTransactionsFound => json!({ "message": NO_TRANSACTIONS_MESSAGE }),
        IngestOutcome::Saved(records) if records.len() == 1 => {
            serde_json::to_value(&records[0]).unwrap_or(Value::Null)
        }
        IngestOutcome::Saved(records) => serde_json::to_value(records).unwrap_or(Value::Null),
    };
    Reply { status: 200, body }
}

/// Reply for a failed upload.
pub fn error_reply(err: &ReceiptError) -> Reply {
    let status = err.status_code();
    let body = match err {
        _ if status < 500 => json!({ "message": err.to_string() }),
        ReceiptError::UpstreamService { service, detail } => json!({
            "message": format!("{service} API error"),
            "error": detail,
        }),
        ReceiptError::UpstreamTimeout { service, .. } => json!({
            "message": format!("{service} API error"),
            "error": err.to_string(),
        }),
        _ => json!({
            "message": "Failed to process receipt",
            "error": err.to_string(),
        }),
    };
    Reply { status, body }
}

/// Reply for either branch of an ingestion result.
pub fn report_reply(result: &Result<IngestReport, ReceiptError>) -> Reply {
    match result {
        Ok(report) => outcome_reply(&report.outcome),
        Err(e) => error_reply(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        NewTransaction, PaymentMethod, PersistedTransaction, TransactionMetadata,
        TransactionSource, TransactionStatus, TransactionType,
    };
    use chrono::{NaiveDate, Utc};

    fn saved(amount: f64) -> PersistedTransaction {
        PersistedTransaction::stamp(
            NewTransaction {
                user_id: "u1".into(),
                kind: TransactionType::Expense,
                category: "Dining".into(),
                subcategory: None,
                amount,
                currency: "INR".into(),
                date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
                description: Some("Dinner".into()),
                payment_method: PaymentMethod::Card,
                tags: vec![],
                source: TransactionSource::Receipt,
                receipt_image_url: None,
                is_deleted: false,
                status: TransactionStatus::Confirmed,
                metadata: TransactionMetadata {
                    extracted_from_ocr: true,
                    ocr_page: Some(1),
                    ..Default::default()
                },
            },
            Utc::now(),
        )
    }

    #[test]
    fn single_record_is_an_object() {
        let r = outcome_reply(&IngestOutcome::Saved(vec![saved(450.0)]));
        assert_eq!(r.status, 200);
        assert!(r.body.is_object());
        assert_eq!(r.body["source"], "receipt");
        assert_eq!(r.body["metadata"]["ocrPage"], 1);
        assert_eq!(r.body["date"], "2024-03-01");
    }

    #[test]
    fn several_records_are_an_array() {
        let r = outcome_reply(&IngestOutcome::Saved(vec![saved(1.0), saved(2.0)]));
        assert_eq!(r.body.as_array().map(Vec::len), Some(2));
    }

    #[test]
    fn nothing_found_is_a_success_message() {
        let r = outcome_reply(&IngestOutcome::NoTransactionsFound);
        assert!(r.is_success());
        assert_eq!(r.body, json!({ "message": NO_TRANSACTIONS_MESSAGE }));
    }

    #[test]
    fn validation_error_is_400_message() {
        let r = error_reply(&ReceiptError::MissingField { field: "amount" });
        assert_eq!(r.status, 400);
        assert_eq!(r.body, json!({ "message": "Missing required field: amount" }));
    }

    #[test]
    fn upstream_error_is_500_with_detail() {
        let r = error_reply(&ReceiptError::upstream("Gemini", "status 403: API key invalid"));
        assert_eq!(r.status, 500);
        assert_eq!(r.body["message"], "Gemini API error");
        assert_eq!(r.body["error"], "status 403: API key invalid");
    }

    #[test]
    fn store_error_is_500() {
        let r = error_reply(&ReceiptError::Store("disk full".into()));
        assert_eq!(r.status, 500);
        assert_eq!(r.body["message"], "Failed to process receipt");
    }
}
