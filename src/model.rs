//! Transaction records: what the model proposes and what the store keeps.
//!
//! [`ExtractionCandidate`] is deliberately loose: every field is optional and
//! the deserialisers accept the shapes models actually emit (`"450.00"`
//! instead of `450`, a bare string instead of a tag list). The strict shape
//! lives in [`NewTransaction`], produced only by
//! [`crate::pipeline::validate`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Maximum stored length of a transaction description, in characters.
pub const MAX_DESCRIPTION_CHARS: usize = 500;

// ── Enums ────────────────────────────────────────────────────────────────

/// Direction of money flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionType {
    Income,
    Expense,
}

impl FromStr for TransactionType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "income" => Ok(TransactionType::Income),
            "expense" => Ok(TransactionType::Expense),
            other => Err(other.to_string()),
        }
    }
}

impl fmt::Display for TransactionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransactionType::Income => f.write_str("income"),
            TransactionType::Expense => f.write_str("expense"),
        }
    }
}

/// How a transaction was paid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentMethod {
    Cash,
    Card,
    Upi,
    BankTransfer,
    #[default]
    Other,
}

impl PaymentMethod {
    /// Map free model text onto the enum. Unknown values become `Other`.
    pub fn from_model_text(s: &str) -> Self {
        let norm = s.trim().to_ascii_lowercase().replace([' ', '-'], "_");
        match norm.as_str() {
            "cash" => PaymentMethod::Cash,
            "card" | "credit_card" | "debit_card" | "visa" | "mastercard" => PaymentMethod::Card,
            "upi" => PaymentMethod::Upi,
            "bank_transfer" | "banktransfer" | "neft" | "imps" | "wire" => {
                PaymentMethod::BankTransfer
            }
            _ => PaymentMethod::Other,
        }
    }
}

/// Where a record came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionSource {
    #[default]
    Manual,
    Receipt,
    Pdf,
    Imported,
}

/// Review state of a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    #[default]
    Confirmed,
    Pending,
    Flagged,
}

// ── Candidate ────────────────────────────────────────────────────────────

/// A transaction-shaped record proposed by the model for one page.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExtractionCandidate {
    #[serde(rename = "type", default, deserialize_with = "lenient_string")]
    pub kind: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub subcategory: Option<String>,
    #[serde(default, deserialize_with = "lenient_amount")]
    pub amount: Option<f64>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub currency: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub date: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub description: Option<String>,
    #[serde(default, deserialize_with = "lenient_string")]
    pub payment_method: Option<String>,
    #[serde(default, deserialize_with = "lenient_tags")]
    pub tags: Vec<String>,
    /// 1-based page the candidate was extracted from.
    #[serde(skip)]
    pub page: usize,
}

impl ExtractionCandidate {
    /// Build a candidate from one JSON value the model produced.
    ///
    /// Returns `None` for non-objects, empty objects, and objects whose
    /// fields cannot be read even leniently.
    pub fn from_value(value: Value) -> Option<Self> {
        match &value {
            Value::Object(map) if !map.is_empty() => serde_json::from_value(value).ok(),
            _ => None,
        }
    }

    /// First required field (`type`, `amount`, `date`) that is absent,
    /// blank, or zero.
    pub fn missing_required_field(&self) -> Option<&'static str> {
        if is_blank(&self.kind) {
            return Some("type");
        }
        match self.amount {
            Some(a) if a != 0.0 && a.is_finite() => {}
            _ => return Some("amount"),
        }
        if is_blank(&self.date) {
            return Some("date");
        }
        None
    }

    pub fn has_required_fields(&self) -> bool {
        self.missing_required_field().is_none()
    }
}

fn is_blank(field: &Option<String>) -> bool {
    field.as_deref().is_none_or(|s| s.trim().is_empty())
}

fn lenient_string<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::String(s)) => Some(s),
        Some(Value::Number(n)) => Some(n.to_string()),
        _ => None,
    })
}

fn lenient_amount<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(amount_from_value))
}

/// Read a monetary amount from a number or a numeric string such as
/// `"₹1,234.50"`.
pub fn amount_from_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let cleaned: String = s
                .chars()
                .filter(|c| c.is_ascii_digit() || *c == '.' || *c == '-')
                .collect();
            cleaned.parse::<f64>().ok()
        }
        _ => None,
    }
}

fn lenient_tags<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(match value {
        Some(Value::Array(items)) => items
            .into_iter()
            .filter_map(|v| match v {
                Value::String(s) if !s.trim().is_empty() => Some(s),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .collect(),
        Some(Value::String(s)) if !s.trim().is_empty() => vec![s],
        _ => Vec::new(),
    })
}

// ── Persisted records ────────────────────────────────────────────────────

/// OCR provenance attached to every receipt-derived record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    #[serde(rename = "extractedFromOCR")]
    pub extracted_from_ocr: bool,
    pub edited_by_user: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_raw_text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pdf_filename: Option<String>,
    /// OCR reliability as a fraction in `[0, 1]`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence_score: Option<f64>,
    /// 1-based page index of the originating page.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ocr_page: Option<usize>,
}

/// A validated record ready for the store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewTransaction {
    pub user_id: String,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub category: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subcategory: Option<String>,
    /// Non-negative magnitude; the direction lives in `kind`.
    pub amount: f64,
    pub currency: String,
    pub date: NaiveDate,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub payment_method: PaymentMethod,
    pub tags: Vec<String>,
    pub source: TransactionSource,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receipt_image_url: Option<String>,
    pub is_deleted: bool,
    pub status: TransactionStatus,
    pub metadata: TransactionMetadata,
}

/// A record as owned by the store: identifier and timestamps added.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedTransaction {
    #[serde(rename = "_id")]
    pub id: Uuid,
    #[serde(flatten)]
    pub record: NewTransaction,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl PersistedTransaction {
    /// Stamp a fresh identifier and creation time onto a record.
    pub fn stamp(record: NewTransaction, now: DateTime<Utc>) -> Self {
        Self {
            id: Uuid::new_v4(),
            record,
            created_at: now,
            updated_at: now,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn candidate_reads_model_shapes() {
        let c = ExtractionCandidate::from_value(json!({
            "type": "expense",
            "category": "Dining",
            "amount": "₹1,234.50",
            "currency": "INR",
            "date": "2024-03-01",
            "paymentMethod": "card",
            "tags": "food",
            "source": "receipt",
            "metadata": { "extractedFromOCR": true }
        }))
        .expect("object should parse");

        assert_eq!(c.kind.as_deref(), Some("expense"));
        assert_eq!(c.amount, Some(1234.5));
        assert_eq!(c.payment_method.as_deref(), Some("card"));
        assert_eq!(c.tags, vec!["food".to_string()]);
        assert!(c.has_required_fields());
    }

    #[test]
    fn empty_object_is_not_a_candidate() {
        assert!(ExtractionCandidate::from_value(json!({})).is_none());
        assert!(ExtractionCandidate::from_value(json!("text")).is_none());
        assert!(ExtractionCandidate::from_value(json!(null)).is_none());
    }

    #[test]
    fn required_fields_reported_in_order() {
        let mut c = ExtractionCandidate::default();
        assert_eq!(c.missing_required_field(), Some("type"));
        c.kind = Some("income".into());
        assert_eq!(c.missing_required_field(), Some("amount"));
        c.amount = Some(0.0);
        assert_eq!(c.missing_required_field(), Some("amount"));
        c.amount = Some(12.0);
        c.date = Some("   ".into());
        assert_eq!(c.missing_required_field(), Some("date"));
        c.date = Some("2024-01-02".into());
        assert_eq!(c.missing_required_field(), None);
    }

    #[test]
    fn payment_method_lenient_mapping() {
        assert_eq!(PaymentMethod::from_model_text("Bank Transfer"), PaymentMethod::BankTransfer);
        assert_eq!(PaymentMethod::from_model_text("credit-card"), PaymentMethod::Card);
        assert_eq!(PaymentMethod::from_model_text("UPI"), PaymentMethod::Upi);
        assert_eq!(PaymentMethod::from_model_text("cheque"), PaymentMethod::Other);
    }

    #[test]
    fn transaction_type_parse() {
        assert_eq!(" Expense ".parse::<TransactionType>(), Ok(TransactionType::Expense));
        assert!("refund".parse::<TransactionType>().is_err());
    }

    #[test]
    fn persisted_serialises_with_store_fields() {
        let record = NewTransaction {
            user_id: "u1".into(),
            kind: TransactionType::Expense,
            category: "Dining".into(),
            subcategory: None,
            amount: 450.0,
            currency: "INR".into(),
            date: NaiveDate::from_ymd_opt(2024, 3, 1).unwrap(),
            description: Some("Dinner".into()),
            payment_method: PaymentMethod::BankTransfer,
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
        };
        let saved = PersistedTransaction::stamp(record, Utc::now());
        let v = serde_json::to_value(&saved).unwrap();

        assert!(v.get("_id").is_some());
        assert_eq!(v["type"], "expense");
        assert_eq!(v["paymentMethod"], "bank_transfer");
        assert_eq!(v["date"], "2024-03-01");
        assert_eq!(v["metadata"]["ocrPage"], 1);
        assert_eq!(v["metadata"]["extractedFromOCR"], true);
        assert!(v.get("createdAt").is_some());

        let back: PersistedTransaction = serde_json::from_value(v).unwrap();
        assert_eq!(back, saved);
    }
}
