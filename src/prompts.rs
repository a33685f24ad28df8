//! Prompts for receipt-to-transaction extraction.
//!
//! Both prompts share one record schema so the multi-record call and the
//! single-record fallback agree on field names. Unit tests inspect the
//! rendered prompts directly.

/// Record schema shown to the model, in the JSON-ish notation models follow
/// most reliably.
pub const TRANSACTION_SCHEMA: &str = r#"{ "type": "income" | "expense", "category": "string", "subcategory": "string (optional)", "amount": number (no currency symbol), "currency": "string", "date": "ISO 8601 date string", "description": "short transaction note", "paymentMethod": "cash" | "card" | "upi" | "bank_transfer" | "other", "tags": ["string"] }"#;

/// Build the multi-record prompt for one page of receipt text.
pub fn multi_record_prompt(page_text: &str) -> String {
    format!(
        "Extract all financial transactions from this receipt page text. \
If there are multiple bills or transactions, return a JSON array of objects, each matching this schema: {TRANSACTION_SCHEMA}. \
If there is only one transaction, return an array with a single object. \
If no transaction is found, return an empty array []. \
Do not return explanations or markdown, only the JSON array.\n\n\
Receipt page text: {page_text}"
    )
}

/// Build the single-record fallback prompt for one page of receipt text.
pub fn single_record_prompt(page_text: &str) -> String {
    format!(
        "Extract a single financial transaction from this receipt page text. \
Return one JSON object matching this schema: {TRANSACTION_SCHEMA}. \
If no transaction is found, return {{}}. \
Do not return explanations or markdown, only the JSON object.\n\n\
Receipt page text: {page_text}"
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn multi_prompt_embeds_page_and_allows_empty() {
        let p = multi_record_prompt("Total: 450.00");
        assert!(p.ends_with("Receipt page text: Total: 450.00"));
        assert!(p.contains("empty array []"));
        assert!(p.contains("\"paymentMethod\""));
        assert!(p.contains("only the JSON array"));
    }

    #[test]
    fn single_prompt_asks_for_object() {
        let p = single_record_prompt("Total: 450.00");
        assert!(p.contains("return {}"));
        assert!(p.contains("only the JSON object"));
        assert!(p.contains(TRANSACTION_SCHEMA));
    }
}
