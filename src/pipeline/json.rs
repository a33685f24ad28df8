//! Recover a JSON value from a model's free-form text response.
//!
//! Models are asked for bare JSON but routinely wrap it in Markdown fences,
//! prefix it with prose ("Here are the transactions:"), or trail commentary
//! after it. Recovery runs three passes and returns the first success:
//!
//! 1. The body of the first fenced block (```` ```json … ``` ````), if any.
//! 2. The whole response, trimmed.
//! 3. A left-to-right scan for the first *balanced* `[…]` or `{…}` span
//!    (string- and escape-aware) that parses.
//!
//! Every pass is a pure function of the input, so feeding the same text
//! twice always yields the same value.

use once_cell::sync::Lazy;
use regex::Regex;
use serde_json::Value;

static RE_FENCED_BLOCK: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)```[ \t]*(?:json[c5]?)?[ \t]*\r?\n?(.*?)```").unwrap());

/// Recover the first well-formed JSON array or object in `text`.
pub fn recover_json(text: &str) -> Option<Value> {
    if let Some(caps) = RE_FENCED_BLOCK.captures(text) {
        let inner = caps[1].trim();
        if let Some(v) = parse_container(inner).or_else(|| scan_balanced(inner)) {
            return Some(v);
        }
    }

    parse_container(text.trim()).or_else(|| scan_balanced(text))
}

/// Flatten a recovered value into candidate record values.
///
/// * array → its elements
/// * non-empty object → a one-element list, or, when it merely wraps a
///   single array field (`{"transactions": [...]}`), that array's elements
/// * anything else → empty
pub fn candidate_values(value: Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items,
        Value::Object(map) if map.is_empty() => Vec::new(),
        Value::Object(map) => {
            if !map.contains_key("type") && map.len() == 1 {
                if let Some(Value::Array(_)) = map.values().next() {
                    let (_, inner) = map.into_iter().next().unwrap_or_default();
                    return candidate_values(inner);
                }
            }
            vec![Value::Object(map)]
        }
        _ => Vec::new(),
    }
}

/// Strict parse that only accepts arrays and objects.
fn parse_container(s: &str) -> Option<Value> {
    match serde_json::from_str::<Value>(s) {
        Ok(v @ (Value::Array(_) | Value::Object(_))) => Some(v),
        _ => None,
    }
}

/// Opening brackets tried by [`scan_balanced`] before giving up.
const MAX_SCAN_ATTEMPTS: usize = 64;

/// Try balanced bracket spans left to right, at most
/// [`MAX_SCAN_ATTEMPTS`] of them.
fn scan_balanced(text: &str) -> Option<Value> {
    let bytes = text.as_bytes();
    let mut start = 0;
    let mut attempts = 0;
    while let Some(offset) = bytes[start..].iter().position(|&b| b == b'[' || b == b'{') {
        attempts += 1;
        if attempts > MAX_SCAN_ATTEMPTS {
            return None;
        }
        let open = start + offset;
        if let Some(close) = matching_close(bytes, open) {
            if let Some(v) = parse_container(&text[open..=close]) {
                return Some(v);
            }
        }
        start = open + 1;
    }
    None
}

/// Index of the bracket closing the one at `open`, skipping brackets that
/// appear inside JSON strings.
fn matching_close(bytes: &[u8], open: usize) -> Option<usize> {
    let mut stack: Vec<u8> = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(open) {
        if in_string {
            match b {
                _ if escaped => escaped = false,
                b'\\' => escaped = true,
                b'"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match b {
            b'"' => in_string = true,
            b'[' => stack.push(b']'),
            b'{' => stack.push(b'}'),
            b']' | b'}' => {
                if stack.pop() != Some(b) {
                    return None;
                }
                if stack.is_empty() {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn bare_array() {
        let v = recover_json(r#"[{"type":"expense","amount":450}]"#).unwrap();
        assert_eq!(v, json!([{"type": "expense", "amount": 450}]));
    }

    #[test]
    fn fenced_array_with_prose() {
        let text = "Sure! Here is what I found:\n```json\n[{\"type\":\"expense\",\"amount\":12.5}]\n```\nLet me know if you need more.";
        assert_eq!(
            recover_json(text).unwrap(),
            json!([{"type": "expense", "amount": 12.5}])
        );
    }

    #[test]
    fn fence_without_language_tag() {
        let text = "```\n{\"type\":\"income\"}\n```";
        assert_eq!(recover_json(text).unwrap(), json!({"type": "income"}));
    }

    #[test]
    fn uppercase_fence_tag_on_same_line() {
        let text = "```JSON [1, 2] ```";
        assert_eq!(recover_json(text).unwrap(), json!([1, 2]));
    }

    #[test]
    fn prose_before_and_after_object() {
        let text = "The transaction is {\"type\": \"expense\", \"note\": \"a } inside\"} -- hope this helps [citation]";
        assert_eq!(
            recover_json(text).unwrap(),
            json!({"type": "expense", "note": "a } inside"})
        );
    }

    #[test]
    fn skips_unparseable_bracket_spans() {
        let text = "[see below] {\"type\": \"expense\"}";
        assert_eq!(recover_json(text).unwrap(), json!({"type": "expense"}));
    }

    #[test]
    fn escaped_quotes_inside_strings() {
        let text = r#"result: {"description": "He said \"hi\" [sic]", "amount": 1}"#;
        assert_eq!(
            recover_json(text).unwrap(),
            json!({"description": "He said \"hi\" [sic]", "amount": 1})
        );
    }

    #[test]
    fn broken_fence_falls_back_to_scan() {
        let text = "```json\n[{\"type\": \"expense\",}]\n```\nActually: [{\"type\": \"income\"}]";
        assert_eq!(recover_json(text).unwrap(), json!([{"type": "income"}]));
    }

    #[test]
    fn truncated_output_is_none() {
        assert!(recover_json("[{\"type\": \"expense\", \"amount\": 4").is_none());
    }

    #[test]
    fn plain_prose_is_none() {
        assert!(recover_json("I could not find any transactions on this page.").is_none());
        assert!(recover_json("").is_none());
    }

    #[test]
    fn scalars_are_not_recovered() {
        assert!(recover_json("42").is_none());
        assert!(recover_json("\"expense\"").is_none());
    }

    #[test]
    fn mismatched_brackets_are_rejected() {
        assert!(recover_json("[{]}").is_none());
    }

    #[test]
    fn nested_arrays_keep_outermost() {
        let v = recover_json("data: [[1], [2]] end").unwrap();
        assert_eq!(v, json!([[1], [2]]));
    }

    #[test]
    fn same_text_twice_yields_same_value() {
        let text = "```json\n[{\"type\":\"expense\",\"amount\":3,\"date\":\"2024-01-01\"}]\n```";
        assert_eq!(recover_json(text), recover_json(text));
    }

    #[test]
    fn candidate_values_shapes() {
        assert_eq!(candidate_values(json!([{"a": 1}, {"b": 2}])).len(), 2);
        assert_eq!(candidate_values(json!({"type": "expense"})).len(), 1);
        assert!(candidate_values(json!({})).is_empty());
        assert!(candidate_values(json!([])).is_empty());
        assert!(candidate_values(json!("text")).is_empty());
    }

    #[test]
    fn candidate_values_unwraps_single_array_field() {
        let v = json!({"transactions": [{"type": "expense"}, {"type": "income"}]});
        let items = candidate_values(v);
        assert_eq!(items.len(), 2);
        assert_eq!(items[1]["type"], "income");
    }

    #[test]
    fn unbalanced_bracket_noise_gives_up() {
        let noise = "[{".repeat(20_000);
        assert!(recover_json(&noise).is_none());

        let late = format!("{} [{{\"type\":\"expense\"}}]", "[x ".repeat(MAX_SCAN_ATTEMPTS + 1));
        assert!(recover_json(&late).is_none());

        let early = format!("{} [{{\"type\":\"expense\"}}]", "[x ".repeat(3));
        assert!(recover_json(&early).is_some());
    }
}
