use std::sync::LazyLock;
use std::time::Duration;

use regex::Regex;
use serde_json::Value;

static REQUEST_ID_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#""id"\s*:\s*(\d+|"[^"]*")"#).expect("valid request id regex")
});

pub fn client(timeout: Duration) -> reqwest::Result<reqwest::Client> {
    reqwest::Client::builder().timeout(timeout).build()
}

/// Best-effort `id` recovery from a line that failed to parse, so the parse
/// error can still be correlated by the client. Digits become an integer id,
/// a quoted value a string id; anything else is `null`.
pub fn extract_request_id(line: &str) -> Value {
    let Some(raw) = REQUEST_ID_PATTERN
        .captures(line)
        .and_then(|caps| caps.get(1))
        .map(|m| m.as_str())
    else {
        return Value::Null;
    };

    if let Some(quoted) = raw.strip_prefix('"') {
        return Value::String(quoted.trim_end_matches('"').to_string());
    }
    raw.parse::<u64>()
        .map(Value::from)
        .unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// First `max_chars` characters of `text`, with `...` appended when cut.
pub fn preview(text: &str, max_chars: usize) -> String {
    let mut chars = text.char_indices();
    match chars.nth(max_chars) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}

pub fn parse_response_body(bytes: &[u8]) -> Value {
    if bytes.is_empty() {
        return Value::Null;
    }
    serde_json::from_slice(bytes)
        .unwrap_or_else(|_| Value::String(String::from_utf8_lossy(bytes).to_string()))
}

pub fn to_pretty_json(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extract_request_id_reads_numbers_and_strings() {
        assert_eq!(extract_request_id(r#"{"id": 42, "method": "x""#), json!(42));
        assert_eq!(extract_request_id(r#"{"id":"abc-1","method":"#), json!("abc-1"));
        assert_eq!(extract_request_id("not json at all"), Value::Null);
        assert_eq!(extract_request_id(r#"{"id": null,"#), Value::Null);
    }

    #[test]
    fn preview_truncates_on_char_boundary() {
        assert_eq!(preview("abcdef", 3), "abc...");
        assert_eq!(preview("abc", 3), "abc");
        assert_eq!(preview("ééé", 2), "éé...");
    }

    #[test]
    fn parse_response_body_falls_back_to_text() {
        assert_eq!(parse_response_body(b""), Value::Null);
        assert_eq!(parse_response_body(br#"{"ok":true}"#), json!({"ok": true}));
        assert_eq!(parse_response_body(b"healthy"), json!("healthy"));
    }
}
