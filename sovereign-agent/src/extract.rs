//! Structured output extraction.
//!
//! Models wrap JSON in prose, markdown fences or trailing commentary, and
//! sometimes stop mid-object. Extraction first tries the whole trimmed
//! text, then scans for bracket-balanced candidates starting at the first
//! opening brace or bracket, preferring the longest one that parses.

use serde_json::Value;

/// Recover a JSON structure from free-form model text.
///
/// Returns `None` when no balanced candidate parses.
pub fn extract_structured(text: &str) -> Option<Value> {
    let trimmed = text.trim();
    if trimmed.is_empty() {
        return None;
    }
    if let Ok(value) = serde_json::from_str(trimmed) {
        return Some(value);
    }

    let bytes = trimmed.as_bytes();
    let mut from = 0;
    while let Some(offset) = bytes[from..].iter().position(|b| *b == b'{' || *b == b'[') {
        let start = from + offset;
        for end in balanced_ends(bytes, start).into_iter().rev() {
            if let Ok(value) = serde_json::from_str(&trimmed[start..=end]) {
                return Some(value);
            }
        }
        // Opening bracket was prose, not JSON; try the next one.
        from = start + 1;
    }
    None
}

/// Positions at which the bracket depth opened at `start` returns to zero.
///
/// Brackets inside string literals (including escaped quotes) are ignored.
fn balanced_ends(bytes: &[u8], start: usize) -> Vec<usize> {
    let mut ends = Vec::new();
    let mut depth: i64 = 0;
    let mut in_string = false;
    let mut escaped = false;

    for (i, &b) in bytes.iter().enumerate().skip(start) {
        if in_string {
            if escaped {
                escaped = false;
            } else if b == b'\\' {
                escaped = true;
            } else if b == b'"' {
                in_string = false;
            }
            continue;
        }

        match b {
            b'"' => in_string = true,
            b'{' | b'[' => depth += 1,
            b'}' | b']' => {
                depth -= 1;
                if depth == 0 {
                    ends.push(i);
                } else if depth < 0 {
                    break;
                }
            }
            _ => {}
        }
    }
    ends
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_canonical_text_is_unchanged() {
        let value = json!({"a": [1, 2, {"b": "c"}], "d": null});
        let text = serde_json::to_string(&value).unwrap();
        assert_eq!(extract_structured(&text), Some(value));
    }

    #[test]
    fn test_prose_wrapped() {
        let text = "Here is the decision you asked for: {\"verdict\": \"APPROVED\"} Let me know!";
        assert_eq!(extract_structured(text), Some(json!({"verdict": "APPROVED"})));
    }

    #[test]
    fn test_markdown_fence() {
        let text = "```json\n{\"mission_id\": \"M-1\", \"kpis\": [\"x\"]}\n```";
        assert_eq!(
            extract_structured(text),
            Some(json!({"mission_id": "M-1", "kpis": ["x"]}))
        );
    }

    #[test]
    fn test_brackets_inside_strings() {
        let text = r#"Result: {"note": "use } and ] carefully", "quote": "say \"{hi}\""} end"#;
        assert_eq!(
            extract_structured(text),
            Some(json!({"note": "use } and ] carefully", "quote": "say \"{hi}\""}))
        );
    }

    #[test]
    fn test_trailing_braces_in_prose() {
        let text = "{\"a\": 1} and then some {unbalanced} junk }";
        assert_eq!(extract_structured(text), Some(json!({"a": 1})));
    }

    #[test]
    fn test_truncated_output_is_not_found() {
        assert_eq!(extract_structured("{\"a\": {\"b\": [1, 2"), None);
        assert_eq!(extract_structured("I cannot help with that."), None);
        assert_eq!(extract_structured("   "), None);
    }

    #[test]
    fn test_prose_bracket_before_json() {
        let text = "[draft] final answer: {\"ok\": true}";
        assert_eq!(extract_structured(text), Some(json!({"ok": true})));
    }

    #[test]
    fn test_array_payload() {
        let text = "rows follow\n[{\"hs_code\": \"8542.31.00\"}]\nthanks";
        assert_eq!(extract_structured(text), Some(json!([{"hs_code": "8542.31.00"}])));
    }

    #[test]
    fn test_multibyte_text_around_json() {
        let text = "résumé → {\"city\": \"Abu Dhabi — UAE\"} ✓";
        assert_eq!(extract_structured(text), Some(json!({"city": "Abu Dhabi — UAE"})));
    }
}
