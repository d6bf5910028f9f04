//! Extracting a structured reply from free-form model output. Models
//! wrap their JSON in prose, smart quotes, markdown fences, stray
//! control characters, and unescaped LaTeX backslashes; each repair
//! heuristic is a named stage here so its effect is testable in
//! isolation and the set can be reordered without touching the
//! dispatcher.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::OracleError;

/// The parsed structured reply for a chat turn. Transient; its fields
/// feed the message list and the memory reconciler.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct OracleResponse {
    pub answer: String,
    pub memory: String,
    #[serde(rename = "sessionForTopicDone")]
    pub session_for_topic_done: bool,
}

/// Locate the first `{` and scan forward tracking brace depth to find
/// its matching `}`. Braces inside string values are ignored, so a
/// stray `}` in an answer cannot truncate the object early.
pub fn extract_balanced_object(raw: &str) -> Option<&str> {
    let start = raw.find('{')?;
    let bytes = raw.as_bytes();
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &b) in bytes[start..].iter().enumerate() {
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
            b'{' => depth += 1,
            b'}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&raw[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// Stage: smart quotes to straight quotes.
pub fn normalize_quotes(input: &str) -> String {
    input
        .replace(['\u{201c}', '\u{201d}'], "\"")
        .replace(['\u{2018}', '\u{2019}'], "'")
}

/// Stage: strip zero-width and invisible Unicode characters that some
/// models emit mid-token.
pub fn strip_invisible(input: &str) -> String {
    input
        .chars()
        .filter(|c| !matches!(c, '\u{200b}' | '\u{200c}' | '\u{200d}' | '\u{feff}' | '\u{2060}'))
        .collect()
}

/// Stage: remove trailing commas before a closing brace or bracket.
pub fn strip_trailing_commas(input: &str) -> String {
    static TRAILING_COMMA: std::sync::LazyLock<regex::Regex> =
        std::sync::LazyLock::new(|| regex::Regex::new(r",\s*([}\]])").unwrap());
    TRAILING_COMMA.replace_all(input, "$1").into_owned()
}

/// Stage: escape any backslash that is not already part of a valid
/// JSON escape sequence. Needed for answers containing raw LaTeX
/// (`\sqrt`, `\alpha`) that the model forgot to double. LaTeX commands
/// whose first letter collides with a real escape (`\frac`, `\times`)
/// are beyond repair at this layer and the prompt asks for doubled
/// backslashes to avoid them.
pub fn escape_stray_backslashes(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek().copied() {
            Some(next @ ('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u')) => {
                out.push('\\');
                out.push(next);
                chars.next();
            }
            _ => out.push_str("\\\\"),
        }
    }
    out
}

/// Run every sanitation stage in order.
pub fn sanitize(input: &str) -> String {
    let cleaned = strip_invisible(input);
    let cleaned = normalize_quotes(&cleaned);
    strip_trailing_commas(&cleaned)
}

/// Extract, sanitize, and parse one JSON object out of raw model
/// output. Returns a typed failure rather than panicking so the
/// dispatcher can treat it as a next-model condition. The plain parse
/// is tried before the backslash repair since the repair can mangle
/// output that was already valid.
pub fn extract_json(raw: &str) -> Result<Value, OracleError> {
    let candidate = extract_balanced_object(raw).ok_or_else(|| {
        OracleError::MalformedResponse("no balanced JSON object in model output".to_string())
    })?;
    let cleaned = sanitize(candidate);

    match serde_json::from_str(&cleaned) {
        Ok(value) => Ok(value),
        Err(first_err) => {
            let repaired = escape_stray_backslashes(&cleaned);
            serde_json::from_str(&repaired).map_err(|_| {
                tracing::warn!("Model output failed to parse after sanitization: {}", first_err);
                OracleError::MalformedResponse(first_err.to_string())
            })
        }
    }
}

/// Parse and shape-validate the chat reply. A structurally valid
/// object missing a required field is still a failure; the reconciler
/// never sees a partial response.
pub fn parse_oracle_response(raw: &str) -> Result<OracleResponse, OracleError> {
    let value = extract_json(raw)?;
    let answer = require_str(&value, "answer")?;
    let memory = require_str(&value, "memory")?;
    let done = value
        .get("sessionForTopicDone")
        .and_then(Value::as_bool)
        .ok_or_else(|| missing_field("sessionForTopicDone"))?;
    Ok(OracleResponse {
        answer,
        memory,
        session_for_topic_done: done,
    })
}

fn require_str(value: &Value, field: &str) -> Result<String, OracleError> {
    value
        .get(field)
        .and_then(Value::as_str)
        .map(String::from)
        .ok_or_else(|| missing_field(field))
}

fn missing_field(field: &str) -> OracleError {
    OracleError::MalformedResponse(format!("missing or mistyped field `{}`", field))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extracts_object_from_surrounding_prose() {
        let raw = "Sure! Here's the result: {\"answer\": \"Good try!\", \"memory\": \"Name: Alex\", \"sessionForTopicDone\": true} Hope that helps!";
        let resp = parse_oracle_response(raw).unwrap();
        assert_eq!(resp.answer, "Good try!");
        assert_eq!(resp.memory, "Name: Alex");
        assert!(resp.session_for_topic_done);
    }

    #[test]
    fn test_balanced_extraction_ignores_braces_in_strings() {
        // An unmatched `}` inside a string value must not truncate the
        // object early.
        let raw = r#"noise {"answer":"close with } then keep {x} going","memory":"m","sessionForTopicDone":false} tail"#;
        let resp = parse_oracle_response(raw).unwrap();
        assert_eq!(resp.answer, "close with } then keep {x} going");
    }

    #[test]
    fn test_nested_objects() {
        let raw = r#"{"outer": {"inner": {"deep": 1}}, "answer":"a","memory":"m","sessionForTopicDone":false}"#;
        let extracted = extract_balanced_object(raw).unwrap();
        assert_eq!(extracted, raw);
    }

    #[test]
    fn test_no_object_fails() {
        assert!(matches!(
            parse_oracle_response("no json here at all"),
            Err(OracleError::MalformedResponse(_))
        ));
        assert!(extract_balanced_object("{ never closed").is_none());
    }

    #[test]
    fn test_smart_quotes_and_trailing_commas() {
        let raw = "{\u{201c}answer\u{201d}: \u{201c}hi\u{201d}, \"memory\": \"m\", \"sessionForTopicDone\": false,}";
        let resp = parse_oracle_response(raw).unwrap();
        assert_eq!(resp.answer, "hi");
    }

    #[test]
    fn test_zero_width_characters_are_stripped() {
        let raw = "{\"answer\":\u{200b} \"ok\", \"memory\": \"m\"\u{feff}, \"sessionForTopicDone\": false}";
        let resp = parse_oracle_response(raw).unwrap();
        assert_eq!(resp.answer, "ok");
    }

    #[test]
    fn test_unescaped_latex_backslashes_are_repaired() {
        let raw = r#"{"answer": "use \sqrt{16} here", "memory": "m", "sessionForTopicDone": false}"#;
        let resp = parse_oracle_response(raw).unwrap();
        assert_eq!(resp.answer, r"use \sqrt{16} here");
    }

    #[test]
    fn test_valid_escapes_survive_repair() {
        let input = r#"line\nbreak and \"quote\" and \\slash"#;
        assert_eq!(escape_stray_backslashes(input), input);
        assert_eq!(escape_stray_backslashes(r"\sqrt{2}"), r"\\sqrt{2}");
    }

    #[test]
    fn test_missing_field_is_a_failure() {
        // Valid JSON, but no memory field: validation must reject it.
        let raw = r#"{"answer": "a", "sessionForTopicDone": true}"#;
        assert!(matches!(
            parse_oracle_response(raw),
            Err(OracleError::MalformedResponse(_))
        ));
    }

    #[test]
    fn test_mistyped_field_is_a_failure() {
        let raw = r#"{"answer": "a", "memory": "m", "sessionForTopicDone": "yes"}"#;
        assert!(parse_oracle_response(raw).is_err());
    }

    #[test]
    fn test_stage_trailing_commas_only() {
        assert_eq!(strip_trailing_commas(r#"{"a": [1,2,], }"#), r#"{"a": [1,2]}"#);
    }
}
