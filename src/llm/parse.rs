//! Lenient JSON extraction from model output
//!
//! Models wrap JSON in markdown fences, add trailing commas or smart quotes.
//! These helpers clean that up before handing the text to serde.

use crate::errors::LlmError;
use crate::util::truncate_str;
use serde_json::{Map, Value};

/// Strip markdown code fences from a response
pub fn strip_markdown_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let clean = if let Some(rest) = trimmed.strip_prefix("```json") {
        rest
    } else if let Some(rest) = trimmed.strip_prefix("```") {
        rest
    } else {
        trimmed
    };
    let clean = clean.strip_suffix("```").unwrap_or(clean);
    clean.trim()
}

/// Extract a JSON fragment between matching delimiters
pub fn extract_json_fragment(text: &str, open: char, close: char) -> Option<&str> {
    let start = text.find(open)?;
    let end = text.rfind(close)?;
    if start <= end {
        Some(&text[start..=end])
    } else {
        None
    }
}

/// Try to fix common JSON issues from LLM responses
pub fn fix_json_issues(json: &str) -> String {
    let mut fixed = json.to_string();

    // Trailing commas before ] or }
    fixed = fixed.replace(",]", "]");
    fixed = fixed.replace(",}", "}");
    fixed = fixed.replace(",\n]", "\n]");
    fixed = fixed.replace(",\n}", "\n}");

    fixed = fixed.replace(['\u{201C}', '\u{201D}'], "\"");
    fixed = fixed.replace(['\u{2018}', '\u{2019}'], "'");

    fixed
        .chars()
        .filter(|c| !c.is_control() || *c == '\n' || *c == '\t')
        .collect()
}

/// Parse a response that must be a JSON array.
///
/// A top-level object is a failure, not something to dig an array out of.
/// When the array itself is broken, any well-formed objects inside it are
/// salvaged.
pub fn parse_json_array(response: &str) -> Result<Vec<Value>, LlmError> {
    let clean = strip_markdown_fences(response);
    if clean.starts_with('{') {
        return Err(LlmError::InvalidResponse(
            "expected a JSON array, got an object".to_string(),
        ));
    }

    let fragment = extract_json_fragment(clean, '[', ']').ok_or_else(|| {
        LlmError::InvalidResponse(format!("no JSON array in response: {}", truncate_str(clean, 200)))
    })?;

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(fragment) {
        return Ok(items);
    }

    let fixed = fix_json_issues(fragment);
    match serde_json::from_str::<Value>(&fixed) {
        Ok(Value::Array(items)) => Ok(items),
        Ok(_) => Err(LlmError::InvalidResponse("expected a JSON array".to_string())),
        Err(err) => {
            let salvaged = split_top_level_objects(&fixed);
            if salvaged.is_empty() {
                Err(LlmError::InvalidResponse(format!(
                    "could not parse array ({}): {}",
                    err,
                    truncate_str(&fixed, 200)
                )))
            } else {
                Ok(salvaged)
            }
        }
    }
}

/// Parse a response that must be a single JSON object.
pub fn parse_json_object(response: &str) -> Result<Map<String, Value>, LlmError> {
    let clean = strip_markdown_fences(response);
    let fragment = extract_json_fragment(clean, '{', '}').ok_or_else(|| {
        LlmError::InvalidResponse(format!("no JSON object in response: {}", truncate_str(clean, 200)))
    })?;

    let value = match serde_json::from_str::<Value>(fragment) {
        Ok(value) => value,
        Err(_) => serde_json::from_str::<Value>(&fix_json_issues(fragment))?,
    };

    match value {
        Value::Object(map) => Ok(map),
        _ => Err(LlmError::InvalidResponse("expected a JSON object".to_string())),
    }
}

/// Pull every parseable `{...}` object out of a depth-scanned array body.
fn split_top_level_objects(json: &str) -> Vec<Value> {
    let inner = json
        .trim()
        .strip_prefix('[')
        .and_then(|s| s.strip_suffix(']'))
        .unwrap_or(json);

    let mut objects = Vec::new();
    let mut depth: i32 = 0;
    let mut start = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in inner.char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => {
                if depth == 0 {
                    start = Some(i);
                }
                depth += 1;
            }
            '}' => {
                if depth == 0 {
                    continue;
                }
                depth -= 1;
                if depth == 0 {
                    if let Some(s) = start.take() {
                        if let Ok(value @ Value::Object(_)) = serde_json::from_str::<Value>(&inner[s..=i]) {
                            objects.push(value);
                        }
                    }
                }
            }
            _ => {}
        }
    }

    objects
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_strip_markdown_fences() {
        assert_eq!(strip_markdown_fences("```json\n[1]\n```"), "[1]");
        assert_eq!(strip_markdown_fences("```\n{}\n```"), "{}");
        assert_eq!(strip_markdown_fences("  [2] "), "[2]");
    }

    #[test]
    fn test_extract_json_fragment() {
        assert_eq!(
            extract_json_fragment("Here you go: [1, 2] thanks", '[', ']'),
            Some("[1, 2]")
        );
        assert_eq!(extract_json_fragment("] backwards [", '[', ']'), None);
    }

    #[test]
    fn test_fix_json_issues() {
        let fixed = fix_json_issues("{\u{201C}a\u{201D}: 1,}");
        assert_eq!(fixed, "{\"a\": 1}");
    }

    #[test]
    fn test_parse_json_array_with_fences_and_prose() {
        let items = parse_json_array("```json\n[{\"id\": 0}, {\"id\": 1}]\n```").unwrap();
        assert_eq!(items.len(), 2);

        let items = parse_json_array("Sure! [{\"id\": 3}]").unwrap();
        assert_eq!(items, vec![json!({"id": 3})]);
    }

    #[test]
    fn test_parse_json_array_rejects_object() {
        assert!(parse_json_array("{\"items\": [1, 2]}").is_err());
        assert!(parse_json_array("no json here").is_err());
    }

    #[test]
    fn test_parse_json_array_trailing_comma() {
        let items = parse_json_array("[{\"id\": 0},]").unwrap();
        assert_eq!(items.len(), 1);
    }

    #[test]
    fn test_parse_json_array_salvages_objects() {
        let items = parse_json_array("[{\"id\": 0, \"note\": \"a } b\"}, {\"id\": 1 oops}, {\"id\": 2}]")
            .unwrap();
        assert_eq!(items, vec![json!({"id": 0, "note": "a } b"}), json!({"id": 2})]);
    }

    #[test]
    fn test_parse_json_object() {
        let map = parse_json_object("```json\n{\"fix_summary\": \"do it\",}\n```").unwrap();
        assert_eq!(map.get("fix_summary"), Some(&json!("do it")));
        assert!(parse_json_object("[1, 2]").is_err());
    }
}
