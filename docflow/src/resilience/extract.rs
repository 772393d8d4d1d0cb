//! Locates the JSON object in a completion response.

use regex::Regex;
use serde::de::DeserializeOwned;
use std::sync::OnceLock;

use crate::utils::static_regex;

static FENCE: OnceLock<Regex> = OnceLock::new();

/// Returns the first balanced JSON object in `text`, preferring the body of
/// a Markdown code fence when one is present.
#[must_use]
pub fn extract_json_object(text: &str) -> Option<&str> {
    let fence = static_regex(&FENCE, r"(?s)```[A-Za-z]*[ \t]*\r?\n?(.*?)```");
    if let Some(body) = fence.captures(text).and_then(|c| c.get(1)) {
        if let Some(object) = balanced_object(body.as_str()) {
            return Some(object);
        }
    }
    balanced_object(text)
}

/// Extracts and deserializes the JSON object in `text`.
///
/// The error string describes the parse failure and is safe to echo back
/// to the service in a corrective prompt.
pub fn parse_structured<T: DeserializeOwned>(text: &str) -> Result<T, String> {
    let object = extract_json_object(text)
        .ok_or_else(|| "response did not contain a JSON object".to_string())?;
    serde_json::from_str(object).map_err(|e| format!("response JSON did not match the schema: {e}"))
}

fn balanced_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, ch) in text[start..].char_indices() {
        if in_string {
            match ch {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match ch {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..=start + offset]);
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
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Reply {
        html_generated: String,
    }

    #[test]
    fn test_bare_object() {
        let reply: Reply = parse_structured(r#"{"html_generated": "<p>{x}</p>"}"#).unwrap();
        assert_eq!(reply.html_generated, "<p>{x}</p>");
    }

    #[test]
    fn test_fenced_object_with_prose() {
        let text = "Here you go:\n```json\n{\"html_generated\": \"<b>\\\"hi\\\"</b>\"}\n```\nDone {really}.";
        let reply: Reply = parse_structured(text).unwrap();
        assert_eq!(reply.html_generated, "<b>\"hi\"</b>");
    }

    #[test]
    fn test_nested_braces_in_strings() {
        let text = r#"Sure. {"html_generated": "<style>p { color: #000 }</style>", "metadata": {"a": 1}} trailing"#;
        let object = extract_json_object(text).unwrap();
        assert!(object.ends_with(r#"{"a": 1}}"#));
    }

    #[test]
    fn test_missing_object_and_wrong_shape() {
        let err = parse_structured::<Reply>("no json here").unwrap_err();
        assert!(err.contains("did not contain"));

        let err = parse_structured::<Reply>(r#"{"other": 1}"#).unwrap_err();
        assert!(err.contains("html_generated"));
    }

    #[test]
    fn test_truncated_object() {
        assert!(extract_json_object(r#"{"html_generated": "<p>"#).is_none());
    }
}
