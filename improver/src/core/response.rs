//! Parsing of untrusted collaborator responses.
//!
//! Responses are free text. A response is accepted as JSON when the whole text
//! parses, when it contains a fenced ```json block that parses, or, with no
//! fence at all, when a balanced `{...}` object inside it parses. The value is
//! then checked against an embedded JSON Schema before it is deserialized.

use std::sync::LazyLock;

use anyhow::{Context, Result, anyhow, bail};
use jsonschema::Draft;
use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;

pub const STRUCTURED_PROMPT_SCHEMA: &str = include_str!("../../schemas/structured_prompt.schema.json");
pub const EVALUATION_SCHEMA: &str = include_str!("../../schemas/evaluation.schema.json");
pub const REVIEW_SCHEMA: &str = include_str!("../../schemas/review.schema.json");
pub const IDEA_SUMMARY_SCHEMA: &str = include_str!("../../schemas/idea_summary.schema.json");

static FENCED_JSON_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?[ \t]*\r?\n(.*?)\r?\n[ \t]*```")
        .expect("fenced json pattern should be valid")
});

/// Extract a JSON value from a collaborator response.
pub fn extract_json(response: &str) -> Result<Value> {
    let trimmed = response.trim();
    let direct_err = match serde_json::from_str::<Value>(trimmed) {
        Ok(value) => return Ok(value),
        Err(err) => err,
    };

    let mut fenced = FENCED_JSON_RE.captures_iter(trimmed);
    let Some(first) = fenced.next() else {
        return first_balanced_object(trimmed)
            .ok_or(direct_err)
            .context("parse response as json");
    };
    if fenced.next().is_some() {
        bail!("response contains more than one fenced block");
    }
    let body = first.get(1).map(|m| m.as_str()).unwrap_or_default();
    serde_json::from_str(body.trim()).context("parse fenced json block")
}

/// First `{...}` span of `text` that parses as JSON.
fn first_balanced_object(text: &str) -> Option<Value> {
    text.match_indices('{').find_map(|(start, _)| {
        let len = balanced_len(&text[start..])?;
        serde_json::from_str(&text[start..start + len]).ok()
    })
}

/// Byte length of the object opening at the start of `text`, skipping braces
/// inside string literals.
fn balanced_len(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;
    for (i, c) in text.char_indices() {
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
            '{' => depth += 1,
            '}' => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(i + 1);
                }
            }
            _ => {}
        }
    }
    None
}

/// Validate a JSON instance against a JSON Schema (Draft 2020-12).
pub fn validate_schema(instance: &Value, schema_raw: &str) -> Result<()> {
    let schema: Value = serde_json::from_str(schema_raw).context("parse schema json")?;
    let compiled = jsonschema::options()
        .with_draft(Draft::Draft202012)
        .build(&schema)
        .map_err(|err| anyhow!("compile json schema: {err}"))?;
    let messages: Vec<String> = compiled
        .iter_errors(instance)
        .map(|err| err.to_string())
        .collect();
    if !messages.is_empty() {
        bail!("schema validation failed:\n- {}", messages.join("\n- "));
    }
    Ok(())
}

/// Extract, validate and deserialize a response in one step.
pub fn parse_validated<T: DeserializeOwned>(response: &str, schema_raw: &str) -> Result<T> {
    let value = extract_json(response)?;
    validate_schema(&value, schema_raw)?;
    serde_json::from_value(value).context("deserialize validated json")
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_plain_json() {
        let value = extract_json("  {\"success\": true}\n").expect("json");
        assert_eq!(value, json!({"success": true}));
    }

    #[test]
    fn extracts_single_fenced_block() {
        let response = "Here is the verdict:\n```json\n{\"review_passed\": false}\n```\nDone.";
        let value = extract_json(response).expect("json");
        assert_eq!(value, json!({"review_passed": false}));
    }

    #[test]
    fn rejects_prose() {
        assert!(extract_json("Looks good to me!").is_err());
        assert!(extract_json("Use {braces} sparingly.").is_err());
    }

    #[test]
    fn finds_object_between_unfenced_notices() {
        let response = "Aider v0.86.1\nMain model: gpt-4o with diff edit format\n\
            {\"success\": false, \"feedback\": \"use {} in \\\"format\\\" strings\"}\n\
            Tokens: 2.1k sent, 35 received. Cost: $0.0056 message, $0.0056 session.\n";
        let value = extract_json(response).expect("json");
        assert_eq!(
            value,
            json!({"success": false, "feedback": "use {} in \"format\" strings"})
        );
    }

    #[test]
    fn rejects_multiple_fenced_blocks() {
        let response = "```json\n{}\n```\nand\n```json\n{}\n```";
        let err = extract_json(response).unwrap_err();
        assert!(err.to_string().contains("more than one"));
    }

    #[test]
    fn schema_reports_wrong_types() {
        let err = validate_schema(&json!({"success": "yes"}), EVALUATION_SCHEMA).unwrap_err();
        assert!(err.to_string().contains("schema validation failed"));
        let err = validate_schema(&json!({}), REVIEW_SCHEMA).unwrap_err();
        assert!(err.to_string().contains("review_passed"));
    }

    #[test]
    fn structured_prompt_schema_allows_missing_sections() {
        validate_schema(&json!({"high_level_goals": ["a"]}), STRUCTURED_PROMPT_SCHEMA)
            .expect("valid");
        assert!(
            validate_schema(&json!({"low_level_goals": [{"task": 3}]}), STRUCTURED_PROMPT_SCHEMA)
                .is_err()
        );
        assert!(validate_schema(&json!(["not", "an", "object"]), STRUCTURED_PROMPT_SCHEMA).is_err());
    }
}
