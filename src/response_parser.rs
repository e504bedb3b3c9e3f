//! Structured JSON extraction from free-form model output
//!
//! Models asked for JSON often wrap it in commentary or code fences. Parsing
//! tries three tiers: the text as-is, the text with known artifacts removed,
//! and finally the first balanced `{...}` object found in the text.

use crate::error::{ManagerError, ManagerResult};
use crate::logging::{log_debug, log_warn, preview};
use serde_json::Value;

/// Parse model output into a JSON object.
///
/// # Errors
///
/// Returns [`ManagerError::MalformedResponse`] if no tier yields a JSON object.
pub fn parse_structured(raw: &str) -> ManagerResult<Value> {
    log_debug!(
        content_length = raw.len(),
        content_preview = %preview(raw, 200),
        "Parsing model output for structured JSON"
    );

    if let Some(value) = parse_object(raw) {
        return Ok(value);
    }

    let cleaned = clean_artifacts(raw);
    if cleaned != raw {
        if let Some(value) = parse_object(&cleaned) {
            log_debug!("Parsed JSON after artifact cleaning");
            return Ok(value);
        }
    }

    if let Some(value) = extract_json_object(&cleaned).and_then(parse_object) {
        log_debug!("Parsed JSON extracted from mixed content");
        return Ok(value);
    }

    log_warn!(
        content_preview = %preview(raw, 200),
        "Failed to parse structured response from model output"
    );
    Err(ManagerError::malformed_response(format!(
        "could not find a JSON object in: {}",
        preview(raw, 200)
    )))
}

/// First balanced top-level `{...}` object in `text`, verbatim.
///
/// Braces inside string literals are ignored. Returns `None` when there is
/// no `{` or the object never closes.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let candidate = &text[start..];
    let end = find_balanced_end(candidate)?;
    Some(&candidate[..end])
}

fn parse_object(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim())
        .ok()
        .filter(Value::is_object)
}

fn clean_artifacts(content: &str) -> String {
    content
        .replace("```json", "")
        .replace("```JSON", "")
        .replace("```", "")
        .trim()
        .chars()
        .filter(|c| !c.is_control() || c.is_whitespace())
        .collect()
}

/// Byte offset just past the brace closing the object that opens `text`.
fn find_balanced_end(text: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
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
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(idx + ch.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
