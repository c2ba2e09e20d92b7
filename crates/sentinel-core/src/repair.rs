//! Best-effort repair of JSON returned by models in text mode.
//!
//! Three passes, in order:
//! 1. Strip a surrounding markdown code fence (with optional language tag).
//! 2. Cut out the outermost balanced `{...}` or `[...]`, skipping brackets
//!    that appear inside string literals.
//! 3. Drop backslashes that do not start a canonical JSON escape
//!    (`\" \\ \/ \b \f \n \r \t \u`), keeping the escaped character.

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::schema::{self, SchemaError, StructuredOutput};

/// Errors from repairing model output.
#[derive(Error, Debug)]
pub enum RepairError {
    #[error("No JSON object or array found in response")]
    NoJson,

    #[error("Repaired text is still not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Schema(#[from] SchemaError),
}

/// Repair raw model text into (hopefully) parseable JSON.
///
/// If no bracket is found the stripped text is returned unchanged.
pub fn repair_json(text: &str) -> String {
    let stripped = strip_code_fence(text);

    match extract_outermost(stripped) {
        Some(json) => strip_invalid_escapes(json),
        None => stripped.to_string(),
    }
}

/// Repair and deserialize without schema validation.
pub fn parse_repaired<T: DeserializeOwned>(text: &str) -> Result<T, RepairError> {
    let stripped = strip_code_fence(text);
    let json = extract_outermost(stripped).ok_or(RepairError::NoJson)?;
    Ok(serde_json::from_str(&strip_invalid_escapes(json))?)
}

/// Repair, validate against `T`'s schema, then deserialize.
pub fn parse_validated<T: StructuredOutput>(text: &str) -> Result<T, RepairError> {
    let value: serde_json::Value = parse_repaired(text)?;
    Ok(schema::from_value::<T>(value)?)
}

fn strip_code_fence(text: &str) -> &str {
    let mut stripped = text.trim();
    if !stripped.starts_with("```") {
        return stripped;
    }

    // Opening fence runs to the end of its line (language tag included)
    if let Some(newline) = stripped.find('\n') {
        stripped = &stripped[newline + 1..];
    }
    let trimmed_end = stripped.trim_end();
    if let Some(body) = trimmed_end.strip_suffix("```") {
        stripped = body.trim_end();
    }
    stripped
}

/// Slice of the first balanced object/array, or to the end if unbalanced.
fn extract_outermost(text: &str) -> Option<&str> {
    let start = text.find(['{', '['])?;
    let open = text.as_bytes()[start];
    let close = if open == b'{' { b'}' } else { b']' };

    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, &byte) in text.as_bytes()[start..].iter().enumerate() {
        if escaped {
            escaped = false;
            continue;
        }
        match byte {
            b'\\' => escaped = true,
            b'"' => in_string = !in_string,
            _ if in_string => {}
            b if b == open => depth += 1,
            b if b == close => {
                depth -= 1;
                if depth == 0 {
                    return Some(&text[start..start + offset + 1]);
                }
            }
            _ => {}
        }
    }

    Some(&text[start..])
}

fn strip_invalid_escapes(json: &str) -> String {
    let mut out = String::with_capacity(json.len());
    let mut chars = json.chars().peekable();

    while let Some(c) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        match chars.peek() {
            Some('"' | '\\' | '/' | 'b' | 'f' | 'n' | 'r' | 't' | 'u') => {
                out.push(c);
                if let Some(next) = chars.next() {
                    out.push(next);
                }
            }
            // Invalid escape: keep the character, drop the backslash
            _ => {}
        }
    }

    out
}
