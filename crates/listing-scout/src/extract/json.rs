//! Pulling a listing record out of free-form model output.
//!
//! Models wrap JSON in prose or code fences, and descriptions routinely
//! contain braces inside strings, so the object is located by tracking brace
//! depth outside string literals rather than by pattern matching.

use serde_json::{Map, Value};

use crate::models::{ListingRecord, SCHEMA_KEYS};

use super::error::ExtractError;

/// Returns the balanced `{...}` span starting at byte `start`, if it closes.
fn balanced_object_at(text: &str, start: usize) -> Option<&str> {
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth = depth.checked_sub(1)?;
                if depth == 0 {
                    return Some(&text[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    None
}

/// First balanced span in `text` that parses as a JSON object.
pub fn find_json_object(text: &str) -> Option<Map<String, Value>> {
    let mut offset = 0;
    while let Some(rel) = text[offset..].find('{') {
        let start = offset + rel;
        if let Some(candidate) = balanced_object_at(text, start) {
            if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(candidate) {
                return Some(map);
            }
        }
        offset = start + 1;
    }
    None
}

fn json_type(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

/// Checks every schema key in order and builds the record. The first
/// offending key is reported. Keys outside the schema are ignored.
pub fn validate_record(map: &Map<String, Value>) -> Result<ListingRecord, ExtractError> {
    let mut fields: Vec<Option<String>> = Vec::with_capacity(SCHEMA_KEYS.len());
    for key in SCHEMA_KEYS {
        match map.get(key) {
            None => return Err(ExtractError::violation(key, "string or null", "missing")),
            Some(Value::Null) if key == "title" => {
                return Err(ExtractError::violation("title", "string", "null"))
            }
            Some(Value::Null) => fields.push(None),
            Some(Value::String(s)) => fields.push(Some(s.clone())),
            Some(other) => {
                return Err(ExtractError::violation(
                    key,
                    "string or null",
                    json_type(other),
                ))
            }
        }
    }

    let mut fields = fields.into_iter();
    let mut next = || fields.next().flatten();
    let title = next().ok_or_else(|| ExtractError::violation("title", "string", "null"))?;
    Ok(ListingRecord {
        title,
        storage: next(),
        processor: next(),
        graphics: next(),
        display: next(),
        ram: next(),
        battery: next(),
        status: next(),
        color: next(),
        description: next(),
        price: next(),
    })
}

/// Locates, parses and validates the record in a raw model response.
pub fn parse_record(response: &str) -> Result<ListingRecord, ExtractError> {
    let map = find_json_object(response).ok_or_else(|| {
        let preview: String = response.chars().take(120).collect();
        ExtractError::MalformedResponse(preview)
    })?;
    validate_record(&map)
}
