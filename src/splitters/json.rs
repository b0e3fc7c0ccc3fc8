//! Semi-structured (JSON) splitter.
//!
//! Recursive size-bounded splitting with a hard character ceiling. A value
//! that serializes under the ceiling becomes one segment; oversized objects
//! split per key, oversized arrays per element, oversized strings at the
//! ceiling. Empty fragments are dropped without leaving sequence gaps.

use serde_json::{Map, Value};

use crate::error::IngestError;

/// Split raw JSON into segments of at most `max_chars` serialized chars.
pub fn split_json(raw: &str, max_chars: usize) -> Result<Vec<String>, IngestError> {
    let value: Value = serde_json::from_str(raw)
        .map_err(|e| IngestError::Validation(format!("invalid JSON: {e}")))?;

    let mut segments = Vec::new();
    walk(&value, max_chars, &mut segments);
    Ok(segments)
}

fn walk(value: &Value, max_chars: usize, out: &mut Vec<String>) {
    let serialized = value.to_string();
    if serialized.chars().count() <= max_chars {
        if !is_trivial(&serialized) {
            out.push(serialized);
        }
        return;
    }

    match value {
        Value::Object(map) => {
            for (key, child) in map {
                if is_trivial(&child.to_string()) {
                    continue;
                }
                let entry = single_entry(key, child);
                let entry_str = entry.to_string();
                if entry_str.chars().count() <= max_chars {
                    if !is_trivial(&entry_str) {
                        out.push(entry_str);
                    }
                } else {
                    // Key context is dropped; the value splits on its own.
                    walk(child, max_chars, out);
                }
            }
        }
        Value::Array(items) => {
            for item in items {
                walk(item, max_chars, out);
            }
        }
        Value::String(s) => {
            // A single oversized scalar gets a hard character split.
            let chars: Vec<char> = s.chars().collect();
            for piece in chars.chunks(max_chars.max(1)) {
                let piece: String = piece.iter().collect();
                if !piece.is_empty() {
                    out.push(piece);
                }
            }
        }
        // Numbers, booleans, and null always fit any sane ceiling.
        _ => out.push(serialized),
    }
}

fn single_entry(key: &str, value: &Value) -> Value {
    let mut map = Map::new();
    map.insert(key.to_string(), value.clone());
    Value::Object(map)
}

fn is_trivial(serialized: &str) -> bool {
    matches!(serialized, "{}" | "[]" | "\"\"" | "null")
}
