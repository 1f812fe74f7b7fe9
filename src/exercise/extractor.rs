//! Structured-output extraction from free-form model replies.
//!
//! The reply is searched for candidate JSON objects; each is decoded strictly
//! first. Only when no candidate decodes does a single repair pass run over
//! all of them before the reply is rejected.

use serde_json::{Map, Value};

use crate::error::{ExerciseError, ExerciseResult};
use crate::utils::json_extraction::{locate_json_objects, repair_json};

use super::types::GeneratedExercise;

/// Wire names of the five mandatory payload fields.
pub const PAYLOAD_FIELDS: [&str; 5] = ["Code", "Description", "ExpectedOutput", "CSVName", "CSV"];

/// Extracts a [`GeneratedExercise`] from a raw model reply.
///
/// # Errors
///
/// Returns [`ExerciseError::Parse`] when the reply holds no object that decodes
/// into all five fields, even after repair.
pub fn extract_exercise(raw: &str) -> ExerciseResult<GeneratedExercise> {
    let candidates = locate_json_objects(raw).map_err(|e| ExerciseError::Parse(e.to_string()))?;

    let mut last_error = String::from("no candidate object");

    for candidate in &candidates {
        match decode_candidate(candidate) {
            Ok(exercise) => return Ok(exercise),
            Err(e) => last_error = e,
        }
    }

    for candidate in &candidates {
        let repaired = repair_json(candidate);
        match decode_candidate(&repaired) {
            Ok(exercise) => {
                tracing::debug!("Exercise payload decoded after repair");
                return Ok(exercise);
            }
            Err(e) => last_error = e,
        }
    }

    Err(ExerciseError::Parse(format!(
        "{} candidate object(s) rejected, last error: {}",
        candidates.len(),
        last_error
    )))
}

fn decode_candidate(candidate: &str) -> Result<GeneratedExercise, String> {
    let value: Value = serde_json::from_str(candidate).map_err(|e| format!("Invalid JSON: {}", e))?;
    let object = value
        .as_object()
        .ok_or_else(|| "payload is not a JSON object".to_string())?;
    exercise_from_object(object)
}

/// Field lookup tolerant of case and separator drift ("expected_output",
/// "csv name", ...).
fn find_field<'a>(object: &'a Map<String, Value>, name: &str) -> Result<&'a Value, String> {
    if let Some(value) = object.get(name) {
        return Ok(value);
    }
    let wanted = canonical_key(name);
    object
        .iter()
        .find(|(k, _)| canonical_key(k) == wanted)
        .map(|(_, v)| v)
        .ok_or_else(|| format!("missing field '{}'", name))
}

fn canonical_key(key: &str) -> String {
    key.chars()
        .filter(|c| c.is_alphanumeric())
        .flat_map(char::to_lowercase)
        .collect()
}

fn exercise_from_object(object: &Map<String, Value>) -> Result<GeneratedExercise, String> {
    let code = code_lines(find_field(object, "Code")?)?;
    if code.iter().all(|l| l.trim().is_empty()) {
        return Err("field 'Code' is empty".to_string());
    }

    let description = text(find_field(object, "Description")?, "Description")?;
    let expected_output = text(find_field(object, "ExpectedOutput")?, "ExpectedOutput")?;
    let csv_name = optional_text(find_field(object, "CSVName")?, "CSVName")?;
    let csv_content = optional_text(find_field(object, "CSV")?, "CSV")?;

    Ok(GeneratedExercise {
        code,
        description,
        expected_output,
        csv_name,
        csv_content,
    })
}

/// Code arrives either as a list of lines or as one newline-separated string.
fn code_lines(value: &Value) -> Result<Vec<String>, String> {
    match value {
        Value::String(s) => Ok(split_lines(s.strip_suffix('\n').unwrap_or(s))),
        Value::Array(items) => {
            let mut lines = Vec::with_capacity(items.len());
            for item in items {
                match item {
                    Value::String(s) => lines.extend(split_lines(s)),
                    other => return Err(format!("field 'Code' holds a non-string line: {}", other)),
                }
            }
            Ok(lines)
        }
        other => Err(format!("field 'Code' must be a string or list, got {}", type_name(other))),
    }
}

fn split_lines(s: &str) -> Vec<String> {
    s.split('\n')
        .map(|l| l.strip_suffix('\r').unwrap_or(l).to_string())
        .collect()
}

fn text(value: &Value, field: &str) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Null => Ok(String::new()),
        Value::Number(n) => Ok(n.to_string()),
        Value::Array(items) => items
            .iter()
            .map(|item| row_text(item, field))
            .collect::<Result<Vec<_>, _>>()
            .map(|rows| rows.join("\n")),
        other => Err(format!("field '{}' must be text, got {}", field, type_name(other))),
    }
}

/// A list element of a text field: a string, a scalar, or a row of cells
/// joined with commas (models sometimes emit CSV as nested arrays).
fn row_text(value: &Value, field: &str) -> Result<String, String> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Number(_) | Value::Bool(_) => Ok(value.to_string()),
        Value::Null => Ok(String::new()),
        Value::Array(cells) => cells
            .iter()
            .map(|cell| match cell {
                Value::String(s) => Ok(s.clone()),
                Value::Null => Ok(String::new()),
                Value::Number(_) | Value::Bool(_) => Ok(cell.to_string()),
                other => Err(format!("field '{}' holds a nested {}", field, type_name(other))),
            })
            .collect::<Result<Vec<_>, _>>()
            .map(|cells| cells.join(",")),
        other => Err(format!("field '{}' holds a nested {}", field, type_name(other))),
    }
}

/// Values are kept verbatim; only an empty string or null means "absent".
fn optional_text(value: &Value, field: &str) -> Result<Option<String>, String> {
    let s = text(value, field)?;
    Ok(if s.is_empty() { None } else { Some(s) })
}

fn type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
