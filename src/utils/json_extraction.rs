//! JSON extraction utilities for parsing LLM responses.
//!
//! Model replies rarely contain bare JSON. The payload is usually wrapped in a
//! markdown fence, surrounded by prose, or slightly malformed (trailing commas,
//! raw newlines inside string literals). This module locates candidate JSON
//! objects and offers a single bounded repair pass; deciding whether a
//! candidate is acceptable is left to the caller's schema.
//!
//! # Example
//!
//! ```
//! use exercise_forge::utils::json_extraction::{locate_json_objects, repair_json};
//!
//! let reply = "Sure!\n```json\n{\"name\": \"example\", \"tags\": [1, 2,],}\n```\nEnjoy.";
//! let candidates = locate_json_objects(reply).unwrap();
//! let repaired = repair_json(&candidates[0]);
//! assert_eq!(repaired, "{\"name\": \"example\", \"tags\": [1, 2]}");
//! ```

use regex::Regex;
use thiserror::Error;

/// Error type for JSON extraction failures
#[derive(Debug, Clone, Error, PartialEq)]
pub enum JsonExtractionError {
    #[error("JSON appears truncated: {unclosed_braces} unclosed braces, {unclosed_brackets} unclosed brackets. Partial: {partial_preview}...")]
    Truncated {
        partial_preview: String,
        unclosed_braces: usize,
        unclosed_brackets: usize,
    },
    #[error("No JSON content found in response. Content starts with: '{content_preview}'")]
    NotFound { content_preview: String },
}

/// Analysis result for JSON structure
#[derive(Debug, Clone, PartialEq)]
pub struct JsonStructureAnalysis {
    /// Number of unclosed braces ('{' without matching '}')
    pub unclosed_braces: usize,
    /// Number of unclosed brackets ('[' without matching ']')
    pub unclosed_brackets: usize,
    /// Whether we ended inside a string literal
    pub in_string: bool,
    /// The position where JSON-like content starts (first '{' or '[')
    pub json_start: Option<usize>,
}

impl JsonStructureAnalysis {
    pub fn is_truncated(&self) -> bool {
        self.json_start.is_some()
            && (self.unclosed_braces > 0 || self.unclosed_brackets > 0 || self.in_string)
    }
}

/// Scans the content tracking brace/bracket depth, honoring string literals
/// and escape sequences.
pub fn analyze_json_structure(s: &str) -> JsonStructureAnalysis {
    let mut brace_depth: isize = 0;
    let mut bracket_depth: isize = 0;
    let mut in_string = false;
    let mut escape_next = false;
    let mut json_start: Option<usize> = None;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' if json_start.is_some() => in_string = !in_string,
            '{' if !in_string => {
                json_start.get_or_insert(i);
                brace_depth += 1;
            }
            '}' if !in_string => brace_depth -= 1,
            '[' if !in_string => {
                json_start.get_or_insert(i);
                bracket_depth += 1;
            }
            ']' if !in_string => bracket_depth -= 1,
            _ => {}
        }
    }

    JsonStructureAnalysis {
        unclosed_braces: brace_depth.max(0) as usize,
        unclosed_brackets: bracket_depth.max(0) as usize,
        in_string,
        json_start,
    }
}

/// Finds the index of the '}' matching the '{' at the start of `s`.
///
/// Braces inside string literals (including escaped quotes) are ignored.
pub fn find_matching_brace(s: &str) -> Option<usize> {
    let mut depth = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in s.char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }

        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' if !in_string => depth += 1,
            '}' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }

    None
}

/// Extract the object inside a ```json ... ``` code block.
pub fn extract_from_json_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```(?i:json)\s*\n?([\s\S]*?)\n?```").ok()?;
    let caps = re.captures(content)?;
    let block = caps.get(1)?.as_str().trim();
    let start = block.find('{')?;
    find_matching_brace(&block[start..]).map(|end| block[start..=start + end].to_string())
}

/// Extract the first object inside a generic ``` ... ``` code block.
pub fn extract_from_generic_code_block(content: &str) -> Option<String> {
    let re = Regex::new(r"```(?:\w+)?\s*\n?([\s\S]*?)\n?```").ok()?;
    for caps in re.captures_iter(content) {
        let Some(block) = caps.get(1).map(|m| m.as_str().trim()) else {
            continue;
        };
        if let Some(start) = block.find('{') {
            if let Some(end) = find_matching_brace(&block[start..]) {
                return Some(block[start..=start + end].to_string());
            }
        }
    }
    None
}

/// Returns every outermost balanced `{...}` block, in document order.
///
/// Blocks nested inside an earlier block are not reported separately.
pub fn outermost_objects(content: &str) -> Vec<&str> {
    let mut blocks = Vec::new();
    let mut offset = 0;

    while let Some(rel) = content[offset..].find('{') {
        let start = offset + rel;
        match find_matching_brace(&content[start..]) {
            Some(end) => {
                blocks.push(&content[start..=start + end]);
                offset = start + end + 1;
            }
            // A stray opening brace; keep scanning after it.
            None => offset = start + 1,
        }
    }

    blocks
}

/// Locates candidate JSON objects in an LLM reply.
///
/// Candidates are ordered by reliability: fenced ```json blocks first, then
/// other fenced blocks, then outermost balanced objects anywhere in the text.
/// Duplicates are removed. Nothing here checks that a candidate parses.
pub fn locate_json_objects(content: &str) -> Result<Vec<String>, JsonExtractionError> {
    let trimmed = content.trim();
    let mut candidates: Vec<String> = Vec::new();
    let mut push = |candidate: String| {
        if !candidates.contains(&candidate) {
            candidates.push(candidate);
        }
    };

    if let Some(json) = extract_from_json_code_block(trimmed) {
        push(json);
    }
    if let Some(json) = extract_from_generic_code_block(trimmed) {
        push(json);
    }
    for block in outermost_objects(trimmed) {
        push(block.to_string());
    }

    if !candidates.is_empty() {
        return Ok(candidates);
    }

    let analysis = analyze_json_structure(trimmed);
    if let (true, Some(start)) = (analysis.is_truncated(), analysis.json_start) {
        return Err(JsonExtractionError::Truncated {
            partial_preview: preview(&trimmed[start..], 100),
            unclosed_braces: analysis.unclosed_braces,
            unclosed_brackets: analysis.unclosed_brackets,
        });
    }

    Err(JsonExtractionError::NotFound {
        content_preview: preview(trimmed, 50),
    })
}

/// Strips markdown fence lines that leaked into a candidate block.
pub fn strip_wrapping_markers(s: &str) -> String {
    s.lines()
        .filter(|line| !line.trim_start().starts_with("```"))
        .collect::<Vec<_>>()
        .join("\n")
}

/// One pass of near-JSON defect repair.
///
/// - removes leaked markdown fence lines
/// - escapes raw newlines, carriage returns and tabs inside string literals
/// - drops trailing commas before `}` or `]`
///
/// Content that is already valid JSON comes back unchanged apart from fence
/// stripping.
pub fn repair_json(s: &str) -> String {
    let stripped = strip_wrapping_markers(s);
    let chars: Vec<char> = stripped.trim().chars().collect();
    let mut out = String::with_capacity(chars.len());
    let mut in_string = false;
    let mut escape_next = false;

    for (i, &c) in chars.iter().enumerate() {
        if in_string {
            if escape_next {
                escape_next = false;
                out.push(c);
                continue;
            }
            match c {
                '\\' => {
                    escape_next = true;
                    out.push(c);
                }
                '"' => {
                    in_string = false;
                    out.push(c);
                }
                '\n' => out.push_str("\\n"),
                '\r' => out.push_str("\\r"),
                '\t' => out.push_str("\\t"),
                _ => out.push(c),
            }
            continue;
        }

        match c {
            '"' => {
                in_string = true;
                out.push(c);
            }
            ',' => {
                let next = chars[i + 1..].iter().find(|ch| !ch.is_whitespace());
                if !matches!(next, Some('}') | Some(']')) {
                    out.push(c);
                }
            }
            _ => out.push(c),
        }
    }

    out
}

fn preview(s: &str, max: usize) -> String {
    let mut end = s.len().min(max);
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}
