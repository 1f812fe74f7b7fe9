//! Canonical indentation for generated code.
//!
//! The indentation unit is inferred per block as the greatest common divisor
//! of the leading space counts of its non-blank lines. Each unit of spaces
//! becomes one tab and existing tabs are kept, so normalized indentation is
//! all tabs and a second pass finds nothing to rewrite.

/// Unit used when no non-blank line is indented with spaces.
pub const INDENT_WIDTH: usize = 4;

/// Rewrites leading space indentation into tabs, one per level.
///
/// Lines without leading spaces are returned unchanged.
pub fn normalize(lines: &[String]) -> Vec<String> {
    let unit = indent_unit(lines);
    lines.iter().map(|line| normalize_line(line, unit)).collect()
}

/// Normalizes and joins the lines into a single newline-separated block.
pub fn normalize_to_block(lines: &[String]) -> String {
    normalize(lines).join("\n")
}

fn split_indent(line: &str) -> (&str, &str) {
    let indent_len = line
        .char_indices()
        .find(|(_, c)| *c != ' ' && *c != '\t')
        .map(|(i, _)| i)
        .unwrap_or(line.len());
    line.split_at(indent_len)
}

fn count_spaces(indent: &str) -> usize {
    indent.chars().filter(|c| *c == ' ').count()
}

fn gcd(a: usize, b: usize) -> usize {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

fn indent_unit(lines: &[String]) -> usize {
    let unit = lines
        .iter()
        .map(|line| split_indent(line))
        .filter(|(_, rest)| !rest.is_empty())
        .map(|(indent, _)| count_spaces(indent))
        .fold(0, gcd);
    if unit == 0 {
        INDENT_WIDTH
    } else {
        unit
    }
}

fn normalize_line(line: &str, unit: usize) -> String {
    let (indent, rest) = split_indent(line);
    if !indent.contains(' ') {
        return line.to_string();
    }

    // Non-blank lines divide evenly; blank lines drop any leftover spaces.
    let tabs = indent.len() - count_spaces(indent);
    let levels = tabs + count_spaces(indent) / unit;

    let mut out = String::with_capacity(levels + rest.len());
    out.extend(std::iter::repeat('\t').take(levels));
    out.push_str(rest);
    out
}
