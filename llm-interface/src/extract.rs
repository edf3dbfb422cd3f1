//! Locating and parsing the JSON object inside free-form model output.
//!
//! The model is asked for a bare JSON object but routinely wraps it in
//! prose, emits raw control characters inside string values, or produces
//! invalid JSON outright. [`extract_json`] never panics; every failure is an
//! [`ExtractionError`] that the normalizer turns into a sentinel result.

use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;
use thiserror::Error;

/// Characters of context shown on each side of a parse error.
const ERROR_CONTEXT_CHARS: usize = 40;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExtractionError {
    #[error("model response was empty")]
    EmptyResponse,

    #[error("no JSON object found in model response")]
    NoJsonFound,

    #[error("malformed JSON at char {offset} (line {line}, column {column}): {message}")]
    MalformedJson {
        offset: usize,
        line: usize,
        column: usize,
        message: String,
        context: String,
    },
}

impl ExtractionError {
    /// Category tag stored alongside `"Error"` in a sentinel result.
    pub fn kind_label(&self) -> &'static str {
        match self {
            ExtractionError::EmptyResponse => "Empty Response",
            ExtractionError::NoJsonFound => "No JSON Found via Regex",
            ExtractionError::MalformedJson { .. } => "Fatal Parsing Failed",
        }
    }
}

fn whole_object_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)^\s*(\{.*\})\s*$").expect("valid regex"))
}

fn embedded_object_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)(\{.*?\})").expect("valid regex"))
}

/// Extracts the JSON value embedded in raw model output.
pub fn extract_json(raw: &str) -> Result<Value, ExtractionError> {
    if raw.trim().is_empty() {
        return Err(ExtractionError::EmptyResponse);
    }

    let span = locate_json_span(raw).ok_or(ExtractionError::NoJsonFound)?;
    let sanitized = strip_control_chars(span);
    parse_lenient(&sanitized)
}

/// Returns the brace-delimited span of `text`. A match of the whole trimmed
/// text wins; otherwise the span runs from the first `{` to the first `}`
/// after it. Trailing prose with braces is ignored, but a nested object
/// wrapped in prose is cut at its first inner `}`.
pub fn locate_json_span(text: &str) -> Option<&str> {
    whole_object_regex()
        .captures(text)
        .or_else(|| embedded_object_regex().captures(text))
        .and_then(|captures| captures.get(1))
        .map(|m| m.as_str())
}

/// Removes ASCII control characters except tab, newline and carriage return.
pub fn strip_control_chars(text: &str) -> String {
    text.chars()
        .filter(|c| !matches!(*c, '\u{00}'..='\u{08}' | '\u{0B}' | '\u{0C}' | '\u{0E}'..='\u{1F}'))
        .collect()
}

/// Parses JSON while tolerating raw control characters inside string
/// literals, which strict JSON forbids.
pub fn parse_lenient(text: &str) -> Result<Value, ExtractionError> {
    let (escaped, origin) = escape_string_controls(text);

    serde_json::from_str::<Value>(&escaped).map_err(|e| {
        let escaped_offset = byte_offset_of(&escaped, e.line(), e.column());
        let byte_offset = origin.get(escaped_offset).copied().unwrap_or(text.len());
        malformed(text, byte_offset, e.to_string())
    })
}

/// Rewrites control characters found inside string literals as JSON escape
/// sequences. Also returns, for every output byte, the input byte it came
/// from.
fn escape_string_controls(text: &str) -> (String, Vec<usize>) {
    let mut out = String::with_capacity(text.len() + 16);
    let mut origin = Vec::with_capacity(text.len() + 16);
    let mut in_string = false;
    let mut escaped = false;

    for (idx, ch) in text.char_indices() {
        let replacement = if in_string && (ch as u32) < 0x20 {
            Some(match ch {
                '\n' => "\\n".to_string(),
                '\r' => "\\r".to_string(),
                '\t' => "\\t".to_string(),
                other => format!("\\u{:04x}", other as u32),
            })
        } else {
            None
        };

        if in_string {
            if escaped {
                escaped = false;
            } else if ch == '\\' {
                escaped = true;
            } else if ch == '"' {
                in_string = false;
            }
        } else if ch == '"' {
            in_string = true;
        }

        match replacement {
            Some(seq) => {
                origin.extend(std::iter::repeat(idx).take(seq.len()));
                out.push_str(&seq);
            }
            None => {
                origin.extend(std::iter::repeat(idx).take(ch.len_utf8()));
                out.push(ch);
            }
        }
    }

    (out, origin)
}

/// Converts serde_json's one-based line and column into a byte offset.
fn byte_offset_of(text: &str, line: usize, column: usize) -> usize {
    let line_start: usize = text
        .split_inclusive('\n')
        .take(line.saturating_sub(1))
        .map(str::len)
        .sum();
    (line_start + column.saturating_sub(1)).min(text.len())
}

fn malformed(text: &str, byte_offset: usize, parser_message: String) -> ExtractionError {
    let mut byte_offset = byte_offset.min(text.len());
    while !text.is_char_boundary(byte_offset) {
        byte_offset -= 1;
    }

    let before = &text[..byte_offset];
    let offset = before.chars().count();
    let line = before.matches('\n').count() + 1;
    let column = before.rsplit('\n').next().map_or(0, |l| l.chars().count()) + 1;

    // serde_json appends " at line X column Y"; the position is reported
    // separately relative to the extracted span.
    let message = match parser_message.rfind(" at line ") {
        Some(idx) => parser_message[..idx].to_string(),
        None => parser_message,
    };

    let context_before: String = {
        let chars: Vec<char> = before.chars().collect();
        let start = chars.len().saturating_sub(ERROR_CONTEXT_CHARS);
        chars[start..].iter().collect()
    };
    let mut rest = text[byte_offset..].chars();
    let error_char = rest
        .next()
        .map_or_else(|| "[EOF]".to_string(), |c| c.to_string());
    let context_after: String = rest.take(ERROR_CONTEXT_CHARS - 1).collect();

    ExtractionError::MalformedJson {
        offset,
        line,
        column,
        message,
        context: format!(
            "...{context_before}>>>ERROR (char {offset}) '{error_char}'<<<{context_after}..."
        ),
    }
}
