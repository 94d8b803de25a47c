//! Tolerant extraction of a JSON object from free-form model output.
//!
//! Models wrap JSON in prose, fence it in markdown, truncate it at the token
//! limit, or leave out the outer braces. Extraction runs an ordered chain of
//! strategies and stops at the first one that yields an object:
//!
//! 1. the whole text, repaired
//! 2. the contents of a fenced code block, repaired
//! 3. the first balanced top-level object anywhere in the text, repaired
//! 4. the whole text wrapped in braces, repaired, only if it carries keywords

use std::sync::LazyLock;

use regex::Regex;
use serde_json::{Map, Value};
use tracing::trace;

pub type JsonObject = Map<String, Value>;

static FENCED_BLOCK: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)```(?:json|JSON)?\s*(.*?)\s*```").expect("valid fence regex")
});
static TRAILING_COMMA: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r",\s*([}\]])").expect("valid trailing comma regex"));

const MAX_REPAIR_ROUNDS: usize = 4;

/// Description and keywords parsed from model output.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GenerationResult {
    pub description: Option<String>,
    pub keywords: Option<Vec<String>>,
}

impl GenerationResult {
    /// Reads the `Description` and `Keywords` fields, matching key names
    /// case-insensitively. A comma-separated keyword string is split.
    pub fn from_object(object: &JsonObject) -> Self {
        let mut result = Self::default();

        for (key, value) in object {
            match key.to_ascii_lowercase().as_str() {
                "description" | "caption" if result.description.is_none() => {
                    result.description = value
                        .as_str()
                        .map(str::trim)
                        .filter(|d| !d.is_empty())
                        .map(str::to_string);
                }
                "keywords" if result.keywords.is_none() => {
                    result.keywords = Some(keyword_list(value));
                }
                _ => {}
            }
        }

        result
    }

    /// True when at least one keyword was produced.
    pub fn has_keywords(&self) -> bool {
        self.keywords.as_ref().is_some_and(|k| !k.is_empty())
    }
}

fn keyword_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items
            .iter()
            .filter_map(|item| match item {
                Value::String(s) => Some(s.trim().to_string()),
                Value::Number(n) => Some(n.to_string()),
                _ => None,
            })
            .filter(|k| !k.is_empty())
            .collect(),
        Value::String(s) => s
            .split(',')
            .map(str::trim)
            .filter(|k| !k.is_empty())
            .map(str::to_string)
            .collect(),
        _ => Vec::new(),
    }
}

struct Strategy {
    name: &'static str,
    parse: fn(&str) -> Option<JsonObject>,
}

const STRATEGIES: [Strategy; 4] = [
    Strategy {
        name: "whole_text",
        parse: parse_whole_text,
    },
    Strategy {
        name: "fenced_block",
        parse: parse_fenced_block,
    },
    Strategy {
        name: "first_object",
        parse: parse_first_object,
    },
    Strategy {
        name: "wrapped",
        parse: parse_wrapped,
    },
];

/// Runs the strategy chain and returns the first object found.
pub fn extract_object(raw: &str) -> Option<JsonObject> {
    STRATEGIES.iter().find_map(|strategy| {
        let parsed = (strategy.parse)(raw);
        if parsed.is_some() {
            trace!(strategy = strategy.name, "extracted JSON object");
        }
        parsed
    })
}

/// Extracts a [`GenerationResult`] from raw model output.
pub fn extract_result(raw: &str) -> Option<GenerationResult> {
    extract_object(raw).map(|object| GenerationResult::from_object(&object))
}

fn parse_whole_text(text: &str) -> Option<JsonObject> {
    parse_repaired(text)
}

fn parse_fenced_block(text: &str) -> Option<JsonObject> {
    let captures = FENCED_BLOCK.captures(text)?;
    parse_repaired(captures.get(1)?.as_str())
}

fn parse_first_object(text: &str) -> Option<JsonObject> {
    parse_repaired(first_object(text)?)
}

fn parse_wrapped(text: &str) -> Option<JsonObject> {
    let object = parse_repaired(&format!("{{{}}}", text.trim()))?;
    object
        .keys()
        .any(|key| key.eq_ignore_ascii_case("keywords"))
        .then_some(object)
}

/// Parses `text` as an object, applying progressively heavier repairs.
fn parse_repaired(text: &str) -> Option<JsonObject> {
    let text = text.trim();
    if !text.starts_with('{') {
        return None;
    }
    if let Some(object) = parse_object(text) {
        return Some(object);
    }

    let normalized = normalize_text(text);
    if let Some(object) = parse_object(&normalized) {
        return Some(object);
    }

    let mut candidate = normalized;
    for _ in 0..MAX_REPAIR_ROUNDS {
        if let Some(object) = parse_object(&complete_structure(&candidate)) {
            return Some(object);
        }
        candidate = truncate_at_last_separator(&candidate)?;
    }
    None
}

fn parse_object(text: &str) -> Option<JsonObject> {
    match serde_json::from_str(text) {
        Ok(Value::Object(object)) => Some(object),
        _ => None,
    }
}

/// Fixes common character-level mistakes: raw newlines, typographic quotes,
/// doubled backslashes and trailing commas.
fn normalize_text(text: &str) -> String {
    let replaced: String = text
        .replace("\\\\", "")
        .chars()
        .map(|c| match c {
            '\r' | '\n' => ' ',
            '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            '\u{2018}' | '\u{2019}' => '\'',
            other => other,
        })
        .collect();
    TRAILING_COMMA.replace_all(&replaced, "$1").into_owned()
}

/// Closes an unterminated string and any open arrays or objects, dropping a
/// dangling separator first.
fn complete_structure(text: &str) -> String {
    let mut closers = Vec::new();
    let mut in_string = false;
    let mut escaped = false;

    for c in text.chars() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => closers.push('}'),
            '[' => closers.push(']'),
            '}' | ']' => {
                closers.pop();
            }
            _ => {}
        }
    }

    let mut out = text.to_string();
    if escaped {
        out.pop();
    }
    if in_string {
        out.push('"');
    }

    let kept = out.trim_end().trim_end_matches(',').trim_end().len();
    out.truncate(kept);
    if out.ends_with(':') {
        out.push_str(" null");
    }
    while let Some(close) = closers.pop() {
        out.push(close);
    }
    out
}

/// Cuts `text` just before the last comma outside a string literal.
fn truncate_at_last_separator(text: &str) -> Option<String> {
    let mut last = None;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in text.char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            ',' => last = Some(i),
            _ => {}
        }
    }

    last.map(|i| text[..i].to_string())
}

/// Returns the first balanced `{...}` span, or everything from the first
/// `{` when the object never closes.
fn first_object(text: &str) -> Option<&str> {
    let start = text.find('{')?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (offset, c) in text[start..].char_indices() {
        if in_string {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == '"' {
                in_string = false;
            }
            continue;
        }
        match c {
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

    Some(&text[start..])
}

/// Cleans a plain-text caption for storage.
///
/// Newlines become spaces, typographic double quotes are straightened,
/// doubled backslashes are dropped, and the text is cut after its last
/// period so a caption truncated by the token limit ends on a full sentence.
pub fn clean_caption(text: &str) -> Option<String> {
    let normalized: String = text
        .replace("\\\\", "")
        .chars()
        .map(|c| match c {
            '\u{201C}' | '\u{201D}' | '\u{201E}' => '"',
            other => other,
        })
        .collect();
    let mut caption = normalized.split_whitespace().collect::<Vec<_>>().join(" ");

    if let Some(last_period) = caption.rfind('.') {
        caption.truncate(last_period + 1);
    }

    let caption = caption.trim();
    (!caption.is_empty()).then(|| caption.to_string())
}
