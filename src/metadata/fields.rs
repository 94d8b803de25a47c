//! Alias tables and reduction from raw tool output to a canonical record.
//!
//! ExifTool reports the same concept under several group-qualified names
//! depending on file format and which software wrote it. The tables below
//! list every name we read, in priority order.

use std::collections::BTreeMap;
use std::path::PathBuf;

use serde_json::Value;

use crate::models::{CanonicalRecord, FileId, Status};

pub const KEYWORD_FIELDS: &[&str] = &[
    "Keywords",
    "IPTC:Keywords",
    "Composite:Keywords",
    "Subject",
    "DC:Subject",
    "XMP:Subject",
    "XMP-dc:Subject",
];

pub const DESCRIPTION_FIELDS: &[&str] = &[
    "Description",
    "XMP:Description",
    "ImageDescription",
    "DC:Description",
    "EXIF:ImageDescription",
    "Composite:Description",
    "Caption",
    "IPTC:Caption",
    "Composite:Caption",
    "IPTC:Caption-Abstract",
    "XMP-dc:Description",
    "PNG:Description",
];

pub const IDENTIFIER_FIELDS: &[&str] = &["Identifier", "XMP:Identifier", "XMP-dc:Identifier"];

pub const STATUS_FIELDS: &[&str] = &["Status", "XMP:Status"];

/// Key under which ExifTool reports `-validate` results.
pub const VALIDATE_FIELD: &str = "ExifTool:Validate";

/// Key under which ExifTool reports the file path.
pub const SOURCE_FILE_FIELD: &str = "SourceFile";

/// Every field requested from the metadata tool on read.
pub fn all_read_fields() -> impl Iterator<Item = &'static str> {
    KEYWORD_FIELDS
        .iter()
        .chain(DESCRIPTION_FIELDS)
        .chain(IDENTIFIER_FIELDS)
        .chain(STATUS_FIELDS)
        .copied()
}

/// Error/warning counts reported by a validation pass, `"<errors> <warnings> <minor>"`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ValidationSummary {
    pub errors: u32,
    pub warnings: u32,
    pub minor_warnings: u32,
}

impl ValidationSummary {
    /// Parses the summary string. Returns `None` if it is not three counts.
    pub fn parse(raw: &str) -> Option<Self> {
        let mut parts = raw.split_whitespace().map(str::parse::<u32>);
        let summary = Self {
            errors: parts.next()?.ok()?,
            warnings: parts.next()?.ok()?,
            minor_warnings: parts.next()?.ok()?,
        };
        parts.next().is_none().then_some(summary)
    }

    pub fn has_errors(&self) -> bool {
        self.errors > 0
    }
}

/// Raw per-file field values as returned by the metadata tool.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct RawFieldMap {
    pub source_file: PathBuf,
    pub fields: BTreeMap<String, Value>,
    pub validation: Option<ValidationSummary>,
}

impl RawFieldMap {
    pub fn new(source_file: impl Into<PathBuf>) -> Self {
        Self {
            source_file: source_file.into(),
            ..Self::default()
        }
    }

    pub fn with_field(mut self, name: impl Into<String>, value: Value) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    /// Builds a map from one object of ExifTool's `-j` output.
    ///
    /// Returns `None` when the object carries no `SourceFile`.
    pub fn from_json_object(object: serde_json::Map<String, Value>) -> Option<Self> {
        let mut fields: BTreeMap<String, Value> = object.into_iter().collect();
        let source_file = match fields.remove(SOURCE_FILE_FIELD)? {
            Value::String(path) => PathBuf::from(path),
            _ => return None,
        };
        let validation = fields
            .remove(VALIDATE_FIELD)
            .and_then(|v| value_as_text(&v))
            .and_then(|text| ValidationSummary::parse(&text));

        Some(Self {
            source_file,
            fields,
            validation,
        })
    }

    /// First non-empty scalar among `aliases`, in order.
    fn first_text(&self, aliases: &[&str]) -> Option<String> {
        aliases
            .iter()
            .filter_map(|alias| self.fields.get(*alias))
            .filter_map(value_as_text)
            .find(|text| !text.trim().is_empty())
    }

    /// Union of the values of every alias in `aliases`.
    fn all_values(&self, aliases: &[&str]) -> Vec<String> {
        aliases
            .iter()
            .filter_map(|alias| self.fields.get(*alias))
            .flat_map(value_as_list)
            .filter(|text| !text.trim().is_empty())
            .collect()
    }
}

/// Reduces vendor field variants to the canonical record.
///
/// Description, identifier and status take the first non-empty alias in
/// priority order. Keywords are the union across all keyword aliases. A
/// status value that is not recognised is treated as unset.
pub fn reduce(raw: &RawFieldMap) -> CanonicalRecord {
    let mut record = CanonicalRecord::new(raw.source_file.clone());
    record.identifier = raw
        .first_text(IDENTIFIER_FIELDS)
        .map(|id| FileId::new(id.trim()));
    record.status = raw
        .first_text(STATUS_FIELDS)
        .and_then(|s| s.parse::<Status>().ok());
    record.description = raw.first_text(DESCRIPTION_FIELDS);
    record.keywords = raw.all_values(KEYWORD_FIELDS).into_iter().collect();
    record
}

fn value_as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Array(items) => items.first().and_then(value_as_text),
        Value::Null | Value::Object(_) => None,
    }
}

fn value_as_list(value: &Value) -> Vec<String> {
    match value {
        Value::Array(items) => items.iter().filter_map(value_as_text).collect(),
        other => value_as_text(other).into_iter().collect(),
    }
}
