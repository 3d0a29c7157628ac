//! Frontmatter value encoding and the per-field decode table
//!
//! Metadata lines are `key: value`, split on the first colon. Which keys are
//! typed and which stay raw strings is decided here and nowhere else:
//!
//! | key                        | kind         | encoding                      |
//! |----------------------------|--------------|-------------------------------|
//! | `id`, `title`, `project`, `hash` | `Text` | raw string, never re-typed    |
//! | `created_at`, `updated_at` | `Timestamp`  | RFC 3339, UTC `Z` suffix      |
//! | `visibility`               | `Visibility` | `owner` / `collaborator` / `public` |
//! | `tags`, `authors`, `links` | `StringList` | JSON array, `[]` when empty   |
//! | anything else              | `Loose`      | JSON literal, else raw string |
//!
//! Keeping `title` as `Text` means a packet titled `true` or `42` survives a
//! round trip as the string it was written as.

use super::model::Visibility;
use crate::error::{Error, Result};
use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::Value;

/// The delimiter line that opens and closes the metadata block
pub const DELIMITER: &str = "---";

/// How a metadata value is decoded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldKind {
    /// Raw string
    Text,
    /// RFC 3339 timestamp
    Timestamp,
    /// Visibility enum
    Visibility,
    /// JSON array of strings
    StringList,
    /// JSON literal if it parses, raw string otherwise
    Loose,
}

/// Look up the decode rule for a metadata key
pub fn field_kind(key: &str) -> FieldKind {
    match key {
        "id" | "title" | "project" | "hash" => FieldKind::Text,
        "created_at" | "updated_at" => FieldKind::Timestamp,
        "visibility" => FieldKind::Visibility,
        "tags" | "authors" | "links" => FieldKind::StringList,
        _ => FieldKind::Loose,
    }
}

/// A decoded metadata value
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Timestamp(DateTime<Utc>),
    Visibility(Visibility),
    StringList(Vec<String>),
    Loose(Value),
}

/// Split a metadata line on its first colon.
///
/// One space after the colon belongs to the separator; everything after it
/// is the value, byte for byte.
pub fn split_line(line: &str) -> Option<(&str, &str)> {
    let (key, rest) = line.split_once(':')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key, rest.strip_prefix(' ').unwrap_or(rest)))
}

/// Decode a raw value according to the table for `key`.
pub fn decode(key: &str, raw: &str) -> Result<FieldValue> {
    match field_kind(key) {
        FieldKind::Text => Ok(FieldValue::Text(raw.to_string())),
        FieldKind::Timestamp => DateTime::parse_from_rfc3339(raw.trim())
            .map(|t| FieldValue::Timestamp(t.with_timezone(&Utc)))
            .map_err(|e| Error::MalformedDocument(format!("{key}: invalid timestamp '{raw}': {e}"))),
        FieldKind::Visibility => raw.parse().map(FieldValue::Visibility),
        FieldKind::StringList => serde_json::from_str::<Vec<String>>(raw.trim())
            .map(FieldValue::StringList)
            .map_err(|e| Error::MalformedDocument(format!("{key}: expected a JSON string array: {e}"))),
        FieldKind::Loose => Ok(FieldValue::Loose(decode_loose(raw))),
    }
}

/// JSON literal if the value parses as one, the raw string otherwise.
pub fn decode_loose(raw: &str) -> Value {
    serde_json::from_str(raw.trim()).unwrap_or_else(|_| Value::String(raw.to_string()))
}

/// Render one metadata line
pub fn encode_text(key: &str, value: &str) -> String {
    format!("{key}: {value}")
}

/// Render a timestamp line
pub fn encode_timestamp(key: &str, at: &DateTime<Utc>) -> String {
    format!("{key}: {}", at.to_rfc3339_opts(SecondsFormat::AutoSi, true))
}

/// Render a string list as a JSON array
pub fn encode_list(key: &str, values: &[String]) -> Result<String> {
    Ok(format!("{key}: {}", serde_json::to_string(values)?))
}
