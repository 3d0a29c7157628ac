//! Recall entries

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use zeroize::Zeroize;

/// An append-only record used for content search.
///
/// Created on write, never mutated, removed only by delete or clear.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryEntry {
    /// `entry-<uuid>`
    pub id: String,
    #[serde(rename = "type")]
    pub entry_type: String,
    pub content: Value,
    pub timestamp: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<HashMap<String, Value>>,
}

impl MemoryEntry {
    /// New entry stamped with a fresh id and the current time
    pub fn new(
        entry_type: impl Into<String>,
        content: impl Into<Value>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Self {
        Self {
            id: format!("entry-{}", uuid::Uuid::new_v4()),
            entry_type: entry_type.into(),
            content: content.into(),
            timestamp: Utc::now(),
            metadata,
        }
    }

    /// Override the timestamp (imports, replays)
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp;
        self
    }

    /// Lowercased text a query is matched against.
    ///
    /// String content matches on the string itself; any other JSON value
    /// matches on its compact serialized form.
    pub fn search_text(&self) -> String {
        match &self.content {
            Value::String(s) => s.to_lowercase(),
            other => other.to_string().to_lowercase(),
        }
    }

    pub fn matches(&self, query_lower: &str) -> bool {
        self.search_text().contains(query_lower)
    }

    /// Zeroize content and metadata before the entry is dropped.
    pub(crate) fn erase(&mut self) {
        erase_value(&mut self.content);
        if let Some(metadata) = self.metadata.as_mut() {
            metadata.values_mut().for_each(erase_value);
            metadata.clear();
        }
    }
}

fn erase_value(value: &mut Value) {
    match value {
        Value::String(s) => s.zeroize(),
        Value::Array(items) => items.iter_mut().for_each(erase_value),
        Value::Object(map) => map.values_mut().for_each(erase_value),
        _ => {}
    }
    *value = Value::Null;
}
