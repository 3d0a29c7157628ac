//! Entry store with optional JSON-lines persistence
//!
//! Entries live in memory behind a `tokio::sync::RwLock`. When opened on a
//! file, every write is appended as one JSON line; delete and clear rewrite
//! the whole file.

use super::entry::MemoryEntry;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use crate::packet::store::write_atomic;
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Append-only entry log with linear search
pub struct EntryStore {
    /// Insertion order
    entries: Arc<RwLock<Vec<MemoryEntry>>>,
    path: Option<PathBuf>,
}

impl EntryStore {
    /// Store that never touches disk
    pub fn in_memory() -> Self {
        Self {
            entries: Arc::new(RwLock::new(Vec::new())),
            path: None,
        }
    }

    /// Open a store backed by a JSON-lines file, loading what it holds.
    ///
    /// A missing file is an empty store. Lines that do not decode are skipped
    /// with a warning.
    pub async fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let entries = load_lines(&path).await?;
        info!(path = %path.display(), count = entries.len(), "Entry log loaded");
        Ok(Self {
            entries: Arc::new(RwLock::new(entries)),
            path: Some(path),
        })
    }

    /// Open the file named by the storage config, or an in-memory store
    pub async fn from_config(config: &StorageConfig) -> Result<Self> {
        match &config.entries_file {
            Some(path) => Self::open(path.clone()).await,
            None => Ok(Self::in_memory()),
        }
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// Record a new entry stamped with the current time
    pub async fn write(
        &self,
        entry_type: &str,
        content: impl Into<Value>,
        metadata: Option<HashMap<String, Value>>,
    ) -> Result<MemoryEntry> {
        let entry = MemoryEntry::new(entry_type, content, metadata);
        self.insert(entry.clone()).await?;
        Ok(entry)
    }

    /// Record a prebuilt entry. Ids must be unique.
    pub async fn insert(&self, entry: MemoryEntry) -> Result<()> {
        if entry.entry_type.trim().is_empty() {
            return Err(Error::Validation("entry type must not be empty".into()));
        }
        let mut entries = self.entries.write().await;
        if entries.iter().any(|e| e.id == entry.id) {
            return Err(Error::Validation(format!("duplicate entry id: {}", entry.id)));
        }
        if let Some(path) = &self.path {
            append_line(path, &entry).await?;
        }
        debug!(entry_id = %entry.id, entry_type = %entry.entry_type, "Entry written");
        entries.push(entry);
        Ok(())
    }

    /// Remove one entry, erasing its content. Returns whether it existed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let mut entries = self.entries.write().await;
        let Some(pos) = entries.iter().position(|e| e.id == id) else {
            return Ok(false);
        };
        if let Some(path) = &self.path {
            let remaining: Vec<MemoryEntry> =
                entries.iter().filter(|e| e.id != id).cloned().collect();
            rewrite(path, &remaining).await?;
        }
        let mut removed = entries.remove(pos);
        removed.erase();
        debug!(entry_id = %id, "Entry deleted");
        Ok(true)
    }

    /// Remove every entry, erasing content. Returns how many were removed.
    pub async fn clear(&self) -> Result<usize> {
        let mut entries = self.entries.write().await;
        let count = entries.len();
        if let Some(path) = &self.path {
            rewrite(path, &[]).await?;
        }
        for mut entry in entries.drain(..) {
            entry.erase();
        }
        info!(count, "Entry log cleared");
        Ok(count)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    pub async fn get(&self, id: &str) -> Option<MemoryEntry> {
        self.entries.read().await.iter().find(|e| e.id == id).cloned()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }

    /// Entries whose content contains `query` (case-insensitive), newest first.
    ///
    /// Ties on timestamp go to the entry written last. An empty query
    /// matches every entry.
    pub async fn search(&self, query: &str, limit: usize) -> Vec<MemoryEntry> {
        let query = query.to_lowercase();
        self.newest_first(limit, |e| e.matches(&query)).await
    }

    /// The `limit` most recent entries
    pub async fn recent(&self, limit: usize) -> Vec<MemoryEntry> {
        self.newest_first(limit, |_| true).await
    }

    /// The `limit` most recent entries of one type
    pub async fn by_type(&self, entry_type: &str, limit: usize) -> Vec<MemoryEntry> {
        self.newest_first(limit, |e| e.entry_type == entry_type).await
    }

    async fn newest_first<F>(&self, limit: usize, keep: F) -> Vec<MemoryEntry>
    where
        F: Fn(&MemoryEntry) -> bool,
    {
        let entries = self.entries.read().await;
        // Reverse insertion order first so the stable sort favors later writes.
        let mut hits: Vec<&MemoryEntry> = entries.iter().rev().filter(|e| keep(e)).collect();
        hits.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        hits.into_iter().take(limit).cloned().collect()
    }
}

impl Default for EntryStore {
    fn default() -> Self {
        Self::in_memory()
    }
}

async fn load_lines(path: &Path) -> Result<Vec<MemoryEntry>> {
    let text = match tokio::fs::read_to_string(path).await {
        Ok(text) => text,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut entries: Vec<MemoryEntry> = Vec::new();
    for (n, line) in text.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<MemoryEntry>(line) {
            Ok(entry) if entries.iter().any(|e| e.id == entry.id) => {
                warn!(path = %path.display(), line = n + 1, entry_id = %entry.id, "Skipping duplicate entry");
            }
            Ok(entry) => entries.push(entry),
            Err(e) => {
                warn!(path = %path.display(), line = n + 1, error = %e, "Skipping invalid entry line");
            }
        }
    }
    Ok(entries)
}

async fn append_line(path: &Path, entry: &MemoryEntry) -> Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    let mut line = serde_json::to_string(entry)?;
    line.push('\n');
    let mut file = tokio::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .await?;
    file.write_all(line.as_bytes()).await?;
    file.flush().await?;
    Ok(())
}

async fn rewrite(path: &Path, entries: &[MemoryEntry]) -> Result<()> {
    let mut body = String::new();
    for entry in entries {
        body.push_str(&serde_json::to_string(entry)?);
        body.push('\n');
    }
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }
    write_atomic(path, body).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn at(minute: u32) -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 10, 14, 12, minute, 0).unwrap()
    }

    #[tokio::test]
    async fn test_search_limit_one_returns_latest() {
        let store = EntryStore::in_memory();
        let newer = MemoryEntry::new("note", "deploy the gateway", None).with_timestamp(at(30));
        let older = MemoryEntry::new("note", "Gateway config drafted", None).with_timestamp(at(5));
        store.insert(newer.clone()).await.unwrap();
        store.insert(older).await.unwrap();

        let hits = store.search("gateway", 1).await;
        assert_eq!(hits, vec![newer]);
    }

    #[tokio::test]
    async fn test_search_is_case_insensitive_and_ordered() {
        let store = EntryStore::in_memory();
        for (minute, text) in [(1, "Alpha"), (3, "alphabet"), (2, "beta")] {
            store
                .insert(MemoryEntry::new("note", text, None).with_timestamp(at(minute)))
                .await
                .unwrap();
        }

        let hits = store.search("ALPHA", 10).await;
        let texts: Vec<_> = hits.iter().map(|e| e.content.as_str().unwrap()).collect();
        assert_eq!(texts, vec!["alphabet", "Alpha"]);
        assert!(store.search("gamma", 10).await.is_empty());
        assert!(store.search("alpha", 0).await.is_empty());
    }

    #[tokio::test]
    async fn test_search_is_deterministic_on_ties() {
        let store = EntryStore::in_memory();
        let first = MemoryEntry::new("note", "same", None).with_timestamp(at(1));
        let second = MemoryEntry::new("note", "same", None).with_timestamp(at(1));
        store.insert(first.clone()).await.unwrap();
        store.insert(second.clone()).await.unwrap();

        for _ in 0..3 {
            let ids: Vec<_> = store.search("same", 10).await.into_iter().map(|e| e.id).collect();
            assert_eq!(ids, vec![second.id.clone(), first.id.clone()]);
        }
    }

    #[tokio::test]
    async fn test_json_content_search() {
        let store = EntryStore::in_memory();
        store
            .write("event", json!({"agent": "Cassie", "action": "handoff"}), None)
            .await
            .unwrap();
        assert_eq!(store.search("cassie", 5).await.len(), 1);
    }

    #[tokio::test]
    async fn test_recent_and_by_type() {
        let store = EntryStore::in_memory();
        let base = Utc::now();
        for (i, kind) in ["plan", "note", "plan", "note"].iter().enumerate() {
            store
                .insert(
                    MemoryEntry::new(*kind, format!("{kind}-{i}"), None)
                        .with_timestamp(base + Duration::seconds(i as i64)),
                )
                .await
                .unwrap();
        }

        let recent = store.recent(2).await;
        assert_eq!(recent[0].content, json!("note-3"));
        assert_eq!(recent[1].content, json!("plan-2"));

        let plans = store.by_type("plan", 10).await;
        assert_eq!(plans.len(), 2);
        assert_eq!(plans[0].content, json!("plan-2"));
    }

    #[tokio::test]
    async fn test_get_delete_clear() {
        let store = EntryStore::in_memory();
        let a = store.write("note", "a", None).await.unwrap();
        store.write("note", "b", None).await.unwrap();

        assert_eq!(store.get(&a.id).await, Some(a.clone()));
        assert!(store.delete(&a.id).await.unwrap());
        assert!(!store.delete(&a.id).await.unwrap());
        assert!(store.get(&a.id).await.is_none());
        assert_eq!(store.len().await, 1);

        assert_eq!(store.clear().await.unwrap(), 1);
        assert!(store.is_empty().await);
    }

    #[tokio::test]
    async fn test_rejects_duplicate_id_and_empty_type() {
        let store = EntryStore::in_memory();
        let entry = MemoryEntry::new("note", "x", None);
        store.insert(entry.clone()).await.unwrap();
        assert!(matches!(store.insert(entry).await, Err(Error::Validation(_))));
        assert!(matches!(
            store.write(" ", "x", None).await,
            Err(Error::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_persistence_roundtrip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("log").join("entries.jsonl");

        let store = EntryStore::open(&path).await.unwrap();
        let keep = store.write("note", "keep me", None).await.unwrap();
        let gone = store.write("note", "drop me", None).await.unwrap();
        store.delete(&gone.id).await.unwrap();

        let reopened = EntryStore::open(&path).await.unwrap();
        assert_eq!(reopened.len().await, 1);
        assert_eq!(reopened.get(&keep.id).await, Some(keep));

        reopened.clear().await.unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.is_empty());
    }

    #[tokio::test]
    async fn test_load_skips_invalid_lines() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entries.jsonl");
        let good = MemoryEntry::new("note", "fine", None);
        let body = format!(
            "{}\nnot json\n\n{{\"id\":\"entry-x\"}}\n",
            serde_json::to_string(&good).unwrap()
        );
        std::fs::write(&path, body).unwrap();

        let store = EntryStore::open(&path).await.unwrap();
        assert_eq!(store.len().await, 1);
        assert_eq!(store.get(&good.id).await, Some(good));
    }

    #[tokio::test]
    async fn test_from_config_without_file_is_in_memory() {
        let config = StorageConfig {
            entries_file: None,
            ..Default::default()
        };
        let store = EntryStore::from_config(&config).await.unwrap();
        assert!(store.path().is_none());
    }

    #[tokio::test]
    async fn test_failed_delete_keeps_entry() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("entries.jsonl");
        let store = EntryStore::open(&path).await.unwrap();
        let entry = store.write("note", "still here", None).await.unwrap();

        std::fs::remove_file(&path).unwrap();
        std::fs::create_dir(&path).unwrap();
        std::fs::write(path.join("occupied"), "x").unwrap();

        assert!(store.delete(&entry.id).await.is_err());
        assert_eq!(store.get(&entry.id).await, Some(entry));
        assert!(!dir.path().join(".entries.jsonl.tmp").exists());
    }
}
