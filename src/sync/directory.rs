//! Directory sync target
//!
//! Layout:
//! ```text
//! <target_dir>/
//! ├── kickoff.json
//! └── alice-to-cassie.json
//! ```

use super::{view_digest, SyncTarget};
use crate::error::{Error, Result};
use crate::packet::model::is_kebab_case;
use crate::packet::store::write_atomic;
use crate::packet::projector::PacketView;
use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Writes each view as pretty JSON to `<dir>/<id>.json`
pub struct DirectoryTarget {
    dir: PathBuf,
}

impl DirectoryTarget {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path_for(&self, id: &str) -> Result<PathBuf> {
        if !is_kebab_case(id) {
            return Err(Error::Sync(format!("refusing to sync non kebab-case id: {id:?}")));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }
}

#[async_trait]
impl SyncTarget for DirectoryTarget {
    fn name(&self) -> &str {
        "directory"
    }

    async fn manifest(&self) -> Result<HashMap<String, String>> {
        let mut manifest = HashMap::new();
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(manifest),
            Err(e) => return Err(e.into()),
        };

        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let Some(id) = path.file_stem().and_then(|s| s.to_str()).map(str::to_string) else {
                continue;
            };
            if id.starts_with('.') {
                continue;
            }
            // Unreadable views get an empty digest so the next pass rewrites or removes them.
            let digest = match tokio::fs::read(&path).await {
                Ok(bytes) => match serde_json::from_slice::<PacketView>(&bytes) {
                    Ok(view) => view_digest(&view)?,
                    Err(e) => {
                        warn!(path = %path.display(), error = %e, "Unreadable synced view");
                        String::new()
                    }
                },
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Unreadable synced view");
                    String::new()
                }
            };
            manifest.insert(id, digest);
        }
        Ok(manifest)
    }

    async fn push(&self, view: &PacketView) -> Result<()> {
        let path = self.path_for(&view.id)?;
        tokio::fs::create_dir_all(&self.dir).await?;
        let body = serde_json::to_string_pretty(view)?;
        write_atomic(&path, body).await
    }

    async fn remove(&self, id: &str) -> Result<()> {
        let path = self.dir.join(format!("{id}.json"));
        if !path.starts_with(&self.dir) || id.contains(['/', '\\']) {
            return Err(Error::Sync(format!("invalid view id: {id:?}")));
        }
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::model::{PacketBuilder, Visibility};
    use crate::packet::projector::{project, Role};
    use crate::packet::store::PacketStore;
    use crate::sync::SyncEngine;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn view(id: &str) -> PacketView {
        let packet = PacketBuilder::new(id, "Title")
            .created_at(Utc.with_ymd_and_hms(2025, 10, 14, 9, 0, 0).unwrap())
            .author("john")
            .content("body")
            .visibility(Visibility::Public)
            .build()
            .unwrap();
        project(&packet, Role::Collaborator)
    }

    #[tokio::test]
    async fn test_push_manifest_remove() {
        let dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(dir.path().join("mirror"));
        assert!(target.manifest().await.unwrap().is_empty());

        let v = view("kickoff");
        target.push(&v).await.unwrap();
        assert!(target.dir().join("kickoff.json").exists());

        let manifest = target.manifest().await.unwrap();
        assert_eq!(manifest.get("kickoff"), Some(&view_digest(&v).unwrap()));

        target.remove("kickoff").await.unwrap();
        target.remove("kickoff").await.unwrap();
        assert!(target.manifest().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_rejects_unsafe_ids() {
        let dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(dir.path());
        let mut v = view("ok");
        v.id = "../escape".into();
        assert!(matches!(target.push(&v).await, Err(Error::Sync(_))));
        assert!(matches!(target.remove("../escape").await, Err(Error::Sync(_))));
    }

    #[tokio::test]
    async fn test_corrupt_view_is_rewritten() {
        let dir = TempDir::new().unwrap();
        let store = PacketStore::new(dir.path().join("packets"));
        let mut packet = PacketBuilder::new("kickoff", "Kickoff")
            .author("john")
            .visibility(Visibility::Public)
            .build()
            .unwrap();
        store.upsert(&mut packet).await.unwrap();

        let mirror = dir.path().join("mirror");
        let engine = SyncEngine::new(Box::new(DirectoryTarget::new(&mirror)), Role::Public);
        engine.sync(&store).await.unwrap();

        std::fs::write(mirror.join("kickoff.json"), "{ broken").unwrap();
        std::fs::write(mirror.join("orphan.json"), "{ broken").unwrap();
        let report = engine.sync(&store).await.unwrap();
        assert_eq!(report.pushed, vec!["kickoff".to_string()]);
        assert_eq!(report.removed, vec!["orphan".to_string()]);

        let text = std::fs::read_to_string(mirror.join("kickoff.json")).unwrap();
        let view: PacketView = serde_json::from_str(&text).unwrap();
        assert_eq!(view.id, "kickoff");
        assert!(view.content.is_none());
    }

    #[tokio::test]
    async fn test_failed_push_leaves_no_temp_file() {
        let dir = TempDir::new().unwrap();
        let target = DirectoryTarget::new(dir.path().join("mirror"));
        let blocker = target.dir().join("kickoff.json");
        std::fs::create_dir_all(&blocker).unwrap();
        std::fs::write(blocker.join("occupied"), "x").unwrap();

        assert!(target.push(&view("kickoff")).await.is_err());
        assert!(!target.dir().join(".kickoff.json.tmp").exists());
    }
}
