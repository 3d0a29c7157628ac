//! Outbound sync of projected packet views
//!
//! Every packet that leaves the process through a sync target is projected
//! for the engine's role first; targets only ever see `PacketView`s.

mod directory;

pub use directory::DirectoryTarget;

use crate::config::SyncConfig;
use crate::error::{Error, Result};
use crate::packet::filter::PacketFilter;
use crate::packet::model::hex_encode;
use crate::packet::projector::{project_visible, PacketView, Role};
use crate::packet::store::{file_id, PacketStore};
use async_trait::async_trait;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use tracing::{debug, info, warn};

/// Destination for projected packet views
#[async_trait]
pub trait SyncTarget: Send + Sync {
    /// Target name for logging
    fn name(&self) -> &str;

    /// Digests (see [`view_digest`]) of the views the target holds, by id
    async fn manifest(&self) -> Result<HashMap<String, String>>;

    /// Create or replace the view for `view.id`
    async fn push(&self, view: &PacketView) -> Result<()>;

    /// Drop the view for `id`; absent ids are not an error
    async fn remove(&self, id: &str) -> Result<()>;
}

/// SHA-256 hex digest of a view's JSON encoding
pub fn view_digest(view: &PacketView) -> Result<String> {
    let bytes = serde_json::to_vec(view)?;
    Ok(hex_encode(&Sha256::digest(&bytes)))
}

/// Outcome of one sync pass
#[derive(Debug, Clone, Default, Serialize)]
pub struct SyncReport {
    pub target: String,
    pub role: Option<Role>,
    /// Ids pushed because they were new or their view changed
    pub pushed: Vec<String>,
    pub unchanged: usize,
    /// Packets the role may not see
    pub hidden: usize,
    /// Ids removed from the target
    pub removed: Vec<String>,
    /// Store files that could not be parsed; their ids are left untouched
    pub failures: usize,
}

/// Mirrors the store into a target as views for one role
pub struct SyncEngine {
    target: Box<dyn SyncTarget>,
    role: Role,
}

impl SyncEngine {
    pub fn new(target: Box<dyn SyncTarget>, role: Role) -> Self {
        Self { target, role }
    }

    /// Engine for the configured directory target; `None` when sync is disabled.
    pub fn from_config(config: &SyncConfig) -> Result<Option<Self>> {
        if !config.enabled {
            return Ok(None);
        }
        let dir = config
            .target_dir
            .clone()
            .ok_or_else(|| Error::Config("sync.enabled requires sync.target_dir".into()))?;
        Ok(Some(Self::new(Box::new(DirectoryTarget::new(dir)), config.role)))
    }

    pub fn role(&self) -> Role {
        self.role
    }

    /// Push changed views, remove vanished ones.
    pub async fn sync(&self, store: &PacketStore) -> Result<SyncReport> {
        let listing = store.list(&PacketFilter::new()).await?;
        let held = self.target.manifest().await?;

        let mut report = SyncReport {
            target: self.target.name().to_string(),
            role: Some(self.role),
            failures: listing.failures.len(),
            ..Default::default()
        };

        // Ids whose documents failed to parse: neither pushed nor removed.
        let mut keep: HashSet<String> = listing
            .failures
            .iter()
            .filter_map(|f| file_id(&f.path))
            .collect();

        for packet in &listing.packets {
            let Some(view) = project_visible(packet, self.role) else {
                report.hidden += 1;
                continue;
            };
            keep.insert(view.id.clone());

            let digest = view_digest(&view)?;
            if held.get(&view.id) == Some(&digest) {
                report.unchanged += 1;
                continue;
            }
            self.target.push(&view).await?;
            debug!(packet_id = %view.id, target = %self.target.name(), "View pushed");
            report.pushed.push(view.id);
        }

        let mut stale: Vec<&String> = held.keys().filter(|id| !keep.contains(*id)).collect();
        stale.sort();
        for id in stale {
            self.target.remove(id).await?;
            debug!(packet_id = %id, target = %self.target.name(), "View removed");
            report.removed.push(id.clone());
        }

        if report.failures > 0 {
            warn!(failures = report.failures, "Sync skipped unreadable packet files");
        }
        info!(
            target = %report.target,
            role = %self.role,
            pushed = report.pushed.len(),
            unchanged = report.unchanged,
            hidden = report.hidden,
            removed = report.removed.len(),
            "Sync finished"
        );
        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::model::{MemoryPacket, PacketBuilder, Visibility};
    use chrono::{TimeZone, Utc};
    use std::sync::{Arc, Mutex};
    use tempfile::TempDir;

    /// Records calls and holds views in memory
    #[derive(Default, Clone)]
    struct RecordingTarget {
        views: Arc<Mutex<HashMap<String, PacketView>>>,
        pushes: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl SyncTarget for RecordingTarget {
        fn name(&self) -> &str {
            "recording"
        }

        async fn manifest(&self) -> Result<HashMap<String, String>> {
            let views = self.views.lock().unwrap();
            views
                .iter()
                .map(|(id, v)| Ok((id.clone(), view_digest(v)?)))
                .collect()
        }

        async fn push(&self, view: &PacketView) -> Result<()> {
            self.pushes.lock().unwrap().push(view.id.clone());
            self.views.lock().unwrap().insert(view.id.clone(), view.clone());
            Ok(())
        }

        async fn remove(&self, id: &str) -> Result<()> {
            self.views.lock().unwrap().remove(id);
            Ok(())
        }
    }

    fn packet(id: &str, visibility: Visibility) -> MemoryPacket {
        PacketBuilder::new(id, format!("Packet {id}"))
            .created_at(Utc.with_ymd_and_hms(2025, 10, 14, 9, 0, 0).unwrap())
            .author("john")
            .content("body")
            .secret("KEY", "hunter2")
            .visibility(visibility)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_sync_pushes_only_changes() {
        let dir = TempDir::new().unwrap();
        let store = PacketStore::new(dir.path());
        store.upsert(&mut packet("open", Visibility::Public)).await.unwrap();
        store.upsert(&mut packet("team", Visibility::Collaborator)).await.unwrap();
        store.upsert(&mut packet("mine", Visibility::Owner)).await.unwrap();

        let target = RecordingTarget::default();
        let engine = SyncEngine::new(Box::new(target.clone()), Role::Collaborator);

        let first = engine.sync(&store).await.unwrap();
        assert_eq!(first.pushed, vec!["open".to_string(), "team".to_string()]);
        assert_eq!(first.hidden, 1);

        let second = engine.sync(&store).await.unwrap();
        assert!(second.pushed.is_empty());
        assert_eq!(second.unchanged, 2);

        let mut edited = packet("team", Visibility::Collaborator);
        edited.content = "new body".into();
        store.upsert(&mut edited).await.unwrap();
        let third = engine.sync(&store).await.unwrap();
        assert_eq!(third.pushed, vec!["team".to_string()]);
        assert_eq!(third.unchanged, 1);
    }

    #[tokio::test]
    async fn test_sync_never_leaks_secrets_below_owner() {
        let dir = TempDir::new().unwrap();
        let store = PacketStore::new(dir.path());
        store.upsert(&mut packet("open", Visibility::Public)).await.unwrap();

        let target = RecordingTarget::default();
        let engine = SyncEngine::new(Box::new(target.clone()), Role::Public);
        engine.sync(&store).await.unwrap();

        let views = target.views.lock().unwrap();
        let json = serde_json::to_string(&views["open"]).unwrap();
        assert!(!json.contains("hunter2"));
        assert!(!json.contains("body"));
    }

    #[tokio::test]
    async fn test_sync_removes_deleted_and_downgraded() {
        let dir = TempDir::new().unwrap();
        let store = PacketStore::new(dir.path());
        store.upsert(&mut packet("a", Visibility::Public)).await.unwrap();
        store.upsert(&mut packet("b", Visibility::Public)).await.unwrap();

        let target = RecordingTarget::default();
        let engine = SyncEngine::new(Box::new(target.clone()), Role::Public);
        engine.sync(&store).await.unwrap();

        store.delete("a").await.unwrap();
        store.upsert(&mut packet("b", Visibility::Owner)).await.unwrap();
        let report = engine.sync(&store).await.unwrap();
        assert_eq!(report.removed, vec!["a".to_string(), "b".to_string()]);
        assert!(target.views.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_sync_keeps_ids_of_unreadable_files() {
        let dir = TempDir::new().unwrap();
        let store = PacketStore::new(dir.path());
        store.upsert(&mut packet("a", Visibility::Public)).await.unwrap();

        let target = RecordingTarget::default();
        let engine = SyncEngine::new(Box::new(target.clone()), Role::Public);
        engine.sync(&store).await.unwrap();

        std::fs::write(dir.path().join("2025-10-14_a.md"), "corrupted").unwrap();
        let report = engine.sync(&store).await.unwrap();
        assert_eq!(report.failures, 1);
        assert!(report.removed.is_empty());
        assert!(target.views.lock().unwrap().contains_key("a"));
    }

    #[test]
    fn test_from_config() {
        assert!(SyncEngine::from_config(&SyncConfig::default()).unwrap().is_none());

        let config = SyncConfig {
            enabled: true,
            target_dir: None,
            role: Role::Public,
        };
        assert!(matches!(SyncEngine::from_config(&config), Err(Error::Config(_))));

        let config = SyncConfig {
            enabled: true,
            target_dir: Some("/tmp/mirror".into()),
            role: Role::Public,
        };
        let engine = SyncEngine::from_config(&config).unwrap().unwrap();
        assert_eq!(engine.role(), Role::Public);
    }
}
