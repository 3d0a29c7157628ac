//! Role-scoped access to the packet store
//!
//! `MemoryVault` is the read/export surface: every read takes a `Role`,
//! applies the visibility gate and returns projected views only.

use crate::config::SoulSketchConfig;
use crate::error::{Error, Result};
use crate::packet::filter::PacketFilter;
use crate::packet::model::MemoryPacket;
use crate::packet::projector::{project_visible, PacketView, Role};
use crate::packet::store::{PacketStore, ScanFailure};
use std::path::PathBuf;
use tracing::{debug, warn};

/// Views returned by a role-scoped listing
#[derive(Debug, Clone, Default)]
pub struct ViewListing {
    pub views: Vec<PacketView>,
    /// Packets that matched the filter but are above the role's visibility
    pub hidden: usize,
    pub failures: Vec<ScanFailure>,
}

/// Packet store wrapped with the role projection
pub struct MemoryVault {
    store: PacketStore,
}

impl MemoryVault {
    pub fn new(store: PacketStore) -> Self {
        Self { store }
    }

    pub fn from_config(config: &SoulSketchConfig) -> Self {
        Self::new(PacketStore::from_config(&config.storage))
    }

    /// Underlying store (owner-side operations such as audit)
    pub fn store(&self) -> &PacketStore {
        &self.store
    }

    /// Write a packet.
    ///
    /// When the id already exists the stored `created_at` is kept and
    /// `updated_at` is refreshed; a new packet is written as given. An
    /// existing file that no longer parses is replaced.
    pub async fn save(&self, packet: &mut MemoryPacket) -> Result<PathBuf> {
        match self.store.read(&packet.id).await {
            Ok(Some(existing)) => {
                debug!(packet_id = %packet.id, "Updating existing packet");
                packet.created_at = existing.created_at;
                packet.touch();
            }
            Ok(None) => {}
            Err(Error::MalformedDocument(e)) => {
                warn!(packet_id = %packet.id, error = %e, "Replacing unreadable packet file");
            }
            Err(e) => return Err(e),
        }
        self.store.upsert(packet).await
    }

    /// Read one packet as `role`. `None` when absent or not visible to the role.
    pub async fn read_as(&self, id: &str, role: Role) -> Result<Option<PacketView>> {
        let Some(packet) = self.store.read(id).await? else {
            return Ok(None);
        };
        let view = project_visible(&packet, role);
        if view.is_none() {
            debug!(packet_id = %id, role = %role, "Packet hidden from role");
        }
        Ok(view)
    }

    /// List packets matching `filter` as seen by `role`, newest first.
    pub async fn list_as(&self, filter: &PacketFilter, role: Role) -> Result<ViewListing> {
        let listing = self.store.list(filter).await?;
        let mut out = ViewListing {
            failures: listing.failures,
            ..Default::default()
        };
        for packet in &listing.packets {
            match project_visible(packet, role) {
                Some(view) => out.views.push(view),
                None => out.hidden += 1,
            }
        }
        out.views
            .sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        Ok(out)
    }

    /// Delete a packet by id
    pub async fn delete(&self, id: &str) -> Result<bool> {
        self.store.delete(id).await
    }
}
