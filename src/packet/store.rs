//! Directory-backed packet store
//!
//! Directory layout:
//! ```text
//! ~/.soulsketch/packets/
//! ├── 2025-10-14_kickoff.md
//! ├── 2025-10-15_alice-to-cassie.md
//! └── ...
//! ```
//!
//! One file per packet identity, named `<created_at date>_<id>.<ext>`.
//! There is no locking: two processes upserting the same id race and the
//! last completed write wins.

use super::codec;
use super::model::{MemoryPacket, STORAGE_PATH_KEY};
use super::filter::PacketFilter;
use crate::config::StorageConfig;
use crate::error::{Error, Result};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Default document extension
pub const DEFAULT_EXTENSION: &str = "md";

/// A file that could not be read or parsed during a scan
#[derive(Debug, Clone, Serialize)]
pub struct ScanFailure {
    pub path: PathBuf,
    pub error: String,
}

/// Result of listing the collection.
///
/// A non-empty `failures` means the listing is partial: the corrupted files
/// were skipped and everything else was still returned.
#[derive(Debug, Clone, Default)]
pub struct Listing {
    pub packets: Vec<MemoryPacket>,
    pub failures: Vec<ScanFailure>,
}

impl Listing {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// File-per-packet store over a single directory
pub struct PacketStore {
    dir: PathBuf,
    extension: String,
}

impl PacketStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }

    /// Create a store from the storage section of the configuration
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.packets_dir.clone()).with_extension(config.extension.clone())
    }

    /// Use a different document extension
    pub fn with_extension(mut self, extension: impl Into<String>) -> Self {
        self.extension = extension.into().trim_start_matches('.').to_string();
        self
    }

    /// Directory holding the packet files
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Deterministic file name for a packet: `<YYYY-MM-DD>_<id>.<ext>`
    pub fn file_name_for(&self, packet: &MemoryPacket) -> String {
        format!(
            "{}_{}.{}",
            packet.created_at.format("%Y-%m-%d"),
            packet.id,
            self.extension
        )
    }

    /// Full path a packet is stored at
    pub fn path_for(&self, packet: &MemoryPacket) -> PathBuf {
        self.dir.join(self.file_name_for(packet))
    }

    // =========================================================================
    // Collection operations
    // =========================================================================

    /// Validate, serialize and write a packet, replacing any file for the same id.
    ///
    /// Stamps `metadata.storage_path` on the caller's packet and returns the path.
    pub async fn upsert(&self, packet: &mut MemoryPacket) -> Result<PathBuf> {
        packet.validate()?;
        let document = codec::serialize(packet)?;

        tokio::fs::create_dir_all(&self.dir).await?;
        let path = self.path_for(packet);
        write_atomic(&path, document).await?;

        // A changed created_at moves the file; drop the old name for this id.
        for stale in self.files_for_id(&packet.id).await? {
            if stale != path {
                debug!(packet_id = %packet.id, path = %stale.display(), "Removing stale packet file");
                tokio::fs::remove_file(&stale).await?;
            }
        }

        packet.metadata.insert(
            STORAGE_PATH_KEY.to_string(),
            serde_json::Value::String(path.display().to_string()),
        );
        info!(packet_id = %packet.id, path = %path.display(), "Packet written");
        Ok(path)
    }

    /// Read a packet by id.
    ///
    /// `Ok(None)` means no file exists for the id; a file that exists but
    /// does not parse is an error.
    pub async fn read(&self, id: &str) -> Result<Option<MemoryPacket>> {
        let Some(path) = self.files_for_id(id).await?.pop() else {
            debug!(packet_id = %id, "Packet not found");
            return Ok(None);
        };
        let packet = self.load(&path).await?;
        Ok(Some(packet))
    }

    /// Parse every file and return the packets matching `filter`.
    ///
    /// Files that fail to read or parse are skipped and logged; they do not
    /// abort the listing. Order follows file names and is not a recency
    /// guarantee.
    pub async fn list(&self, filter: &PacketFilter) -> Result<Listing> {
        let mut listing = Listing::default();
        for path in self.document_paths().await? {
            match self.load(&path).await {
                Ok(packet) => {
                    if filter.matches(&packet) {
                        listing.packets.push(packet);
                    }
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Skipping unreadable packet file");
                    listing.failures.push(ScanFailure {
                        path,
                        error: e.to_string(),
                    });
                }
            }
        }
        Ok(listing)
    }

    /// Delete the file(s) for an id. Returns whether anything was removed.
    pub async fn delete(&self, id: &str) -> Result<bool> {
        let paths = self.files_for_id(id).await?;
        if paths.is_empty() {
            return Ok(false);
        }
        for path in &paths {
            tokio::fs::remove_file(path).await?;
        }
        info!(packet_id = %id, "Packet deleted");
        Ok(true)
    }

    // =========================================================================
    // Helpers
    // =========================================================================

    /// Read and parse one document, stamping its storage path.
    pub(crate) async fn load(&self, path: &Path) -> Result<MemoryPacket> {
        let text = tokio::fs::read_to_string(path).await?;
        let mut packet = codec::parse(&text).map_err(|e| match e {
            Error::MalformedDocument(msg) => {
                Error::MalformedDocument(format!("{}: {msg}", path.display()))
            }
            other => other,
        })?;
        packet.metadata.insert(
            STORAGE_PATH_KEY.to_string(),
            serde_json::Value::String(path.display().to_string()),
        );
        Ok(packet)
    }

    /// All document files in the directory, sorted by name.
    ///
    /// A missing directory is an empty collection.
    pub(crate) async fn document_paths(&self) -> Result<Vec<PathBuf>> {
        let mut entries = match tokio::fs::read_dir(&self.dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut paths = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let path = entry.path();
            let is_doc = path.extension().and_then(|e| e.to_str()) == Some(self.extension.as_str());
            let hidden = path
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with('.'));
            if is_doc && !hidden && entry.file_type().await?.is_file() {
                paths.push(path);
            }
        }
        paths.sort();
        Ok(paths)
    }

    /// Files whose name is `<date>_<id>.<ext>` for exactly this id, oldest first.
    async fn files_for_id(&self, id: &str) -> Result<Vec<PathBuf>> {
        Ok(self
            .document_paths()
            .await?
            .into_iter()
            .filter(|p| file_id(p).as_deref() == Some(id))
            .collect())
    }
}

/// The id part of a `<date>_<id>.<ext>` file name
pub(crate) fn file_id(path: &Path) -> Option<String> {
    let stem = path.file_stem()?.to_str()?;
    let (date, id) = stem.split_once('_')?;
    if chrono::NaiveDate::parse_from_str(date, "%Y-%m-%d").is_err() {
        return None;
    }
    Some(id.to_string())
}

/// Write `body` to a hidden `.<name>.tmp` sibling, then rename it over `path`.
///
/// On failure the temporary file is removed and `path` is left as it was.
pub(crate) async fn write_atomic(path: &Path, body: impl AsRef<[u8]>) -> Result<()> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::Internal(format!("no file name in {}", path.display())))?;
    let tmp = path.with_file_name(format!(".{name}.tmp"));
    let written = match tokio::fs::write(&tmp, body).await {
        Ok(()) => tokio::fs::rename(&tmp, path).await,
        Err(e) => Err(e),
    };
    if let Err(e) = written {
        if let Err(cleanup) = tokio::fs::remove_file(&tmp).await {
            if cleanup.kind() != std::io::ErrorKind::NotFound {
                warn!(path = %tmp.display(), error = %cleanup, "Temporary file left behind");
            }
        }
        return Err(e.into());
    }
    Ok(())
}
