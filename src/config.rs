//! SoulSketch configuration management
//!
//! Loaded once at process start and passed by reference into the stores and
//! the sync engine.

use crate::error::{Error, Result};
use crate::packet::projector::Role;
use crate::packet::store::DEFAULT_EXTENSION;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Main SoulSketch configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SoulSketchConfig {
    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Recall configuration
    #[serde(default)]
    pub recall: RecallConfig,

    /// Sync configuration
    #[serde(default)]
    pub sync: SyncConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl SoulSketchConfig {
    /// Default base directory (~/.soulsketch/)
    pub fn default_dir() -> PathBuf {
        dirs_next::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".soulsketch")
    }

    /// Load from a TOML file, or YAML when the extension is `.yaml`/`.yml`.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let is_yaml = matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("yaml") | Some("yml")
        );
        let config: Self = if is_yaml {
            serde_yaml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        } else {
            toml::from_str(&content)
                .map_err(|e| Error::Config(format!("{}: {e}", path.display())))?
        };
        config.validate()?;
        Ok(config)
    }

    /// Load `path` when given, otherwise fall back to defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => Ok(Self::default()),
        }
    }

    /// Reject values no component can work with
    pub fn validate(&self) -> Result<()> {
        let ext = self.storage.extension.trim_start_matches('.');
        if ext.is_empty() || ext.contains(['/', '\\']) {
            return Err(Error::Config(format!(
                "invalid storage.extension: {:?}",
                self.storage.extension
            )));
        }
        if self.recall.default_limit == 0 {
            return Err(Error::Config("recall.default_limit must be at least 1".into()));
        }
        if self.sync.enabled && self.sync.target_dir.is_none() {
            return Err(Error::Config("sync.enabled requires sync.target_dir".into()));
        }
        Ok(())
    }

    /// Render as pretty TOML
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| Error::Config(e.to_string()))
    }
}

/// Storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory holding one document per packet
    pub packets_dir: PathBuf,

    /// JSON-lines file backing the recall entry log (None = in-memory only)
    pub entries_file: Option<PathBuf>,

    /// Packet document extension
    pub extension: String,
}

impl Default for StorageConfig {
    fn default() -> Self {
        let base = SoulSketchConfig::default_dir();
        Self {
            packets_dir: base.join("packets"),
            entries_file: Some(base.join("entries.jsonl")),
            extension: DEFAULT_EXTENSION.to_string(),
        }
    }
}

/// Recall configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RecallConfig {
    /// Result limit when the caller does not give one
    pub default_limit: usize,
}

impl Default for RecallConfig {
    fn default() -> Self {
        Self { default_limit: 10 }
    }
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Enable mirroring to the sync target
    pub enabled: bool,

    /// Directory the projected views are written to
    pub target_dir: Option<PathBuf>,

    /// Role views are projected for before leaving the process
    pub role: Role,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            target_dir: None,
            role: Role::Collaborator,
        }
    }
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter level for the crate
    pub level: String,

    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}
