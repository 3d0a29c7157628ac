//! Memory packet data types
//!
//! A packet is the unit of the canonical store: a titled, tagged,
//! timestamped text record with optional owner-only secrets and entity
//! references. Every packet that reaches disk has passed `validate()`.

use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::str::FromStr;

/// Who a packet is meant for. Ordered from most to least restrictive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Visibility {
    /// Only the owner may read it
    #[default]
    Owner,
    /// Owner and collaborators
    Collaborator,
    /// Anyone
    Public,
}

impl Visibility {
    /// Minimum role rank required to see a packet with this visibility
    pub(crate) fn required_rank(self) -> u8 {
        match self {
            Visibility::Public => 0,
            Visibility::Collaborator => 1,
            Visibility::Owner => 2,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Visibility::Owner => "owner",
            Visibility::Collaborator => "collaborator",
            Visibility::Public => "public",
        }
    }
}

impl fmt::Display for Visibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Visibility {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim() {
            "owner" => Ok(Visibility::Owner),
            "collaborator" => Ok(Visibility::Collaborator),
            "public" => Ok(Visibility::Public),
            other => Err(Error::MalformedDocument(format!(
                "unknown visibility: {other}"
            ))),
        }
    }
}

/// A reference to a person, project, or agent mentioned by a packet
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Entity {
    /// Display name
    pub name: String,
    /// Free-form kind, e.g. "person" or "agent"
    #[serde(rename = "type")]
    pub entity_type: String,
    /// Decentralized identifier, if known
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub did: Option<String>,
}

impl Entity {
    pub fn new(name: impl Into<String>, entity_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entity_type: entity_type.into(),
            did: None,
        }
    }

    pub fn with_did(mut self, did: impl Into<String>) -> Self {
        self.did = Some(did.into());
        self
    }

    /// Why this entity cannot be written as a `- **name** (type) - `did`` bullet.
    fn bullet_error(&self) -> Option<&'static str> {
        let fields = [Some(&self.name), Some(&self.entity_type), self.did.as_ref()];
        if fields.iter().flatten().any(|v| v.contains(|c: char| c == '\n' || c == '\r')) {
            return Some("fields must be single-line");
        }
        if self.name.trim().is_empty() || self.entity_type.trim().is_empty() {
            return Some("name and type must not be blank");
        }
        if self.name.contains("** (") {
            return Some("name must not contain `** (`");
        }
        if self.entity_type.contains(')') {
            return Some("type must not contain `)`");
        }
        if self.did.as_ref().is_some_and(|did| did.trim().is_empty()) {
            return Some("did must be absent or non-blank");
        }
        None
    }
}

/// The canonical in-memory shape of a memory packet.
///
/// `secrets` and `entities` treat "empty" and "absent" as the same state.
/// `metadata` is storage bookkeeping and is never written to the document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MemoryPacket {
    /// Lowercase kebab-case identity key
    pub id: String,
    /// Human-readable title
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    /// Display order is preserved; matching ignores order
    #[serde(default)]
    pub tags: Vec<String>,
    #[serde(default)]
    pub visibility: Visibility,
    /// Immutable after creation
    pub created_at: DateTime<Utc>,
    /// Refreshed on every mutation
    pub updated_at: DateTime<Utc>,
    pub authors: Vec<String>,
    #[serde(default)]
    pub links: Vec<String>,
    pub content: String,
    /// Owner-only values
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub secrets: BTreeMap<String, serde_json::Value>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub entities: Vec<Entity>,
    /// Content fingerprint for dedup / idempotence checks
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Metadata key the store stamps with the resolved file path
pub const STORAGE_PATH_KEY: &str = "storage_path";

impl MemoryPacket {
    /// Check write-time invariants.
    pub fn validate(&self) -> Result<()> {
        if self.id.is_empty() {
            return Err(Error::Validation("id must not be empty".to_string()));
        }
        if !is_kebab_case(&self.id) {
            return Err(Error::Validation(format!(
                "id '{}' must be lowercase kebab-case",
                self.id
            )));
        }
        if self.title.trim().is_empty() {
            return Err(Error::Validation(format!(
                "packet '{}' has an empty title",
                self.id
            )));
        }
        for (field, value) in [
            ("title", Some(self.title.as_str())),
            ("project", self.project.as_deref()),
            ("hash", self.hash.as_deref()),
        ] {
            if value.is_some_and(|v| v.contains('\n') || v.contains('\r')) {
                return Err(Error::Validation(format!(
                    "{field} of packet '{}' must be a single line",
                    self.id
                )));
            }
        }
        if self.authors.is_empty() || self.authors.iter().any(|a| a.trim().is_empty()) {
            return Err(Error::Validation(format!(
                "packet '{}' needs at least one non-blank author",
                self.id
            )));
        }
        if self.updated_at < self.created_at {
            return Err(Error::Validation(format!(
                "packet '{}' has updated_at before created_at",
                self.id
            )));
        }
        for entity in &self.entities {
            if let Some(reason) = entity.bullet_error() {
                return Err(Error::Validation(format!(
                    "packet '{}' has an invalid entity '{}': {reason}",
                    self.id, entity.name
                )));
            }
        }
        if self.links.iter().any(|l| l.trim().is_empty() || l.contains('\n')) {
            return Err(Error::Validation(format!(
                "packet '{}' has a blank or multi-line link",
                self.id
            )));
        }
        Ok(())
    }

    /// Refresh `updated_at` after a mutation.
    pub fn touch(&mut self) {
        self.updated_at = Utc::now().max(self.created_at);
    }

    /// SHA-256 over the identity and body fields, hex encoded.
    ///
    /// Timestamps, `hash` and `metadata` are excluded so that re-saving an
    /// unchanged packet yields the same fingerprint.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        let mut field = |value: &str| {
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        };
        field(&self.id);
        field(&self.title);
        field(self.project.as_deref().unwrap_or_default());
        field(self.summary.as_deref().unwrap_or_default());
        field(&self.tags.join("\u{1f}"));
        field(self.visibility.as_str());
        field(&self.authors.join("\u{1f}"));
        field(&self.links.join("\u{1f}"));
        field(&self.content);
        for entity in &self.entities {
            field(&entity.name);
            field(&entity.entity_type);
            field(entity.did.as_deref().unwrap_or_default());
        }
        for (key, value) in &self.secrets {
            field(key);
            field(&value.to_string());
        }
        hex_encode(&hasher.finalize())
    }

    /// Store the current fingerprint in `hash`.
    pub fn with_fingerprint(mut self) -> Self {
        self.hash = Some(self.fingerprint());
        self
    }

    /// Path the store last wrote or read this packet from, if stamped.
    pub fn storage_path(&self) -> Option<&str> {
        self.metadata.get(STORAGE_PATH_KEY).and_then(|v| v.as_str())
    }
}

/// Builder for constructing `MemoryPacket` instances
pub struct PacketBuilder {
    id: String,
    title: String,
    project: Option<String>,
    summary: Option<String>,
    tags: Vec<String>,
    visibility: Visibility,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    authors: Vec<String>,
    links: Vec<String>,
    content: String,
    secrets: BTreeMap<String, serde_json::Value>,
    entities: Vec<Entity>,
    hash: Option<String>,
}

impl PacketBuilder {
    /// Create a new builder with the required identity fields
    pub fn new(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            project: None,
            summary: None,
            tags: Vec::new(),
            visibility: Visibility::default(),
            created_at: None,
            updated_at: None,
            authors: Vec::new(),
            links: Vec::new(),
            content: String::new(),
            secrets: BTreeMap::new(),
            entities: Vec::new(),
            hash: None,
        }
    }

    /// Derive the id from the title
    pub fn from_title(title: impl Into<String>) -> Self {
        let title = title.into();
        Self::new(slugify(&title), title)
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn summary(mut self, summary: impl Into<String>) -> Self {
        self.summary = Some(summary.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn tags(mut self, tags: impl IntoIterator<Item = impl Into<String>>) -> Self {
        self.tags.extend(tags.into_iter().map(Into::into));
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = visibility;
        self
    }

    pub fn created_at(mut self, at: DateTime<Utc>) -> Self {
        self.created_at = Some(at);
        self
    }

    pub fn updated_at(mut self, at: DateTime<Utc>) -> Self {
        self.updated_at = Some(at);
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        let author = author.into();
        if !self.authors.contains(&author) {
            self.authors.push(author);
        }
        self
    }

    pub fn link(mut self, link: impl Into<String>) -> Self {
        self.links.push(link.into());
        self
    }

    pub fn content(mut self, content: impl Into<String>) -> Self {
        self.content = content.into();
        self
    }

    pub fn secret(mut self, key: impl Into<String>, value: impl Into<serde_json::Value>) -> Self {
        self.secrets.insert(key.into(), value.into());
        self
    }

    pub fn entity(mut self, entity: Entity) -> Self {
        self.entities.push(entity);
        self
    }

    pub fn hash(mut self, hash: impl Into<String>) -> Self {
        self.hash = Some(hash.into());
        self
    }

    /// Build and validate the packet
    pub fn build(self) -> Result<MemoryPacket> {
        let created_at = self.created_at.unwrap_or_else(Utc::now);
        let updated_at = self.updated_at.unwrap_or(created_at);

        let packet = MemoryPacket {
            id: self.id,
            title: self.title,
            project: self.project,
            summary: self.summary,
            tags: self.tags,
            visibility: self.visibility,
            created_at,
            updated_at,
            authors: self.authors,
            links: self.links,
            content: self.content,
            secrets: self.secrets,
            entities: self.entities,
            hash: self.hash,
            metadata: HashMap::new(),
        };
        packet.validate()?;
        Ok(packet)
    }
}

/// Convert a title to a kebab-case id
pub fn slugify(title: &str) -> String {
    title
        .to_lowercase()
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '-' })
        .collect::<String>()
        .split('-')
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}

/// Lowercase ASCII words joined by single hyphens
pub fn is_kebab_case(id: &str) -> bool {
    !id.is_empty()
        && id
            .split('-')
            .all(|part| !part.is_empty() && part.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit()))
}

pub(crate) fn hex_encode(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}
