//! Role-based projection
//!
//! `project` is the only way a packet leaves the crate: every outbound
//! surface (vault reads, sync targets, the CLI) serializes a `PacketView`,
//! never a `MemoryPacket`. Fields a role may not see are omitted, not masked.
//!
//! | field                              | owner | collaborator | public |
//! |------------------------------------|:-----:|:------------:|:------:|
//! | id, title, summary, tags, visibility, created_at, project | ✓ | ✓ | ✓ |
//! | updated_at, authors, links, content, entities, hash       | ✓ | ✓ |   |
//! | secrets                            | ✓     |              |        |

use super::model::{Entity, MemoryPacket, Visibility};
use crate::error::Error;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

/// Caller role, required on every read or export
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    Owner,
    Collaborator,
    Public,
}

impl Role {
    fn rank(self) -> u8 {
        match self {
            Role::Public => 0,
            Role::Collaborator => 1,
            Role::Owner => 2,
        }
    }

    /// Whether this role may see a packet with the given visibility at all
    pub fn can_see(self, visibility: Visibility) -> bool {
        self.rank() >= visibility.required_rank()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Role::Owner => "owner",
            Role::Collaborator => "collaborator",
            Role::Public => "public",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Error> {
        match s.trim().to_ascii_lowercase().as_str() {
            "owner" => Ok(Role::Owner),
            "collaborator" => Ok(Role::Collaborator),
            "public" => Ok(Role::Public),
            other => Err(Error::Validation(format!("unknown role: {other}"))),
        }
    }
}

/// The view of a packet a role is entitled to
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PacketView {
    pub id: String,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    pub tags: Vec<String>,
    pub visibility: Visibility,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authors: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub links: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entities: Option<Vec<Entity>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub secrets: Option<BTreeMap<String, serde_json::Value>>,
}

/// Derive the view `role` may see. Never mutates the source packet.
pub fn project(packet: &MemoryPacket, role: Role) -> PacketView {
    let mut view = PacketView {
        id: packet.id.clone(),
        title: packet.title.clone(),
        project: packet.project.clone(),
        summary: packet.summary.clone(),
        tags: packet.tags.clone(),
        visibility: packet.visibility,
        created_at: packet.created_at,
        updated_at: None,
        authors: None,
        links: None,
        content: None,
        entities: None,
        hash: None,
        secrets: None,
    };

    if role == Role::Public {
        return view;
    }

    view.updated_at = Some(packet.updated_at);
    view.authors = Some(packet.authors.clone());
    view.links = Some(packet.links.clone());
    view.content = Some(packet.content.clone());
    view.entities = Some(packet.entities.clone());
    view.hash = packet.hash.clone();

    if role == Role::Owner && !packet.secrets.is_empty() {
        view.secrets = Some(packet.secrets.clone());
    }
    view
}

/// Project a packet only if the role may see it at all.
pub fn project_visible(packet: &MemoryPacket, role: Role) -> Option<PacketView> {
    role.can_see(packet.visibility).then(|| project(packet, role))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::packet::model::PacketBuilder;
    use chrono::TimeZone;

    fn kickoff() -> MemoryPacket {
        PacketBuilder::new("kickoff", "Kickoff")
            .created_at(Utc.with_ymd_and_hms(2025, 10, 14, 23, 8, 0).unwrap())
            .author("A")
            .content("Body text")
            .tags(["integration", "notion"])
            .visibility(Visibility::Collaborator)
            .secret("API_KEY", "xyz")
            .entity(Entity::new("Cassie", "agent"))
            .link("https://example.com")
            .build()
            .unwrap()
    }

    #[test]
    fn test_owner_sees_everything() {
        let packet = kickoff();
        let view = project(&packet, Role::Owner);
        assert_eq!(view.secrets.as_ref(), Some(&packet.secrets));
        assert_eq!(view.content.as_deref(), Some("Body text"));
        assert_eq!(view.authors, Some(vec!["A".to_string()]));
    }

    #[test]
    fn test_collaborator_omits_secrets() {
        let packet = kickoff();
        let view = project(&packet, Role::Collaborator);
        assert!(view.secrets.is_none());
        assert_eq!(view.content.as_deref(), Some("Body text"));
        assert_eq!(view.entities.as_ref().map(Vec::len), Some(1));

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("xyz"));
        assert!(!json.contains("secrets"));
    }

    #[test]
    fn test_public_view_is_minimal() {
        let packet = kickoff();
        let view = project(&packet, Role::Public);
        assert!(view.secrets.is_none());
        assert!(view.content.is_none());
        assert!(view.authors.is_none());
        assert!(view.links.is_none());
        assert!(view.entities.is_none());
        assert_eq!(view.tags, packet.tags);

        let json = serde_json::to_string(&view).unwrap();
        assert!(!json.contains("xyz"));
        assert!(!json.contains("Body text"));
        assert!(!json.contains("authors"));
    }

    #[test]
    fn test_projection_does_not_mutate_source() {
        let packet = kickoff();
        let before = packet.clone();
        let _ = project(&packet, Role::Public);
        let _ = project(&packet, Role::Collaborator);
        assert_eq!(packet, before);
    }

    #[test]
    fn test_metadata_never_projected() {
        let mut packet = kickoff();
        packet
            .metadata
            .insert("storage_path".into(), serde_json::json!("/tmp/x.md"));
        let json = serde_json::to_string(&project(&packet, Role::Owner)).unwrap();
        assert!(!json.contains("/tmp/x.md"));
    }

    #[test]
    fn test_visibility_gate() {
        assert!(Role::Owner.can_see(Visibility::Owner));
        assert!(Role::Owner.can_see(Visibility::Public));
        assert!(Role::Collaborator.can_see(Visibility::Collaborator));
        assert!(!Role::Collaborator.can_see(Visibility::Owner));
        assert!(Role::Public.can_see(Visibility::Public));
        assert!(!Role::Public.can_see(Visibility::Collaborator));

        let packet = kickoff();
        assert!(project_visible(&packet, Role::Public).is_none());
        assert!(project_visible(&packet, Role::Collaborator).is_some());
    }

    #[test]
    fn test_role_parse() {
        assert_eq!("Owner".parse::<Role>().unwrap(), Role::Owner);
        assert_eq!("public".parse::<Role>().unwrap(), Role::Public);
        assert!("admin".parse::<Role>().is_err());
    }
}
