//! List filters over a packet collection
//!
//! Categories combine with AND; `tags` and `authors` are any-of within
//! their category. Unset categories match everything.

use super::model::{MemoryPacket, Visibility};
use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Filter predicates for `PacketStore::list`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PacketFilter {
    /// Exact project match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    /// Any-of tag match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
    /// Exact visibility match
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visibility: Option<Visibility>,
    /// Any-of author match
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub authors: Vec<String>,
    /// Inclusive lower bound on `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub since: Option<DateTime<Utc>>,
    /// Inclusive upper bound on `created_at`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub until: Option<DateTime<Utc>>,
}

impl PacketFilter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    pub fn tag(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }

    pub fn visibility(mut self, visibility: Visibility) -> Self {
        self.visibility = Some(visibility);
        self
    }

    pub fn author(mut self, author: impl Into<String>) -> Self {
        self.authors.push(author.into());
        self
    }

    pub fn since(mut self, at: DateTime<Utc>) -> Self {
        self.since = Some(at);
        self
    }

    pub fn until(mut self, at: DateTime<Utc>) -> Self {
        self.until = Some(at);
        self
    }

    /// Lower bound at the first instant of `date` (UTC)
    pub fn since_date(self, date: NaiveDate) -> Self {
        let start = date.and_hms_opt(0, 0, 0).map(|t| t.and_utc());
        match start {
            Some(at) => self.since(at),
            None => self,
        }
    }

    /// Upper bound at the last instant of `date` (UTC)
    pub fn until_date(self, date: NaiveDate) -> Self {
        let end = date
            .and_hms_nano_opt(23, 59, 59, 999_999_999)
            .map(|t| t.and_utc());
        match end {
            Some(at) => self.until(at),
            None => self,
        }
    }

    /// Whether the packet passes every set category
    pub fn matches(&self, packet: &MemoryPacket) -> bool {
        if let Some(project) = &self.project {
            if packet.project.as_ref() != Some(project) {
                return false;
            }
        }
        if !self.tags.is_empty() && !packet.tags.iter().any(|t| self.tags.contains(t)) {
            return false;
        }
        if let Some(visibility) = self.visibility {
            if packet.visibility != visibility {
                return false;
            }
        }
        if !self.authors.is_empty() && !packet.authors.iter().any(|a| self.authors.contains(a)) {
            return false;
        }
        if let Some(since) = self.since {
            if packet.created_at < since {
                return false;
            }
        }
        if let Some(until) = self.until {
            if packet.created_at > until {
                return false;
            }
        }
        true
    }
}
