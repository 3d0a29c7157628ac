//! Collection audit
//!
//! Walks the whole packet directory and reports structural problems
//! (unparseable files, invariant violations, duplicate ids, file names that
//! disagree with their packet) plus softer recommendations.

use super::model::MemoryPacket;
use super::store::{file_id, PacketStore, ScanFailure};
use crate::error::Result;
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use tracing::info;

/// Overall audit outcome
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditStatus {
    /// No problems found
    Valid,
    /// Only recommendations or naming drift
    ValidWithWarnings,
    /// At least one file or packet is broken
    Invalid,
}

/// A packet that parsed but breaks a write-time invariant
#[derive(Debug, Clone, Serialize)]
pub struct Violation {
    pub packet_id: String,
    pub path: Option<PathBuf>,
    pub reason: String,
}

/// Audit report over a packet directory
#[derive(Debug, Clone, Serialize)]
pub struct AuditReport {
    pub checked_at: DateTime<Utc>,
    pub directory: PathBuf,
    pub status: AuditStatus,
    /// Document files found
    pub files: usize,
    /// Files that parsed
    pub packets: usize,
    pub failures: Vec<ScanFailure>,
    pub violations: Vec<Violation>,
    /// Ids stored in more than one file
    pub duplicate_ids: Vec<String>,
    /// Files whose name does not match `<created_at date>_<id>`
    pub misnamed: Vec<PathBuf>,
    pub recommendations: Vec<String>,
}

impl PacketStore {
    /// Audit every document in the store directory.
    pub async fn audit(&self) -> Result<AuditReport> {
        let paths = self.document_paths().await?;
        let mut failures = Vec::new();
        let mut violations = Vec::new();
        let mut misnamed = Vec::new();
        let mut recommendations = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut packets = 0;

        for path in &paths {
            let packet = match self.load(path).await {
                Ok(packet) => packet,
                Err(e) => {
                    failures.push(ScanFailure {
                        path: path.clone(),
                        error: e.to_string(),
                    });
                    continue;
                }
            };
            packets += 1;
            *seen.entry(packet.id.clone()).or_default() += 1;

            if let Err(e) = packet.validate() {
                violations.push(Violation {
                    packet_id: packet.id.clone(),
                    path: Some(path.clone()),
                    reason: e.to_string(),
                });
            }

            let expected = self.file_name_for(&packet);
            let actual = path.file_name().and_then(|n| n.to_str()).unwrap_or_default();
            if actual != expected {
                misnamed.push(path.clone());
            }
            if file_id(path).is_none() {
                recommendations.push(format!(
                    "{actual}: rename to {expected} so id lookups can find it"
                ));
            }

            recommendations.extend(recommend(&packet));
        }

        let mut duplicate_ids: Vec<String> = seen
            .into_iter()
            .filter(|(_, count)| *count > 1)
            .map(|(id, _)| id)
            .collect();
        duplicate_ids.sort();

        let status = if !failures.is_empty() || !violations.is_empty() || !duplicate_ids.is_empty() {
            AuditStatus::Invalid
        } else if !misnamed.is_empty() || !recommendations.is_empty() {
            AuditStatus::ValidWithWarnings
        } else {
            AuditStatus::Valid
        };

        info!(
            directory = %self.dir().display(),
            files = paths.len(),
            packets,
            status = ?status,
            "Packet audit finished"
        );

        Ok(AuditReport {
            checked_at: Utc::now(),
            directory: self.dir().to_path_buf(),
            status,
            files: paths.len(),
            packets,
            failures,
            violations,
            duplicate_ids,
            misnamed,
            recommendations,
        })
    }
}

/// Soft quality checks for a single packet
fn recommend(packet: &MemoryPacket) -> Vec<String> {
    let mut out = Vec::new();
    if packet.content.trim().is_empty() {
        out.push(format!("{}: content is empty", packet.id));
    }
    if packet.summary.as_deref().map_or(true, |s| s.trim().is_empty()) {
        out.push(format!("{}: consider adding a summary", packet.id));
    }
    if packet.tags.is_empty() {
        out.push(format!("{}: no tags; tag filters will never match it", packet.id));
    }
    if let Some(hash) = &packet.hash {
        if *hash != packet.fingerprint() {
            out.push(format!("{}: stored hash is stale", packet.id));
        }
    }
    out
}
