//! Packet document codec
//!
//! Document layout:
//! ```text
//! ---
//! id: kickoff
//! title: Kickoff
//! tags: ["integration","notion"]
//! visibility: collaborator
//! created_at: 2025-10-14T23:08:00Z
//! updated_at: 2025-10-14T23:08:00Z
//! authors: ["A"]
//! links: []
//! ---
//!
//! # Kickoff
//!
//! ## Summary            (optional)
//! ## Content            (always)
//! ## Secrets (Owner Only)   fenced JSON, only when non-empty
//! ## Entities           `- **name** (type) - `did``, only when non-empty
//! ## Links              `- url`, only when non-empty
//! ```
//!
//! Parsing is a line-oriented state machine over four zones: before the
//! metadata block, inside it, between body sections, and inside a section.
//! A `## ` heading only opens a section when it names a known section that
//! comes later in the fixed order; any other heading inside a section is
//! part of that section's text.
//!
//! Summary and content are free text, so `serialize` escapes any of their
//! lines that reads as a known section heading by prefixing one backslash,
//! and the parser strips it again. A line already made of backslashes
//! followed by such a heading gains one more, so the escape is reversible.
//! Code fences in free text carry no structure: an unclosed fence cannot
//! swallow the sections that follow it.

use super::frontmatter::{self, FieldValue, DELIMITER};
use super::model::{Entity, MemoryPacket, Visibility};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use regex::Regex;
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::OnceLock;
use tracing::{debug, warn};

/// Body sections in the order they are written
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Section {
    Summary,
    Content,
    Secrets,
    Entities,
    Links,
}

impl Section {
    const ALL: [Section; 5] = [
        Section::Summary,
        Section::Content,
        Section::Secrets,
        Section::Entities,
        Section::Links,
    ];

    fn heading(self) -> &'static str {
        match self {
            Section::Summary => "Summary",
            Section::Content => "Content",
            Section::Secrets => "Secrets (Owner Only)",
            Section::Entities => "Entities",
            Section::Links => "Links",
        }
    }

    fn from_heading(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.heading() == name)
    }
}

/// A recoverable problem found while parsing.
///
/// None of these abort the parse; the affected piece is dropped and the rest
/// of the packet is still returned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Diagnostic {
    /// The secrets block exists but could not be decoded; secrets omitted
    SecretsDecodeFailure(String),
    /// An entity bullet did not match the grammar; line dropped
    MalformedEntity(String),
    /// A body heading that is not a known section; its text is ignored
    UnknownSection(String),
    /// A metadata key outside the decode table; kept in `metadata`
    UnknownMetadataKey(String),
    /// A line that belongs to no field
    IgnoredLine(String),
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Diagnostic::SecretsDecodeFailure(e) => write!(f, "secrets block omitted: {e}"),
            Diagnostic::MalformedEntity(line) => write!(f, "entity line dropped: {line}"),
            Diagnostic::UnknownSection(name) => write!(f, "unknown section ignored: {name}"),
            Diagnostic::UnknownMetadataKey(key) => write!(f, "unknown metadata key kept: {key}"),
            Diagnostic::IgnoredLine(line) => write!(f, "line ignored: {line}"),
        }
    }
}

/// Parse result with the diagnostics collected along the way
#[derive(Debug, Clone)]
pub struct Parsed {
    pub packet: MemoryPacket,
    pub diagnostics: Vec<Diagnostic>,
}

// =============================================================================
// Serialize
// =============================================================================

/// Render a packet as a document.
pub fn serialize(packet: &MemoryPacket) -> Result<String> {
    let mut meta = vec![
        frontmatter::encode_text("id", &packet.id),
        frontmatter::encode_text("title", &packet.title),
    ];
    if let Some(project) = &packet.project {
        meta.push(frontmatter::encode_text("project", project));
    }
    meta.push(frontmatter::encode_list("tags", &packet.tags)?);
    meta.push(frontmatter::encode_text("visibility", packet.visibility.as_str()));
    meta.push(frontmatter::encode_timestamp("created_at", &packet.created_at));
    meta.push(frontmatter::encode_timestamp("updated_at", &packet.updated_at));
    meta.push(frontmatter::encode_list("authors", &packet.authors)?);
    meta.push(frontmatter::encode_list("links", &packet.links)?);
    if let Some(hash) = &packet.hash {
        meta.push(frontmatter::encode_text("hash", hash));
    }

    let mut doc = String::new();
    doc.push_str(DELIMITER);
    doc.push('\n');
    for line in meta {
        doc.push_str(&line);
        doc.push('\n');
    }
    doc.push_str(DELIMITER);
    doc.push_str("\n\n");
    doc.push_str(&format!("# {}\n", packet.title));

    if let Some(summary) = &packet.summary {
        push_section(&mut doc, Section::Summary, &escape_text(summary));
    }
    push_section(&mut doc, Section::Content, &escape_text(&packet.content));

    if !packet.secrets.is_empty() {
        let json = serde_json::to_string_pretty(&packet.secrets)?;
        push_section(&mut doc, Section::Secrets, &format!("```json\n{json}\n```"));
    }
    if !packet.entities.is_empty() {
        let bullets: Vec<String> = packet.entities.iter().map(entity_bullet).collect();
        push_section(&mut doc, Section::Entities, &bullets.join("\n"));
    }
    if !packet.links.is_empty() {
        let bullets: Vec<String> = packet.links.iter().map(|l| format!("- {l}")).collect();
        push_section(&mut doc, Section::Links, &bullets.join("\n"));
    }

    Ok(doc)
}

fn push_section(doc: &mut String, section: Section, body: &str) {
    doc.push_str(&format!("\n## {}\n\n", section.heading()));
    if !body.is_empty() {
        doc.push_str(body);
        doc.push('\n');
    }
}

/// Escape free-text lines the scanner would read as section headings.
fn escape_text(text: &str) -> String {
    if !text.lines().any(is_heading_like) {
        return text.to_string();
    }
    text.lines()
        .map(|line| {
            if is_heading_like(line) {
                format!("\\{line}")
            } else {
                line.to_string()
            }
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Undo `escape_text` on one line.
fn unescape_line(line: &str) -> &str {
    match line.strip_prefix('\\') {
        Some(rest) if is_heading_like(line) => rest,
        _ => line,
    }
}

/// Zero or more backslashes followed by a known section heading.
fn is_heading_like(line: &str) -> bool {
    line.trim_start_matches('\\')
        .strip_prefix("## ")
        .is_some_and(|name| Section::from_heading(name.trim()).is_some())
}

fn entity_bullet(entity: &Entity) -> String {
    match &entity.did {
        Some(did) => format!("- **{}** ({}) - `{}`", entity.name, entity.entity_type, did),
        None => format!("- **{}** ({})", entity.name, entity.entity_type),
    }
}

// =============================================================================
// Parse
// =============================================================================

/// Parse a document, logging every recoverable problem.
pub fn parse(text: &str) -> Result<MemoryPacket> {
    let parsed = parse_with_diagnostics(text)?;
    for diagnostic in &parsed.diagnostics {
        match diagnostic {
            Diagnostic::UnknownMetadataKey(_) => {
                debug!(packet_id = %parsed.packet.id, "{}", diagnostic)
            }
            _ => warn!(packet_id = %parsed.packet.id, "{}", diagnostic),
        }
    }
    Ok(parsed.packet)
}

/// Where the scanner currently is
enum Zone {
    PreMetadata,
    Metadata,
    Body(Option<BodyTarget>),
}

/// What body lines are currently collected into
enum BodyTarget {
    Known(Section),
    Ignored,
}

#[derive(Default)]
struct MetadataFields {
    id: Option<String>,
    title: Option<String>,
    project: Option<String>,
    hash: Option<String>,
    visibility: Option<Visibility>,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    tags: Option<Vec<String>>,
    authors: Option<Vec<String>>,
    links: Option<Vec<String>>,
    extra: HashMap<String, Value>,
}

/// Parse a document and return the diagnostics instead of logging them.
pub fn parse_with_diagnostics(text: &str) -> Result<Parsed> {
    let mut diagnostics = Vec::new();
    let mut fields = MetadataFields::default();
    let mut heading_title: Option<String> = None;
    let mut sections: BTreeMap<Section, Vec<&str>> = BTreeMap::new();
    let mut zone = Zone::PreMetadata;

    for line in text.trim_start_matches('\u{feff}').lines() {
        match zone {
            Zone::PreMetadata => {
                if line.trim().is_empty() {
                    continue;
                }
                if line.trim_end() != DELIMITER {
                    return Err(Error::MalformedDocument(
                        "document does not open with a `---` metadata block".to_string(),
                    ));
                }
                zone = Zone::Metadata;
            }
            Zone::Metadata => {
                if line.trim_end() == DELIMITER {
                    zone = Zone::Body(None);
                    continue;
                }
                if line.trim().is_empty() {
                    continue;
                }
                match frontmatter::split_line(line) {
                    Some((key, raw)) => {
                        apply_field(&mut fields, key, raw, &mut diagnostics)?;
                    }
                    None => diagnostics.push(Diagnostic::IgnoredLine(line.to_string())),
                }
            }
            Zone::Body(ref mut target) => {
                if let Some(name) = line.strip_prefix("## ") {
                    let name = name.trim();
                    let current = match target {
                        Some(BodyTarget::Known(s)) => Some(*s),
                        _ => None,
                    };
                    match Section::from_heading(name) {
                        Some(section) if current.map_or(true, |c| section > c) => {
                            sections.entry(section).or_default();
                            *target = Some(BodyTarget::Known(section));
                            continue;
                        }
                        _ if current.is_none() => {
                            diagnostics.push(Diagnostic::UnknownSection(name.to_string()));
                            *target = Some(BodyTarget::Ignored);
                            continue;
                        }
                        _ => {}
                    }
                } else if target.is_none() {
                    if let Some(title) = line.strip_prefix("# ") {
                        if heading_title.is_none() {
                            heading_title = Some(title.trim().to_string());
                            continue;
                        }
                    }
                }

                match target {
                    Some(BodyTarget::Known(section @ (Section::Summary | Section::Content))) => {
                        sections.entry(*section).or_default().push(unescape_line(line));
                    }
                    Some(BodyTarget::Known(section)) => {
                        sections.entry(*section).or_default().push(line);
                    }
                    Some(BodyTarget::Ignored) => {}
                    None => {
                        if !line.trim().is_empty() {
                            diagnostics.push(Diagnostic::IgnoredLine(line.to_string()));
                        }
                    }
                }
            }
        }
    }

    match zone {
        Zone::PreMetadata => {
            return Err(Error::MalformedDocument(
                "no metadata delimiters found".to_string(),
            ))
        }
        Zone::Metadata => {
            return Err(Error::MalformedDocument(
                "metadata block is missing its closing `---`".to_string(),
            ))
        }
        Zone::Body(_) => {}
    }

    let id = fields
        .id
        .ok_or_else(|| Error::MalformedDocument("metadata is missing `id`".to_string()))?;
    let title = fields
        .title
        .or(heading_title)
        .ok_or_else(|| Error::MalformedDocument(format!("packet '{id}' has no title")))?;
    let created_at = fields.created_at.ok_or_else(|| {
        Error::MalformedDocument(format!("packet '{id}' is missing `created_at`"))
    })?;

    let summary = sections.get(&Section::Summary).map(|lines| section_text(lines));
    let content = sections
        .get(&Section::Content)
        .map(|lines| section_text(lines))
        .unwrap_or_default();

    let secrets = match sections.get(&Section::Secrets) {
        Some(lines) => match decode_secrets(lines) {
            Ok(secrets) => secrets,
            Err(reason) => {
                diagnostics.push(Diagnostic::SecretsDecodeFailure(reason));
                BTreeMap::new()
            }
        },
        None => BTreeMap::new(),
    };

    let entities = sections
        .get(&Section::Entities)
        .map(|lines| decode_entities(lines, &mut diagnostics))
        .unwrap_or_default();

    let links = match fields.links {
        Some(links) => links,
        None => sections
            .get(&Section::Links)
            .map(|lines| decode_links(lines, &mut diagnostics))
            .unwrap_or_default(),
    };

    let packet = MemoryPacket {
        id,
        title,
        project: fields.project,
        summary,
        tags: fields.tags.unwrap_or_default(),
        visibility: fields.visibility.unwrap_or_default(),
        created_at,
        updated_at: fields.updated_at.unwrap_or(created_at),
        authors: fields.authors.unwrap_or_default(),
        links,
        content,
        secrets,
        entities,
        hash: fields.hash,
        metadata: fields.extra,
    };

    Ok(Parsed {
        packet,
        diagnostics,
    })
}

fn apply_field(
    fields: &mut MetadataFields,
    key: &str,
    raw: &str,
    diagnostics: &mut Vec<Diagnostic>,
) -> Result<()> {
    match (key, frontmatter::decode(key, raw)?) {
        ("id", FieldValue::Text(v)) => fields.id = Some(v),
        ("title", FieldValue::Text(v)) => fields.title = Some(v),
        ("project", FieldValue::Text(v)) => fields.project = Some(v),
        ("hash", FieldValue::Text(v)) => fields.hash = Some(v),
        (_, FieldValue::Visibility(v)) => fields.visibility = Some(v),
        ("created_at", FieldValue::Timestamp(t)) => fields.created_at = Some(t),
        ("updated_at", FieldValue::Timestamp(t)) => fields.updated_at = Some(t),
        ("tags", FieldValue::StringList(v)) => fields.tags = Some(v),
        ("authors", FieldValue::StringList(v)) => fields.authors = Some(v),
        ("links", FieldValue::StringList(v)) => fields.links = Some(v),
        (_, FieldValue::Loose(v)) => {
            diagnostics.push(Diagnostic::UnknownMetadataKey(key.to_string()));
            fields.extra.insert(key.to_string(), v);
        }
        (key, value) => {
            return Err(Error::Internal(format!(
                "decode table mismatch for `{key}`: {value:?}"
            )))
        }
    }
    Ok(())
}

fn is_fence_line(line: &str) -> bool {
    let trimmed = line.trim_start();
    trimmed.starts_with("```") || trimmed.starts_with("~~~")
}

/// Join section lines, dropping blank lines at either end.
fn section_text(lines: &[&str]) -> String {
    let start = lines.iter().position(|l| !l.trim().is_empty());
    let end = lines.iter().rposition(|l| !l.trim().is_empty());
    match (start, end) {
        (Some(start), Some(end)) => lines[start..=end].join("\n"),
        _ => String::new(),
    }
}

fn decode_secrets(
    lines: &[&str],
) -> std::result::Result<BTreeMap<String, Value>, String> {
    let open = lines
        .iter()
        .position(|l| is_fence_line(l))
        .ok_or_else(|| "no fenced block in secrets section".to_string())?;
    let close = lines[open + 1..]
        .iter()
        .position(|l| is_fence_line(l))
        .map(|i| open + 1 + i)
        .ok_or_else(|| "secrets fence is never closed".to_string())?;
    let body = lines[open + 1..close].join("\n");
    serde_json::from_str::<BTreeMap<String, Value>>(&body).map_err(|e| e.to_string())
}

fn entity_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^- \*\*(.+?)\*\* \((.+?)\)(?: - `(.+?)`)?$")
            .unwrap_or_else(|e| panic!("entity pattern must compile: {e}"))
    })
}

fn decode_entities(lines: &[&str], diagnostics: &mut Vec<Diagnostic>) -> Vec<Entity> {
    let pattern = entity_pattern();
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter_map(|line| match pattern.captures(line) {
            Some(caps) => Some(Entity {
                name: caps[1].to_string(),
                entity_type: caps[2].to_string(),
                did: caps.get(3).map(|m| m.as_str().to_string()),
            }),
            None => {
                diagnostics.push(Diagnostic::MalformedEntity(line.to_string()));
                None
            }
        })
        .collect()
}

fn decode_links(lines: &[&str], diagnostics: &mut Vec<Diagnostic>) -> Vec<String> {
    lines
        .iter()
        .map(|l| l.trim())
        .filter(|l| !l.is_empty())
        .filter_map(|line| match line.strip_prefix("- ") {
            Some(url) => Some(url.trim().to_string()),
            None => {
                diagnostics.push(Diagnostic::IgnoredLine(line.to_string()));
                None
            }
        })
        .collect()
}
