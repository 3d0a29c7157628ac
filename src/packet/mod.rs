//! Memory packets: model, document codec, directory store, role projection
//!
//! A packet is persisted as one human-readable document (metadata block plus
//! markdown body) and only ever leaves the crate as a role-scoped view.

pub mod audit;
pub mod codec;
pub mod filter;
pub mod frontmatter;
pub mod model;
pub mod projector;
pub mod store;

pub use audit::{AuditReport, AuditStatus, Violation};
pub use codec::{parse, parse_with_diagnostics, serialize, Diagnostic, Parsed};
pub use filter::PacketFilter;
pub use model::{Entity, MemoryPacket, PacketBuilder, Visibility};
pub use projector::{project, project_visible, PacketView, Role};
pub use store::{Listing, PacketStore, ScanFailure};
