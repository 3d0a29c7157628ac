//! SoulSketch - file-backed memory packets with role-based projection
//!
//! SoulSketch keeps structured "memory packets" (titled, tagged, timestamped
//! text records with optional secrets and entity references) as one
//! human-readable document per packet, and hands them out only as views
//! scoped to a caller role.
//!
//! ## Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │                          Callers                              │
//! │        CLI  ·  agent memory driver  ·  sync targets           │
//! └──────────────┬──────────────────────────────┬─────────────────┘
//!                │ role                          │ query
//! ┌──────────────▼──────────────┐   ┌───────────▼────────────────┐
//! │        MemoryVault          │   │        EntryStore          │
//! │  - visibility gate          │   │  - append-only entries     │
//! │  - Projector (only exit)    │   │  - substring recall        │
//! └──────────────┬──────────────┘   │  - JSONL persistence       │
//!                │                   └────────────────────────────┘
//! ┌──────────────▼──────────────┐
//! │        PacketStore          │
//! │  - <date>_<id>.md per packet│
//! │  - list / read / upsert     │
//! │  - audit                    │
//! └──────────────┬──────────────┘
//!                │ serialize / parse
//! ┌──────────────▼──────────────┐
//! │           Codec             │
//! │  frontmatter + sections     │
//! └─────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`packet`]: packet model, document codec, directory store, projector
//! - [`vault`]: role-scoped read/list surface over the store
//! - [`recall`]: entry log and search
//! - [`sync`]: mirroring projected views to an external target
//! - [`config`]: configuration management

pub mod config;
pub mod error;
pub mod packet;
pub mod recall;
pub mod sync;
pub mod vault;

pub use config::SoulSketchConfig;
pub use error::{Error, Result};
pub use packet::{MemoryPacket, PacketBuilder, PacketFilter, PacketStore, PacketView, Role, Visibility};
pub use recall::{EntryStore, MemoryEntry};
pub use sync::{DirectoryTarget, SyncEngine, SyncReport, SyncTarget};
pub use vault::MemoryVault;
