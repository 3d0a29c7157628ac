//! Search and recall over independent memory entries
//!
//! A linear, case-insensitive substring scan. No ranking and no tokenization:
//! for a fixed collection the same query always yields the same order.

pub mod entry;
pub mod store;

pub use entry::MemoryEntry;
pub use store::EntryStore;
