//! Versioned memory records
//!
//! Every save or update appends a new version of a lineage keyed by
//! `memory_id`. Nothing is ever deleted; archiving only flips a flag so the
//! record drops out of every query.

mod store;
mod types;

pub use store::MemoryStore;
pub use types::Memory;
