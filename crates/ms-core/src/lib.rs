//! ms-core: Memory Server Core Library
//!
//! Versioned memory records on SQLite: the record type, the store with its
//! save / update / archive / query operations, the error taxonomy shared by
//! every layer, and the server configuration.

pub mod config;
pub mod error;
pub mod memory;

pub use config::{Config, ServerConfig, StoreConfig};
pub use error::{Error, Result};
pub use memory::{Memory, MemoryStore};
