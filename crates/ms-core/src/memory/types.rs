//! Memory type definitions for ms-core

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One version of a memory lineage
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Memory {
    /// Store-assigned row id, never reused
    pub id: i64,
    /// Caller-chosen lineage key
    pub memory_id: String,
    /// 1-based version within the lineage
    pub version: i64,
    /// The content of the memory
    pub content: String,
    /// Ordered tags
    #[serde(default)]
    pub tags: Vec<String>,
    /// Archived records are invisible to every query
    pub archived: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Memory {
    /// Exact, case-sensitive tag membership
    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.iter().any(|t| t == tag)
    }
}
