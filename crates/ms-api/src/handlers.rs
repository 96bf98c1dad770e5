//! HTTP API handlers
//!
//! Thin adapters between the JSON routes and [`ms_core::MemoryStore`].

use axum::{
    Json,
    extract::{
        Path, Query, State,
        rejection::{JsonRejection, PathRejection, QueryRejection},
    },
};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use ms_core::Memory;

use crate::error::Result;
use crate::server::AppState;

// ============================================================================
// Request/Response types
// ============================================================================

/// Body of `/save-memory` and `/update-memory`
#[derive(Debug, Serialize, Deserialize)]
pub struct WriteMemoryRequest {
    pub memory_id: String,
    pub content: String,
    /// Omitted or `null` means no tags
    #[serde(default)]
    pub tags: Option<Vec<String>>,
}

/// Body of `/delete-memory`
#[derive(Debug, Serialize, Deserialize)]
pub struct ArchiveMemoryRequest {
    pub memory_id: String,
}

/// Result of a write operation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: String,
    pub memory_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<i64>,
}

impl StatusResponse {
    fn saved(memory_id: String, version: i64) -> Self {
        Self {
            status: "saved".to_string(),
            memory_id,
            version: Some(version),
        }
    }

    fn updated(memory_id: String, version: i64) -> Self {
        Self {
            status: "updated".to_string(),
            memory_id,
            version: Some(version),
        }
    }

    fn archived(memory_id: String) -> Self {
        Self {
            status: "archived".to_string(),
            memory_id,
            version: None,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    #[serde(default)]
    pub q: String,
}

#[derive(Debug, Deserialize)]
pub struct TagQuery {
    #[serde(default)]
    pub tag: String,
}

// ============================================================================
// Handler functions
// ============================================================================

/// Health check endpoint
pub async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({
        "status": "healthy",
        "service": "memory-server"
    }))
}

/// Append a new version
pub async fn save_memory(
    State(state): State<AppState>,
    payload: std::result::Result<Json<WriteMemoryRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let Json(req) = payload?;
    let tags = req.tags.unwrap_or_default();

    let version = state.store.save(&req.memory_id, &req.content, &tags)?;
    info!("Saved memory {} version {}", req.memory_id, version);

    Ok(Json(StatusResponse::saved(req.memory_id, version)))
}

/// Archive the current version and append a new one
pub async fn update_memory(
    State(state): State<AppState>,
    payload: std::result::Result<Json<WriteMemoryRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let Json(req) = payload?;
    let tags = req.tags.unwrap_or_default();

    let version = state.store.update(&req.memory_id, &req.content, &tags)?;
    info!("Updated memory {} to version {}", req.memory_id, version);

    Ok(Json(StatusResponse::updated(req.memory_id, version)))
}

/// Archive every version of a memory
pub async fn delete_memory(
    State(state): State<AppState>,
    payload: std::result::Result<Json<ArchiveMemoryRequest>, JsonRejection>,
) -> Result<Json<StatusResponse>> {
    let Json(req) = payload?;

    let archived = state.store.archive(&req.memory_id)?;
    info!("Archived memory {} ({} record(s))", req.memory_id, archived);

    Ok(Json(StatusResponse::archived(req.memory_id)))
}

/// All non-archived records
pub async fn list_memories(State(state): State<AppState>) -> Result<Json<Vec<Memory>>> {
    Ok(Json(state.store.list_current()?))
}

/// Non-archived records carrying a tag
pub async fn list_memories_by_tag(
    State(state): State<AppState>,
    query: std::result::Result<Query<TagQuery>, QueryRejection>,
) -> Result<Json<Vec<Memory>>> {
    let Query(query) = query?;
    debug!("List by tag: {}", query.tag);
    Ok(Json(state.store.list_by_tag(&query.tag)?))
}

/// Current version of one memory
pub async fn get_memory_by_id(
    State(state): State<AppState>,
    path: std::result::Result<Path<String>, PathRejection>,
) -> Result<Json<Memory>> {
    let Path(memory_id) = path?;
    Ok(Json(state.store.get(&memory_id)?))
}

/// Substring search over ids and content
pub async fn search_memories(
    State(state): State<AppState>,
    query: std::result::Result<Query<SearchQuery>, QueryRejection>,
) -> Result<Json<Vec<Memory>>> {
    let Query(query) = query?;
    Ok(Json(state.store.search(&query.q)?))
}

/// Cancel the server's shutdown token
pub async fn shutdown(State(state): State<AppState>) -> &'static str {
    info!("Shutdown requested over HTTP");
    state.shutdown.cancel();
    "Shutting down..."
}
