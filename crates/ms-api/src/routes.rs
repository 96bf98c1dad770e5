//! Route definitions
//!
//! Defines all HTTP API endpoints.

use axum::{
    Router,
    routing::{get, post},
};

use crate::handlers::{
    delete_memory, get_memory_by_id, health, list_memories, list_memories_by_tag,
    save_memory, search_memories, shutdown, update_memory,
};
use crate::server::AppState;
use crate::viewer::{index, openapi};

/// Create the API router
///
/// `POST /shutdown` is only mounted when `shutdown_endpoint` is set.
pub fn routes(shutdown_endpoint: bool) -> Router<AppState> {
    let router = Router::new()
        // Viewer and API description
        .route("/", get(index))
        .route("/openapi.json", get(openapi))
        .route("/health", get(health))
        // Writes
        .route("/save-memory", post(save_memory))
        .route("/update-memory", post(update_memory))
        .route("/delete-memory", post(delete_memory))
        // Reads
        .route("/list-memories", get(list_memories))
        .route("/list-memories-by-tag", get(list_memories_by_tag))
        .route("/get-memory-by-id/{memory_id}", get(get_memory_by_id))
        .route("/search-memories", get(search_memories));

    if shutdown_endpoint {
        router.route("/shutdown", post(shutdown))
    } else {
        router
    }
}
