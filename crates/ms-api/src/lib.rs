//! ms-api: HTTP API for the memory server
//!
//! Exposes the versioned memory store over JSON routes, plus the bundled
//! viewer page and an OpenAPI description. Built with axum.

pub mod error;
pub mod handlers;
pub mod routes;
pub mod server;
pub mod viewer;

pub use error::{ApiError, Result};
pub use server::{AppState, router, serve, start_server};
