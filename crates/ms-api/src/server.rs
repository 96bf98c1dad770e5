//! HTTP API Server
//!
//! Starts and manages the axum-based HTTP server. The accept loop stops when
//! the shared [`CancellationToken`] is cancelled, either by the process
//! (Ctrl-C) or by `POST /shutdown`.

use std::sync::Arc;

use axum::{
    Router,
    http::{HeaderValue, Method, header},
};
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tower::ServiceBuilder;
use tower_http::{
    cors::{AllowOrigin, CorsLayer},
    trace::TraceLayer,
};
use tracing::{info, warn};

use ms_core::{MemoryStore, ServerConfig};

use crate::routes::routes;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
    /// Cancelled to stop the server
    pub shutdown: CancellationToken,
}

impl AppState {
    pub fn new(store: Arc<MemoryStore>, shutdown: CancellationToken) -> Self {
        Self { store, shutdown }
    }
}

/// Build the application router with tracing and CORS layers
pub fn router(state: AppState, config: &ServerConfig) -> Router {
    Router::new()
        .merge(routes(config.shutdown_endpoint))
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors_layer(config.allowed_origins.as_deref())),
        )
        .with_state(state)
}

fn cors_layer(allowed_origins: Option<&[String]>) -> CorsLayer {
    let Some(origins) = allowed_origins.filter(|o| !o.is_empty()) else {
        return CorsLayer::permissive();
    };

    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(e) => {
                warn!("Ignoring invalid CORS origin {:?}: {}", origin, e);
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([header::CONTENT_TYPE])
}

/// Serve `app` on an already bound listener until `shutdown` is cancelled
pub async fn serve(
    listener: TcpListener,
    app: Router,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await?;

    info!("HTTP server stopped accepting connections");
    Ok(())
}

/// Bind the configured address and serve until `shutdown` is cancelled
pub async fn start_server(
    config: &ServerConfig,
    store: Arc<MemoryStore>,
    shutdown: CancellationToken,
) -> anyhow::Result<()> {
    let addr = config.socket_addr()?;
    let app = router(AppState::new(store, shutdown.clone()), config);

    let listener = TcpListener::bind(addr).await?;
    info!("HTTP API listening on {}", listener.local_addr()?);

    serve(listener, app, shutdown).await
}
