//! memory-server: versioned memory store over HTTP
//!
//! Usage:
//!   memory-server                   - Start the server
//!   memory-server --config <path>   - Start with an explicit TOML config file
//!   memory-server --help            - Show help

use std::sync::Arc;
use std::time::Duration;

use ms_core::{Config, MemoryStore};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// How long in-flight requests get to finish once shutdown starts
const SHUTDOWN_GRACE: Duration = Duration::from_secs(5);

const DEFAULT_LOG_FILTER: &str = "info";

/// Run mode
#[derive(Debug, PartialEq, Eq)]
enum RunMode {
    /// Serve HTTP, optionally from an explicit config file
    Serve { config_path: Option<String> },
    Help,
    Version,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let mode = parse_args(std::env::args().skip(1))?;

    let config_path = match mode {
        RunMode::Help => {
            print_help();
            return Ok(());
        }
        RunMode::Version => {
            println!("memory-server {}", env!("CARGO_PKG_VERSION"));
            return Ok(());
        }
        RunMode::Serve { config_path } => config_path,
    };

    // Load .env file first so it can set RUST_LOG
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(log_filter(std::env::var(EnvFilter::DEFAULT_ENV).ok().as_deref()))
        .init();

    let config = match &config_path {
        Some(path) => Config::from_toml_file(path),
        None => Config::load(),
    }
    .map_err(|e| anyhow::anyhow!("Config error: {}", e))?;

    tracing::info!("Starting memory-server...");
    tracing::info!("Database: {}", config.store.dsn);

    let store = Arc::new(
        MemoryStore::open(&config.store.dsn)
            .map_err(|e| anyhow::anyhow!("Failed to open memory store: {}", e))?,
    );

    run_server(config, store).await
}

/// Parse command line arguments (program name already stripped)
fn parse_args<I>(args: I) -> anyhow::Result<RunMode>
where
    I: IntoIterator<Item = String>,
{
    let mut config_path = None;
    let mut args = args.into_iter();

    while let Some(arg) = args.next() {
        match arg.as_str() {
            "--help" | "-h" => return Ok(RunMode::Help),
            "--version" | "-v" => return Ok(RunMode::Version),
            "--config" | "-c" => {
                let path = args
                    .next()
                    .ok_or_else(|| anyhow::anyhow!("--config requires a path"))?;
                config_path = Some(path);
            }
            other => {
                if let Some(path) = other.strip_prefix("--config=") {
                    config_path = Some(path.to_string());
                } else {
                    anyhow::bail!("Unknown argument: {} (see --help)", other);
                }
            }
        }
    }

    Ok(RunMode::Serve { config_path })
}

/// Log filter from `RUST_LOG` directives, `info` when unset or invalid
fn log_filter(directives: Option<&str>) -> EnvFilter {
    directives
        .filter(|d| !d.trim().is_empty())
        .and_then(|d| EnvFilter::try_new(d).ok())
        .unwrap_or_else(|| EnvFilter::new(DEFAULT_LOG_FILTER))
}

/// Print help message
fn print_help() {
    println!("memory-server - Versioned memory store over HTTP");
    println!();
    println!("Usage:");
    println!("  memory-server                   Start the server");
    println!("  memory-server --config <path>   Load settings from a TOML file");
    println!("  memory-server --help            Show this help message");
    println!("  memory-server --version         Show version");
    println!();
    println!("Without --config, ./{} is read when present.", ms_core::config::DEFAULT_CONFIG_FILE);
    println!();
    println!("Environment Variables:");
    println!("  MEMORY_SERVER_HOST               Bind address (default: 0.0.0.0)");
    println!("  MEMORY_SERVER_PORT               HTTP port (default: 38080)");
    println!("  MEMORY_SERVER_DSN                SQLite path or :memory: (default: ~/Databases/memory_server.sqlite)");
    println!("  MEMORY_SERVER_SHUTDOWN_ENDPOINT  Mount POST /shutdown (default: true)");
    println!("  MEMORY_SERVER_ALLOWED_ORIGINS    Comma separated CORS origins (default: any)");
    println!("  RUST_LOG                         Log filter (default: info)");
}

/// Serve until Ctrl-C or `POST /shutdown`, then drain
async fn run_server(config: Config, store: Arc<MemoryStore>) -> anyhow::Result<()> {
    let shutdown = CancellationToken::new();

    let signal_token = shutdown.clone();
    tokio::spawn(async move {
        match tokio::signal::ctrl_c().await {
            Ok(()) => tracing::info!("Received Ctrl-C"),
            Err(e) => tracing::error!("Failed to listen for Ctrl-C: {}", e),
        }
        signal_token.cancel();
    });

    let server_config = config.server.clone();
    let server_token = shutdown.clone();
    let mut handle = tokio::spawn(async move {
        ms_api::start_server(&server_config, store, server_token).await
    });

    tracing::info!("memory-server initialized successfully");
    tracing::info!("Press Ctrl+C to exit");

    tokio::select! {
        result = &mut handle => {
            // Server ended on its own: bind failure or accept loop error
            return match result {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(anyhow::anyhow!("HTTP API error: {}", e)),
                Err(e) => Err(anyhow::anyhow!("HTTP API task failed: {}", e)),
            };
        }
        _ = shutdown.cancelled() => {
            tracing::info!("Shutting down...");
        }
    }

    match tokio::time::timeout(SHUTDOWN_GRACE, &mut handle).await {
        Ok(Ok(Ok(()))) => {}
        Ok(Ok(Err(e))) => tracing::error!("HTTP API error during shutdown: {}", e),
        Ok(Err(e)) => tracing::error!("HTTP API task failed: {}", e),
        Err(_) => {
            tracing::warn!(
                "Requests still running after {:?}, aborting",
                SHUTDOWN_GRACE
            );
            handle.abort();
        }
    }

    tracing::info!("memory-server stopped");
    Ok(())
}
