//! chorus-server - Main entry point
//!
//! Bioacoustics job orchestrator and clip rendering service. Starts worker
//! subprocesses for inference, training and extraction jobs, and renders
//! audio clips with spectrograms for the review front-end.
//!
//! Startup sequence:
//! 1. Load bootstrap config (CLI > environment > TOML > defaults)
//! 2. Initialise logging
//! 3. Resolve the jobs root folder and rediscover existing jobs
//! 4. Build the clip service and serve HTTP until Ctrl+C / SIGTERM
//!
//! Worker subprocesses are not stopped on shutdown; after a restart they
//! show up as orphaned jobs.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio::signal;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use chorus_common::config::{load_config, resolve_root_folder};
use chorus_common::logging::init_tracing;
use chorus_server::clips::{default_worker_threads, ClipService, SpectrogramRenderer};
use chorus_server::jobs::{JobRegistry, JobRunner, OsLauncher};
use chorus_server::{build_router, AppState};

/// Command-line arguments for chorus-server
#[derive(Parser, Debug)]
#[command(name = "chorus-server")]
#[command(about = "Bioacoustics job orchestrator and clip rendering service")]
#[command(version)]
struct Args {
    /// Port to listen on
    #[arg(short, long, env = "CHORUS_PORT")]
    port: Option<u16>,

    /// Address to bind
    #[arg(long, env = "CHORUS_HOST")]
    host: Option<String>,

    /// Folder holding one sub-directory per job
    #[arg(short, long, env = "CHORUS_ROOT_FOLDER")]
    root_folder: Option<PathBuf>,

    /// Path to chorus.toml
    #[arg(short, long, env = "CHORUS_CONFIG")]
    config: Option<PathBuf>,

    /// Maximum number of rendered clips kept in memory
    #[arg(long, env = "CHORUS_CACHE_SIZE")]
    cache_size: Option<usize>,

    /// Clip render worker threads
    #[arg(long, env = "CHORUS_CLIP_WORKERS")]
    workers: Option<usize>,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Parse command-line arguments
    let args = Args::parse();

    let (config, config_path) =
        load_config(args.config.as_deref()).context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialise logging")?;

    info!("Starting chorus-server v{}", env!("CARGO_PKG_VERSION"));
    match &config_path {
        Some(path) => info!("Config file: {}", path.display()),
        None => info!("Config file: none (built-in defaults)"),
    }

    let root_folder = resolve_root_folder(args.root_folder.as_deref(), &config);
    info!("Root folder: {}", root_folder.display());

    // Job registry over the root folder
    let runner = JobRunner::new(Arc::new(OsLauncher), config.jobs.kill_grace());
    let registry = Arc::new(
        JobRegistry::new(&root_folder, runner, config.jobs.log_tail_lines)
            .context("Failed to initialise job registry")?,
    );

    // Rediscover jobs left by a previous run
    let known = registry
        .list_jobs()
        .context("Failed to scan root folder for jobs")?;
    info!("Recovered {} job(s) from {}", known.len(), root_folder.display());

    // Clip service
    let cache_capacity = args.cache_size.unwrap_or(config.clips.cache_capacity);
    let worker_threads = args
        .workers
        .or(config.clips.worker_threads)
        .unwrap_or_else(default_worker_threads);
    let clips = Arc::new(
        ClipService::new(Arc::new(SpectrogramRenderer::new()), cache_capacity, worker_threads)
            .context("Failed to initialise clip service")?,
    );

    // Build the application router
    let app_state = AppState::new(registry, clips, config.jobs.clone());
    let app = build_router(app_state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let host = args.host.unwrap_or_else(|| config.server.host.clone());
    let port = args.port.unwrap_or(config.server.port);

    info!("Starting HTTP server on {}:{}", host, port);

    // Create and run the server
    let listener = tokio::net::TcpListener::bind((host.as_str(), port))
        .await
        .with_context(|| format!("Failed to bind to {}:{}", host, port))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutdown complete");
    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, shutting down");
        },
        _ = terminate => {
            info!("Received terminate signal, shutting down");
        },
    }
}
