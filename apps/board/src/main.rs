mod backend;
mod config;
mod errors;
mod pipeline;
mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use tower_http::{cors::CorsLayer, trace::TraceLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::backend::{CsvExporter, HttpBackend};
use crate::config::{BoardKind, Config};
use crate::pipeline::board::{Board, BoardOptions};
use crate::pipeline::stage::StageRegistry;
use crate::routes::build_router;
use crate::state::AppState;

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration first (fails on missing required env vars)
    let config = Config::from_env()?;

    // Initialize structured logging
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new(format!("{}={}", env!("CARGO_PKG_NAME"), &config.rust_log))
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting board service v{}", env!("CARGO_PKG_VERSION"));

    // Backend client (single attempt per call, no retry loop)
    let backend = Arc::new(HttpBackend::new(
        &config.backend_url,
        config.backend_token.clone(),
        config.board_kind.resource(),
        Duration::from_secs(config.request_timeout_secs),
    )?);
    info!("Backend client initialized ({})", config.backend_url);

    let registry = match config.board_kind {
        BoardKind::Applications => StageRegistry::applications(),
        BoardKind::Candidates => StageRegistry::candidates(),
    }?;
    info!(
        "Stage registry: {}",
        registry
            .stages()
            .iter()
            .map(|s| s.id.as_str())
            .collect::<Vec<_>>()
            .join(" -> ")
    );

    let board = Arc::new(Board::new(
        Arc::new(registry),
        backend.clone(),
        backend,
        Arc::new(CsvExporter),
        BoardOptions {
            source: config.board_source(),
            compare_cap: config.compare_cap,
            bulk_mode: config.bulk_mode,
        },
    ));

    // An unreachable backend should not keep the dashboard from starting.
    if let Err(e) = board.refresh().await {
        warn!("Initial board load failed: {e}");
    }
    board.refresh_server_stats().await;

    let state = AppState {
        board,
        config: config.clone(),
    };

    let app = build_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive()); // TODO: restrict CORS to the dashboard origin once it is configurable

    let addr: SocketAddr = format!("0.0.0.0:{}", config.port).parse()?;
    info!("Listening on {addr}");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
