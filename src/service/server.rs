use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::services::ServeDir;
use tower_http::trace::TraceLayer;

use super::api::{self, AppState, SharedState};
use crate::config::ServiceConfig;
use crate::sketch::SketchBuilder;

/// Build the full application router: JSON API plus static files from
/// `public_dir` at `/`.
pub fn build_router(state: SharedState, public_dir: &Path) -> Router {
    api::api_router()
        .fallback_service(ServeDir::new(public_dir))
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}

/// Start the HTTP server and run until Ctrl+C.
pub async fn start_server(config: ServiceConfig, open_browser: bool) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    let builder =
        SketchBuilder::from_config(&config).context("Failed to initialize sketch builder")?;
    tracing::info!(
        temp_root = %builder.workspaces().root().display(),
        arduino_cli = %config.arduino.cli_path,
        "sketch builder ready"
    );
    let state = Arc::new(AppState { builder });

    let mut app = build_router(state, &config.server.public_dir);
    if config.server.dev {
        app = app.layer(CorsLayer::permissive());
    }

    let addr = config.bind_addr();
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    let local_addr = listener.local_addr()?;
    let url = format!("http://localhost:{}", local_addr.port());
    tracing::info!("Server running on port {}", local_addr.port());
    tracing::info!("Visit {}", url);

    if open_browser && let Err(e) = open::that(&url) {
        tracing::warn!(error = %e, "Failed to open browser");
    }

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    tracing::info!("Server shut down gracefully.");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "Failed to install Ctrl+C handler");
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutting down...");
}
