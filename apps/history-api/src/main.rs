//! Candle History API Binary
//!
//! Serves historical candles over HTTP.
//!
//! # Usage
//!
//! ```bash
//! cargo run --bin history-api
//! ```
//!
//! # Environment Variables
//!
//! - `CANDLE_BACKEND`: sqlite | r2 | local (default: sqlite)
//! - `DATABASE_PATH`: SQLite file (default: crypto_data.db)
//! - `R2_ENDPOINT`, `R2_BUCKET`: object store location (required for r2)
//! - `R2_ACCESS_KEY`, `R2_SECRET_KEY`: bucket credentials (required for r2)
//! - `R2_REGION`: signing region (default: auto)
//! - `DATA_DIR`: document directory for local (default: data)
//! - `DOCUMENT_LAYOUT`: per-symbol | per-timeframe
//! - `PORT`: HTTP port (default: 3001)
//! - `OTEL_ENABLED`, `OTEL_EXPORTER_OTLP_ENDPOINT`, `OTEL_SERVICE_NAME`
//! - `RUST_LOG`: Log level (default: info)

use std::net::SocketAddr;
use std::sync::Arc;

use history_api::infrastructure::telemetry;
use history_api::{
    AppState, HealthState, HistoryConfig, HistoryService, connect_backend, create_router,
    init_metrics,
};
use tokio::net::TcpListener;
use tokio::signal;
use tokio_util::sync::CancellationToken;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    load_dotenv();

    let _telemetry_guard = telemetry::init();

    tracing::info!("Starting candle history API");

    if let Err(e) = init_metrics() {
        tracing::warn!(error = %e, "Prometheus recorder not installed");
    }

    let config = HistoryConfig::from_env()?;
    log_config(&config);

    let repository = connect_backend(&config.backend).await?;
    let state = AppState {
        history: HistoryService::new(repository),
    };
    let health = Arc::new(HealthState::new(
        env!("CARGO_PKG_VERSION"),
        config.backend.as_str(),
    ));
    let app = create_router(state, health);

    let shutdown_token = CancellationToken::new();
    let addr = SocketAddr::from(([0, 0, 0, 0], config.server.port));
    let listener = TcpListener::bind(addr).await?;
    tracing::info!(addr = %addr, "HTTP server listening");

    let server_shutdown = shutdown_token.clone();
    let server = tokio::spawn(async move {
        axum::serve(listener, app)
            .with_graceful_shutdown(server_shutdown.cancelled_owned())
            .await
    });

    await_shutdown(shutdown_token).await;
    server.await??;

    tracing::info!("Candle history API stopped");
    Ok(())
}

/// Log the parsed configuration.
fn log_config(config: &HistoryConfig) {
    tracing::info!(
        backend = config.backend.as_str(),
        port = config.server.port,
        "Configuration loaded"
    );
    tracing::debug!(backend = ?config.backend, "Backend settings");
}

/// Load .env file from current directory or any ancestor directory.
fn load_dotenv() {
    if dotenvy::dotenv().is_ok() {
        return;
    }

    if let Ok(cwd) = std::env::current_dir() {
        let mut dir = cwd.as_path();
        while let Some(parent) = dir.parent() {
            let env_path = parent.join(".env");
            if env_path.exists() {
                let _ = dotenvy::from_path(&env_path);
                return;
            }
            dir = parent;
        }
    }
}

/// Wait for shutdown signal (SIGTERM or SIGINT).
#[allow(clippy::expect_used)]
async fn await_shutdown(shutdown_token: CancellationToken) {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("signal handler installation is critical for graceful shutdown");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("SIGTERM handler installation is critical for graceful shutdown")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received Ctrl+C, initiating shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, initiating shutdown");
        }
    }

    shutdown_token.cancel();
}
