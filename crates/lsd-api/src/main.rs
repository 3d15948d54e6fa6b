//! # lsd-api: Binary Entry Point
//!
//! Starts the Axum HTTP server for the License Status service.
//! Binds to the configured host and port (default `0.0.0.0:8990`).

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;

use lsd_api::config::AppConfig;
use lsd_api::state::AppState;
use lsd_api::store::{MemoryStore, PgStore, StatusStore};
use lsd_core::SystemClock;
use lsd_issuer_client::IssuerClient;

/// License Status Document server.
#[derive(Debug, Parser)]
#[command(name = "lsd-api", version, about)]
struct Args {
    /// YAML configuration file. Environment variables override its values.
    #[arg(long, short, env = "LSD_CONFIG")]
    config: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let args = Args::parse();
    let config = AppConfig::load(args.config.as_deref()).context("loading configuration")?;

    let store: Arc<dyn StatusStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url.expose()).await.map_err(|e| {
                tracing::error!("Database initialization failed: {e}");
                e
            })?;
            tracing::info!("PostgreSQL store connected");
            Arc::new(store)
        }
        None => {
            tracing::warn!("DATABASE_URL not set. Statuses are kept in memory and lost on restart.");
            Arc::new(MemoryStore::new())
        }
    };

    let issuer = IssuerClient::new(config.issuer_config()?).map_err(|e| {
        tracing::error!("Failed to create issuer client: {e}");
        e
    })?;
    tracing::info!(issuer = %config.issuer.public_base_url, "Issuer client configured");

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let state = AppState::new(config, store, Arc::new(issuer), Arc::new(SystemClock));
    let app = lsd_api::app(state);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("binding {addr}"))?;
    tracing::info!("License Status API listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shut down");
    Ok(())
}

/// Structured tracing. `LOG_FORMAT=json` switches to JSON lines.
fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    let json = std::env::var("LOG_FORMAT").is_ok_and(|f| f.eq_ignore_ascii_case("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {e}");
        std::future::pending::<()>().await;
    }
}
