//! Anomalyscope -- interactive CSV outlier review.
//!
//! Upload a CSV, pick two numeric columns and an expected outlier rate, and
//! an Isolation Forest flags the atypical rows. The crate provides the
//! ingestion, scoring, reporting and web layers; the binary wraps them in a
//! server and an offline `analyze` command.

pub mod api;
pub mod config;
pub mod detect;
pub mod ingest;
pub mod pipeline;
pub mod report;

use anyhow::{Context, Result};

/// Start the web UI: build state from `config` and serve until shutdown.
pub async fn serve(config: config::Config) -> Result<()> {
    let addr: std::net::SocketAddr = config
        .server
        .bind
        .parse()
        .with_context(|| format!("invalid bind address: {}", config.server.bind))?;

    let state = api::state::AppState::new(config);
    let app = api::router(state);

    tracing::info!(%addr, "anomalyscope listening");
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("failed to bind {}", addr))?;
    axum::serve(listener, app).await?;

    Ok(())
}
