use std::net::SocketAddr;

use axum::{Router, routing::get};
use tower_http::trace::TraceLayer;
use tracing::info;

/// Liveness endpoints. `/healthz` is kept for probes written against older
/// manifests.
pub fn router() -> Router {
    Router::new()
        .route("/health", get(|| async { "ok" }))
        .route("/healthz", get(|| async { "ok" }))
        .layer(TraceLayer::new_for_http())
}

pub async fn run_http_server(addr: SocketAddr) -> anyhow::Result<()> {
    info!("phare-controller HTTP listening on {}", addr);
    axum::serve(tokio::net::TcpListener::bind(addr).await?, router()).await?;
    Ok(())
}
