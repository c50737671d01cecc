//! Health check endpoint.

use std::net::SocketAddr;

use axum::routing::get;
use axum::{Json, Router};
use serde_json::json;

pub async fn serve(addr: SocketAddr) -> anyhow::Result<()> {
    let app = Router::new().route("/health", get(health_check));

    tracing::info!("Health endpoint listening on {}", addr);
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "service": "herald-worker",
        "version": env!("CARGO_PKG_VERSION")
    }))
}
