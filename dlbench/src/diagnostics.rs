//! Local HTTP endpoint for inspecting a running benchmark.
//!
//! The endpoint exposes the health of the process and metrics of the async runtime. It never
//! carries benchmark results, which are only written to stdout.

use std::net::SocketAddr;

use anyhow::Result;
use axum::routing::get;
use axum::{Json, Router};
use serde::Serialize;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

/// Snapshot of the async runtime served at `/debug/runtime`.
#[derive(Debug, Serialize)]
pub struct RuntimeStats {
    pub num_workers: usize,
    pub num_alive_tasks: usize,
}

impl RuntimeStats {
    fn current() -> Self {
        let metrics = tokio::runtime::Handle::current().metrics();
        Self {
            num_workers: metrics.num_workers(),
            num_alive_tasks: metrics.num_alive_tasks(),
        }
    }
}

async fn health() -> &'static str {
    "OK"
}

async fn runtime() -> Json<RuntimeStats> {
    Json(RuntimeStats::current())
}

pub fn routes() -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/debug/runtime", get(runtime))
}

/// Serves the diagnostics endpoint on `addr` until `shutdown` is cancelled.
///
/// Only loopback addresses are accepted.
pub async fn serve(addr: SocketAddr, shutdown: CancellationToken) -> Result<()> {
    if !addr.ip().is_loopback() {
        anyhow::bail!("diagnostics address {addr} is not a loopback address");
    }

    let listener = TcpListener::bind(addr).await?;
    tracing::info!("Diagnostics listening on {}", listener.local_addr()?);

    axum::serve(listener, routes())
        .with_graceful_shutdown(async move { shutdown.cancelled().await })
        .await?;

    Ok(())
}

/// Spawns the diagnostics endpoint in the background.
///
/// Failures are logged and never affect the benchmark.
pub fn spawn(addr: SocketAddr, shutdown: CancellationToken) {
    tokio::spawn(async move {
        if let Err(error) = serve(addr, shutdown).await {
            tracing::warn!(
                error = &*error as &dyn std::error::Error,
                "Diagnostics endpoint unavailable"
            );
        }
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn rejects_public_address() {
        let addr: SocketAddr = "0.0.0.0:6060".parse().unwrap();
        let err = serve(addr, CancellationToken::new()).await.unwrap_err();
        assert!(err.to_string().contains("not a loopback address"));
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let shutdown = CancellationToken::new();
        shutdown.cancel();

        let addr: SocketAddr = "127.0.0.1:0".parse().unwrap();
        serve(addr, shutdown).await.unwrap();
    }

    #[tokio::test]
    async fn reports_runtime_stats() {
        let Json(stats) = runtime().await;
        assert_eq!(stats.num_workers, 1);
        assert_eq!(health().await, "OK");
    }
}
