// HTTP + WebSocket routes

mod http;
mod ws;

use axum::{Router, routing::get};
use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use tokio::sync::broadcast;
use tower_http::cors::{Any, CorsLayer};

use crate::config::AppConfig;
use crate::record_repo::RecordRepo;

#[derive(Clone)]
pub(crate) struct AppState {
    /// Weak: the live channel closes when the watcher (its only strong sender) stops.
    pub(crate) live_tx: broadcast::WeakSender<String>,
    pub(crate) record_repo: Arc<RecordRepo>,
    pub(crate) ws_run_connections: Arc<AtomicUsize>,
    pub(crate) config: AppConfig,
}

pub fn app(
    live_tx: broadcast::Sender<String>,
    record_repo: Arc<RecordRepo>,
    ws_run_connections: Arc<AtomicUsize>,
    config: AppConfig,
) -> Router {
    let state = AppState {
        live_tx: live_tx.downgrade(),
        record_repo,
        ws_run_connections,
        config,
    };
    Router::new()
        .route("/", get(|| async { "Hello from ecowatch!" })) // GET /
        .route("/version", get(http::version_handler)) // GET /version
        .route("/api/runs/{run_id}/aggregate", get(http::run_aggregate_handler)) // GET run aggregate (batch)
        .route("/api/runs/{run_id}/export.csv", get(http::run_export_csv_handler)) // GET run records as CSV
        .route("/ws/runs/{run_id}", get(ws::ws_run)) // WS live run aggregate
        .layer(CorsLayer::new().allow_origin(Any))
        .with_state(state)
}
