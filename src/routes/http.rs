// GET handlers: version, run aggregate, CSV export

use axum::{
    extract::{Path, State},
    http::{StatusCode, header},
    response::{IntoResponse, Response},
};

use super::AppState;
use crate::aggregation;
use crate::export;
use crate::models::RunAggregate;

const NAME: &str = env!("CARGO_PKG_NAME");
const VERSION: &str = env!("CARGO_PKG_VERSION");

/// GET /version: returns service name and version (from Cargo.toml at build time).
pub(super) async fn version_handler() -> impl IntoResponse {
    axum::Json(serde_json::json!({
        "name": NAME,
        "version": VERSION,
    }))
}

/// GET /api/runs/{run_id}/aggregate: batch aggregate over every stored record of the run.
pub(super) async fn run_aggregate_handler(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    match load_aggregate(&state, &run_id).await {
        Ok(agg) => axum::Json(agg).into_response(),
        Err(e) => internal_error(&run_id, "run_aggregate", e),
    }
}

/// GET /api/runs/{run_id}/export.csv: records in arrival order.
pub(super) async fn run_export_csv_handler(
    Path(run_id): Path<String>,
    State(state): State<AppState>,
) -> Response {
    let csv = match load_aggregate(&state, &run_id).await {
        Ok(agg) => export::to_csv_string(&agg),
        Err(e) => Err(e),
    };
    match csv {
        Ok(body) => (
            [
                (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
                (
                    header::CONTENT_DISPOSITION,
                    format!("attachment; filename=\"run-{}.csv\"", run_id),
                ),
            ],
            body,
        )
            .into_response(),
        Err(e) => internal_error(&run_id, "run_export_csv", e),
    }
}

pub(super) async fn load_aggregate(
    state: &AppState,
    run_id: &str,
) -> anyhow::Result<RunAggregate> {
    let records = state.record_repo.get_run_records(run_id).await?;
    Ok(aggregation::aggregate(run_id, &records)?)
}

fn internal_error(run_id: &str, operation: &'static str, e: anyhow::Error) -> Response {
    tracing::error!(error = %e, run_id, operation, "request failed");
    (StatusCode::INTERNAL_SERVER_ERROR, e.to_string()).into_response()
}
