use crate::middleware::{RequireCronSecret, RequireKeyAuth};
use crate::types::{ConnectionReport, RunSummary};
use crate::{PulseError, router::PulseState};
use axum::{
    Json,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::time::Instant;
use tracing::{error, info};

/// 200 with the summary whenever the run started, even if every connection
/// failed; 500 only when it could not start.
async fn run_and_respond(state: &PulseState, trigger: &'static str) -> Response {
    let started = Instant::now();
    info!(trigger, "sync triggered");
    let summary = match state.sync.run_sync().await {
        Ok(summary) => summary,
        Err(e) => {
            error!(trigger, error = %e, "sync actor unavailable");
            RunSummary::aborted(e, started.elapsed())
        }
    };
    let status = if summary.success {
        StatusCode::OK
    } else {
        StatusCode::INTERNAL_SERVER_ERROR
    };
    (status, Json(summary)).into_response()
}

/// POST /cron/sync
pub async fn cron_sync_handler(_auth: RequireCronSecret, State(state): State<PulseState>) -> Response {
    run_and_respond(&state, "cron").await
}

/// POST /sync/manual
pub async fn manual_sync_handler(_auth: RequireKeyAuth, State(state): State<PulseState>) -> Response {
    run_and_respond(&state, "manual").await
}

/// POST /sync/backfill/{connection_id}
pub async fn backfill_handler(
    _auth: RequireKeyAuth,
    State(state): State<PulseState>,
    Path(connection_id): Path<i64>,
) -> Result<Json<ConnectionReport>, PulseError> {
    info!(connection_id, "backfill triggered");
    let report = state.sync.backfill(connection_id).await?;
    Ok(Json(report))
}
