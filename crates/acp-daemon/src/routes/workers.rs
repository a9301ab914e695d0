//! On-demand triggers for the run worker and the daily snapshot job.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{NaiveDate, Utc};

use acp_worker::{run_daily_snapshot, CycleResult, SnapshotResult};

use crate::api_types::{RunCycleRequest, SnapshotJobRequest};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

pub(crate) async fn run_cycle(
    State(st): State<Arc<AppState>>,
    WorkspaceId(_workspace_id): WorkspaceId,
    Json(body): Json<RunCycleRequest>,
) -> Result<Json<CycleResult>, ApiError> {
    if body.batch_limit <= 0 {
        return Err(ApiError::validation(
            "invalid_batch_limit",
            "batch_limit must be positive",
        ));
    }
    let result = st.run_worker.run_cycle(body.batch_limit).await?;
    Ok(Json(result))
}

pub(crate) async fn daily_snapshot(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<SnapshotJobRequest>,
) -> Result<Json<SnapshotResult>, ApiError> {
    let date = match &body.date {
        Some(raw) => NaiveDate::parse_from_str(raw, "%Y-%m-%d").map_err(|_| {
            ApiError::validation("invalid_date", format!("'{raw}' is not an ISO date"))
        })?,
        None => Utc::now().date_naive(),
    };

    let result = run_daily_snapshot(&st.pool, &st.broker, &workspace_id, date).await?;
    Ok(Json(result))
}
