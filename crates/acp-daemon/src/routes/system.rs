//! Health and status.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;

use crate::api_types::{HealthResponse, StatusResponse};
use crate::error::ApiError;
use crate::state::AppState;

pub(crate) async fn health(State(st): State<Arc<AppState>>) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(HealthResponse {
            ok: true,
            service: st.build.service,
            version: st.build.version,
        }),
    )
}

pub(crate) async fn status(
    State(st): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, ApiError> {
    let db = acp_db::status(&st.pool).await?;
    Ok(Json(StatusResponse {
        ok: db.ok && db.has_event_table,
        db_ok: db.ok,
        has_event_table: db.has_event_table,
        service: st.build.service,
        version: st.build.version,
    }))
}
