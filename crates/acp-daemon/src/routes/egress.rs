//! Egress decision endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use acp_egress::{request_egress, target_domain, EgressRequest};
use acp_events::{EventContext, UnitOfWork};

use crate::api_types::{EgressApiRequest, EgressApiResponse};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

pub(crate) async fn request(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<EgressApiRequest>,
) -> Result<Json<EgressApiResponse>, ApiError> {
    if target_domain(&body.target_url).is_err() {
        return Err(ApiError::validation(
            "invalid_target_url",
            format!("'{}' is not a resolvable absolute URL", body.target_url),
        ));
    }

    let mut ctx = EventContext::new(&workspace_id);
    if let Some(room_id) = &body.room_id {
        ctx = ctx.in_room(room_id.clone());
    }
    let mut uow = UnitOfWork::begin(&st.pool, ctx).await?;

    let outcome = request_egress(
        &mut uow,
        &st.config.egress,
        &st.config.learning,
        &EgressRequest {
            action: body.action,
            target_url: body.target_url,
            method: body.method,
            run_id: body.run_id,
            actor_type: body.actor_type,
            actor_id: body.actor_id,
            principal_id: body.principal_id,
            room_id: body.room_id,
            context: body.context.unwrap_or_else(|| json!({})),
        },
    )
    .await?;

    uow.commit(&st.broker).await?;

    Ok(Json(EgressApiResponse {
        decision: outcome.decision.as_str().to_string(),
        reason_code: outcome.reason_code,
    }))
}
