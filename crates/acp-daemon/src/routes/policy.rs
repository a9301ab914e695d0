//! Policy evaluation endpoint.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use acp_events::{EventContext, UnitOfWork};
use acp_learning::observe_decision;
use acp_policy::{evaluate, snapshot::load_snapshot, PolicyInput};

use crate::api_types::{EvaluatePolicyRequest, EvaluatePolicyResponse};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

/// Evaluate one action. The decision is the 200 body; `deny` and
/// `require_approval` are outcomes, not HTTP errors. Every evaluation emits
/// `policy.evaluated`; non-allow outcomes feed the learning pipeline inside
/// the same unit-of-work.
pub(crate) async fn evaluate_policy(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<EvaluatePolicyRequest>,
) -> Result<Json<EvaluatePolicyResponse>, ApiError> {
    let mut ctx = EventContext::new(&workspace_id);
    if let Some(room_id) = &body.room_id {
        ctx = ctx.in_room(room_id.clone());
    }
    let mut uow = UnitOfWork::begin(&st.pool, ctx).await?;

    let input = PolicyInput {
        action: body.action,
        actor_type: body.actor_type,
        actor_id: body.actor_id,
        principal_id: body.principal_id,
        room_id: body.room_id,
        target_url: body.target_url,
        context: body.context.unwrap_or_else(|| json!({})),
    };

    let snapshot = load_snapshot(uow.conn(), &workspace_id, &input.action).await?;
    let decision = evaluate(&input, &snapshot);

    uow.append(
        "policy.evaluated",
        json!({
            "action": input.action,
            "actor_type": input.actor_type,
            "actor_id": input.actor_id,
            "room_id": input.room_id,
            "decision": decision.decision.as_str(),
            "reason_code": decision.reason_code,
            "enforced": decision.enforced,
        }),
    )
    .await?;

    observe_decision(&mut uow, &st.config.learning, &input, &decision).await?;
    uow.commit(&st.broker).await?;

    Ok(Json(EvaluatePolicyResponse {
        decision: decision.decision.as_str().to_string(),
        reason_code: decision.reason_code,
    }))
}
