//! Approval lifecycle.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use acp_db::approvals;
use acp_events::{ids, EventContext, UnitOfWork};
use acp_learning::redact_value;

use crate::api_types::{
    ApprovalResponse, CreateApprovalRequest, DecideApprovalRequest, DecideApprovalResponse,
};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

fn scope_room_id(scope: &serde_json::Value) -> Option<String> {
    scope
        .get("room_id")
        .and_then(|v| v.as_str())
        .map(str::to_string)
}

pub(crate) async fn create(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<CreateApprovalRequest>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let scope_type = body
        .scope
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or_default();
    match scope_type {
        "workspace" => {}
        "room" => {
            if scope_room_id(&body.scope).is_none() {
                return Err(ApiError::validation(
                    "approval_scope_invalid",
                    "room-scoped approvals must carry scope.room_id",
                ));
            }
        }
        _ => {
            return Err(ApiError::validation(
                "approval_scope_invalid",
                "scope.type must be room or workspace",
            ))
        }
    }

    let mut ctx = EventContext::new(&workspace_id);
    if let Some(room_id) = scope_room_id(&body.scope) {
        ctx = ctx.in_room(room_id);
    }
    let mut uow = UnitOfWork::begin(&st.pool, ctx).await?;

    let approval_id = ids::mint(ids::APPROVAL);
    let context = redact_value(&body.context.unwrap_or_else(|| json!({})));

    let record = uow
        .append(
            "approval.created",
            json!({
                "approval_id": approval_id,
                "action": body.action,
                "scope": body.scope,
            }),
        )
        .await?;

    approvals::insert_approval(
        uow.conn(),
        &workspace_id,
        &approval_id,
        &body.action,
        &body.scope,
        &context,
        &record.event_id,
    )
    .await?;
    uow.commit(&st.broker).await?;

    Ok(Json(ApprovalResponse {
        approval_id,
        action: body.action,
        status: "pending".to_string(),
        scope: body.scope,
    }))
}

pub(crate) async fn get_approval(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(approval_id): Path<String>,
) -> Result<Json<ApprovalResponse>, ApiError> {
    let mut conn = st.pool.acquire().await.map_err(anyhow::Error::from)?;
    let row = approvals::fetch_approval(&mut conn, &workspace_id, &approval_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("approval {approval_id}")))?;

    Ok(Json(ApprovalResponse {
        approval_id: row.approval_id,
        action: row.action,
        status: row.status,
        scope: row.scope,
    }))
}

/// Decide an approval. Idempotent on `(approval_id, decision)`: repeating
/// the same decision is a no-op 200; a contradictory decision is a 409.
pub(crate) async fn decide(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(approval_id): Path<String>,
    Json(body): Json<DecideApprovalRequest>,
) -> Result<Json<DecideApprovalResponse>, ApiError> {
    let target_status = match body.decision.as_str() {
        "approve" => "approved",
        "reject" => "rejected",
        other => {
            return Err(ApiError::validation(
                "invalid_decision",
                format!("decision must be approve or reject, got '{other}'"),
            ))
        }
    };

    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;

    let row = approvals::fetch_approval(uow.conn(), &workspace_id, &approval_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("approval {approval_id}")))?;

    if row.status == target_status {
        return Ok(Json(DecideApprovalResponse {
            approval_id,
            status: row.status,
            changed: false,
        }));
    }
    if row.status != "pending" {
        return Err(ApiError::Conflict(format!(
            "approval {approval_id} already {}",
            row.status
        )));
    }

    if let Some(room_id) = scope_room_id(&row.scope) {
        uow.ctx_mut().room_id = Some(room_id);
    }
    uow.ctx_mut().parent_event_id = row.last_event_id.clone();

    let record = uow
        .append(
            "approval.decided",
            json!({
                "approval_id": approval_id,
                "decision": body.decision,
                "status": target_status,
                "decided_by": body.decided_by,
            }),
        )
        .await?;

    let changed = approvals::decide_approval(
        uow.conn(),
        &workspace_id,
        &approval_id,
        target_status,
        &body.decided_by,
        &record.event_id,
    )
    .await?;
    if !changed {
        return Err(ApiError::Conflict(format!(
            "approval {approval_id} was decided concurrently"
        )));
    }
    uow.commit(&st.broker).await?;

    Ok(Json(DecideApprovalResponse {
        approval_id,
        status: target_status.to_string(),
        changed: true,
    }))
}
