//! Agent registration, skill inventory, snapshots, quarantine controls.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;

use acp_db::{agents, principals, snapshots};
use acp_events::{ids, EventContext, UnitOfWork};
use acp_skills::{import_inventory, review_pending, ReviewSummary};

use crate::api_types::{
    QuarantineLiftResponse, RegisterAgentRequest, RegisterAgentResponse, SkillImportRequest,
    SkillImportResponse, SnapshotDto, SnapshotsQuery, SnapshotsResponse,
};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

pub(crate) async fn register(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<RegisterAgentRequest>,
) -> Result<Json<RegisterAgentResponse>, ApiError> {
    if body.display_name.trim().is_empty() {
        return Err(ApiError::validation(
            "display_name_required",
            "display_name must not be empty",
        ));
    }

    let agent_id = ids::mint(ids::AGENT);
    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;

    // The agent owns exactly one principal of type `agent`; the legacy pair
    // is (agent, agent_id) so ensure-by-actor converges on the same row.
    let (principal, _created) = principals::ensure_by_actor(
        uow.conn(),
        &workspace_id,
        &ids::mint(ids::PRINCIPAL),
        "agent",
        "agent",
        &agent_id,
    )
    .await?;

    let record = uow
        .append(
            "agent.registered",
            json!({
                "agent_id": agent_id,
                "principal_id": principal.principal_id,
                "display_name": body.display_name,
            }),
        )
        .await?;

    agents::insert_agent(
        uow.conn(),
        &workspace_id,
        &agent_id,
        &principal.principal_id,
        &body.display_name,
        &record.event_id,
    )
    .await?;

    uow.commit(&st.broker).await?;

    Ok(Json(RegisterAgentResponse {
        agent_id,
        principal_id: principal.principal_id,
        display_name: body.display_name,
    }))
}

/// Load an agent or 404 within the workspace.
async fn require_agent(
    uow: &mut UnitOfWork,
    workspace_id: &str,
    agent_id: &str,
) -> Result<agents::AgentRow, ApiError> {
    agents::fetch_agent(uow.conn(), workspace_id, agent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("agent {agent_id}")))
}

pub(crate) async fn skills_import(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(agent_id): Path<String>,
    Json(body): Json<SkillImportRequest>,
) -> Result<Json<SkillImportResponse>, ApiError> {
    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;
    require_agent(&mut uow, &workspace_id, &agent_id).await?;

    let summary = import_inventory(&mut uow, &agent_id, &body.packages).await?;
    uow.commit(&st.broker).await?;

    Ok(Json(SkillImportResponse { summary }))
}

pub(crate) async fn skills_review_pending(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(agent_id): Path<String>,
) -> Result<Json<ReviewSummary>, ApiError> {
    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;
    require_agent(&mut uow, &workspace_id, &agent_id).await?;

    let summary = review_pending(&mut uow, &agent_id).await?;
    uow.commit(&st.broker).await?;

    Ok(Json(summary))
}

pub(crate) async fn snapshots(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(agent_id): Path<String>,
    Query(query): Query<SnapshotsQuery>,
) -> Result<Json<SnapshotsResponse>, ApiError> {
    let rows = snapshots::list_for_agent(&st.pool, &workspace_id, &agent_id, query.days).await?;
    Ok(Json(SnapshotsResponse {
        agent_id,
        snapshots: rows
            .into_iter()
            .map(|r| SnapshotDto {
                agent_id: r.agent_id,
                snapshot_date: r.snapshot_date.to_string(),
                trust_score: r.trust_score,
                autonomy_rate: r.autonomy_rate,
                learning_events_7d: r.learning_events_7d,
                constraints_active: r.constraints_active,
                skills_verified: r.skills_verified,
                egress_blocked_7d: r.egress_blocked_7d,
            })
            .collect(),
    }))
}

pub(crate) async fn quarantine_lift(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(agent_id): Path<String>,
) -> Result<Json<QuarantineLiftResponse>, ApiError> {
    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;
    let agent = require_agent(&mut uow, &workspace_id, &agent_id).await?;

    let mut lifted = false;
    if agent.is_quarantined() {
        let record = uow
            .append(
                "agent.quarantine_lifted",
                json!({
                    "agent_id": agent_id,
                    "previous_reason": agent.quarantine_reason,
                }),
            )
            .await?;
        lifted =
            agents::lift_quarantine(uow.conn(), &workspace_id, &agent_id, &record.event_id).await?;
    }

    uow.commit(&st.broker).await?;
    Ok(Json(QuarantineLiftResponse { agent_id, lifted }))
}
