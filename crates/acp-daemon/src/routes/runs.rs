//! Run lifecycle, steps, artifacts.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde_json::json;

use acp_db::rooms;
use acp_db::runs::{self, RunRow, RunStatus};
use acp_events::{ids, EventContext, UnitOfWork};

use crate::api_types::{
    ArtifactResponse, ArtifactsQuery, ArtifactsResponse, CompleteRunRequest, CreateArtifactRequest,
    CreateRunRequest, CreateStepRequest, RunResponse, StepResponse, TransitionResponse,
};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

fn run_response(run: RunRow) -> RunResponse {
    RunResponse {
        run_id: run.run_id,
        status: run.status.as_str().to_string(),
        correlation_id: run.correlation_id,
        room_id: run.room_id,
        output: run.output,
        error_reason_code: run.error_reason_code,
        last_event_id: run.last_event_id,
    }
}

pub(crate) async fn create_run(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<CreateRunRequest>,
) -> Result<Json<RunResponse>, ApiError> {
    let run_id = ids::mint(ids::RUN);
    let correlation_id = ids::mint(ids::CORRELATION);

    let mut ctx = EventContext::new(&workspace_id).for_run(run_id.clone(), correlation_id.clone());
    if let Some(room_id) = &body.room_id {
        ctx = ctx.in_room(room_id.clone());
    }
    if let Some(thread_id) = &body.thread_id {
        ctx = ctx.in_thread(thread_id.clone());
    }
    let mut uow = UnitOfWork::begin(&st.pool, ctx).await?;

    if let Some(room_id) = &body.room_id {
        rooms::fetch_room(uow.conn(), &workspace_id, room_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("room {room_id}")))?;
    }

    let record = uow
        .append(
            "run.created",
            json!({
                "run_id": run_id,
                "created_by_type": body.created_by_type,
                "created_by_id": body.created_by_id,
            }),
        )
        .await?;

    runs::insert_run(
        uow.conn(),
        &runs::NewRun {
            run_id: run_id.clone(),
            workspace_id: workspace_id.clone(),
            room_id: body.room_id.clone(),
            thread_id: body.thread_id.clone(),
            created_by_type: body.created_by_type,
            created_by_id: body.created_by_id,
            input: body.input.unwrap_or_else(|| json!({})),
            correlation_id: correlation_id.clone(),
        },
        &record.event_id,
    )
    .await?;
    uow.commit(&st.broker).await?;

    Ok(Json(RunResponse {
        run_id,
        status: "queued".to_string(),
        correlation_id,
        room_id: body.room_id,
        output: None,
        error_reason_code: None,
        last_event_id: Some(record.event_id),
    }))
}

pub(crate) async fn get_run(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(run_id): Path<String>,
) -> Result<Json<RunResponse>, ApiError> {
    let mut conn = st.pool.acquire().await.map_err(anyhow::Error::from)?;
    let run = runs::fetch_run(&mut conn, &workspace_id, &run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id}")))?;
    Ok(Json(run_response(run)))
}

/// Open a unit-of-work bound to an existing run's context, causation
/// chaining off the run's latest event.
async fn begin_run_uow(
    st: &AppState,
    workspace_id: &str,
    run_id: &str,
) -> Result<(UnitOfWork, RunRow), ApiError> {
    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(workspace_id)).await?;
    let run = runs::fetch_run(uow.conn(), workspace_id, run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("run {run_id}")))?;

    {
        let ctx = uow.ctx_mut();
        ctx.run_id = Some(run.run_id.clone());
        ctx.correlation_id = Some(run.correlation_id.clone());
        ctx.room_id = run.room_id.clone();
        ctx.thread_id = run.thread_id.clone();
        ctx.parent_event_id = run.last_event_id.clone();
    }

    Ok((uow, run))
}

pub(crate) async fn start_run(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(run_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let (mut uow, run) = begin_run_uow(&st, &workspace_id, &run_id).await?;

    match run.status {
        RunStatus::Queued => {}
        RunStatus::Running => {
            return Ok(Json(TransitionResponse {
                run_id,
                status: "running".to_string(),
                changed: false,
            }))
        }
        other => {
            return Err(ApiError::Conflict(format!(
                "run {run_id} is {}, cannot start",
                other.as_str()
            )))
        }
    }

    let record = uow
        .append("run.started", json!({ "run_id": run_id }))
        .await?;
    let changed = runs::start_run(uow.conn(), &workspace_id, &run_id, &record.event_id).await?;
    if !changed {
        // Lost a race with a worker claim; nothing to publish.
        return Err(ApiError::Conflict(format!("run {run_id} is not queued")));
    }
    uow.commit(&st.broker).await?;

    Ok(Json(TransitionResponse {
        run_id,
        status: "running".to_string(),
        changed: true,
    }))
}

pub(crate) async fn complete_run(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(run_id): Path<String>,
    Json(body): Json<CompleteRunRequest>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let target = match body.status.as_str() {
        "succeeded" => RunStatus::Succeeded,
        "failed" => RunStatus::Failed,
        other => {
            return Err(ApiError::validation(
                "invalid_run_status",
                format!("status must be succeeded or failed, got '{other}'"),
            ))
        }
    };

    let (mut uow, run) = begin_run_uow(&st, &workspace_id, &run_id).await?;

    if run.status == target {
        return Ok(Json(TransitionResponse {
            run_id,
            status: target.as_str().to_string(),
            changed: false,
        }));
    }
    if run.status != RunStatus::Running {
        return Err(ApiError::Conflict(format!(
            "run {run_id} is {}, cannot complete",
            run.status.as_str()
        )));
    }

    let event_type = match target {
        RunStatus::Succeeded => "run.succeeded",
        _ => "run.failed",
    };
    let record = uow
        .append(
            event_type,
            json!({
                "run_id": run_id,
                "status": target.as_str(),
                "reason_code": body.error_reason_code,
            }),
        )
        .await?;

    runs::complete_run(
        uow.conn(),
        &workspace_id,
        &run_id,
        target,
        body.output.as_ref(),
        body.error_reason_code.as_deref(),
        &record.event_id,
    )
    .await?;
    uow.commit(&st.broker).await?;

    Ok(Json(TransitionResponse {
        run_id,
        status: target.as_str().to_string(),
        changed: true,
    }))
}

pub(crate) async fn cancel_run(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(run_id): Path<String>,
) -> Result<Json<TransitionResponse>, ApiError> {
    let (mut uow, run) = begin_run_uow(&st, &workspace_id, &run_id).await?;

    match run.status {
        RunStatus::Queued | RunStatus::Running => {}
        RunStatus::Cancelled => {
            return Ok(Json(TransitionResponse {
                run_id,
                status: "cancelled".to_string(),
                changed: false,
            }))
        }
        other => {
            return Err(ApiError::Conflict(format!(
                "run {run_id} is {}, cannot cancel",
                other.as_str()
            )))
        }
    }

    let record = uow
        .append("run.cancelled", json!({ "run_id": run_id }))
        .await?;
    runs::cancel_run(uow.conn(), &workspace_id, &run_id, &record.event_id).await?;
    uow.commit(&st.broker).await?;

    Ok(Json(TransitionResponse {
        run_id,
        status: "cancelled".to_string(),
        changed: true,
    }))
}

pub(crate) async fn create_step(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(run_id): Path<String>,
    Json(body): Json<CreateStepRequest>,
) -> Result<Json<StepResponse>, ApiError> {
    let (mut uow, _run) = begin_run_uow(&st, &workspace_id, &run_id).await?;

    let step_id = ids::mint(ids::STEP);
    uow.ctx_mut().step_id = Some(step_id.clone());

    let record = uow
        .append(
            "step.created",
            json!({
                "step_id": step_id,
                "run_id": run_id,
                "name": body.name,
            }),
        )
        .await?;

    runs::insert_step(
        uow.conn(),
        &workspace_id,
        &step_id,
        &run_id,
        &body.name,
        &body.input.unwrap_or_else(|| json!({})),
        &record.event_id,
    )
    .await?;
    runs::touch_last_event(uow.conn(), &run_id, &record.event_id).await?;
    uow.commit(&st.broker).await?;

    Ok(Json(StepResponse {
        step_id,
        run_id,
        last_event_id: Some(record.event_id),
    }))
}

pub(crate) async fn create_artifact(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(step_id): Path<String>,
    Json(body): Json<CreateArtifactRequest>,
) -> Result<Json<ArtifactResponse>, ApiError> {
    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;

    let step = runs::fetch_step(uow.conn(), &workspace_id, &step_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("step {step_id}")))?;
    let run = runs::fetch_run(uow.conn(), &workspace_id, &step.run_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("run {}", step.run_id)))?;

    let artifact_id = ids::mint(ids::ARTIFACT);
    {
        // Correlation inherits from the run; causation is the step's latest
        // event, so the artifact chains off the step that produced it.
        let ctx = uow.ctx_mut();
        ctx.run_id = Some(run.run_id.clone());
        ctx.correlation_id = Some(run.correlation_id.clone());
        ctx.room_id = run.room_id.clone();
        ctx.thread_id = run.thread_id.clone();
        ctx.step_id = Some(step_id.clone());
        ctx.parent_event_id = step.last_event_id.clone();
    }

    let record = uow
        .append(
            "artifact.created",
            json!({
                "artifact_id": artifact_id,
                "kind": body.kind,
            }),
        )
        .await?;

    runs::insert_artifact(
        uow.conn(),
        &workspace_id,
        &artifact_id,
        &run.run_id,
        &step_id,
        &body.kind,
        &body.content.unwrap_or_else(|| json!({})),
        &record.event_id,
    )
    .await?;
    uow.commit(&st.broker).await?;

    Ok(Json(ArtifactResponse {
        artifact_id,
        run_id: run.run_id,
        step_id,
        kind: body.kind,
        last_event_id: Some(record.event_id),
    }))
}

pub(crate) async fn list_artifacts(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Query(query): Query<ArtifactsQuery>,
) -> Result<Json<ArtifactsResponse>, ApiError> {
    let rows = runs::list_artifacts(&st.pool, &workspace_id, query.run_id.as_deref()).await?;
    Ok(Json(ArtifactsResponse {
        artifacts: rows
            .into_iter()
            .map(|r| ArtifactResponse {
                artifact_id: r.artifact_id,
                run_id: r.run_id,
                step_id: r.step_id,
                kind: r.kind,
                last_event_id: r.last_event_id,
            })
            .collect(),
    }))
}

pub(crate) async fn get_artifact(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(artifact_id): Path<String>,
) -> Result<Json<ArtifactResponse>, ApiError> {
    let row = runs::fetch_artifact(&st.pool, &workspace_id, &artifact_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("artifact {artifact_id}")))?;
    Ok(Json(ArtifactResponse {
        artifact_id: row.artifact_id,
        run_id: row.run_id,
        step_id: row.step_id,
        kind: row.kind,
        last_event_id: row.last_event_id,
    }))
}
