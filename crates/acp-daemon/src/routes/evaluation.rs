//! Scorecards, lessons, learned constraints.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use acp_db::{evaluation, learning, runs};
use acp_events::{ids, EventContext, UnitOfWork};
use acp_learning::redact_value;
use acp_scorecard::{
    score_overall, template_requires_evidence, validate_scores, PromotionScorer, ThresholdScorer,
};

use crate::api_types::{
    CreateLessonRequest, CreateScorecardRequest, LessonResponse, ScorecardDto, ScorecardResponse,
};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

pub(crate) async fn create_scorecard(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<CreateScorecardRequest>,
) -> Result<Json<ScorecardResponse>, ApiError> {
    if let Err(message) = validate_scores(&body.scores) {
        return Err(ApiError::validation("invalid_scores", message));
    }
    if template_requires_evidence(&body.template) && body.evidence_run_id.is_none() {
        return Err(ApiError::validation(
            "missing_evidence_for_template",
            format!("template '{}' requires evidence_run_id", body.template),
        ));
    }

    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;

    let agent = acp_db::agents::fetch_agent(uow.conn(), &workspace_id, &body.agent_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("agent {}", body.agent_id)))?;

    // Evidence must be a run of this workspace created by this agent.
    if let Some(evidence_run_id) = &body.evidence_run_id {
        let run = runs::fetch_run(uow.conn(), &workspace_id, evidence_run_id)
            .await?
            .ok_or_else(|| {
                ApiError::validation(
                    "evidence_run_mismatch",
                    format!("evidence run {evidence_run_id} not found in workspace"),
                )
            })?;
        if run.created_by_id != agent.agent_id {
            return Err(ApiError::validation(
                "evidence_run_mismatch",
                format!("run {evidence_run_id} was not created by agent {}", agent.agent_id),
            ));
        }
    }

    let scorecard_id = ids::mint(ids::SCORECARD);
    let overall = score_overall(&body.scores);

    uow.append(
        "scorecard.recorded",
        json!({
            "scorecard_id": scorecard_id,
            "agent_id": agent.agent_id,
            "template": body.template,
            "overall": overall,
        }),
    )
    .await?;

    evaluation::insert_scorecard(
        uow.conn(),
        &workspace_id,
        &scorecard_id,
        &agent.agent_id,
        &body.template,
        &body.scores,
        overall,
        body.evidence_run_id.as_deref(),
        body.notes.as_deref(),
    )
    .await?;

    // Promotion loop: deterministic scorer over the agent's recent overall
    // scores, recorded as the single current recommendation per agent.
    let mut recommendation = None;
    if st.config.promotion.loop_enabled {
        let scorer = ThresholdScorer::default();
        let recent = evaluation::recent_overall_scores(
            uow.conn(),
            &workspace_id,
            &agent.agent_id,
            scorer.thresholds.window as i64,
        )
        .await?;
        let report = scorer.score(&recent);

        evaluation::upsert_recommendation(
            uow.conn(),
            &workspace_id,
            &agent.agent_id,
            report.recommendation.as_str(),
            report.mean_score,
            report.sample_count as i64,
            &json!(report.reasons),
        )
        .await?;

        uow.append(
            "autonomy.recommendation",
            json!({
                "agent_id": agent.agent_id,
                "recommendation": report.recommendation.as_str(),
                "mean_score": report.mean_score,
                "sample_count": report.sample_count,
                "reasons": report.reasons,
            }),
        )
        .await?;

        recommendation = Some(report.recommendation.as_str().to_string());
    }

    uow.commit(&st.broker).await?;

    Ok(Json(ScorecardResponse {
        scorecard_id,
        agent_id: agent.agent_id,
        template: body.template,
        overall,
        recommendation,
    }))
}

pub(crate) async fn get_scorecard(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(scorecard_id): Path<String>,
) -> Result<Json<ScorecardDto>, ApiError> {
    let row = evaluation::fetch_scorecard(&st.pool, &workspace_id, &scorecard_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("scorecard {scorecard_id}")))?;

    Ok(Json(ScorecardDto {
        scorecard_id: row.scorecard_id,
        agent_id: row.agent_id,
        template: row.template,
        scores: row.scores,
        overall: row.overall,
        evidence_run_id: row.evidence_run_id,
        notes: row.notes,
    }))
}

pub(crate) async fn create_lesson(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<CreateLessonRequest>,
) -> Result<Json<LessonResponse>, ApiError> {
    let context = match &body.context {
        Some(ctx) if ctx.as_object().map(|m| !m.is_empty()).unwrap_or(false) => ctx.clone(),
        _ => {
            return Err(ApiError::validation(
                "lesson_context_required",
                "lessons must carry a non-empty context object",
            ))
        }
    };

    let lesson_id = ids::mint(ids::LESSON);
    let redacted = redact_value(&context);

    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;
    uow.append(
        "lesson.recorded",
        json!({
            "lesson_id": lesson_id,
            "title": body.title,
        }),
    )
    .await?;

    evaluation::insert_lesson(
        uow.conn(),
        &workspace_id,
        &lesson_id,
        &body.title,
        body.body.as_deref(),
        &redacted,
    )
    .await?;
    uow.commit(&st.broker).await?;

    Ok(Json(LessonResponse { lesson_id }))
}

pub(crate) async fn list_constraints(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
) -> Result<Json<serde_json::Value>, ApiError> {
    let rows = learning::list_constraints(&st.pool, &workspace_id).await?;
    let constraints: Vec<_> = rows
        .into_iter()
        .map(|r| {
            json!({
                "constraint_id": r.constraint_id,
                "reason_code": r.reason_code,
                "category": r.category,
                "pattern": r.pattern,
                "guidance": r.guidance,
                "seen_count": r.seen_count,
            })
        })
        .collect();
    Ok(Json(json!({ "constraints": constraints })))
}
