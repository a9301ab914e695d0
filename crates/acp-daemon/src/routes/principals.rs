//! Idempotent ensure-by-actor.

use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use serde_json::json;

use acp_db::principals;
use acp_events::{ids, EventContext, UnitOfWork};

use crate::api_types::{EnsurePrincipalRequest, EnsurePrincipalResponse};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

pub(crate) async fn ensure(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<EnsurePrincipalRequest>,
) -> Result<Json<EnsurePrincipalResponse>, ApiError> {
    if !matches!(body.principal_type.as_str(), "user" | "service" | "agent") {
        return Err(ApiError::validation(
            "invalid_principal_type",
            "principal_type must be one of user | service | agent",
        ));
    }

    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;

    let (row, created) = principals::ensure_by_actor(
        uow.conn(),
        &workspace_id,
        &ids::mint(ids::PRINCIPAL),
        &body.principal_type,
        &body.actor_type,
        &body.actor_id,
    )
    .await?;

    if created {
        uow.append(
            "principal.ensured",
            json!({
                "principal_id": row.principal_id,
                "principal_type": row.principal_type,
                "legacy_actor_type": row.legacy_actor_type,
                "legacy_actor_id": row.legacy_actor_id,
            }),
        )
        .await?;
    }

    uow.commit(&st.broker).await?;

    Ok(Json(EnsurePrincipalResponse {
        principal_id: row.principal_id,
        principal_type: row.principal_type,
        created,
    }))
}
