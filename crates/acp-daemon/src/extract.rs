//! Request extractors.

use axum::async_trait;
use axum::extract::FromRequestParts;
use axum::http::request::Parts;

use crate::error::ApiError;

pub const WORKSPACE_HEADER: &str = "x-workspace-id";

/// The workspace every request is scoped to. Extracted from the
/// `x-workspace-id` header; no endpoint serves cross-workspace reads.
#[derive(Debug, Clone)]
pub struct WorkspaceId(pub String);

#[async_trait]
impl<S> FromRequestParts<S> for WorkspaceId
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        let value = parts
            .headers
            .get(WORKSPACE_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .ok_or_else(|| {
                ApiError::validation(
                    "workspace_header_required",
                    format!("missing required header {WORKSPACE_HEADER}"),
                )
            })?;

        Ok(WorkspaceId(value.to_string()))
    }
}
