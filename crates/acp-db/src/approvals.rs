//! Approval projections.
//!
//! A decided `approved` approval with a matching scope flips the policy
//! evaluator to `allow` for that action until revoked. Deciding is
//! idempotent on `(approval_id, decision)`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, Row};

#[derive(Debug, Clone)]
pub struct ApprovalRow {
    pub approval_id: String,
    pub workspace_id: String,
    pub action: String,
    pub scope: Value,
    pub status: String,
    pub decided_by: Option<String>,
    pub decided_at: Option<DateTime<Utc>>,
    pub context: Value,
    pub created_at: DateTime<Utc>,
    pub last_event_id: Option<String>,
}

fn map_row(row: sqlx::postgres::PgRow) -> Result<ApprovalRow> {
    Ok(ApprovalRow {
        approval_id: row.try_get("approval_id")?,
        workspace_id: row.try_get("workspace_id")?,
        action: row.try_get("action")?,
        scope: row.try_get("scope")?,
        status: row.try_get("status")?,
        decided_by: row.try_get("decided_by")?,
        decided_at: row.try_get("decided_at")?,
        context: row.try_get("context")?,
        created_at: row.try_get("created_at")?,
        last_event_id: row.try_get("last_event_id")?,
    })
}

pub async fn insert_approval(
    conn: &mut PgConnection,
    workspace_id: &str,
    approval_id: &str,
    action: &str,
    scope: &Value,
    context: &Value,
    last_event_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into proj_approvals
            (approval_id, workspace_id, action, scope, context, last_event_id)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(approval_id)
    .bind(workspace_id)
    .bind(action)
    .bind(scope)
    .bind(context)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("insert_approval failed")?;
    Ok(())
}

pub async fn fetch_approval(
    conn: &mut PgConnection,
    workspace_id: &str,
    approval_id: &str,
) -> Result<Option<ApprovalRow>> {
    let row = sqlx::query(
        r#"
        select approval_id, workspace_id, action, scope, status, decided_by,
               decided_at, context, created_at, last_event_id
        from proj_approvals
        where workspace_id = $1 and approval_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(approval_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_approval failed")?;
    row.map(map_row).transpose()
}

/// `pending -> approved | rejected`. Returns `true` when the row transitioned;
/// `false` when it was already in the requested state (idempotent repeat).
/// A decided row asked to move to a *different* decision is a conflict the
/// caller surfaces; this function only reports that nothing changed.
pub async fn decide_approval(
    conn: &mut PgConnection,
    workspace_id: &str,
    approval_id: &str,
    status: &str,
    decided_by: &str,
    last_event_id: &str,
) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        update proj_approvals
           set status        = $3,
               decided_by    = $4,
               decided_at    = now(),
               last_event_id = $5
         where workspace_id = $1
           and approval_id = $2
           and status = 'pending'
        returning approval_id
        "#,
    )
    .bind(workspace_id)
    .bind(approval_id)
    .bind(status)
    .bind(decided_by)
    .bind(last_event_id)
    .fetch_optional(&mut *conn)
    .await
    .context("decide_approval failed")?;
    Ok(row.is_some())
}

/// All `approved` approvals for `(workspace, action)`: the policy
/// evaluator's snapshot input.
pub async fn active_approvals(
    conn: &mut PgConnection,
    workspace_id: &str,
    action: &str,
) -> Result<Vec<ApprovalRow>> {
    let rows = sqlx::query(
        r#"
        select approval_id, workspace_id, action, scope, status, decided_by,
               decided_at, context, created_at, last_event_id
        from proj_approvals
        where workspace_id = $1 and action = $2 and status = 'approved'
        order by created_at asc
        "#,
    )
    .bind(workspace_id)
    .bind(action)
    .fetch_all(&mut *conn)
    .await
    .context("active_approvals failed")?;
    rows.into_iter().map(map_row).collect()
}
