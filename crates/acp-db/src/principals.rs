//! Principal store. The legacy `(actor_type, actor_id)` pair is the natural
//! key used by ensure-by-actor; callers mint the candidate `principal_id`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};

#[derive(Debug, Clone)]
pub struct PrincipalRow {
    pub principal_id: String,
    pub workspace_id: String,
    pub principal_type: String,
    pub legacy_actor_type: String,
    pub legacy_actor_id: String,
    pub created_at: DateTime<Utc>,
}

fn map_row(row: sqlx::postgres::PgRow) -> Result<PrincipalRow> {
    Ok(PrincipalRow {
        principal_id: row.try_get("principal_id")?,
        workspace_id: row.try_get("workspace_id")?,
        principal_type: row.try_get("principal_type")?,
        legacy_actor_type: row.try_get("legacy_actor_type")?,
        legacy_actor_id: row.try_get("legacy_actor_id")?,
        created_at: row.try_get("created_at")?,
    })
}

/// Idempotent ensure-by-actor.
///
/// Inserts a principal for `(workspace, legacy_actor_type, legacy_actor_id)`
/// or returns the existing row. `candidate_id` is used only when the insert
/// wins; the boolean reports whether a new row was created.
pub async fn ensure_by_actor(
    conn: &mut PgConnection,
    workspace_id: &str,
    candidate_id: &str,
    principal_type: &str,
    legacy_actor_type: &str,
    legacy_actor_id: &str,
) -> Result<(PrincipalRow, bool)> {
    let inserted = sqlx::query(
        r#"
        insert into sec_principals
            (principal_id, workspace_id, principal_type, legacy_actor_type, legacy_actor_id)
        values ($1, $2, $3, $4, $5)
        on conflict (workspace_id, legacy_actor_type, legacy_actor_id) do nothing
        returning principal_id, workspace_id, principal_type,
                  legacy_actor_type, legacy_actor_id, created_at
        "#,
    )
    .bind(candidate_id)
    .bind(workspace_id)
    .bind(principal_type)
    .bind(legacy_actor_type)
    .bind(legacy_actor_id)
    .fetch_optional(&mut *conn)
    .await
    .context("ensure_by_actor insert failed")?;

    if let Some(row) = inserted {
        return Ok((map_row(row)?, true));
    }

    let row = sqlx::query(
        r#"
        select principal_id, workspace_id, principal_type,
               legacy_actor_type, legacy_actor_id, created_at
        from sec_principals
        where workspace_id = $1 and legacy_actor_type = $2 and legacy_actor_id = $3
        "#,
    )
    .bind(workspace_id)
    .bind(legacy_actor_type)
    .bind(legacy_actor_id)
    .fetch_one(&mut *conn)
    .await
    .context("ensure_by_actor readback failed")?;

    Ok((map_row(row)?, false))
}

/// Look up a principal by its legacy actor pair. `None` when absent.
pub async fn fetch_by_actor(
    conn: &mut PgConnection,
    workspace_id: &str,
    legacy_actor_type: &str,
    legacy_actor_id: &str,
) -> Result<Option<PrincipalRow>> {
    let row = sqlx::query(
        r#"
        select principal_id, workspace_id, principal_type,
               legacy_actor_type, legacy_actor_id, created_at
        from sec_principals
        where workspace_id = $1 and legacy_actor_type = $2 and legacy_actor_id = $3
        "#,
    )
    .bind(workspace_id)
    .bind(legacy_actor_type)
    .bind(legacy_actor_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_by_actor failed")?;

    row.map(map_row).transpose()
}
