//! Skill-package inventory store.
//!
//! Import is idempotent on `(agent_id, skill_id, version, hash_sha256)`:
//! re-importing an identical inventory inserts nothing and the summary
//! counts come out identical.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, Row};

#[derive(Debug, Clone)]
pub struct SkillPackageRow {
    pub id: i64,
    pub workspace_id: String,
    pub agent_id: String,
    pub skill_package_id: String,
    pub skill_id: String,
    pub version: String,
    pub hash_sha256: String,
    pub verification_status: String,
    pub verification_reason: Option<String>,
    pub imported_at: DateTime<Utc>,
}

fn map_row(row: sqlx::postgres::PgRow) -> Result<SkillPackageRow> {
    Ok(SkillPackageRow {
        id: row.try_get("id")?,
        workspace_id: row.try_get("workspace_id")?,
        agent_id: row.try_get("agent_id")?,
        skill_package_id: row.try_get("skill_package_id")?,
        skill_id: row.try_get("skill_id")?,
        version: row.try_get("version")?,
        hash_sha256: row.try_get("hash_sha256")?,
        verification_status: row.try_get("verification_status")?,
        verification_reason: row.try_get("verification_reason")?,
        imported_at: row.try_get("imported_at")?,
    })
}

/// Insert one inventory entry; no-op on the idempotency key.
/// Returns `true` when a new row was created.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_package(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
    skill_package_id: &str,
    skill_id: &str,
    version: &str,
    hash_sha256: &str,
    verification_status: &str,
    verification_reason: Option<&str>,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        insert into sec_agent_skill_packages
            (workspace_id, agent_id, skill_package_id, skill_id, version,
             hash_sha256, verification_status, verification_reason)
        values ($1, $2, $3, $4, $5, $6, $7, $8)
        on conflict (agent_id, skill_id, version, hash_sha256) do nothing
        returning id
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .bind(skill_package_id)
    .bind(skill_id)
    .bind(version)
    .bind(hash_sha256)
    .bind(verification_status)
    .bind(verification_reason)
    .fetch_optional(&mut *conn)
    .await
    .context("upsert_package failed")?;

    Ok(row.is_some())
}

pub async fn list_for_agent(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
) -> Result<Vec<SkillPackageRow>> {
    let rows = sqlx::query(
        r#"
        select id, workspace_id, agent_id, skill_package_id, skill_id, version,
               hash_sha256, verification_status, verification_reason, imported_at
        from sec_agent_skill_packages
        where workspace_id = $1 and agent_id = $2
        order by id asc
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .fetch_all(&mut *conn)
    .await
    .context("list_for_agent failed")?;
    rows.into_iter().map(map_row).collect()
}

pub async fn list_pending_for_agent(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
) -> Result<Vec<SkillPackageRow>> {
    let rows = sqlx::query(
        r#"
        select id, workspace_id, agent_id, skill_package_id, skill_id, version,
               hash_sha256, verification_status, verification_reason, imported_at
        from sec_agent_skill_packages
        where workspace_id = $1 and agent_id = $2 and verification_status = 'pending'
        order by id asc
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .fetch_all(&mut *conn)
    .await
    .context("list_pending_for_agent failed")?;
    rows.into_iter().map(map_row).collect()
}

/// Reclassify one inventory row. Returns `true` when the row was updated.
pub async fn set_verification_status(
    conn: &mut PgConnection,
    id: i64,
    verification_status: &str,
    verification_reason: Option<&str>,
) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        update sec_agent_skill_packages
           set verification_status = $2,
               verification_reason = $3
         where id = $1
        returning id
        "#,
    )
    .bind(id)
    .bind(verification_status)
    .bind(verification_reason)
    .fetch_optional(&mut *conn)
    .await
    .context("set_verification_status failed")?;
    Ok(row.is_some())
}

/// Count inventory rows per verification status for one agent.
pub async fn status_counts(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
) -> Result<(i64, i64, i64)> {
    let row = sqlx::query(
        r#"
        select
            count(*) filter (where verification_status = 'verified')    as verified,
            count(*) filter (where verification_status = 'pending')     as pending,
            count(*) filter (where verification_status = 'quarantined') as quarantined
        from sec_agent_skill_packages
        where workspace_id = $1 and agent_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .fetch_one(&mut *conn)
    .await
    .context("status_counts failed")?;

    Ok((
        row.try_get("verified")?,
        row.try_get("pending")?,
        row.try_get("quarantined")?,
    ))
}
