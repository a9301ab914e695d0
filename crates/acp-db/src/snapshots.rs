//! Daily per-agent snapshots.
//!
//! Writes are idempotent on `(workspace_id, agent_id, snapshot_date)`: the
//! second run of a day inserts nothing, so the job can emit its event only
//! for rows that actually landed.

use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone)]
pub struct AgentSnapshotRow {
    pub snapshot_id: i64,
    pub workspace_id: String,
    pub agent_id: String,
    pub snapshot_date: NaiveDate,
    pub trust_score: f64,
    pub autonomy_rate: f64,
    pub learning_events_7d: i64,
    pub constraints_active: i64,
    pub skills_verified: i64,
    pub egress_blocked_7d: i64,
    pub created_at: DateTime<Utc>,
}

fn map_row(row: sqlx::postgres::PgRow) -> Result<AgentSnapshotRow> {
    Ok(AgentSnapshotRow {
        snapshot_id: row.try_get("snapshot_id")?,
        workspace_id: row.try_get("workspace_id")?,
        agent_id: row.try_get("agent_id")?,
        snapshot_date: row.try_get("snapshot_date")?,
        trust_score: row.try_get("trust_score")?,
        autonomy_rate: row.try_get("autonomy_rate")?,
        learning_events_7d: row.try_get("learning_events_7d")?,
        constraints_active: row.try_get("constraints_active")?,
        skills_verified: row.try_get("skills_verified")?,
        egress_blocked_7d: row.try_get("egress_blocked_7d")?,
        created_at: row.try_get("created_at")?,
    })
}

#[derive(Debug, Clone)]
pub struct NewAgentSnapshot {
    pub workspace_id: String,
    pub agent_id: String,
    pub snapshot_date: NaiveDate,
    pub trust_score: f64,
    pub autonomy_rate: f64,
    pub learning_events_7d: i64,
    pub constraints_active: i64,
    pub skills_verified: i64,
    pub egress_blocked_7d: i64,
}

/// Insert one snapshot row; no-op on the daily key. Returns `true` when the
/// row was created.
pub async fn insert_snapshot(conn: &mut PgConnection, snap: &NewAgentSnapshot) -> Result<bool> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        insert into sec_agent_snapshots
            (workspace_id, agent_id, snapshot_date, trust_score, autonomy_rate,
             learning_events_7d, constraints_active, skills_verified, egress_blocked_7d)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        on conflict (workspace_id, agent_id, snapshot_date) do nothing
        returning snapshot_id
        "#,
    )
    .bind(&snap.workspace_id)
    .bind(&snap.agent_id)
    .bind(snap.snapshot_date)
    .bind(snap.trust_score)
    .bind(snap.autonomy_rate)
    .bind(snap.learning_events_7d)
    .bind(snap.constraints_active)
    .bind(snap.skills_verified)
    .bind(snap.egress_blocked_7d)
    .fetch_optional(&mut *conn)
    .await
    .context("insert_snapshot failed")?;

    Ok(row.is_some())
}

/// Snapshot time series for one agent, newest first.
pub async fn list_for_agent(
    pool: &PgPool,
    workspace_id: &str,
    agent_id: &str,
    days: i64,
) -> Result<Vec<AgentSnapshotRow>> {
    let rows = sqlx::query(
        r#"
        select snapshot_id, workspace_id, agent_id, snapshot_date, trust_score,
               autonomy_rate, learning_events_7d, constraints_active,
               skills_verified, egress_blocked_7d, created_at
        from sec_agent_snapshots
        where workspace_id = $1
          and agent_id = $2
          and snapshot_date > (current_date - $3::int)
        order by snapshot_date desc
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .bind(days)
    .fetch_all(pool)
    .await
    .context("snapshot list_for_agent failed")?;
    rows.into_iter().map(map_row).collect()
}
