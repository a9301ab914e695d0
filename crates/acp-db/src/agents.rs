//! Agent store. An agent owns exactly one principal of type `agent`;
//! quarantine is a marker pair (`quarantined_at`, `quarantine_reason`).

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone)]
pub struct AgentRow {
    pub agent_id: String,
    pub workspace_id: String,
    pub principal_id: String,
    pub display_name: String,
    pub quarantined_at: Option<DateTime<Utc>>,
    pub quarantine_reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub last_event_id: Option<String>,
}

impl AgentRow {
    pub fn is_quarantined(&self) -> bool {
        self.quarantined_at.is_some()
    }
}

fn map_row(row: sqlx::postgres::PgRow) -> Result<AgentRow> {
    Ok(AgentRow {
        agent_id: row.try_get("agent_id")?,
        workspace_id: row.try_get("workspace_id")?,
        principal_id: row.try_get("principal_id")?,
        display_name: row.try_get("display_name")?,
        quarantined_at: row.try_get("quarantined_at")?,
        quarantine_reason: row.try_get("quarantine_reason")?,
        created_at: row.try_get("created_at")?,
        last_event_id: row.try_get("last_event_id")?,
    })
}

pub async fn insert_agent(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
    principal_id: &str,
    display_name: &str,
    last_event_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into sec_agents
            (agent_id, workspace_id, principal_id, display_name, last_event_id)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(agent_id)
    .bind(workspace_id)
    .bind(principal_id)
    .bind(display_name)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("insert_agent failed")?;
    Ok(())
}

pub async fn fetch_agent(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
) -> Result<Option<AgentRow>> {
    let row = sqlx::query(
        r#"
        select agent_id, workspace_id, principal_id, display_name,
               quarantined_at, quarantine_reason, created_at, last_event_id
        from sec_agents
        where workspace_id = $1 and agent_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_agent failed")?;
    row.map(map_row).transpose()
}

/// Resolve the agent owning `principal_id`, if any.
pub async fn fetch_agent_by_principal(
    conn: &mut PgConnection,
    workspace_id: &str,
    principal_id: &str,
) -> Result<Option<AgentRow>> {
    let row = sqlx::query(
        r#"
        select agent_id, workspace_id, principal_id, display_name,
               quarantined_at, quarantine_reason, created_at, last_event_id
        from sec_agents
        where workspace_id = $1 and principal_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(principal_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_agent_by_principal failed")?;
    row.map(map_row).transpose()
}

pub async fn list_agents(pool: &PgPool, workspace_id: &str) -> Result<Vec<AgentRow>> {
    let rows = sqlx::query(
        r#"
        select agent_id, workspace_id, principal_id, display_name,
               quarantined_at, quarantine_reason, created_at, last_event_id
        from sec_agents
        where workspace_id = $1
        order by created_at asc
        "#,
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await
    .context("list_agents failed")?;
    rows.into_iter().map(map_row).collect()
}

/// Workspaces that have at least one agent (snapshot-job enumeration).
pub async fn list_workspace_ids(pool: &PgPool) -> Result<Vec<String>> {
    let rows: Vec<(String,)> =
        sqlx::query_as("select distinct workspace_id from sec_agents order by workspace_id")
            .fetch_all(pool)
            .await
            .context("list_workspace_ids failed")?;
    Ok(rows.into_iter().map(|(ws,)| ws).collect())
}

/// Set the quarantine marker.
///
/// Returns `true` if the row transitioned from not-quarantined to
/// quarantined; `false` when the agent was already quarantined (the marker
/// is left untouched so the original trigger is preserved).
pub async fn quarantine_agent(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
    reason: &str,
    last_event_id: &str,
) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        update sec_agents
           set quarantined_at    = now(),
               quarantine_reason = $3,
               last_event_id     = $4
         where workspace_id = $1
           and agent_id = $2
           and quarantined_at is null
        returning agent_id
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .bind(reason)
    .bind(last_event_id)
    .fetch_optional(&mut *conn)
    .await
    .context("quarantine_agent failed")?;

    Ok(row.is_some())
}

/// Clear the quarantine marker. Returns `true` if a quarantined row was
/// lifted; `false` when the agent was not quarantined.
pub async fn lift_quarantine(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
    last_event_id: &str,
) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        update sec_agents
           set quarantined_at    = null,
               quarantine_reason = null,
               last_event_id     = $3
         where workspace_id = $1
           and agent_id = $2
           and quarantined_at is not null
        returning agent_id
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .bind(last_event_id)
    .fetch_optional(&mut *conn)
    .await
    .context("lift_quarantine failed")?;

    Ok(row.is_some())
}
