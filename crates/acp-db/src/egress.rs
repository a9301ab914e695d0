//! Egress request ledger and fixed-bucket rate counters.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone)]
pub struct EgressRequestRow {
    pub egress_id: i64,
    pub workspace_id: String,
    pub run_id: Option<String>,
    pub target_url: String,
    pub target_domain: String,
    pub method: String,
    pub policy_decision: String,
    pub blocked: bool,
    pub approval_id: Option<String>,
    pub policy_reason_code: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn map_row(row: sqlx::postgres::PgRow) -> Result<EgressRequestRow> {
    Ok(EgressRequestRow {
        egress_id: row.try_get("egress_id")?,
        workspace_id: row.try_get("workspace_id")?,
        run_id: row.try_get("run_id")?,
        target_url: row.try_get("target_url")?,
        target_domain: row.try_get("target_domain")?,
        method: row.try_get("method")?,
        policy_decision: row.try_get("policy_decision")?,
        blocked: row.try_get("blocked")?,
        approval_id: row.try_get("approval_id")?,
        policy_reason_code: row.try_get("policy_reason_code")?,
        created_at: row.try_get("created_at")?,
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_request(
    conn: &mut PgConnection,
    workspace_id: &str,
    run_id: Option<&str>,
    target_url: &str,
    target_domain: &str,
    method: &str,
    policy_decision: &str,
    blocked: bool,
    approval_id: Option<&str>,
    policy_reason_code: Option<&str>,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into sec_egress_requests
            (workspace_id, run_id, target_url, target_domain, method,
             policy_decision, blocked, approval_id, policy_reason_code)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        returning egress_id
        "#,
    )
    .bind(workspace_id)
    .bind(run_id)
    .bind(target_url)
    .bind(target_domain)
    .bind(method)
    .bind(policy_decision)
    .bind(blocked)
    .bind(approval_id)
    .bind(policy_reason_code)
    .fetch_one(&mut *conn)
    .await
    .context("insert egress request failed")?;
    Ok(id)
}

pub async fn list_for_run(
    pool: &PgPool,
    workspace_id: &str,
    run_id: &str,
) -> Result<Vec<EgressRequestRow>> {
    let rows = sqlx::query(
        r#"
        select egress_id, workspace_id, run_id, target_url, target_domain, method,
               policy_decision, blocked, approval_id, policy_reason_code, created_at
        from sec_egress_requests
        where workspace_id = $1 and run_id = $2
        order by egress_id asc
        "#,
    )
    .bind(workspace_id)
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("list_for_run failed")?;
    rows.into_iter().map(map_row).collect()
}

/// Bump the current 1-hour bucket for `(workspace, target_domain)` and
/// return the post-increment count. The bucket key is `date_trunc('hour',
/// now())`, so the window is fixed, not sliding.
pub async fn bump_rate_counter(
    conn: &mut PgConnection,
    workspace_id: &str,
    target_domain: &str,
) -> Result<i64> {
    let (count,): (i64,) = sqlx::query_as(
        r#"
        insert into sec_egress_rate_counters
            (workspace_id, target_domain, bucket_start, request_count)
        values ($1, $2, date_trunc('hour', now()), 1)
        on conflict (workspace_id, target_domain, bucket_start) do update
            set request_count = sec_egress_rate_counters.request_count + 1
        returning request_count
        "#,
    )
    .bind(workspace_id)
    .bind(target_domain)
    .fetch_one(&mut *conn)
    .await
    .context("bump_rate_counter failed")?;
    Ok(count)
}

/// Trailing-window block/total counts for the runs of one agent (snapshot
/// metric input). Egress rows join to agents through the run that issued
/// them.
pub async fn blocked_totals_for_agent(
    conn: &mut PgConnection,
    workspace_id: &str,
    created_by_id: &str,
    days: i64,
) -> Result<(i64, i64)> {
    let row = sqlx::query(
        r#"
        select
            count(*) filter (where e.blocked) as blocked,
            count(*)                          as total
        from sec_egress_requests e
        join proj_runs r on r.run_id = e.run_id
        where e.workspace_id = $1
          and r.created_by_id = $2
          and e.created_at > now() - make_interval(days => $3::int)
        "#,
    )
    .bind(workspace_id)
    .bind(created_by_id)
    .bind(days)
    .fetch_one(&mut *conn)
    .await
    .context("blocked_totals_for_agent failed")?;

    Ok((row.try_get("blocked")?, row.try_get("total")?))
}
