//! Learned constraints and mistake counters.
//!
//! Constraint upsert is keyed `(workspace_id, reason_code, pattern)`; the
//! pattern column must only ever receive redacted material; the learning
//! pipeline is the sole writer and redacts before deriving the pattern.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone)]
pub struct ConstraintRow {
    pub constraint_id: String,
    pub workspace_id: String,
    pub reason_code: String,
    pub category: String,
    pub pattern: String,
    pub guidance: String,
    pub seen_count: i64,
    pub first_seen_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

fn map_constraint(row: sqlx::postgres::PgRow) -> Result<ConstraintRow> {
    Ok(ConstraintRow {
        constraint_id: row.try_get("constraint_id")?,
        workspace_id: row.try_get("workspace_id")?,
        reason_code: row.try_get("reason_code")?,
        category: row.try_get("category")?,
        pattern: row.try_get("pattern")?,
        guidance: row.try_get("guidance")?,
        seen_count: row.try_get("seen_count")?,
        first_seen_at: row.try_get("first_seen_at")?,
        updated_at: row.try_get("updated_at")?,
    })
}

/// Insert with `seen_count = 1` or bump the existing row. `candidate_id` is
/// used only when the insert wins. Returns the stored row.
#[allow(clippy::too_many_arguments)]
pub async fn upsert_constraint(
    conn: &mut PgConnection,
    workspace_id: &str,
    candidate_id: &str,
    reason_code: &str,
    category: &str,
    pattern: &str,
    guidance: &str,
) -> Result<ConstraintRow> {
    let row = sqlx::query(
        r#"
        insert into sec_constraints
            (constraint_id, workspace_id, reason_code, category, pattern, guidance)
        values ($1, $2, $3, $4, $5, $6)
        on conflict (workspace_id, reason_code, pattern) do update
            set seen_count = sec_constraints.seen_count + 1,
                updated_at = now()
        returning constraint_id, workspace_id, reason_code, category, pattern,
                  guidance, seen_count, first_seen_at, updated_at
        "#,
    )
    .bind(candidate_id)
    .bind(workspace_id)
    .bind(reason_code)
    .bind(category)
    .bind(pattern)
    .bind(guidance)
    .fetch_one(&mut *conn)
    .await
    .context("upsert_constraint failed")?;

    map_constraint(row)
}

pub async fn list_constraints(pool: &PgPool, workspace_id: &str) -> Result<Vec<ConstraintRow>> {
    let rows = sqlx::query(
        r#"
        select constraint_id, workspace_id, reason_code, category, pattern,
               guidance, seen_count, first_seen_at, updated_at
        from sec_constraints
        where workspace_id = $1
        order by updated_at desc
        "#,
    )
    .bind(workspace_id)
    .fetch_all(pool)
    .await
    .context("list_constraints failed")?;
    rows.into_iter().map(map_constraint).collect()
}

/// Bump the `(workspace, reason_code, actor_key)` tally and return the new
/// `seen_count`.
pub async fn bump_mistake_counter(
    conn: &mut PgConnection,
    workspace_id: &str,
    reason_code: &str,
    actor_key: &str,
) -> Result<i64> {
    let (seen_count,): (i64,) = sqlx::query_as(
        r#"
        insert into sec_mistake_counters (workspace_id, reason_code, actor_key)
        values ($1, $2, $3)
        on conflict (workspace_id, reason_code, actor_key) do update
            set seen_count   = sec_mistake_counters.seen_count + 1,
                last_seen_at = now()
        returning seen_count
        "#,
    )
    .bind(workspace_id)
    .bind(reason_code)
    .bind(actor_key)
    .fetch_one(&mut *conn)
    .await
    .context("bump_mistake_counter failed")?;
    Ok(seen_count)
}

/// Sum of recent mistake activity for one actor (trailing-window metric
/// input for daily snapshots).
pub async fn recent_mistakes_for_actor(
    conn: &mut PgConnection,
    workspace_id: &str,
    actor_key: &str,
    days: i64,
) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select coalesce(sum(seen_count), 0)::bigint
        from sec_mistake_counters
        where workspace_id = $1
          and actor_key = $2
          and last_seen_at > now() - make_interval(days => $3::int)
        "#,
    )
    .bind(workspace_id)
    .bind(actor_key)
    .bind(days)
    .fetch_one(&mut *conn)
    .await
    .context("recent_mistakes_for_actor failed")?;
    Ok(n)
}

/// Count of constraints touched in the trailing window.
pub async fn active_constraint_count(
    conn: &mut PgConnection,
    workspace_id: &str,
    days: i64,
) -> Result<i64> {
    let (n,): (i64,) = sqlx::query_as(
        r#"
        select count(*)::bigint
        from sec_constraints
        where workspace_id = $1
          and updated_at > now() - make_interval(days => $2::int)
        "#,
    )
    .bind(workspace_id)
    .bind(days)
    .fetch_one(&mut *conn)
    .await
    .context("active_constraint_count failed")?;
    Ok(n)
}
