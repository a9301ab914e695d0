//! Run / step / artifact / tool-call projections.
//!
//! Runs move `queued -> running -> (succeeded | failed | cancelled)`. The
//! worker claims queued runs with `FOR UPDATE SKIP LOCKED`, so at most one
//! worker processes a given run; a claim carries a lease that the stale
//! sweep reclaims if the worker dies before completing.

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Queued,
    Running,
    Succeeded,
    Failed,
    Cancelled,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Queued => "queued",
            RunStatus::Running => "running",
            RunStatus::Succeeded => "succeeded",
            RunStatus::Failed => "failed",
            RunStatus::Cancelled => "cancelled",
        }
    }

    pub fn parse(s: &str) -> Result<Self> {
        match s {
            "queued" => Ok(RunStatus::Queued),
            "running" => Ok(RunStatus::Running),
            "succeeded" => Ok(RunStatus::Succeeded),
            "failed" => Ok(RunStatus::Failed),
            "cancelled" => Ok(RunStatus::Cancelled),
            other => Err(anyhow!("invalid run status: {}", other)),
        }
    }
}

#[derive(Debug, Clone)]
pub struct NewRun {
    pub run_id: String,
    pub workspace_id: String,
    pub room_id: Option<String>,
    pub thread_id: Option<String>,
    pub created_by_type: String,
    pub created_by_id: String,
    pub input: Value,
    pub correlation_id: String,
}

#[derive(Debug, Clone)]
pub struct RunRow {
    pub run_id: String,
    pub workspace_id: String,
    pub room_id: Option<String>,
    pub thread_id: Option<String>,
    pub created_by_type: String,
    pub created_by_id: String,
    pub status: RunStatus,
    pub input: Value,
    pub output: Option<Value>,
    pub error_reason_code: Option<String>,
    pub correlation_id: String,
    pub worker_id: Option<String>,
    pub lease_expires_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub last_event_id: Option<String>,
}

fn map_run(row: sqlx::postgres::PgRow) -> Result<RunRow> {
    Ok(RunRow {
        run_id: row.try_get("run_id")?,
        workspace_id: row.try_get("workspace_id")?,
        room_id: row.try_get("room_id")?,
        thread_id: row.try_get("thread_id")?,
        created_by_type: row.try_get("created_by_type")?,
        created_by_id: row.try_get("created_by_id")?,
        status: RunStatus::parse(&row.try_get::<String, _>("status")?)?,
        input: row.try_get("input")?,
        output: row.try_get("output")?,
        error_reason_code: row.try_get("error_reason_code")?,
        correlation_id: row.try_get("correlation_id")?,
        worker_id: row.try_get("worker_id")?,
        lease_expires_at: row.try_get("lease_expires_at")?,
        created_at: row.try_get("created_at")?,
        started_at: row.try_get("started_at")?,
        completed_at: row.try_get("completed_at")?,
        last_event_id: row.try_get("last_event_id")?,
    })
}

const RUN_COLUMNS: &str = "run_id, workspace_id, room_id, thread_id, created_by_type, \
     created_by_id, status, input, output, error_reason_code, correlation_id, \
     worker_id, lease_expires_at, created_at, started_at, completed_at, last_event_id";

pub async fn insert_run(conn: &mut PgConnection, run: &NewRun, last_event_id: &str) -> Result<()> {
    sqlx::query(
        r#"
        insert into proj_runs
            (run_id, workspace_id, room_id, thread_id, created_by_type, created_by_id,
             input, correlation_id, last_event_id)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9)
        "#,
    )
    .bind(&run.run_id)
    .bind(&run.workspace_id)
    .bind(&run.room_id)
    .bind(&run.thread_id)
    .bind(&run.created_by_type)
    .bind(&run.created_by_id)
    .bind(&run.input)
    .bind(&run.correlation_id)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("insert_run failed")?;
    Ok(())
}

pub async fn fetch_run(
    conn: &mut PgConnection,
    workspace_id: &str,
    run_id: &str,
) -> Result<Option<RunRow>> {
    let sql = format!("select {RUN_COLUMNS} from proj_runs where workspace_id = $1 and run_id = $2");
    let row = sqlx::query(&sql)
        .bind(workspace_id)
        .bind(run_id)
        .fetch_optional(&mut *conn)
        .await
        .context("fetch_run failed")?;
    row.map(map_run).transpose()
}

/// `queued -> running` for an API-driven start. Returns `false` when the run
/// was not in `queued` (idempotent repeat or invalid transition; the caller
/// distinguishes by re-reading the row).
pub async fn start_run(
    conn: &mut PgConnection,
    workspace_id: &str,
    run_id: &str,
    last_event_id: &str,
) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        update proj_runs
           set status        = 'running',
               started_at    = now(),
               last_event_id = $3
         where workspace_id = $1
           and run_id = $2
           and status = 'queued'
        returning run_id
        "#,
    )
    .bind(workspace_id)
    .bind(run_id)
    .bind(last_event_id)
    .fetch_optional(&mut *conn)
    .await
    .context("start_run failed")?;
    Ok(row.is_some())
}

/// Terminal transition `running -> succeeded | failed`. Only a `running` row
/// moves; repeats return `false` and mutate nothing, which is what makes
/// completion (and its event emission) idempotent.
pub async fn complete_run(
    conn: &mut PgConnection,
    workspace_id: &str,
    run_id: &str,
    status: RunStatus,
    output: Option<&Value>,
    error_reason_code: Option<&str>,
    last_event_id: &str,
) -> Result<bool> {
    match status {
        RunStatus::Succeeded | RunStatus::Failed => {}
        other => return Err(anyhow!("complete_run invalid target: {}", other.as_str())),
    }

    let row: Option<(String,)> = sqlx::query_as(
        r#"
        update proj_runs
           set status            = $3,
               output            = $4,
               error_reason_code = $5,
               completed_at      = now(),
               worker_id         = null,
               lease_expires_at  = null,
               last_event_id     = $6
         where workspace_id = $1
           and run_id = $2
           and status = 'running'
        returning run_id
        "#,
    )
    .bind(workspace_id)
    .bind(run_id)
    .bind(status.as_str())
    .bind(output)
    .bind(error_reason_code)
    .bind(last_event_id)
    .fetch_optional(&mut *conn)
    .await
    .context("complete_run failed")?;
    Ok(row.is_some())
}

/// `queued | running -> cancelled`. Returns `false` when already terminal.
pub async fn cancel_run(
    conn: &mut PgConnection,
    workspace_id: &str,
    run_id: &str,
    last_event_id: &str,
) -> Result<bool> {
    let row: Option<(String,)> = sqlx::query_as(
        r#"
        update proj_runs
           set status           = 'cancelled',
               completed_at     = now(),
               worker_id        = null,
               lease_expires_at = null,
               last_event_id    = $3
         where workspace_id = $1
           and run_id = $2
           and status in ('queued', 'running')
        returning run_id
        "#,
    )
    .bind(workspace_id)
    .bind(run_id)
    .bind(last_event_id)
    .fetch_optional(&mut *conn)
    .await
    .context("cancel_run failed")?;
    Ok(row.is_some())
}

/// Atomically claim one queued run for exclusive execution.
///
/// Uses `FOR UPDATE SKIP LOCKED` so concurrent workers never claim the same
/// row. The claimed run is `running` with a lease of `lease_ttl_secs`; the
/// worker must complete it or the stale sweep reclaims it after the TTL.
pub async fn claim_one_queued(
    conn: &mut PgConnection,
    worker_id: &str,
    lease_ttl_secs: i64,
) -> Result<Option<RunRow>> {
    let sql = format!(
        r#"
        with to_claim as (
            select run_id
            from proj_runs
            where status = 'queued'
            order by created_at asc
            limit 1
            for update skip locked
        )
        update proj_runs
           set status           = 'running',
               started_at       = now(),
               worker_id        = $1,
               lease_expires_at = now() + make_interval(secs => $2)
         where run_id in (select run_id from to_claim)
        returning {RUN_COLUMNS}
        "#
    );
    let row = sqlx::query(&sql)
        .bind(worker_id)
        .bind(lease_ttl_secs as f64)
        .fetch_optional(&mut *conn)
        .await
        .context("claim_one_queued failed")?;
    row.map(map_run).transpose()
}

/// Point a run's `last_event_id` at the event that just mutated it.
pub async fn touch_last_event(
    conn: &mut PgConnection,
    run_id: &str,
    last_event_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        update proj_runs
           set last_event_id = $2
         where run_id = $1
        "#,
    )
    .bind(run_id)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("touch_last_event failed")?;
    Ok(())
}

/// Flip expired `running` leases back to `queued` so another worker can pick
/// them up. Returns the reclaimed run ids.
pub async fn reclaim_stale_leases(conn: &mut PgConnection) -> Result<Vec<String>> {
    let rows: Vec<(String,)> = sqlx::query_as(
        r#"
        update proj_runs
           set status           = 'queued',
               worker_id        = null,
               lease_expires_at = null,
               started_at       = null
         where status = 'running'
           and lease_expires_at is not null
           and lease_expires_at < now()
        returning run_id
        "#,
    )
    .fetch_all(&mut *conn)
    .await
    .context("reclaim_stale_leases failed")?;
    Ok(rows.into_iter().map(|(id,)| id).collect())
}

// ---------------------------------------------------------------------------
// Steps
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct StepRow {
    pub step_id: String,
    pub workspace_id: String,
    pub run_id: String,
    pub name: String,
    pub input: Value,
    pub created_at: DateTime<Utc>,
    pub last_event_id: Option<String>,
}

fn map_step(row: sqlx::postgres::PgRow) -> Result<StepRow> {
    Ok(StepRow {
        step_id: row.try_get("step_id")?,
        workspace_id: row.try_get("workspace_id")?,
        run_id: row.try_get("run_id")?,
        name: row.try_get("name")?,
        input: row.try_get("input")?,
        created_at: row.try_get("created_at")?,
        last_event_id: row.try_get("last_event_id")?,
    })
}

pub async fn insert_step(
    conn: &mut PgConnection,
    workspace_id: &str,
    step_id: &str,
    run_id: &str,
    name: &str,
    input: &Value,
    last_event_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into proj_steps (step_id, workspace_id, run_id, name, input, last_event_id)
        values ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(step_id)
    .bind(workspace_id)
    .bind(run_id)
    .bind(name)
    .bind(input)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("insert_step failed")?;
    Ok(())
}

pub async fn fetch_step(
    conn: &mut PgConnection,
    workspace_id: &str,
    step_id: &str,
) -> Result<Option<StepRow>> {
    let row = sqlx::query(
        r#"
        select step_id, workspace_id, run_id, name, input, created_at, last_event_id
        from proj_steps
        where workspace_id = $1 and step_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(step_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_step failed")?;
    row.map(map_step).transpose()
}

// ---------------------------------------------------------------------------
// Artifacts
// ---------------------------------------------------------------------------

#[derive(Debug, Clone)]
pub struct ArtifactRow {
    pub artifact_id: String,
    pub workspace_id: String,
    pub run_id: String,
    pub step_id: String,
    pub kind: String,
    pub content: Value,
    pub created_at: DateTime<Utc>,
    pub last_event_id: Option<String>,
}

fn map_artifact(row: sqlx::postgres::PgRow) -> Result<ArtifactRow> {
    Ok(ArtifactRow {
        artifact_id: row.try_get("artifact_id")?,
        workspace_id: row.try_get("workspace_id")?,
        run_id: row.try_get("run_id")?,
        step_id: row.try_get("step_id")?,
        kind: row.try_get("kind")?,
        content: row.try_get("content")?,
        created_at: row.try_get("created_at")?,
        last_event_id: row.try_get("last_event_id")?,
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_artifact(
    conn: &mut PgConnection,
    workspace_id: &str,
    artifact_id: &str,
    run_id: &str,
    step_id: &str,
    kind: &str,
    content: &Value,
    last_event_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into proj_artifacts
            (artifact_id, workspace_id, run_id, step_id, kind, content, last_event_id)
        values ($1, $2, $3, $4, $5, $6, $7)
        "#,
    )
    .bind(artifact_id)
    .bind(workspace_id)
    .bind(run_id)
    .bind(step_id)
    .bind(kind)
    .bind(content)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("insert_artifact failed")?;
    Ok(())
}

pub async fn fetch_artifact(
    pool: &PgPool,
    workspace_id: &str,
    artifact_id: &str,
) -> Result<Option<ArtifactRow>> {
    let row = sqlx::query(
        r#"
        select artifact_id, workspace_id, run_id, step_id, kind, content,
               created_at, last_event_id
        from proj_artifacts
        where workspace_id = $1 and artifact_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(artifact_id)
    .fetch_optional(pool)
    .await
    .context("fetch_artifact failed")?;
    row.map(map_artifact).transpose()
}

/// List artifacts for a workspace, optionally narrowed to one run.
pub async fn list_artifacts(
    pool: &PgPool,
    workspace_id: &str,
    run_id: Option<&str>,
) -> Result<Vec<ArtifactRow>> {
    let rows = sqlx::query(
        r#"
        select artifact_id, workspace_id, run_id, step_id, kind, content,
               created_at, last_event_id
        from proj_artifacts
        where workspace_id = $1
          and ($2::text is null or run_id = $2)
        order by created_at asc
        "#,
    )
    .bind(workspace_id)
    .bind(run_id)
    .fetch_all(pool)
    .await
    .context("list_artifacts failed")?;
    rows.into_iter().map(map_artifact).collect()
}

// ---------------------------------------------------------------------------
// Tool calls
// ---------------------------------------------------------------------------

/// Insert a `running` tool-call row; returns its id.
pub async fn insert_tool_call(
    conn: &mut PgConnection,
    workspace_id: &str,
    run_id: &str,
    tool_name: &str,
    input: &Value,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        insert into proj_tool_calls (workspace_id, run_id, tool_name, input)
        values ($1, $2, $3, $4)
        returning tool_call_id
        "#,
    )
    .bind(workspace_id)
    .bind(run_id)
    .bind(tool_name)
    .bind(input)
    .fetch_one(&mut *conn)
    .await
    .context("insert_tool_call failed")?;
    Ok(id)
}

/// `running -> succeeded | failed` for one tool call.
pub async fn complete_tool_call(
    conn: &mut PgConnection,
    tool_call_id: i64,
    status: &str,
    output: Option<&Value>,
    error_reason_code: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        update proj_tool_calls
           set status            = $2,
               output            = $3,
               error_reason_code = $4,
               completed_at      = now()
         where tool_call_id = $1
           and status = 'running'
        "#,
    )
    .bind(tool_call_id)
    .bind(status)
    .bind(output)
    .bind(error_reason_code)
    .execute(&mut *conn)
    .await
    .context("complete_tool_call failed")?;
    Ok(())
}
