//! Daily per-agent snapshot job.
//!
//! For `(workspace, date)`: enumerate agents, compute trailing-7-day
//! metrics, insert one row per agent, and emit one `daily.agent.snapshot`
//! per row that actually landed. Idempotent per (workspace, agent, date):
//! a second invocation writes zero rows and emits nothing.

use anyhow::Result;
use chrono::NaiveDate;
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

use acp_db::{agents, egress, learning, skills, snapshots};
use acp_events::{Broker, EventContext, UnitOfWork};

const TRAILING_DAYS: i64 = 7;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct SnapshotResult {
    pub agents: i64,
    pub written_rows: i64,
}

/// Run the snapshot job for one workspace and date.
pub async fn run_daily_snapshot(
    pool: &PgPool,
    broker: &Broker,
    workspace_id: &str,
    date: NaiveDate,
) -> Result<SnapshotResult> {
    let agent_rows = agents::list_agents(pool, workspace_id).await?;

    let mut uow = UnitOfWork::begin(pool, EventContext::new(workspace_id)).await?;
    let mut result = SnapshotResult {
        agents: agent_rows.len() as i64,
        ..Default::default()
    };

    for agent in &agent_rows {
        let metrics = compute_metrics(&mut uow, workspace_id, agent).await?;

        let inserted = snapshots::insert_snapshot(
            uow.conn(),
            &snapshots::NewAgentSnapshot {
                workspace_id: workspace_id.to_string(),
                agent_id: agent.agent_id.clone(),
                snapshot_date: date,
                trust_score: metrics.trust_score,
                autonomy_rate: metrics.autonomy_rate,
                learning_events_7d: metrics.learning_events_7d,
                constraints_active: metrics.constraints_active,
                skills_verified: metrics.skills_verified,
                egress_blocked_7d: metrics.egress_blocked_7d,
            },
        )
        .await?;

        if inserted {
            result.written_rows += 1;
            uow.append(
                "daily.agent.snapshot",
                json!({
                    "agent_id": agent.agent_id,
                    "snapshot_date": date.to_string(),
                    "trust_score": metrics.trust_score,
                    "autonomy_rate": metrics.autonomy_rate,
                    "learning_events_7d": metrics.learning_events_7d,
                    "constraints_active": metrics.constraints_active,
                    "skills_verified": metrics.skills_verified,
                    "egress_blocked_7d": metrics.egress_blocked_7d,
                }),
            )
            .await?;
        }
    }

    uow.commit(broker).await?;
    info!(
        %workspace_id,
        agents = result.agents,
        written_rows = result.written_rows,
        "daily snapshot pass"
    );
    Ok(result)
}

struct Metrics {
    trust_score: f64,
    autonomy_rate: f64,
    learning_events_7d: i64,
    constraints_active: i64,
    skills_verified: i64,
    egress_blocked_7d: i64,
}

async fn compute_metrics(
    uow: &mut UnitOfWork,
    workspace_id: &str,
    agent: &agents::AgentRow,
) -> Result<Metrics> {
    // Mistakes are tallied under the principal when the caller knew it and
    // under the legacy agent pair otherwise; sum both keys.
    let legacy_key = format!("agent:{}", agent.agent_id);
    let mistakes = learning::recent_mistakes_for_actor(
        uow.conn(),
        workspace_id,
        &agent.principal_id,
        TRAILING_DAYS,
    )
    .await?
        + learning::recent_mistakes_for_actor(uow.conn(), workspace_id, &legacy_key, TRAILING_DAYS)
            .await?;

    let constraints_active =
        learning::active_constraint_count(uow.conn(), workspace_id, TRAILING_DAYS).await?;

    let (skills_verified, _pending, _quarantined) =
        skills::status_counts(uow.conn(), workspace_id, &agent.agent_id).await?;

    let (blocked, total) = egress::blocked_totals_for_agent(
        uow.conn(),
        workspace_id,
        &agent.agent_id,
        TRAILING_DAYS,
    )
    .await?;

    let autonomy_rate = if total > 0 {
        1.0 - blocked as f64 / total as f64
    } else {
        1.0
    };

    // Trust starts at 1.0, loses 0.05 per recent mistake (capped at 0.5),
    // and loses another 0.5 while quarantined.
    let mistake_penalty = (mistakes as f64 * 0.05).min(0.5);
    let quarantine_penalty = if agent.is_quarantined() { 0.5 } else { 0.0 };
    let trust_score = (1.0 - mistake_penalty - quarantine_penalty).max(0.0);

    Ok(Metrics {
        trust_score,
        autonomy_rate,
        learning_events_7d: mistakes,
        constraints_active,
        skills_verified,
        egress_blocked_7d: blocked,
    })
}
