//! Scorecards, autonomy recommendations, and lessons.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone)]
pub struct ScorecardRow {
    pub scorecard_id: String,
    pub workspace_id: String,
    pub agent_id: String,
    pub template: String,
    pub scores: Value,
    pub overall: f64,
    pub evidence_run_id: Option<String>,
    pub notes: Option<String>,
    pub created_at: DateTime<Utc>,
}

fn map_scorecard(row: sqlx::postgres::PgRow) -> Result<ScorecardRow> {
    Ok(ScorecardRow {
        scorecard_id: row.try_get("scorecard_id")?,
        workspace_id: row.try_get("workspace_id")?,
        agent_id: row.try_get("agent_id")?,
        template: row.try_get("template")?,
        scores: row.try_get("scores")?,
        overall: row.try_get("overall")?,
        evidence_run_id: row.try_get("evidence_run_id")?,
        notes: row.try_get("notes")?,
        created_at: row.try_get("created_at")?,
    })
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_scorecard(
    conn: &mut PgConnection,
    workspace_id: &str,
    scorecard_id: &str,
    agent_id: &str,
    template: &str,
    scores: &Value,
    overall: f64,
    evidence_run_id: Option<&str>,
    notes: Option<&str>,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into sec_scorecards
            (scorecard_id, workspace_id, agent_id, template, scores, overall,
             evidence_run_id, notes)
        values ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(scorecard_id)
    .bind(workspace_id)
    .bind(agent_id)
    .bind(template)
    .bind(scores)
    .bind(overall)
    .bind(evidence_run_id)
    .bind(notes)
    .execute(&mut *conn)
    .await
    .context("insert_scorecard failed")?;
    Ok(())
}

pub async fn fetch_scorecard(
    pool: &PgPool,
    workspace_id: &str,
    scorecard_id: &str,
) -> Result<Option<ScorecardRow>> {
    let row = sqlx::query(
        r#"
        select scorecard_id, workspace_id, agent_id, template, scores, overall,
               evidence_run_id, notes, created_at
        from sec_scorecards
        where workspace_id = $1 and scorecard_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(scorecard_id)
    .fetch_optional(pool)
    .await
    .context("fetch_scorecard failed")?;
    row.map(map_scorecard).transpose()
}

/// Most recent overall scores for one agent, newest first.
pub async fn recent_overall_scores(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
    limit: i64,
) -> Result<Vec<f64>> {
    let rows: Vec<(f64,)> = sqlx::query_as(
        r#"
        select overall
        from sec_scorecards
        where workspace_id = $1 and agent_id = $2
        order by created_at desc
        limit $3
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .bind(limit)
    .fetch_all(&mut *conn)
    .await
    .context("recent_overall_scores failed")?;
    Ok(rows.into_iter().map(|(v,)| v).collect())
}

/// Upsert the single recommendation row per (workspace, agent).
pub async fn upsert_recommendation(
    conn: &mut PgConnection,
    workspace_id: &str,
    agent_id: &str,
    recommendation: &str,
    mean_score: f64,
    sample_count: i64,
    reasons: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into sec_autonomy_recommendations
            (workspace_id, agent_id, recommendation, mean_score, sample_count, reasons)
        values ($1, $2, $3, $4, $5, $6)
        on conflict (workspace_id, agent_id) do update
            set recommendation = excluded.recommendation,
                mean_score     = excluded.mean_score,
                sample_count   = excluded.sample_count,
                reasons        = excluded.reasons,
                updated_at     = now()
        "#,
    )
    .bind(workspace_id)
    .bind(agent_id)
    .bind(recommendation)
    .bind(mean_score)
    .bind(sample_count)
    .bind(reasons)
    .execute(&mut *conn)
    .await
    .context("upsert_recommendation failed")?;
    Ok(())
}

pub async fn insert_lesson(
    conn: &mut PgConnection,
    workspace_id: &str,
    lesson_id: &str,
    title: &str,
    body: Option<&str>,
    context: &Value,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into sec_lessons (lesson_id, workspace_id, title, body, context)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(lesson_id)
    .bind(workspace_id)
    .bind(title)
    .bind(body)
    .bind(context)
    .execute(&mut *conn)
    .await
    .context("insert_lesson failed")?;
    Ok(())
}
