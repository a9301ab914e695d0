//! Event log append path and cursor reads.

use anyhow::{Context, Result};
use chrono::Utc;
use serde_json::Value;
use sqlx::{PgConnection, PgPool, Row};

use crate::ids;
use crate::types::{EventContext, EventRecord};

/// Append one event inside the caller's transaction.
///
/// Sequence allocation upserts the `evt_stream_heads` row, which takes the
/// row lock: concurrent writers to the same stream serialize here, and an
/// aborted transaction rolls the head back, so committed `stream_seq`
/// values form `1..N` with no gaps or duplicates.
pub async fn append_event(
    conn: &mut PgConnection,
    ctx: &mut EventContext,
    event_type: &str,
    data: Value,
) -> Result<EventRecord> {
    let (stream_type, stream_id) = ctx.stream();

    let (stream_seq,): (i64,) = sqlx::query_as(
        r#"
        insert into evt_stream_heads (stream_type, stream_id, last_seq)
        values ($1, $2, 1)
        on conflict (stream_type, stream_id) do update
            set last_seq = evt_stream_heads.last_seq + 1
        returning last_seq
        "#,
    )
    .bind(stream_type)
    .bind(&stream_id)
    .fetch_one(&mut *conn)
    .await
    .context("stream head allocation failed")?;

    let record = EventRecord {
        event_id: ids::mint(ids::EVENT),
        stream_type: stream_type.to_string(),
        stream_id,
        stream_seq,
        event_type: event_type.to_string(),
        workspace_id: ctx.workspace_id.clone(),
        room_id: ctx.room_id.clone(),
        thread_id: ctx.thread_id.clone(),
        run_id: ctx.run_id.clone(),
        step_id: ctx.step_id.clone(),
        correlation_id: ctx.correlation_or_mint(),
        causation_id: ctx.next_causation(),
        occurred_at: Utc::now(),
        recorded_at: Utc::now(),
        data,
    };

    sqlx::query(
        r#"
        insert into evt_events
            (event_id, stream_type, stream_id, stream_seq, event_type,
             workspace_id, room_id, thread_id, run_id, step_id,
             correlation_id, causation_id, occurred_at, data)
        values ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14)
        "#,
    )
    .bind(&record.event_id)
    .bind(&record.stream_type)
    .bind(&record.stream_id)
    .bind(record.stream_seq)
    .bind(&record.event_type)
    .bind(&record.workspace_id)
    .bind(&record.room_id)
    .bind(&record.thread_id)
    .bind(&record.run_id)
    .bind(&record.step_id)
    .bind(&record.correlation_id)
    .bind(&record.causation_id)
    .bind(record.occurred_at)
    .bind(&record.data)
    .execute(&mut *conn)
    .await
    .context("insert event failed")?;

    ctx.last_event_id = Some(record.event_id.clone());
    Ok(record)
}

fn map_event(row: sqlx::postgres::PgRow) -> Result<EventRecord> {
    Ok(EventRecord {
        event_id: row.try_get("event_id")?,
        stream_type: row.try_get("stream_type")?,
        stream_id: row.try_get("stream_id")?,
        stream_seq: row.try_get("stream_seq")?,
        event_type: row.try_get("event_type")?,
        workspace_id: row.try_get("workspace_id")?,
        room_id: row.try_get("room_id")?,
        thread_id: row.try_get("thread_id")?,
        run_id: row.try_get("run_id")?,
        step_id: row.try_get("step_id")?,
        correlation_id: row.try_get("correlation_id")?,
        causation_id: row.try_get("causation_id")?,
        occurred_at: row.try_get("occurred_at")?,
        recorded_at: row.try_get("recorded_at")?,
        data: row.try_get("data")?,
    })
}

/// Committed events on one stream with `stream_seq > from_seq`, ascending.
/// This is the replay half of the replay-then-live handoff.
pub async fn fetch_stream_after(
    pool: &PgPool,
    stream_type: &str,
    stream_id: &str,
    from_seq: i64,
) -> Result<Vec<EventRecord>> {
    let rows = sqlx::query(
        r#"
        select event_id, stream_type, stream_id, stream_seq, event_type,
               workspace_id, room_id, thread_id, run_id, step_id,
               correlation_id, causation_id, occurred_at, recorded_at, data
        from evt_events
        where stream_type = $1 and stream_id = $2 and stream_seq > $3
        order by stream_seq asc
        "#,
    )
    .bind(stream_type)
    .bind(stream_id)
    .bind(from_seq)
    .fetch_all(pool)
    .await
    .context("fetch_stream_after failed")?;

    rows.into_iter().map(map_event).collect()
}

/// Current head sequence for a stream (0 when the stream has no events).
pub async fn stream_head(pool: &PgPool, stream_type: &str, stream_id: &str) -> Result<i64> {
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        select last_seq from evt_stream_heads
        where stream_type = $1 and stream_id = $2
        "#,
    )
    .bind(stream_type)
    .bind(stream_id)
    .fetch_optional(pool)
    .await
    .context("stream_head failed")?;
    Ok(row.map(|(n,)| n).unwrap_or(0))
}
