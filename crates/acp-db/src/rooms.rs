//! Room / thread / message projections.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgConnection, PgPool, Row};

#[derive(Debug, Clone)]
pub struct RoomRow {
    pub room_id: String,
    pub workspace_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_event_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ThreadRow {
    pub thread_id: String,
    pub workspace_id: String,
    pub room_id: String,
    pub title: String,
    pub created_at: DateTime<Utc>,
    pub last_event_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MessageRow {
    pub message_id: String,
    pub workspace_id: String,
    pub room_id: String,
    pub thread_id: String,
    pub author_type: String,
    pub author_id: String,
    pub body: String,
    pub created_at: DateTime<Utc>,
    pub last_event_id: Option<String>,
}

pub async fn insert_room(
    conn: &mut PgConnection,
    workspace_id: &str,
    room_id: &str,
    title: &str,
    last_event_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into proj_rooms (room_id, workspace_id, title, last_event_id)
        values ($1, $2, $3, $4)
        "#,
    )
    .bind(room_id)
    .bind(workspace_id)
    .bind(title)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("insert_room failed")?;
    Ok(())
}

pub async fn fetch_room(
    conn: &mut PgConnection,
    workspace_id: &str,
    room_id: &str,
) -> Result<Option<RoomRow>> {
    let row = sqlx::query(
        r#"
        select room_id, workspace_id, title, created_at, last_event_id
        from proj_rooms
        where workspace_id = $1 and room_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(room_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_room failed")?;

    row.map(|r| {
        Ok(RoomRow {
            room_id: r.try_get("room_id")?,
            workspace_id: r.try_get("workspace_id")?,
            title: r.try_get("title")?,
            created_at: r.try_get("created_at")?,
            last_event_id: r.try_get("last_event_id")?,
        })
    })
    .transpose()
}

pub async fn insert_thread(
    conn: &mut PgConnection,
    workspace_id: &str,
    thread_id: &str,
    room_id: &str,
    title: &str,
    last_event_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into proj_threads (thread_id, workspace_id, room_id, title, last_event_id)
        values ($1, $2, $3, $4, $5)
        "#,
    )
    .bind(thread_id)
    .bind(workspace_id)
    .bind(room_id)
    .bind(title)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("insert_thread failed")?;
    Ok(())
}

pub async fn fetch_thread(
    conn: &mut PgConnection,
    workspace_id: &str,
    thread_id: &str,
) -> Result<Option<ThreadRow>> {
    let row = sqlx::query(
        r#"
        select thread_id, workspace_id, room_id, title, created_at, last_event_id
        from proj_threads
        where workspace_id = $1 and thread_id = $2
        "#,
    )
    .bind(workspace_id)
    .bind(thread_id)
    .fetch_optional(&mut *conn)
    .await
    .context("fetch_thread failed")?;

    row.map(|r| {
        Ok(ThreadRow {
            thread_id: r.try_get("thread_id")?,
            workspace_id: r.try_get("workspace_id")?,
            room_id: r.try_get("room_id")?,
            title: r.try_get("title")?,
            created_at: r.try_get("created_at")?,
            last_event_id: r.try_get("last_event_id")?,
        })
    })
    .transpose()
}

#[allow(clippy::too_many_arguments)]
pub async fn insert_message(
    conn: &mut PgConnection,
    workspace_id: &str,
    message_id: &str,
    room_id: &str,
    thread_id: &str,
    author_type: &str,
    author_id: &str,
    body: &str,
    last_event_id: &str,
) -> Result<()> {
    sqlx::query(
        r#"
        insert into proj_messages
            (message_id, workspace_id, room_id, thread_id, author_type, author_id,
             body, last_event_id)
        values ($1, $2, $3, $4, $5, $6, $7, $8)
        "#,
    )
    .bind(message_id)
    .bind(workspace_id)
    .bind(room_id)
    .bind(thread_id)
    .bind(author_type)
    .bind(author_id)
    .bind(body)
    .bind(last_event_id)
    .execute(&mut *conn)
    .await
    .context("insert_message failed")?;
    Ok(())
}

pub async fn list_messages(
    pool: &PgPool,
    workspace_id: &str,
    thread_id: &str,
) -> Result<Vec<MessageRow>> {
    let rows = sqlx::query(
        r#"
        select message_id, workspace_id, room_id, thread_id, author_type, author_id,
               body, created_at, last_event_id
        from proj_messages
        where workspace_id = $1 and thread_id = $2
        order by created_at asc
        "#,
    )
    .bind(workspace_id)
    .bind(thread_id)
    .fetch_all(pool)
    .await
    .context("list_messages failed")?;

    rows.into_iter()
        .map(|r| {
            Ok(MessageRow {
                message_id: r.try_get("message_id")?,
                workspace_id: r.try_get("workspace_id")?,
                room_id: r.try_get("room_id")?,
                thread_id: r.try_get("thread_id")?,
                author_type: r.try_get("author_type")?,
                author_id: r.try_get("author_id")?,
                body: r.try_get("body")?,
                created_at: r.try_get("created_at")?,
                last_event_id: r.try_get("last_event_id")?,
            })
        })
        .collect()
}
