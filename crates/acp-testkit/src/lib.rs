//! Shared helpers for DB-backed scenario tests.
//!
//! All scenario tests gate on `DATABASE_URL`; each test isolates itself by
//! working in a unique workspace id rather than truncating tables.

use anyhow::Result;
use serde_json::json;
use sqlx::PgPool;
use uuid::Uuid;

use acp_events::{ids, Broker, EventContext, UnitOfWork};

/// Connect using DATABASE_URL and ensure migrations are applied.
pub async fn db_pool() -> Result<PgPool> {
    acp_db::testkit_db_pool().await
}

/// A fresh workspace id per test keeps scenarios independent.
pub fn workspace_id() -> String {
    format!("ws_test_{}", Uuid::new_v4().simple())
}

#[derive(Debug, Clone)]
pub struct SeededAgent {
    pub agent_id: String,
    pub principal_id: String,
}

/// Register a principal + agent pair directly through the stores.
pub async fn seed_agent(
    pool: &PgPool,
    workspace_id: &str,
    display_name: &str,
) -> Result<SeededAgent> {
    let broker = Broker::new();
    let agent_id = ids::mint(ids::AGENT);

    let mut uow = UnitOfWork::begin(pool, EventContext::new(workspace_id)).await?;
    let (principal, _created) = acp_db::principals::ensure_by_actor(
        uow.conn(),
        workspace_id,
        &ids::mint(ids::PRINCIPAL),
        "agent",
        "agent",
        &agent_id,
    )
    .await?;

    let record = uow
        .append(
            "agent.registered",
            json!({ "agent_id": agent_id, "display_name": display_name }),
        )
        .await?;
    acp_db::agents::insert_agent(
        uow.conn(),
        workspace_id,
        &agent_id,
        &principal.principal_id,
        display_name,
        &record.event_id,
    )
    .await?;
    uow.commit(&broker).await?;

    Ok(SeededAgent {
        agent_id,
        principal_id: principal.principal_id,
    })
}

/// Create a room projection with its `room.created` event.
pub async fn seed_room(pool: &PgPool, workspace_id: &str, title: &str) -> Result<String> {
    let broker = Broker::new();
    let room_id = ids::mint(ids::ROOM);

    let mut uow = UnitOfWork::begin(
        pool,
        EventContext::new(workspace_id).in_room(room_id.clone()),
    )
    .await?;
    let record = uow
        .append("room.created", json!({ "room_id": room_id, "title": title }))
        .await?;
    acp_db::rooms::insert_room(uow.conn(), workspace_id, &room_id, title, &record.event_id).await?;
    uow.commit(&broker).await?;

    Ok(room_id)
}
