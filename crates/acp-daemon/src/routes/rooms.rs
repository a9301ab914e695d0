//! Room / thread / message projections.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::Json;
use serde_json::json;

use acp_db::rooms;
use acp_events::{ids, EventContext, UnitOfWork};

use crate::api_types::{
    CreateMessageRequest, CreateRoomRequest, CreateThreadRequest, MessageResponse, RoomResponse,
    ThreadResponse,
};
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

pub(crate) async fn create_room(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Json(body): Json<CreateRoomRequest>,
) -> Result<Json<RoomResponse>, ApiError> {
    let room_id = ids::mint(ids::ROOM);
    let ctx = EventContext::new(&workspace_id).in_room(room_id.clone());
    let mut uow = UnitOfWork::begin(&st.pool, ctx).await?;

    let record = uow
        .append(
            "room.created",
            json!({
                "room_id": room_id,
                "title": body.title,
            }),
        )
        .await?;

    rooms::insert_room(uow.conn(), &workspace_id, &room_id, &body.title, &record.event_id).await?;
    uow.commit(&st.broker).await?;

    Ok(Json(RoomResponse {
        room_id,
        title: body.title,
        last_event_id: Some(record.event_id),
    }))
}

pub(crate) async fn get_room(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(room_id): Path<String>,
) -> Result<Json<RoomResponse>, ApiError> {
    let mut conn = st.pool.acquire().await.map_err(anyhow::Error::from)?;
    let room = rooms::fetch_room(&mut conn, &workspace_id, &room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("room {room_id}")))?;

    Ok(Json(RoomResponse {
        room_id: room.room_id,
        title: room.title,
        last_event_id: room.last_event_id,
    }))
}

pub(crate) async fn create_thread(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(room_id): Path<String>,
    Json(body): Json<CreateThreadRequest>,
) -> Result<Json<ThreadResponse>, ApiError> {
    let ctx = EventContext::new(&workspace_id).in_room(room_id.clone());
    let mut uow = UnitOfWork::begin(&st.pool, ctx).await?;

    rooms::fetch_room(uow.conn(), &workspace_id, &room_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("room {room_id}")))?;

    let thread_id = ids::mint(ids::THREAD);
    uow.ctx_mut().thread_id = Some(thread_id.clone());

    let record = uow
        .append(
            "thread.created",
            json!({
                "thread_id": thread_id,
                "room_id": room_id,
                "title": body.title,
            }),
        )
        .await?;

    rooms::insert_thread(
        uow.conn(),
        &workspace_id,
        &thread_id,
        &room_id,
        &body.title,
        &record.event_id,
    )
    .await?;
    uow.commit(&st.broker).await?;

    Ok(Json(ThreadResponse {
        thread_id,
        room_id,
        title: body.title,
        last_event_id: Some(record.event_id),
    }))
}

pub(crate) async fn create_message(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(thread_id): Path<String>,
    Json(body): Json<CreateMessageRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    let mut uow = UnitOfWork::begin(&st.pool, EventContext::new(&workspace_id)).await?;

    let thread = rooms::fetch_thread(uow.conn(), &workspace_id, &thread_id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("thread {thread_id}")))?;

    let message_id = ids::mint(ids::MESSAGE);
    {
        let ctx = uow.ctx_mut();
        ctx.room_id = Some(thread.room_id.clone());
        ctx.thread_id = Some(thread_id.clone());
    }

    // Externally originated: no causation parent.
    let record = uow
        .append(
            "message.created",
            json!({
                "message_id": message_id,
                "thread_id": thread_id,
                "author_type": body.author_type,
                "author_id": body.author_id,
            }),
        )
        .await?;

    rooms::insert_message(
        uow.conn(),
        &workspace_id,
        &message_id,
        &thread.room_id,
        &thread_id,
        &body.author_type,
        &body.author_id,
        &body.body,
        &record.event_id,
    )
    .await?;
    uow.commit(&st.broker).await?;

    Ok(Json(MessageResponse {
        message_id,
        thread_id,
        room_id: thread.room_id,
        last_event_id: Some(record.event_id),
    }))
}
