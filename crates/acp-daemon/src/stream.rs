//! SSE room streams: replay-then-live with no gaps or duplicates.

use std::collections::VecDeque;
use std::convert::Infallible;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::{HeaderMap, HeaderValue};
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::{stream, Stream};

use acp_events::log::fetch_stream_after;
use acp_events::{EventFrame, Subscription};

use crate::api_types::StreamQuery;
use crate::error::ApiError;
use crate::extract::WorkspaceId;
use crate::state::AppState;

/// GET /v1/streams/rooms/{room_id}?from_seq=N
///
/// The subscriber attaches to the live fanout FIRST, then the persisted
/// events with `stream_seq > from_seq` are replayed; live frames that were
/// buffered during the replay read are deduplicated by sequence. Each event
/// is one `data: <json>` frame; a subscriber disconnected for falling
/// behind receives a terminal `overflow` frame.
pub(crate) async fn stream_room(
    State(st): State<Arc<AppState>>,
    WorkspaceId(workspace_id): WorkspaceId,
    Path(room_id): Path<String>,
    Query(query): Query<StreamQuery>,
) -> Result<Response, ApiError> {
    {
        let mut conn = st.pool.acquire().await.map_err(anyhow::Error::from)?;
        acp_db::rooms::fetch_room(&mut conn, &workspace_id, &room_id)
            .await?
            .ok_or_else(|| ApiError::NotFound(format!("room {room_id}")))?;
    }

    // Live first, replay second: anything committed between the two is
    // waiting in the subscriber queue and dedupes by stream_seq.
    let subscription = st.broker.subscribe(&room_id);
    let replay = fetch_stream_after(&st.pool, "room", &room_id, query.from_seq).await?;

    let events = merged_stream(replay, subscription, query.from_seq);

    let mut headers = HeaderMap::new();
    headers.insert("Cache-Control", HeaderValue::from_static("no-cache"));
    headers.insert("Connection", HeaderValue::from_static("keep-alive"));

    Ok((headers, Sse::new(events).keep_alive(KeepAlive::new())).into_response())
}

struct StreamState {
    replay: VecDeque<EventFrame>,
    subscription: Subscription,
    last_seq: i64,
    closed: bool,
}

fn merged_stream(
    replay: Vec<acp_events::EventRecord>,
    subscription: Subscription,
    from_seq: i64,
) -> impl Stream<Item = Result<Event, Infallible>> {
    let state = StreamState {
        replay: replay.iter().map(EventFrame::from).collect(),
        subscription,
        last_seq: from_seq,
        closed: false,
    };

    stream::unfold(state, |mut st| async move {
        loop {
            if let Some(frame) = st.replay.pop_front() {
                st.last_seq = frame.stream_seq;
                return Some((Ok(frame_event(&frame)), st));
            }
            if st.closed {
                return None;
            }
            match st.subscription.rx.recv().await {
                Some(frame) => {
                    // Already delivered via replay.
                    if frame.stream_seq <= st.last_seq {
                        continue;
                    }
                    st.last_seq = frame.stream_seq;
                    return Some((Ok(frame_event(&frame)), st));
                }
                None => {
                    st.closed = true;
                    if st.subscription.overflowed() {
                        return Some((
                            Ok(Event::default().event("overflow").data("{}")),
                            st,
                        ));
                    }
                    return None;
                }
            }
        }
    })
}

fn frame_event(frame: &EventFrame) -> Event {
    let data = serde_json::to_string(frame).unwrap_or_else(|_| "{}".to_string());
    Event::default().data(data)
}
