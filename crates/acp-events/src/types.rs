//! Event records, wire frames, and the correlation/causation context.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::ids;

/// One persisted event row.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRecord {
    pub event_id: String,
    pub stream_type: String,
    pub stream_id: String,
    pub stream_seq: i64,
    pub event_type: String,
    pub workspace_id: String,
    pub room_id: Option<String>,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
    pub step_id: Option<String>,
    pub correlation_id: String,
    pub causation_id: Option<String>,
    pub occurred_at: DateTime<Utc>,
    pub recorded_at: DateTime<Utc>,
    pub data: Value,
}

/// The JSON shape delivered to SSE subscribers, one frame per event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event_id: String,
    pub event_type: String,
    pub workspace_id: String,
    pub room_id: Option<String>,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
    pub step_id: Option<String>,
    pub stream_type: String,
    pub stream_id: String,
    pub stream_seq: i64,
    pub correlation_id: String,
    pub causation_id: Option<String>,
    pub data: Value,
}

impl From<&EventRecord> for EventFrame {
    fn from(rec: &EventRecord) -> Self {
        Self {
            event_id: rec.event_id.clone(),
            event_type: rec.event_type.clone(),
            workspace_id: rec.workspace_id.clone(),
            room_id: rec.room_id.clone(),
            thread_id: rec.thread_id.clone(),
            run_id: rec.run_id.clone(),
            step_id: rec.step_id.clone(),
            stream_type: rec.stream_type.clone(),
            stream_id: rec.stream_id.clone(),
            stream_seq: rec.stream_seq,
            correlation_id: rec.correlation_id.clone(),
            causation_id: rec.causation_id.clone(),
            data: rec.data.clone(),
        }
    }
}

/// Correlation/causation context threaded through one unit-of-work.
///
/// Explicit fields, not ambient state: handlers build the context from the
/// request, background jobs build it from the work item they act on behalf
/// of. The first append inherits `parent_event_id` as its causation (or
/// none, for externally originated events); every later append in the same
/// context is caused by the previous one.
#[derive(Debug, Clone)]
pub struct EventContext {
    pub workspace_id: String,
    /// Inherited from the originating run, or minted `cor_...` on first append.
    pub correlation_id: Option<String>,
    pub room_id: Option<String>,
    pub thread_id: Option<String>,
    pub run_id: Option<String>,
    pub step_id: Option<String>,
    /// Caller-provided causation for the first append.
    pub parent_event_id: Option<String>,
    /// Id of the last event appended through this context.
    pub(crate) last_event_id: Option<String>,
}

impl EventContext {
    pub fn new(workspace_id: impl Into<String>) -> Self {
        Self {
            workspace_id: workspace_id.into(),
            correlation_id: None,
            room_id: None,
            thread_id: None,
            run_id: None,
            step_id: None,
            parent_event_id: None,
            last_event_id: None,
        }
    }

    pub fn in_room(mut self, room_id: impl Into<String>) -> Self {
        self.room_id = Some(room_id.into());
        self
    }

    pub fn in_thread(mut self, thread_id: impl Into<String>) -> Self {
        self.thread_id = Some(thread_id.into());
        self
    }

    /// Bind the context to a run, inheriting its correlation id.
    pub fn for_run(mut self, run_id: impl Into<String>, correlation_id: impl Into<String>) -> Self {
        self.run_id = Some(run_id.into());
        self.correlation_id = Some(correlation_id.into());
        self
    }

    pub fn in_step(mut self, step_id: impl Into<String>) -> Self {
        self.step_id = Some(step_id.into());
        self
    }

    /// Set the causation parent for the first append.
    pub fn caused_by(mut self, parent_event_id: Option<String>) -> Self {
        self.parent_event_id = parent_event_id;
        self
    }

    /// Stream routing: room-scoped when the context carries a room,
    /// workspace-scoped otherwise.
    pub fn stream(&self) -> (&'static str, String) {
        match &self.room_id {
            Some(room) => ("room", room.clone()),
            None => ("workspace", self.workspace_id.clone()),
        }
    }

    /// Correlation id for the next append, minting one if absent.
    pub(crate) fn correlation_or_mint(&mut self) -> String {
        self.correlation_id
            .get_or_insert_with(|| ids::mint(ids::CORRELATION))
            .clone()
    }

    /// Causation id for the next append: the previous event in this context,
    /// else the caller-provided parent, else none.
    pub(crate) fn next_causation(&self) -> Option<String> {
        self.last_event_id
            .clone()
            .or_else(|| self.parent_event_id.clone())
    }

    pub fn last_event_id(&self) -> Option<&str> {
        self.last_event_id.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stream_routing_prefers_room() {
        let ctx = EventContext::new("ws_1").in_room("rm_abc");
        assert_eq!(ctx.stream(), ("room", "rm_abc".to_string()));

        let ctx = EventContext::new("ws_1");
        assert_eq!(ctx.stream(), ("workspace", "ws_1".to_string()));
    }

    #[test]
    fn causation_prefers_last_appended_event() {
        let mut ctx = EventContext::new("ws_1").caused_by(Some("evt_parent".into()));
        assert_eq!(ctx.next_causation().as_deref(), Some("evt_parent"));

        ctx.last_event_id = Some("evt_prior".into());
        assert_eq!(ctx.next_causation().as_deref(), Some("evt_prior"));
    }

    #[test]
    fn correlation_minted_once_and_reused() {
        let mut ctx = EventContext::new("ws_1");
        let first = ctx.correlation_or_mint();
        assert!(first.starts_with("cor_"));
        assert_eq!(ctx.correlation_or_mint(), first);
    }
}
