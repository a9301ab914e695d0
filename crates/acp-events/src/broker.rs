//! In-process pub/sub fanout.
//!
//! Per-stream subscriber lists, not one global channel; a global channel
//! would serialize unrelated streams. Each subscriber owns a bounded queue;
//! a subscriber that cannot keep up is disconnected and marked overflowed
//! so the transport can emit a terminal frame instead of dropping silently.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tokio::sync::mpsc;
use tracing::warn;

use crate::types::EventFrame;

/// Bound on each subscriber's in-flight queue.
pub const SUBSCRIBER_QUEUE_CAPACITY: usize = 1024;

struct BrokerSub {
    tx: mpsc::Sender<EventFrame>,
    overflowed: Arc<AtomicBool>,
}

/// Live half of one subscription. The channel closes when the subscriber is
/// disconnected (overflow) or the broker drops; [`Subscription::overflowed`]
/// distinguishes the two after the receiver drains.
pub struct Subscription {
    pub rx: mpsc::Receiver<EventFrame>,
    overflowed: Arc<AtomicBool>,
}

impl Subscription {
    pub fn overflowed(&self) -> bool {
        self.overflowed.load(Ordering::Relaxed)
    }
}

#[derive(Default)]
pub struct Broker {
    subs: Mutex<HashMap<String, Vec<BrokerSub>>>,
}

impl Broker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Attach a live subscriber to `stream_id`.
    ///
    /// Callers doing replay must attach BEFORE reading persisted events and
    /// then deduplicate by `stream_seq`: events committed during the replay
    /// read are buffered in the queue, so the handoff has no gap.
    pub fn subscribe(&self, stream_id: &str) -> Subscription {
        let (tx, rx) = mpsc::channel(SUBSCRIBER_QUEUE_CAPACITY);
        let overflowed = Arc::new(AtomicBool::new(false));

        let mut subs = self.subs.lock().expect("broker registry poisoned");
        subs.entry(stream_id.to_string()).or_default().push(BrokerSub {
            tx,
            overflowed: Arc::clone(&overflowed),
        });

        Subscription { rx, overflowed }
    }

    /// Fan one committed frame out to the stream's subscribers.
    ///
    /// Slow subscribers are disconnected (queue full -> overflow flag set,
    /// sender dropped); closed subscribers are pruned.
    pub fn publish(&self, frame: &EventFrame) {
        let mut subs = self.subs.lock().expect("broker registry poisoned");
        let Some(list) = subs.get_mut(&frame.stream_id) else {
            return;
        };

        list.retain(|sub| match sub.tx.try_send(frame.clone()) {
            Ok(()) => true,
            Err(mpsc::error::TrySendError::Full(_)) => {
                sub.overflowed.store(true, Ordering::Relaxed);
                warn!(stream_id = %frame.stream_id, "subscriber overflow, disconnecting");
                false
            }
            Err(mpsc::error::TrySendError::Closed(_)) => false,
        });

        if list.is_empty() {
            subs.remove(&frame.stream_id);
        }
    }

    /// Number of live subscribers on a stream (test hook).
    pub fn subscriber_count(&self, stream_id: &str) -> usize {
        let subs = self.subs.lock().expect("broker registry poisoned");
        subs.get(stream_id).map(|l| l.len()).unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn frame(stream_id: &str, seq: i64) -> EventFrame {
        EventFrame {
            event_id: format!("evt_{seq}"),
            event_type: "message.created".into(),
            workspace_id: "ws_test".into(),
            room_id: Some(stream_id.to_string()),
            thread_id: None,
            run_id: None,
            step_id: None,
            stream_type: "room".into(),
            stream_id: stream_id.to_string(),
            stream_seq: seq,
            correlation_id: "cor_test".into(),
            causation_id: None,
            data: json!({}),
        }
    }

    #[tokio::test]
    async fn delivers_to_matching_stream_only() {
        let broker = Broker::new();
        let mut sub_a = broker.subscribe("rm_a");
        let mut sub_b = broker.subscribe("rm_b");

        broker.publish(&frame("rm_a", 1));

        let got = sub_a.rx.recv().await.expect("rm_a frame");
        assert_eq!(got.stream_seq, 1);
        assert!(sub_b.rx.try_recv().is_err(), "rm_b must see nothing");
    }

    #[tokio::test]
    async fn preserves_publish_order_per_subscriber() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("rm_a");

        for seq in 1..=5 {
            broker.publish(&frame("rm_a", seq));
        }

        for expected in 1..=5 {
            assert_eq!(sub.rx.recv().await.unwrap().stream_seq, expected);
        }
    }

    #[tokio::test]
    async fn overflow_disconnects_and_flags_subscriber() {
        let broker = Broker::new();
        let mut sub = broker.subscribe("rm_a");

        // Fill the queue past capacity without draining.
        for seq in 0..(SUBSCRIBER_QUEUE_CAPACITY as i64 + 2) {
            broker.publish(&frame("rm_a", seq));
        }

        assert_eq!(broker.subscriber_count("rm_a"), 0, "must be disconnected");

        // Drain what was buffered; the channel then reports closed.
        let mut drained = 0;
        while sub.rx.recv().await.is_some() {
            drained += 1;
        }
        assert_eq!(drained, SUBSCRIBER_QUEUE_CAPACITY);
        assert!(sub.overflowed(), "overflow flag must be set");
    }

    #[tokio::test]
    async fn dropped_subscriber_is_pruned_on_next_publish() {
        let broker = Broker::new();
        let sub = broker.subscribe("rm_a");
        assert_eq!(broker.subscriber_count("rm_a"), 1);

        drop(sub);
        broker.publish(&frame("rm_a", 1));
        assert_eq!(broker.subscriber_count("rm_a"), 0);
    }
}
