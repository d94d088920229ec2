//! Event bus for tracker notifications.
//!
//! Presentation layers subscribe here instead of polling tracker state. The
//! bus assigns sequential identifiers and keeps a bounded replay ring so a
//! subscriber that attaches late can catch up from a known id. Internally it
//! uses `tokio::broadcast`; when the channel overflows the oldest events are
//! dropped.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use tokio::sync::broadcast;
use tokio::sync::broadcast::{Receiver, Sender};

/// Identifier assigned to each published event.
pub type EventId = u64;

/// Default buffer size for the in-memory replay ring.
const DEFAULT_REPLAY_CAPACITY: usize = 256;

/// Typed tracker events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Event {
    /// A new task was accepted by the service and is now the active task.
    TaskSubmitted {
        task_id: String,
        url: String,
        format: String,
    },
    /// The active task reported fresh progress.
    ActiveProgress {
        task_id: String,
        status: String,
        progress: f64,
    },
    /// The active task finished and its artifact is ready.
    ActiveCompleted {
        task_id: String,
        filename: Option<String>,
        title: Option<String>,
    },
    /// The active task failed or vanished from the service.
    ActiveFailed {
        task_id: Option<String>,
        message: String,
    },
    /// The active task pointer was cleared.
    ActiveCleared { task_id: String },
    /// One reconciliation pass over the history finished with changes.
    HistoryChanged {
        active_count: usize,
        records: usize,
    },
    /// Startup restoration finished.
    SessionRestored { outcome: String },
}

impl Event {
    /// Machine-friendly discriminator for log fields and filters.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::TaskSubmitted { .. } => "task_submitted",
            Self::ActiveProgress { .. } => "active_progress",
            Self::ActiveCompleted { .. } => "active_completed",
            Self::ActiveFailed { .. } => "active_failed",
            Self::ActiveCleared { .. } => "active_cleared",
            Self::HistoryChanged { .. } => "history_changed",
            Self::SessionRestored { .. } => "session_restored",
        }
    }

    /// Task the event refers to, when it refers to exactly one.
    #[must_use]
    pub fn task_id(&self) -> Option<&str> {
        match self {
            Self::TaskSubmitted { task_id, .. }
            | Self::ActiveProgress { task_id, .. }
            | Self::ActiveCompleted { task_id, .. }
            | Self::ActiveCleared { task_id } => Some(task_id),
            Self::ActiveFailed { task_id, .. } => task_id.as_deref(),
            Self::HistoryChanged { .. } | Self::SessionRestored { .. } => None,
        }
    }
}

/// Metadata wrapper around events.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize, PartialEq)]
pub struct EventEnvelope {
    pub id: EventId,
    pub timestamp: DateTime<Utc>,
    pub event: Event,
}

/// Shared event bus built on top of `tokio::broadcast`.
#[derive(Clone)]
pub struct EventBus {
    sender: Sender<EventEnvelope>,
    buffer: Arc<Mutex<VecDeque<EventEnvelope>>>,
    next_id: Arc<AtomicU64>,
    replay_capacity: usize,
}

impl EventBus {
    /// Construct a new bus with the provided broadcast capacity.
    ///
    /// # Panics
    ///
    /// Panics if `capacity` is zero.
    #[must_use]
    pub fn with_capacity(capacity: usize) -> Self {
        assert!(capacity > 0, "event bus capacity must be positive");
        let (sender, _) = broadcast::channel(capacity);
        Self {
            sender,
            buffer: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            next_id: Arc::new(AtomicU64::new(1)),
            replay_capacity: capacity,
        }
    }

    /// Construct a bus with the default replay buffer size.
    #[must_use]
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_REPLAY_CAPACITY)
    }

    /// Publish an event, assigning it the next sequential identifier.
    ///
    /// Publishing never fails when nobody is subscribed; the event still lands
    /// in the replay ring.
    pub fn publish(&self, event: Event) -> EventId {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        let envelope = EventEnvelope {
            id,
            timestamp: Utc::now(),
            event,
        };

        {
            let mut buffer = self
                .buffer
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            if buffer.len() == self.replay_capacity {
                buffer.pop_front();
            }
            buffer.push_back(envelope.clone());
        }

        let _ = self.sender.send(envelope);
        id
    }

    /// Subscribe to the bus, replaying buffered events newer than `since_id`.
    #[must_use]
    pub fn subscribe(&self, since_id: Option<EventId>) -> EventStream {
        let mut backlog = VecDeque::new();
        if let Some(since) = since_id {
            let buffer = self
                .buffer
                .lock()
                .unwrap_or_else(std::sync::PoisonError::into_inner);
            backlog.extend(buffer.iter().filter(|item| item.id > since).cloned());
        }

        let receiver = self.sender.subscribe();
        EventStream { backlog, receiver }
    }

    /// Returns the last assigned identifier, if any events have been published.
    #[must_use]
    pub fn last_event_id(&self) -> Option<EventId> {
        let buffer = self
            .buffer
            .lock()
            .unwrap_or_else(std::sync::PoisonError::into_inner);
        buffer.back().map(|event| event.id)
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

/// Stream wrapper yielding events from the replay backlog, then the live channel.
pub struct EventStream {
    backlog: VecDeque<EventEnvelope>,
    receiver: Receiver<EventEnvelope>,
}

impl EventStream {
    /// Receive the next event, respecting the replay backlog first.
    pub async fn next(&mut self) -> Option<EventEnvelope> {
        if let Some(event) = self.backlog.pop_front() {
            return Some(event);
        }

        loop {
            match self.receiver.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio::time::timeout;

    fn history_event(active_count: usize) -> Event {
        Event::HistoryChanged {
            active_count,
            records: active_count + 1,
        }
    }

    #[tokio::test]
    async fn sequential_ids_and_replay() {
        let bus = EventBus::with_capacity(16);

        let mut last_id = 0;
        for i in 0..5 {
            last_id = bus.publish(history_event(i));
        }
        assert_eq!(last_id, 5);
        assert_eq!(bus.last_event_id(), Some(5));

        let mut stream = bus.subscribe(Some(2));
        let mut received = Vec::new();
        for _ in 0..3 {
            if let Some(event) = stream.next().await {
                received.push(event.id);
            }
        }
        assert_eq!(received, vec![3, 4, 5]);
    }

    #[tokio::test]
    async fn replay_ring_drops_oldest_entries() {
        let bus = EventBus::with_capacity(2);
        for i in 0..4 {
            let _ = bus.publish(history_event(i));
        }
        let mut stream = bus.subscribe(Some(0));
        let first = stream.next().await.expect("backlog event");
        assert_eq!(first.id, 3);
    }

    #[tokio::test]
    async fn live_subscribers_receive_new_events() {
        let bus = EventBus::new();
        let mut stream = bus.subscribe(None);
        let id = bus.publish(Event::ActiveCleared {
            task_id: "t-1".into(),
        });
        let envelope = timeout(Duration::from_secs(1), stream.next())
            .await
            .expect("event delivered")
            .expect("stream open");
        assert_eq!(envelope.id, id);
        assert_eq!(envelope.event.kind(), "active_cleared");
        assert_eq!(envelope.event.task_id(), Some("t-1"));
    }

    #[tokio::test]
    async fn publishing_without_subscribers_still_fills_the_replay_ring() {
        let bus = EventBus::new();
        let first = bus.publish(history_event(0));
        let second = bus.publish(history_event(1));
        assert_eq!((first, second), (1, 2));

        let mut stream = bus.subscribe(Some(0));
        let replayed = stream.next().await.expect("backlog event");
        assert_eq!(replayed.id, 1);
        assert_eq!(replayed.event.kind(), "history_changed");
    }
}
