//! Fan-out of turn events.
//!
//! The EventBus lets several consumers (a terminal renderer, a transcript
//! writer, a UI) watch the same turns without the chat driving each of them.
//!
//! # Example
//!
//! ```rust
//! use agentstream_core::event_bus::{EventBus, TurnEvent, TurnEventKind};
//! use agentstream_core::SessionId;
//!
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe();
//!
//! bus.emit(TurnEvent::new("manus", SessionId::from("abc"), TurnEventKind::Started));
//! assert_eq!(rx.try_recv().unwrap().kind, TurnEventKind::Started);
//! ```

use tokio::sync::broadcast;

use crate::error::StreamError;
use crate::session::{SessionId, StreamEvent};

/// Events beyond this many cause slow subscribers to lag.
const DEFAULT_CAPACITY: usize = 1024;

/// What happened in a turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TurnEventKind {
    Started,
    Payload(String),
    Completed,
    Failed(StreamError),
    Cancelled,
}

impl From<StreamEvent> for TurnEventKind {
    fn from(event: StreamEvent) -> Self {
        match event {
            StreamEvent::Payload(text) => TurnEventKind::Payload(text),
            StreamEvent::Completed => TurnEventKind::Completed,
            StreamEvent::Failed(error) => TurnEventKind::Failed(error),
        }
    }
}

/// One turn event, tagged with where it came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnEvent {
    /// Agent name (e.g. "inspector").
    pub agent: String,
    pub session_id: SessionId,
    pub kind: TurnEventKind,
}

impl TurnEvent {
    pub fn new(agent: impl Into<String>, session_id: SessionId, kind: TurnEventKind) -> Self {
        Self {
            agent: agent.into(),
            session_id,
            kind,
        }
    }
}

/// Broadcasts [`TurnEvent`]s to every subscriber.
///
/// Uses a tokio broadcast channel, so subscribers may be async tasks
/// (`recv().await`) or plain threads (`try_recv`/`blocking_recv`).
pub struct EventBus {
    sender: broadcast::Sender<TurnEvent>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Send to all current subscribers.
    ///
    /// Returns how many received it; with no subscribers the event is dropped.
    pub fn emit(&self, event: TurnEvent) -> usize {
        self.sender.send(event).unwrap_or(0)
    }

    /// Receive every future event. Past events are not replayed.
    pub fn subscribe(&self) -> broadcast::Receiver<TurnEvent> {
        self.sender.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
