//! Decoupled event bus for observing a run.
//!
//! The engine emits events via [`EventBus::emit`]; anything interested
//! (tests, a status display) subscribes via [`EventBus::subscribe`]. Built on
//! [`tokio::sync::broadcast`] so multiple listeners can react independently.

use std::time::Duration;

use tokio::sync::broadcast;

use crate::client::MessageId;

/// Lifecycle phases of a run, in order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Init,
    Backfill,
    Live,
    Shutdown,
}

/// Events that flow through the system.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    /// The engine entered a new phase.
    PhaseChanged(Phase),
    /// A message was claimed and its dispatch is starting.
    DispatchStarted { message: MessageId },
    /// A message was already claimed; nothing was sent.
    DuplicateSkipped { message: MessageId },
    /// One reaction landed.
    ReactionSent {
        session: String,
        message: MessageId,
        symbol: String,
    },
    /// A try failed and another follows after `delay`.
    RetryScheduled {
        session: String,
        message: MessageId,
        attempt: u32,
        delay: Duration,
    },
    /// Every try failed; the session is skipped for this message.
    SessionExhausted { session: String, message: MessageId },
}

/// A broadcast channel that any component can emit to or subscribe from.
#[derive(Debug)]
pub struct EventBus {
    tx: broadcast::Sender<Event>,
}

impl EventBus {
    /// Create a new event bus with the given channel capacity.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    /// Returns the number of receivers that will see it.
    pub fn emit(&self, event: Event) -> usize {
        self.tx.send(event).unwrap_or(0)
    }

    /// Subscribe to events. Returns a receiver that yields all
    /// future events (does not replay past ones).
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.tx.subscribe()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(1024)
    }
}

/// Drain whatever is buffered in `rx` without waiting.
pub fn drain(rx: &mut broadcast::Receiver<Event>) -> Vec<Event> {
    let mut events = Vec::new();
    loop {
        match rx.try_recv() {
            Ok(event) => events.push(event),
            Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
            Err(_) => break,
        }
    }
    events
}
