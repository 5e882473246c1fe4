//! Publish bus for external reducer state
//!
//! Every external state a pipeline publishes can be broadcast here for
//! dashboards (SSE subscribers) to pick up. Publishing is fire-and-forget:
//! a state with nobody listening is simply dropped.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::broadcast;

/// One published external state
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PublishedState {
    /// Fully-qualified reducer name
    pub reducer: String,
    /// Store key the state was written under
    pub key: String,
    /// The external state itself
    pub state: Value,
    /// When the state was published
    pub timestamp: DateTime<Utc>,
}

/// Broadcast channel of published states
pub struct PublishBus {
    tx: broadcast::Sender<PublishedState>,
    capacity: usize,
}

impl PublishBus {
    /// Creates a new bus buffering up to `capacity` states per slow subscriber
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx, capacity }
    }

    /// Subscribe to all future states
    ///
    /// States published before subscription are not received.
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedState> {
        self.tx.subscribe()
    }

    /// Publish a state to every current subscriber
    ///
    /// Returns how many subscribers received it; zero when nobody is
    /// listening, in which case the state is dropped.
    pub fn emit(&self, state: PublishedState) -> usize {
        self.tx.send(state).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
