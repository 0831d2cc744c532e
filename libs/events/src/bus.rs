//! The in-process event bus.
//!
//! A thin wrapper over a tokio broadcast channel. Publication is
//! fire-and-forget: a publish with no live subscribers succeeds, and slow
//! subscribers that lag simply miss events. Publishing after `close()`
//! fails, which lets the core detect that it can no longer observe its
//! own tasks.

use std::sync::atomic::{AtomicBool, Ordering};

use tokio::sync::broadcast;

use crate::{EventError, SchedulerEvent};

/// Receiving half of an event bus subscription.
pub type EventReceiver = broadcast::Receiver<SchedulerEvent>;

/// Fire-and-forget broadcast bus for [`SchedulerEvent`]s.
pub struct EventBus {
    tx: broadcast::Sender<SchedulerEvent>,
    closed: AtomicBool,
}

impl EventBus {
    /// Creates a bus retaining up to `capacity` undelivered events per
    /// subscriber.
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self {
            tx,
            closed: AtomicBool::new(false),
        }
    }

    /// Publishes an event to all current subscribers.
    pub fn publish(&self, event: SchedulerEvent) -> Result<(), EventError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(EventError::Closed);
        }
        // A send error only means there are no subscribers right now.
        let _ = self.tx.send(event);
        Ok(())
    }

    /// Subscribes to events published after this call.
    pub fn subscribe(&self) -> EventReceiver {
        self.tx.subscribe()
    }

    /// Closes the bus; subsequent publishes fail.
    pub fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }

    /// Number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}
