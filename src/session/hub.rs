// src/session/hub.rs

//! Fan-out of session output to job-scoped subscribers.
//!
//! The output pump publishes every chunk here. A job subscribes when it
//! is dispatched and drops its [`Subscription`] when it resolves; dropping is
//! the only way to detach, so a subscription is torn down exactly once and
//! never outlives its job. Chunks published while nobody is subscribed are
//! discarded.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::mpsc;
use tracing::trace;

use super::SessionEvent;

#[derive(Debug, Default)]
struct HubState {
    next_id: u64,
    closed: bool,
    subscribers: HashMap<u64, mpsc::UnboundedSender<SessionEvent>>,
}

/// Shared registry of output subscribers for one session.
#[derive(Debug, Clone, Default)]
pub struct StreamHub {
    state: Arc<Mutex<HubState>>,
}

impl StreamHub {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, HubState> {
        // A poisoned lock only means a subscriber panicked mid-publish; the
        // map itself is still consistent.
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Register a new subscriber.
    ///
    /// Subscribing to a hub that has already closed yields a subscription
    /// whose first event is [`SessionEvent::Closed`].
    pub fn subscribe(&self) -> Subscription {
        let (tx, rx) = mpsc::unbounded_channel();
        let mut state = self.lock();

        let id = state.next_id;
        state.next_id += 1;

        if state.closed {
            let _ = tx.send(SessionEvent::Closed);
        } else {
            state.subscribers.insert(id, tx);
        }
        trace!(id, listeners = state.subscribers.len(), "subscribed to session output");

        Subscription {
            id,
            rx,
            hub: self.clone(),
        }
    }

    /// Deliver an event to every current subscriber.
    pub fn publish(&self, event: SessionEvent) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state
            .subscribers
            .retain(|_, tx| tx.send(event.clone()).is_ok());
    }

    /// Deliver [`SessionEvent::Closed`] and refuse any further events.
    ///
    /// Only the first call has an effect.
    pub fn close(&self) {
        let mut state = self.lock();
        if state.closed {
            return;
        }
        state.closed = true;
        for (_, tx) in state.subscribers.drain() {
            let _ = tx.send(SessionEvent::Closed);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    /// Number of live subscriptions.
    pub fn listener_count(&self) -> usize {
        self.lock().subscribers.len()
    }

    fn unsubscribe(&self, id: u64) {
        let mut state = self.lock();
        state.subscribers.remove(&id);
        trace!(id, listeners = state.subscribers.len(), "unsubscribed from session output");
    }
}

/// Handle to one subscriber's event stream. Detaches on drop.
#[derive(Debug)]
pub struct Subscription {
    id: u64,
    rx: mpsc::UnboundedReceiver<SessionEvent>,
    hub: StreamHub,
}

impl Subscription {
    /// Next event, or `None` once the hub has gone away.
    pub async fn recv(&mut self) -> Option<SessionEvent> {
        self.rx.recv().await
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.hub.unsubscribe(self.id);
    }
}
